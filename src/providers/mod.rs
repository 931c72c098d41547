pub mod gitlab;

use async_trait::async_trait;

use crate::error::TrackerResult;
use crate::model::work_item::{ItemState, IterationRef, RelationRef, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateFilter {
    #[default]
    Opened,
    Closed,
    All,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateFilter::Opened => "opened",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

impl std::str::FromStr for StateFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "opened" | "open" => Ok(StateFilter::Opened),
            "closed" => Ok(StateFilter::Closed),
            "all" => Ok(StateFilter::All),
            other => Err(format!("unknown state '{other}' (use opened, closed or all)")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub state: StateFilter,
    /// Items must carry every one of these labels.
    pub labels: Vec<String>,
}

/// Plain field assignments for one save call. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub state: Option<ItemState>,
    pub weight: Option<u32>,
    pub labels: Option<Vec<String>>,
}

impl ItemUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.state.is_none()
            && self.weight.is_none()
            && self.labels.is_none()
    }
}

/// Creation payload. Relations are passed as already-resolved ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub weight: Option<u32>,
    pub epic_id: Option<u64>,
    pub milestone_id: Option<u64>,
}

/// The remote project tracker. Project and group come from the
/// configuration the implementation was built with.
#[async_trait]
pub trait Tracker: Send + Sync {
    fn name(&self) -> &str;
    async fn get_item(&self, iid: u64) -> TrackerResult<WorkItem>;
    async fn list_items(&self, filter: &ItemFilter) -> TrackerResult<Vec<WorkItem>>;
    async fn create_item(&self, item: &NewItem) -> TrackerResult<WorkItem>;
    async fn save_item(&self, iid: u64, update: &ItemUpdate) -> TrackerResult<()>;

    async fn list_epics(&self) -> TrackerResult<Vec<RelationRef>>;
    async fn attach_epic(&self, item: &WorkItem, epic_id: u64) -> TrackerResult<()>;
    async fn clear_epic(&self, item: &WorkItem) -> TrackerResult<()>;

    async fn list_milestones(&self) -> TrackerResult<Vec<RelationRef>>;
    async fn attach_milestone(&self, item: &WorkItem, milestone_id: u64) -> TrackerResult<()>;
    async fn clear_milestone(&self, item: &WorkItem) -> TrackerResult<()>;

    async fn list_iterations(&self) -> TrackerResult<Vec<IterationRef>>;

    /// `duration` uses the tracker's short form, e.g. `1h54m`.
    async fn log_time(&self, iid: u64, duration: &str) -> TrackerResult<()>;
}

#[cfg(test)]
pub mod tests;
