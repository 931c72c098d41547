use chrono::NaiveDate;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::TrackerResult;
use crate::model::work_item::{IterationRef, RelationRef};
use crate::providers::Tracker;

/// Resolves human-readable relation references to tracker ids.
///
/// Candidate lists are fetched on first use and cached for the rest of the
/// pass. Matching is case-insensitive on trimmed titles and the first match
/// in listing order wins; which of two same-titled epics is picked is not
/// otherwise specified.
pub struct RelationalResolver<'a> {
    tracker: &'a dyn Tracker,
    epics: OnceCell<Vec<RelationRef>>,
    milestones: OnceCell<Vec<RelationRef>>,
    iterations: OnceCell<Vec<IterationRef>>,
}

impl<'a> RelationalResolver<'a> {
    pub fn new(tracker: &'a dyn Tracker) -> Self {
        Self {
            tracker,
            epics: OnceCell::new(),
            milestones: OnceCell::new(),
            iterations: OnceCell::new(),
        }
    }

    pub async fn resolve_epic(&self, title: &str) -> TrackerResult<Option<RelationRef>> {
        let epics = self
            .epics
            .get_or_try_init(|| self.tracker.list_epics())
            .await?;
        Ok(found_or_warn("epic", title, find_by_title(epics, title)))
    }

    pub async fn resolve_milestone(&self, title: &str) -> TrackerResult<Option<RelationRef>> {
        let milestones = self
            .milestones
            .get_or_try_init(|| self.tracker.list_milestones())
            .await?;
        Ok(found_or_warn("milestone", title, find_by_title(milestones, title)))
    }

    pub async fn resolve_iteration(&self, start_date: &str) -> TrackerResult<Option<IterationRef>> {
        let Ok(date) = start_date.trim().parse::<NaiveDate>() else {
            warn!(start_date, "iteration start date is not a YYYY-MM-DD date");
            return Ok(None);
        };
        let iterations = self
            .iterations
            .get_or_try_init(|| self.tracker.list_iterations())
            .await?;
        let found = iterations.iter().find(|i| i.start_date == date).cloned();
        Ok(found_or_warn("iteration", start_date, found))
    }
}

fn find_by_title(candidates: &[RelationRef], title: &str) -> Option<RelationRef> {
    let wanted = title.trim().to_lowercase();
    candidates
        .iter()
        .find(|c| c.title.trim().to_lowercase() == wanted)
        .cloned()
}

fn found_or_warn<T: std::fmt::Debug>(kind: &str, reference: &str, found: Option<T>) -> Option<T> {
    match &found {
        Some(r) => debug!(kind, reference, resolved = ?r, "resolved reference"),
        None => warn!(kind, reference, "reference not found"),
    }
    found
}
