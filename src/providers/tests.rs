use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ItemFilter, ItemUpdate, NewItem, StateFilter, Tracker};
use crate::error::{TrackerError, TrackerResult};
use crate::model::work_item::{sample_item, ItemState, IterationRef, RelationRef, WorkItem};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get(u64),
    List,
    Create(NewItem),
    Save(u64, ItemUpdate),
    ListEpics,
    AttachEpic { iid: u64, epic_id: u64 },
    ClearEpic(u64),
    ListMilestones,
    AttachMilestone { iid: u64, milestone_id: u64 },
    ClearMilestone(u64),
    ListIterations,
    LogTime(u64, String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::Get(_) | Call::List | Call::ListEpics | Call::ListMilestones | Call::ListIterations
        )
    }
}

/// In-memory tracker that records every call and applies writes to its own
/// item list, so a second pass sees the result of the first.
pub struct MockTracker {
    items: Mutex<Vec<WorkItem>>,
    epics: Vec<RelationRef>,
    milestones: Vec<RelationRef>,
    iterations: Vec<IterationRef>,
    forbidden: Vec<u64>,
    failing_listings: AtomicU32,
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl MockTracker {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items: Mutex::new(items),
            epics: Vec::new(),
            milestones: Vec::new(),
            iterations: Vec::new(),
            forbidden: Vec::new(),
            failing_listings: AtomicU32::new(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_epics(mut self, epics: &[(u64, &str)]) -> Self {
        self.epics = relations(epics);
        self
    }

    pub fn with_milestones(mut self, milestones: &[(u64, &str)]) -> Self {
        self.milestones = relations(milestones);
        self
    }

    pub fn with_iterations(mut self, iterations: Vec<IterationRef>) -> Self {
        self.iterations = iterations;
        self
    }

    /// Saves to this iid fail with a permission error.
    pub fn with_forbidden(mut self, iid: u64) -> Self {
        self.forbidden.push(iid);
        self
    }

    /// The next `count` epic or milestone listings fail with a 503.
    pub fn with_failing_listings(self, count: u32) -> Self {
        self.failing_listings.store(count, Ordering::SeqCst);
        self
    }

    fn listing_outage(&self) -> TrackerResult<()> {
        let failed = self
            .failing_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(TrackerError::Api {
                status: 503,
                message: "service unavailable".into(),
            })
        } else {
            Ok(())
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn item(&self, iid: u64) -> Option<WorkItem> {
        self.items.lock().unwrap().iter().find(|i| i.iid == iid).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_item<T>(&self, iid: u64, f: impl FnOnce(&mut WorkItem) -> T) -> TrackerResult<T> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|i| i.iid == iid)
            .ok_or_else(|| TrackerError::NotFound(format!("issue {iid}")))?;
        Ok(f(item))
    }
}

fn relations(pairs: &[(u64, &str)]) -> Vec<RelationRef> {
    pairs
        .iter()
        .map(|(id, title)| RelationRef {
            id: *id,
            title: title.to_string(),
        })
        .collect()
}

#[async_trait]
impl Tracker for MockTracker {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn get_item(&self, iid: u64) -> TrackerResult<WorkItem> {
        self.record(Call::Get(iid));
        self.with_item(iid, |i| i.clone())
    }

    async fn list_items(&self, filter: &ItemFilter) -> TrackerResult<Vec<WorkItem>> {
        self.record(Call::List);
        let items = self.items.lock().unwrap();
        Ok(items
            .iter()
            .filter(|i| match filter.state {
                StateFilter::Opened => i.state == ItemState::Opened,
                StateFilter::Closed => i.state == ItemState::Closed,
                StateFilter::All => true,
            })
            .filter(|i| {
                filter
                    .labels
                    .iter()
                    .all(|l| i.has_any_label(std::slice::from_ref(l)))
            })
            .cloned()
            .collect())
    }

    async fn create_item(&self, new: &NewItem) -> TrackerResult<WorkItem> {
        self.record(Call::Create(new.clone()));
        let mut items = self.items.lock().unwrap();
        let iid = items.iter().map(|i| i.iid).max().unwrap_or(0) + 1;
        let mut item = sample_item(iid);
        item.title = new.title.clone();
        item.description = new.description.clone();
        item.labels = new.labels.clone();
        item.weight = new.weight;
        item.epic = new
            .epic_id
            .and_then(|id| self.epics.iter().find(|e| e.id == id).cloned());
        item.milestone = new
            .milestone_id
            .and_then(|id| self.milestones.iter().find(|m| m.id == id).cloned());
        items.push(item.clone());
        Ok(item)
    }

    async fn save_item(&self, iid: u64, update: &ItemUpdate) -> TrackerResult<()> {
        self.record(Call::Save(iid, update.clone()));
        if self.forbidden.contains(&iid) {
            return Err(TrackerError::Permission("403 Forbidden".into()));
        }
        self.with_item(iid, |item| {
            if let Some(title) = &update.title {
                item.title = title.clone();
            }
            if let Some(description) = &update.description {
                item.description = Some(description.clone());
            }
            if let Some(state) = update.state {
                item.state = state;
            }
            if let Some(weight) = update.weight {
                item.weight = Some(weight);
            }
            if let Some(labels) = &update.labels {
                item.labels = labels.clone();
            }
        })
    }

    async fn list_epics(&self) -> TrackerResult<Vec<RelationRef>> {
        self.record(Call::ListEpics);
        self.listing_outage()?;
        Ok(self.epics.clone())
    }

    async fn attach_epic(&self, item: &WorkItem, epic_id: u64) -> TrackerResult<()> {
        self.record(Call::AttachEpic {
            iid: item.iid,
            epic_id,
        });
        let epic = self.epics.iter().find(|e| e.id == epic_id).cloned();
        self.with_item(item.iid, |i| i.epic = epic)
    }

    async fn clear_epic(&self, item: &WorkItem) -> TrackerResult<()> {
        self.record(Call::ClearEpic(item.iid));
        self.with_item(item.iid, |i| i.epic = None)
    }

    async fn list_milestones(&self) -> TrackerResult<Vec<RelationRef>> {
        self.record(Call::ListMilestones);
        self.listing_outage()?;
        Ok(self.milestones.clone())
    }

    async fn attach_milestone(&self, item: &WorkItem, milestone_id: u64) -> TrackerResult<()> {
        self.record(Call::AttachMilestone {
            iid: item.iid,
            milestone_id,
        });
        let milestone = self.milestones.iter().find(|m| m.id == milestone_id).cloned();
        self.with_item(item.iid, |i| i.milestone = milestone)
    }

    async fn clear_milestone(&self, item: &WorkItem) -> TrackerResult<()> {
        self.record(Call::ClearMilestone(item.iid));
        self.with_item(item.iid, |i| i.milestone = None)
    }

    async fn list_iterations(&self) -> TrackerResult<Vec<IterationRef>> {
        self.record(Call::ListIterations);
        Ok(self.iterations.clone())
    }

    async fn log_time(&self, iid: u64, duration: &str) -> TrackerResult<()> {
        self.record(Call::LogTime(iid, duration.to_string()));
        self.with_item(iid, |_| ())
    }
}

#[tokio::test]
async fn mock_save_applies_update() {
    let tracker = MockTracker::new(vec![sample_item(1)]);
    let update = ItemUpdate {
        title: Some("Renamed".into()),
        state: Some(ItemState::Closed),
        ..Default::default()
    };
    tracker.save_item(1, &update).await.unwrap();

    let item = tracker.item(1).unwrap();
    assert_eq!(item.title, "Renamed");
    assert_eq!(item.state, ItemState::Closed);
    assert_eq!(tracker.mutations(), vec![Call::Save(1, update)]);
}

#[tokio::test]
async fn mock_get_missing_is_not_found() {
    let tracker = MockTracker::new(vec![]);
    let err = tracker.get_item(3).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn mock_forbidden_save_propagates() {
    let tracker = MockTracker::new(vec![sample_item(1)]).with_forbidden(1);
    let result = tracker
        .save_item(1, &ItemUpdate {
            weight: Some(2),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(TrackerError::Permission(_))));
    assert_eq!(tracker.item(1).unwrap().weight, None);
}

#[tokio::test]
async fn list_filters_by_state_through_trait_object() {
    let mut closed = sample_item(2);
    closed.state = ItemState::Closed;
    let tracker: Box<dyn Tracker> = Box::new(MockTracker::new(vec![sample_item(1), closed]));

    let open = tracker.list_items(&ItemFilter::default()).await.unwrap();
    assert_eq!(open.iter().map(|i| i.iid).collect::<Vec<_>>(), vec![1]);

    let all = tracker
        .list_items(&ItemFilter {
            state: StateFilter::All,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn list_label_filter_requires_every_label() {
    let mut doing = sample_item(1);
    doing.labels = vec!["Doing".into()];
    let mut both = sample_item(2);
    both.labels = vec!["Doing".into(), "In Progress".into()];
    let tracker = MockTracker::new(vec![doing, both]);

    let found = tracker
        .list_items(&ItemFilter {
            labels: vec!["Doing".into(), "In Progress".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.iter().map(|i| i.iid).collect::<Vec<_>>(), vec![2]);
}

#[test]
fn update_is_empty_only_without_fields() {
    assert!(ItemUpdate::default().is_empty());
    assert!(!ItemUpdate {
        labels: Some(vec![]),
        ..Default::default()
    }
    .is_empty());
}
