use std::collections::HashSet;

use tracing::{info, warn};

use crate::model::row::DesiredRow;
use crate::model::work_item::{ItemState, WorkItem};
use crate::providers::{ItemUpdate, Tracker};

/// Literal the operator has to type before anything is closed.
pub const CONFIRM_TOKEN: &str = "CLOSE";

/// Identity keys present in the sheet, as trimmed strings.
pub fn desired_keys(rows: &[DesiredRow]) -> HashSet<String> {
    rows.iter()
        .filter_map(|r| r.key())
        .map(String::from)
        .collect()
}

/// Items the tracker has that the sheet does not mention.
pub fn select_for_close<'a>(desired: &HashSet<String>, current: &'a [WorkItem]) -> Vec<&'a WorkItem> {
    current
        .iter()
        .filter(|item| !desired.contains(&item.key()))
        .collect()
}

pub fn is_confirmed(answer: Option<&str>) -> bool {
    answer.map(str::trim) == Some(CONFIRM_TOKEN)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    Aborted,
    Closed {
        closed: Vec<u64>,
        failed: Vec<(u64, String)>,
    },
}

/// Closes `items` once `answer` matches [`CONFIRM_TOKEN`]; otherwise sends
/// nothing. A failure on one item does not stop the others.
pub async fn close_items(tracker: &dyn Tracker, items: &[&WorkItem], answer: Option<&str>) -> PruneOutcome {
    if !is_confirmed(answer) {
        warn!(selected = items.len(), "closure aborted");
        return PruneOutcome::Aborted;
    }

    let update = ItemUpdate {
        state: Some(ItemState::Closed),
        ..Default::default()
    };
    let mut closed = Vec::new();
    let mut failed = Vec::new();
    for item in items {
        match tracker.save_item(item.iid, &update).await {
            Ok(()) => {
                info!(iid = item.iid, title = %item.title, "closed issue");
                closed.push(item.iid);
            }
            Err(e) => {
                warn!(iid = item.iid, error = %e, "failed to close issue");
                failed.push((item.iid, e.to_string()));
            }
        }
    }
    PruneOutcome::Closed { closed, failed }
}
