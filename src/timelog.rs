//! Spreads a daily time budget over each user's active items.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::model::work_item::WorkItem;
use crate::providers::Tracker;

/// Absorbs binary rounding so 1.9h truncates to 1h54m rather than 1h53m.
const MINUTE_EPSILON: f64 = 1e-6;

/// Per-user share of the daily budget, keyed by lowercase username.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationMap(BTreeMap<String, f64>);

impl AllocationMap {
    pub fn get(&self, user: &str) -> Option<f64> {
        self.0.get(&normalize_user(user)).copied()
    }
}

fn normalize_user(user: &str) -> String {
    user.trim().trim_start_matches('@').to_lowercase()
}

/// Parses directives such as `alice: 0.5, @bob=100%; carol 0.25`.
impl FromStr for AllocationMap {
    type Err = SyncError;

    fn from_str(directive: &str) -> Result<Self, Self::Err> {
        let mut map = BTreeMap::new();
        for entry in directive
            .split([',', ';', '\n'])
            .map(str::trim)
            .filter(|e| !e.is_empty())
        {
            let (user, value) = entry
                .split_once([':', '='])
                .or_else(|| entry.rsplit_once(char::is_whitespace))
                .ok_or_else(|| SyncError::MalformedDirective(format!("{entry:?} has no value")))?;

            let user = normalize_user(user);
            if user.is_empty() {
                return Err(SyncError::MalformedDirective(format!("{entry:?} has no user")));
            }
            let fraction = parse_fraction(value.trim())
                .ok_or_else(|| SyncError::MalformedDirective(format!("bad allocation in {entry:?}")))?;
            if map.insert(user.clone(), fraction).is_some() {
                return Err(SyncError::MalformedDirective(format!("{user} listed twice")));
            }
        }
        if map.is_empty() {
            return Err(SyncError::MalformedDirective("no entries".into()));
        }
        Ok(AllocationMap(map))
    }
}

fn parse_fraction(value: &str) -> Option<f64> {
    let fraction = match value.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok()? / 100.0,
        None => value.parse::<f64>().ok()?,
    };
    (fraction.is_finite() && fraction >= 0.0).then_some(fraction)
}

/// Whole hours and truncated minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpentTime {
    pub hours: u32,
    pub minutes: u32,
}

impl SpentTime {
    pub fn from_hours(hours: f64) -> Self {
        let whole = hours.floor();
        let minutes = ((hours - whole) * 60.0 + MINUTE_EPSILON).floor();
        if minutes >= 60.0 {
            Self {
                hours: whole as u32 + 1,
                minutes: 0,
            }
        } else {
            Self {
                hours: whole as u32,
                minutes: minutes as u32,
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0
    }
}

impl fmt::Display for SpentTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h{}m", self.hours, self.minutes)
    }
}

/// Items carrying one of `status_labels`, grouped by assignee username.
/// An item with several assignees counts once for each of them.
pub fn group_by_assignee<'a>(
    items: &'a [WorkItem],
    status_labels: &[String],
) -> BTreeMap<String, Vec<&'a WorkItem>> {
    let mut groups: BTreeMap<String, Vec<&WorkItem>> = BTreeMap::new();
    for item in items.iter().filter(|i| i.has_any_label(status_labels)) {
        for assignee in &item.assignees {
            groups.entry(assignee.username.clone()).or_default().push(item);
        }
    }
    groups
}

/// `base_hours / item_count * allocation` for every user that has items.
/// A user without an allocation entry fails the whole computation.
pub fn compute_time_per_item(
    allocation: &AllocationMap,
    by_user: &BTreeMap<String, Vec<&WorkItem>>,
    base_hours: f64,
) -> Result<BTreeMap<String, SpentTime>, SyncError> {
    let mut out = BTreeMap::new();
    for (user, items) in by_user {
        if items.is_empty() {
            continue;
        }
        let share = allocation
            .get(user)
            .ok_or_else(|| SyncError::MissingAllocation(user.clone()))?;
        let hours = base_hours / items.len() as f64 * share;
        debug!(user, items = items.len(), share, hours, "allocated time");
        out.insert(user.clone(), SpentTime::from_hours(hours));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEntry {
    pub iid: u64,
    pub title: String,
    pub user: String,
    pub spent: SpentTime,
}

/// All entries for one day, computed before anything is posted so a
/// configuration problem aborts with nothing logged.
pub fn plan_entries(
    allocation: &AllocationMap,
    items: &[WorkItem],
    status_labels: &[String],
    base_hours: f64,
) -> Result<Vec<TimeEntry>, SyncError> {
    let by_user = group_by_assignee(items, status_labels);
    let per_item = compute_time_per_item(allocation, &by_user, base_hours)?;
    let mut entries = Vec::new();
    for (user, items) in &by_user {
        let spent = per_item[user];
        if spent.is_zero() {
            debug!(user, "zero allocation, nothing to log");
            continue;
        }
        entries.extend(items.iter().map(|item| TimeEntry {
            iid: item.iid,
            title: item.title.clone(),
            user: user.clone(),
            spent,
        }));
    }
    Ok(entries)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogReport {
    pub logged: usize,
    pub failed: Vec<(u64, String)>,
}

pub async fn log_entries(tracker: &dyn Tracker, entries: &[TimeEntry]) -> LogReport {
    let mut report = LogReport::default();
    for entry in entries {
        match tracker.log_time(entry.iid, &entry.spent.to_string()).await {
            Ok(()) => {
                info!(iid = entry.iid, user = %entry.user, spent = %entry.spent, "logged time");
                report.logged += 1;
            }
            Err(e) => {
                warn!(iid = entry.iid, error = %e, "failed to log time");
                report.failed.push((entry.iid, e.to_string()));
            }
        }
    }
    report
}
