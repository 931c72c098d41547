use std::fmt;

use tracing::{info, warn};

use super::differ::{self, Mutation, MutationSet, RelationDelta};
use super::resolver::RelationalResolver;
use crate::error::TrackerError;
use crate::model::field::{Field, FieldKind};
use crate::model::row::DesiredRow;
use crate::model::work_item::WorkItem;
use crate::providers::{NewItem, Tracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Create,
    Update,
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    Applied,
    /// Computed under `--dry-run`, nothing sent.
    Planned,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub key: String,
    pub action: RowAction,
    pub status: RowStatus,
    pub changes: Vec<String>,
    pub warnings: Vec<String>,
}

impl RowOutcome {
    fn new(key: String, action: RowAction) -> Self {
        Self {
            key,
            action,
            status: RowStatus::Skipped,
            changes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn fail(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(key = %self.key, %reason, "row failed");
        self.status = RowStatus::Failed(reason);
        self
    }
}

impl fmt::Display for RowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, self.action) {
            (RowStatus::Failed(reason), _) => write!(f, "{}: failed: {reason}", self.key),
            (RowStatus::Skipped, _) => write!(f, "{}: unchanged", self.key),
            (RowStatus::Planned, RowAction::Create) => {
                write!(f, "{}: would create ({})", self.key, self.changes.join("; "))
            }
            (RowStatus::Planned, _) => {
                write!(f, "{}: would update ({})", self.key, self.changes.join("; "))
            }
            (RowStatus::Applied, RowAction::Create) => {
                write!(f, "{}: created ({})", self.key, self.changes.join("; "))
            }
            (RowStatus::Applied, _) => {
                write!(f, "{}: updated ({})", self.key, self.changes.join("; "))
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<RowOutcome>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchCounts {
    pub created: usize,
    pub updated: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn counts(&self) -> BatchCounts {
        let mut counts = BatchCounts::default();
        for outcome in &self.outcomes {
            match (&outcome.status, outcome.action) {
                (RowStatus::Applied, RowAction::Create) => counts.created += 1,
                (RowStatus::Applied, _) => counts.updated += 1,
                (RowStatus::Planned, _) => counts.planned += 1,
                (RowStatus::Skipped, _) => counts.skipped += 1,
                (RowStatus::Failed(_), _) => counts.failed += 1,
            }
        }
        counts
    }
}

/// Converges tracker items towards the rows of a desired-state sheet.
///
/// Rows are handled one at a time in input order. Each diff is computed
/// against the item as it is fetched at that moment, so rerunning after a
/// partial failure only sends what is still missing. A failing row never
/// stops the batch.
pub struct ReconciliationEngine<'a> {
    tracker: &'a dyn Tracker,
    resolver: RelationalResolver<'a>,
    dry_run: bool,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(tracker: &'a dyn Tracker) -> Self {
        Self {
            tracker,
            resolver: RelationalResolver::new(tracker),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn reconcile(&self, rows: &[DesiredRow]) -> BatchReport {
        let mut report = BatchReport::default();
        for row in rows {
            info!(key = %row.display_key(), title = row.get(Field::Title), "processing row");
            let outcome = match row.key() {
                None => self.create_row(row).await,
                Some(key) => self.update_row(row, key).await,
            };
            report.outcomes.push(outcome);
        }
        report
    }

    async fn create_row(&self, row: &DesiredRow) -> RowOutcome {
        let mut outcome = RowOutcome::new(row.display_key(), RowAction::Create);
        let Some(title) = row.value(Field::Title) else {
            return outcome.fail("title is required to create an issue");
        };

        let weight = match row.value(Field::Weight) {
            None => None,
            Some(w) => match Field::Weight.normalize(w).parse::<u32>() {
                Ok(w) => Some(w),
                Err(_) => return outcome.fail(format!("weight must be a whole number, got {w:?}")),
            },
        };

        let mut new = NewItem {
            title: title.to_string(),
            description: row.value(Field::Description).map(String::from),
            labels: row.labels().map(|l| l.into_iter().collect()).unwrap_or_default(),
            weight,
            ..Default::default()
        };

        if let Some(epic) = row.value(Field::Epic) {
            match self.resolver.resolve_epic(epic).await {
                Ok(Some(r)) => new.epic_id = Some(r.id),
                Ok(None) => outcome.warnings.push(format!("epic {epic:?} not found")),
                Err(e) => return outcome.fail(format!("resolving epic: {e}")),
            }
        }
        if let Some(milestone) = row.value(Field::Milestone) {
            match self.resolver.resolve_milestone(milestone).await {
                Ok(Some(r)) => new.milestone_id = Some(r.id),
                Ok(None) => outcome
                    .warnings
                    .push(format!("milestone {milestone:?} not found")),
                Err(e) => return outcome.fail(format!("resolving milestone: {e}")),
            }
        }

        outcome.changes.push(format!("title {title:?}"));
        if self.dry_run {
            outcome.status = RowStatus::Planned;
            return outcome;
        }

        match self.tracker.create_item(&new).await {
            Ok(item) => {
                info!(iid = item.iid, title = %item.title, "created issue");
                outcome.changes = vec![format!("#{}", item.iid)];
                outcome.status = RowStatus::Applied;
                outcome
            }
            Err(e) => outcome.fail(e.to_string()),
        }
    }

    async fn update_row(&self, row: &DesiredRow, key: &str) -> RowOutcome {
        let mut outcome = RowOutcome::new(row.display_key(), RowAction::NoOp);
        let Ok(iid) = key.parse::<u64>() else {
            return outcome.fail(format!("invalid iid {key:?}"));
        };

        let item = match self.tracker.get_item(iid).await {
            Ok(item) => item,
            Err(e) if e.is_not_found() => return outcome.fail("not found"),
            Err(e) => return outcome.fail(e.to_string()),
        };

        let planned = self.plan_update(&item, row, &mut outcome.warnings).await;
        let mutations = match planned {
            Ok(m) => m,
            Err(e) => return outcome.fail(e.to_string()),
        };
        if mutations.is_empty() {
            return outcome;
        }

        outcome.action = RowAction::Update;
        outcome.changes = mutations.describe();
        let update = match mutations.to_update() {
            Ok(u) => u,
            Err(reason) => return outcome.fail(reason),
        };
        if self.dry_run {
            outcome.status = RowStatus::Planned;
            return outcome;
        }

        for mutation in mutations.relational() {
            let result = match mutation {
                Mutation::ClearEpic { .. } => self.tracker.clear_epic(&item).await,
                Mutation::AttachEpic { id, .. } => self.tracker.attach_epic(&item, *id).await,
                Mutation::ClearMilestone { .. } => self.tracker.clear_milestone(&item).await,
                Mutation::AttachMilestone { id, .. } => {
                    self.tracker.attach_milestone(&item, *id).await
                }
                _ => Ok(()),
            };
            if let Err(e) = result {
                return outcome.fail(format!("{mutation}: {e}"));
            }
        }

        if let Err(e) = self.tracker.save_item(iid, &update).await {
            return outcome.fail(e.to_string());
        }
        info!(iid, changes = mutations.len(), "updated issue");
        outcome.status = RowStatus::Applied;
        outcome
    }

    /// Everything the row asks to change on `item`. Unresolvable references
    /// are recorded in `warnings` and only drop the attach they belong to.
    pub async fn plan_update(
        &self,
        item: &WorkItem,
        row: &DesiredRow,
        warnings: &mut Vec<String>,
    ) -> Result<MutationSet, TrackerError> {
        let mut set = MutationSet::default();

        let relations = Field::ALL
            .into_iter()
            .filter(|f| f.kind() == FieldKind::Relational && !f.is_read_only());
        for field in relations {
            if !row.has(field) {
                continue;
            }
            let current = match field {
                Field::Epic => item.epic.as_ref(),
                _ => item.milestone.as_ref(),
            };
            let RelationDelta::Change { clear, attach } =
                differ::relation_delta(field, current, row.get(field))
            else {
                continue;
            };

            if let Some(title) = clear {
                set.push(match field {
                    Field::Epic => Mutation::ClearEpic { title },
                    _ => Mutation::ClearMilestone { title },
                });
            }
            if let Some(title) = attach {
                let resolved = match field {
                    Field::Epic => self.resolver.resolve_epic(&title).await?,
                    _ => self.resolver.resolve_milestone(&title).await?,
                };
                match resolved {
                    Some(r) if field == Field::Epic => set.push(Mutation::AttachEpic {
                        id: r.id,
                        title: r.title,
                    }),
                    Some(r) => set.push(Mutation::AttachMilestone {
                        id: r.id,
                        title: r.title,
                    }),
                    None => warnings.push(format!("{field} {title:?} not found, not attached")),
                }
            }
        }

        if let Some(labels) = differ::diff_labels(item, row) {
            set.push(labels);
        }
        set.extend(differ::diff(item, row));

        if let Some(start) = row.value(Field::Iteration) {
            if Field::Iteration.normalize(start) != item.field_value(Field::Iteration) {
                let note = match self.resolver.resolve_iteration(start).await? {
                    Some(it) => format!("iteration {start} (id {}) is read-only, not moved", it.id),
                    None => format!("iteration {start} not found"),
                };
                warn!(iid = item.iid, "{note}");
                warnings.push(note);
            }
        }

        Ok(set)
    }
}
