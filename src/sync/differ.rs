use std::collections::BTreeSet;
use std::fmt;

use crate::model::field::{BlankPolicy, Field};
use crate::model::row::{parse_labels, DesiredRow};
use crate::model::work_item::{ItemState, RelationRef, WorkItem};
use crate::providers::ItemUpdate;

/// One change to apply to an item during a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set { field: Field, value: String },
    ReplaceLabels(Vec<String>),
    ClearEpic { title: String },
    AttachEpic { id: u64, title: String },
    ClearMilestone { title: String },
    AttachMilestone { id: u64, title: String },
}

impl Mutation {
    pub fn is_relational(&self) -> bool {
        !matches!(self, Mutation::Set { .. } | Mutation::ReplaceLabels(_))
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Set { field, value } => write!(f, "{field} -> {value:?}"),
            Mutation::ReplaceLabels(labels) => write!(f, "labels -> {:?}", labels.join(",")),
            Mutation::ClearEpic { title } => write!(f, "clear epic {title:?}"),
            Mutation::AttachEpic { title, .. } => write!(f, "attach epic {title:?}"),
            Mutation::ClearMilestone { title } => write!(f, "clear milestone {title:?}"),
            Mutation::AttachMilestone { title, .. } => write!(f, "attach milestone {title:?}"),
        }
    }
}

/// Ordered changes for one item. Empty means the item is left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationSet(Vec<Mutation>);

impl MutationSet {
    pub fn push(&mut self, mutation: Mutation) {
        self.0.push(mutation);
    }

    pub fn extend(&mut self, other: MutationSet) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn relational(&self) -> impl Iterator<Item = &Mutation> {
        self.0.iter().filter(|m| m.is_relational())
    }

    pub fn describe(&self) -> Vec<String> {
        self.0.iter().map(|m| m.to_string()).collect()
    }

    /// Folds the scalar and label changes into one save payload. Fails on
    /// values the tracker could never accept.
    pub fn to_update(&self) -> Result<ItemUpdate, String> {
        let mut update = ItemUpdate::default();
        for mutation in &self.0 {
            match mutation {
                Mutation::Set { field, value } => match field {
                    Field::Title => update.title = Some(value.clone()),
                    Field::Description => update.description = Some(value.clone()),
                    Field::State => {
                        update.state = Some(
                            ItemState::parse(value)
                                .ok_or_else(|| format!("unknown state {value:?}"))?,
                        )
                    }
                    Field::Weight => {
                        update.weight = Some(
                            Field::Weight
                                .normalize(value)
                                .parse()
                                .map_err(|_| format!("weight must be a whole number, got {value:?}"))?,
                        )
                    }
                    other => return Err(format!("{other} cannot be updated")),
                },
                Mutation::ReplaceLabels(labels) => update.labels = Some(labels.clone()),
                _ => {}
            }
        }
        Ok(update)
    }
}

/// Scalar changes: a field changes only when the row carries a non-blank
/// value that differs from the current one after normalisation.
pub fn diff(item: &WorkItem, row: &DesiredRow) -> MutationSet {
    let mut set = MutationSet::default();
    for field in Field::updatable_scalars() {
        if !row.has(field) {
            continue;
        }
        let desired = match row.value(field) {
            Some(v) => v,
            None if field.blank_policy() == BlankPolicy::NoChange => continue,
            None => "",
        };
        if field.normalize(desired) != field.normalize(&item.field_value(field)) {
            set.push(Mutation::Set {
                field,
                value: desired.to_string(),
            });
        }
    }
    set
}

/// Labels compare as sets and are replaced wholesale.
pub fn diff_labels(item: &WorkItem, row: &DesiredRow) -> Option<Mutation> {
    let desired = row.labels()?;
    let current: BTreeSet<String> = parse_labels(&item.labels.join(","));
    if desired == current {
        None
    } else {
        Some(Mutation::ReplaceLabels(desired.into_iter().collect()))
    }
}

/// Epic or milestone change, before the desired title is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationDelta {
    Unchanged,
    Change {
        clear: Option<String>,
        attach: Option<String>,
    },
}

pub fn relation_delta(field: Field, current: Option<&RelationRef>, desired: &str) -> RelationDelta {
    let current_title = current.map(|r| r.title.as_str()).unwrap_or("");
    if desired.trim().is_empty() && field.blank_policy() == BlankPolicy::NoChange {
        return RelationDelta::Unchanged;
    }
    if field.normalize(desired) == field.normalize(current_title) {
        return RelationDelta::Unchanged;
    }
    let desired = desired.trim();
    RelationDelta::Change {
        clear: current.map(|r| r.title.clone()),
        attach: (!desired.is_empty()).then(|| desired.to_string()),
    }
}
