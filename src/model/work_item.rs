use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::field::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Opened,
    Closed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Opened => "opened",
            ItemState::Closed => "closed",
        }
    }

    /// Accepts the spellings found in hand-edited sheets ("open", "Closed", ...).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "open" | "opened" | "reopen" | "reopened" => Some(ItemState::Opened),
            "close" | "closed" => Some(ItemState::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: u64,
    pub username: String,
    pub name: String,
}

/// Epic or milestone the item belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRef {
    pub id: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRef {
    pub id: u64,
    pub start_date: NaiveDate,
}

/// Read snapshot of one tracker issue. Changes go through the tracker, never
/// through this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: ItemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserRef>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic: Option<RelationRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<RelationRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<IterationRef>,
}

impl WorkItem {
    /// The tabular rendering of one field. Blank is the empty string.
    pub fn field_value(&self, field: Field) -> String {
        match field {
            Field::Id => self.id.to_string(),
            Field::Iid => self.iid.to_string(),
            Field::Title => self.title.clone(),
            Field::Epic => self.epic.as_ref().map(|e| e.title.clone()).unwrap_or_default(),
            Field::Milestone => self
                .milestone
                .as_ref()
                .map(|m| m.title.clone())
                .unwrap_or_default(),
            Field::Iteration => self
                .iteration
                .as_ref()
                .map(|i| i.start_date.to_string())
                .unwrap_or_default(),
            Field::Labels => self.labels.join(","),
            Field::Author => self.author.as_ref().map(|a| a.name.clone()).unwrap_or_default(),
            Field::CreatedAt => self.created_at.to_rfc3339(),
            Field::Description => self.description.clone().unwrap_or_default(),
            Field::State => self.state.as_str().to_string(),
            Field::Weight => self.weight.map(|w| w.to_string()).unwrap_or_default(),
        }
    }

    pub fn key(&self) -> String {
        self.iid.to_string()
    }

    pub fn has_any_label(&self, wanted: &[String]) -> bool {
        self.labels
            .iter()
            .any(|label| wanted.iter().any(|w| w.trim().eq_ignore_ascii_case(label.trim())))
    }
}

#[cfg(test)]
pub(crate) fn sample_item(iid: u64) -> WorkItem {
    WorkItem {
        id: 1000 + iid,
        iid,
        title: format!("Issue {iid}"),
        description: None,
        state: ItemState::Opened,
        weight: None,
        labels: Vec::new(),
        assignees: Vec::new(),
        author: None,
        created_at: "2023-01-01T09:00:00Z".parse().unwrap(),
        closed_at: None,
        epic: None,
        milestone: None,
        iteration: None,
    }
}
