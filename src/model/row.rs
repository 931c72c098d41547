use std::collections::{BTreeSet, HashMap};

use super::field::Field;

/// One desired-state line from the sheet. Columns the sheet does not carry
/// are absent, which reads the same as a blank cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredRow {
    /// 1-based data line, used in reports.
    pub line: usize,
    values: HashMap<Field, String>,
}

impl DesiredRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: Field) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn has(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    /// Trimmed value, `None` when blank.
    pub fn value(&self, field: Field) -> Option<&str> {
        let v = self.get(field).trim();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    }

    /// Identity key (the project-scoped iid). Blank means "create".
    pub fn key(&self) -> Option<&str> {
        self.value(Field::Iid)
    }

    /// Label for logs: the iid, or the line number for rows without one.
    pub fn display_key(&self) -> String {
        match self.key() {
            Some(iid) => format!("#{iid}"),
            None => format!("line {}", self.line),
        }
    }

    pub fn labels(&self) -> Option<BTreeSet<String>> {
        self.value(Field::Labels).map(parse_labels)
    }
}

/// Splits a comma-joined label cell into a trimmed set.
pub fn parse_labels(cell: &str) -> BTreeSet<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
