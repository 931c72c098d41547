use std::fmt;

/// Column of the tabular interchange format, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Id,
    Iid,
    Title,
    Epic,
    Milestone,
    Iteration,
    Labels,
    Author,
    CreatedAt,
    Description,
    State,
    Weight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Identity,
    Scalar,
    /// Stored remotely as a separate relationship object.
    Relational,
    Labels,
}

/// What an empty cell means for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlankPolicy {
    NoChange,
    Clear,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Id,
        Field::Iid,
        Field::Title,
        Field::Epic,
        Field::Milestone,
        Field::Iteration,
        Field::Labels,
        Field::Author,
        Field::CreatedAt,
        Field::Description,
        Field::State,
        Field::Weight,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Iid => "iid",
            Field::Title => "title",
            Field::Epic => "epic",
            Field::Milestone => "milestone",
            Field::Iteration => "iteration",
            Field::Labels => "labels",
            Field::Author => "author",
            Field::CreatedAt => "created_at",
            Field::Description => "description",
            Field::State => "state",
            Field::Weight => "weight",
        }
    }

    /// Matches a header cell, tolerating `ID`, `Created At` and similar
    /// spellings from older exports.
    pub fn from_column(header: &str) -> Option<Field> {
        let normalized = normalize_header(header);
        Field::ALL.into_iter().find(|f| f.column() == normalized)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Id | Field::Iid => FieldKind::Identity,
            Field::Epic | Field::Milestone | Field::Iteration => FieldKind::Relational,
            Field::Labels => FieldKind::Labels,
            _ => FieldKind::Scalar,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Field::Id | Field::Iid | Field::Author | Field::CreatedAt | Field::Iteration
        )
    }

    pub fn blank_policy(&self) -> BlankPolicy {
        match self {
            Field::Epic | Field::Milestone => BlankPolicy::Clear,
            _ => BlankPolicy::NoChange,
        }
    }

    /// Scalar fields the differ is allowed to write.
    pub fn updatable_scalars() -> impl Iterator<Item = Field> {
        Field::ALL
            .into_iter()
            .filter(|f| f.kind() == FieldKind::Scalar && !f.is_read_only())
    }

    /// Canonical form used when comparing a sheet cell against the remote value.
    pub fn normalize(&self, value: &str) -> String {
        let trimmed = value.trim();
        match self {
            Field::Epic | Field::Milestone | Field::Iteration => trimmed.to_lowercase(),
            Field::State => super::work_item::ItemState::parse(trimmed)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| trimmed.to_lowercase()),
            Field::Weight => match trimmed.parse::<f64>() {
                Ok(w) if w.fract() == 0.0 && w >= 0.0 => format!("{}", w as u64),
                _ => trimmed.to_string(),
            },
            _ => trimmed.to_string(),
        }
    }
}

/// Lowercase, trimmed, with spaces and dashes turned into underscores.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}
