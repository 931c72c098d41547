use thiserror::Error;

/// Failure reported by the remote tracker or the transport underneath it.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected by tracker: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("tracker returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Decode(#[from] serde_json::Error),
}

impl TrackerError {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            404 => TrackerError::NotFound(message),
            400 | 422 => TrackerError::Validation(message),
            401 | 403 => TrackerError::Permission(message),
            _ => TrackerError::Api { status, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed allocation directive: {0}")]
    MalformedDirective(String),

    #[error("no allocation entry for assignee '{0}'")]
    MissingAllocation(String),

    #[error("inconsistent burn-down input: {0}")]
    DataInconsistency(String),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(TrackerError::from_status(404, "x".into()).is_not_found());
        assert!(matches!(
            TrackerError::from_status(422, "x".into()),
            TrackerError::Validation(_)
        ));
        assert!(matches!(
            TrackerError::from_status(403, "x".into()),
            TrackerError::Permission(_)
        ));
        assert!(matches!(
            TrackerError::from_status(500, "x".into()),
            TrackerError::Api { status: 500, .. }
        ));
    }
}
