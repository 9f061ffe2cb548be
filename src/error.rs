use serde::Serialize;
use thiserror::Error;

use crate::database::DatabaseError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: String, action: &'static str },
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Internal,
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Validation(_) | EngineError::InvalidTransition { .. } => ErrorKind::Validation,
            EngineError::Database(_) | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::not_found("Session", "abc").kind(), ErrorKind::NotFound);
        assert_eq!(EngineError::Validation("bad".into()).kind(), ErrorKind::Validation);
        let transition = EngineError::InvalidTransition { state: "COMPLETED".into(), action: "start" };
        assert_eq!(transition.kind(), ErrorKind::Validation);
        assert_eq!(transition.to_string(), "Cannot start while COMPLETED");
        let db = EngineError::from(DatabaseError::QueryFailed("boom".into()));
        assert_eq!(db.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_not_found_message() {
        let err = EngineError::not_found("Question", "q-1");
        assert_eq!(err.to_string(), "Question not found: q-1");
    }
}
