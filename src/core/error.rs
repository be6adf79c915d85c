//! Error taxonomy shared by the registry, upgrade and restore components.

use thiserror::Error;

/// Errors raised by core operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid security token for '{scope}'")]
    Auth { scope: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Shorthand for a missing entity
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// HTTP status reported at the action boundary
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Auth { .. } => 401,
            CoreError::PermissionDenied(_) => 403,
            CoreError::NotFound { .. } => 404,
            CoreError::Validation(_) => 422,
            CoreError::Storage(_) | CoreError::Serialization(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            CoreError::Auth {
                scope: "contentupgrade".to_string()
            }
            .status_code(),
            401
        );
        assert_eq!(CoreError::PermissionDenied("x".into()).status_code(), 403);
        assert_eq!(CoreError::not_found("Library", 4).status_code(), 404);
        assert_eq!(CoreError::Validation("x".into()).status_code(), 422);
    }

    #[test]
    fn test_not_found_message() {
        let err = CoreError::not_found("Library", 12);
        assert_eq!(err.to_string(), "Library not found: 12");
    }
}
