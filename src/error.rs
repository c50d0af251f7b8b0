//! Error taxonomy shared by every layer of the tracker.
//!
//! Each user-visible failure kind maps to its own variant and its own process
//! exit code. Storage and configuration failures are kept separate and are
//! reported to the user as an opaque internal error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Malformed, missing or contradictory input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Authenticated, but the role does not allow the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A referenced task, user or milestone does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The action is not valid for the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The record changed between read and write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing, malformed, tampered or expired identity token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt database: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    /// Stable label for the error kind, used in JSON output and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Io(_) | Self::Corrupt(_) | Self::Config(_) => "internal",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == "internal"
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Unauthenticated(_) => 3,
            Self::Forbidden(_) => 4,
            Self::NotFound(_) => 5,
            Self::InvalidState(_) => 6,
            Self::Conflict(_) => 7,
            Self::Io(_) | Self::Corrupt(_) | Self::Config(_) => 1,
        }
    }

    /// Message shown to the user. Internal failures are not described.
    pub fn user_message(&self) -> String {
        if self.is_internal() {
            "internal error (see log for details)".to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_kind() {
        let errors = [
            TrackerError::validation("x"),
            TrackerError::Unauthenticated("x".into()),
            TrackerError::forbidden("x"),
            TrackerError::not_found("x"),
            TrackerError::invalid_state("x"),
            TrackerError::Conflict("x".into()),
            TrackerError::Config("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = TrackerError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
        assert_eq!(err.kind(), "internal");
        assert!(!err.user_message().contains("disk on fire"));

        let err = TrackerError::forbidden("hod may only delete own department");
        assert!(err.user_message().contains("own department"));
    }
}
