//! Structured error types for Wren
//!
//! Every fallible operation in the checkpoint store, the session state
//! machine and the orchestrator reports through [`WrenError`]. A missing
//! checkpoint is not an error: lookups return `Ok(None)` for that case.

use std::time::Duration;
use thiserror::Error;

/// Primary error type for Wren operations
#[derive(Error, Debug)]
pub enum WrenError {
    // =========================================================================
    // Checkpoint Store Errors
    // =========================================================================
    /// Backend could not be reached or refused the operation
    #[error("checkpoint store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// Backend handle was already closed
    #[error("checkpoint store closed")]
    StoreClosed,

    /// Checkpoint record could not be encoded or decoded
    #[error("serialization error for session {session_id} (checkpoint {checkpoint_id}): {message}")]
    Serialization {
        session_id: String,
        checkpoint_id: String,
        message: String,
    },

    /// Backend holds an entry it cannot decode
    #[error("corrupt entry {key}: {message}")]
    CorruptEntry { key: String, message: String },

    /// Session id cannot be used to build a checkpoint key
    #[error("invalid session id: {session_id:?}")]
    InvalidSessionId { session_id: String },

    // =========================================================================
    // Session State Errors
    // =========================================================================
    /// State machine was asked to advance a session in a terminal status
    #[error("invalid transition for session {session_id}: {event} while {status}")]
    InvalidTransition {
        session_id: String,
        status: String,
        event: String,
    },

    /// A new session was requested under an id that already has checkpoints
    #[error("session {session_id} already exists")]
    SessionExists { session_id: String },

    /// Snapshot handed to the state machine violates its invariants
    #[error("corrupt session state for {session_id}: {reason}")]
    CorruptState { session_id: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl WrenError {
    /// Shorthand for a backend failure
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Shorthand for a codec failure tied to a checkpoint address
    pub fn serialization(
        session_id: impl Into<String>,
        checkpoint_id: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Serialization {
            session_id: session_id.into(),
            checkpoint_id: checkpoint_id.into(),
            message: message.to_string(),
        }
    }

    /// Check if error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable { .. } => true,

            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),

            Self::StoreClosed
            | Self::CorruptEntry { .. }
            | Self::Serialization { .. }
            | Self::InvalidSessionId { .. }
            | Self::SessionExists { .. }
            | Self::InvalidTransition { .. }
            | Self::CorruptState { .. }
            | Self::InvalidConfig { .. }
            | Self::TomlParse(_)
            | Self::TomlSerialize(_)
            | Self::Json(_) => false,
        }
    }

    /// Get suggested retry delay for retryable errors
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::StoreUnavailable { .. } => Some(Duration::from_millis(250)),
            Self::Io(_) if self.is_retryable() => Some(Duration::from_millis(100)),
            _ => None,
        }
    }

    /// True when the error comes from the persistence layer rather than
    /// from the session logic
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. }
                | Self::StoreClosed
                | Self::CorruptEntry { .. }
                | Self::Serialization { .. }
                | Self::Io(_)
        )
    }

    /// Shorthand for an entry the backend cannot decode
    pub fn corrupt_entry(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::CorruptEntry {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::StoreUnavailable { .. } | Self::StoreClosed => {
                "Progress could not be saved. The interview can continue, \
                 but it may not be resumable."
                    .to_string()
            }
            Self::InvalidTransition { status, .. } => {
                format!("This interview has already ended ({}).", status)
            }
            Self::SessionExists { session_id } => {
                format!("Session {} already exists; resume it instead.", session_id)
            }
            Self::InvalidConfig { message } => format!("Configuration problem: {}", message),
            _ => self.to_string(),
        }
    }
}

impl From<serde_json::Error> for WrenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias using WrenError
pub type Result<T> = std::result::Result<T, WrenError>;
