//! Error taxonomy
//!
//! `PampaxError` gives every subsystem a shared vocabulary for the
//! retry/degrade/surface decisions made by the reliability envelope.
//! Variants map 1:1 onto the kinds in the error-handling design.

use std::fmt;

/// Top-level error type returned by every public `pampax-core` operation.
#[derive(Debug, thiserror::Error)]
pub enum PampaxError {
    /// Bad configuration value, invalid packing profile, malformed policy.
    /// Fatal to the operation; never retried.
    #[error("config error: {0}")]
    Config(String),

    /// Foreign-key violation, duplicate primary key, or other row-level
    /// constraint failure. Fatal per-row; callers see the offending id.
    #[error("storage constraint violation on {entity} {id}: {reason}")]
    StorageConstraint {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// Disk full, lock contention, corruption. Retried with backoff by the
    /// reliability envelope before degrading.
    #[error("storage I/O error: {0}")]
    StorageIo(String),

    /// An operation deadline (overall or per-probe) elapsed.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The circuit breaker for this operation class is open.
    #[error("circuit open for {0}")]
    CircuitOpen(&'static str),

    /// Requested entity does not exist. Not an error condition by itself —
    /// callers typically match this out of the `Result` and treat it as an
    /// `Option::None`.
    #[error("not found: {0}")]
    NotFound(String),

    /// Programming bug or unhandled case. Logged at ERROR with an
    /// incremented alert counter; the envelope still returns a degraded
    /// result rather than panicking.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PampaxError {
    /// Process exit code this error maps to on the CLI surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            PampaxError::Config(_) => 2,
            PampaxError::StorageIo(_) => 3,
            PampaxError::Timeout(_) => 124,
            PampaxError::StorageConstraint { .. }
            | PampaxError::CircuitOpen(_)
            | PampaxError::NotFound(_)
            | PampaxError::Internal(_) => 1,
        }
    }

    /// A coarse error-code slug suitable for JSON output envelopes.
    pub fn error_code(&self) -> &'static str {
        match self {
            PampaxError::Config(_) => "config_invalid",
            PampaxError::StorageConstraint { .. } => "storage_constraint",
            PampaxError::StorageIo(_) => "storage_io",
            PampaxError::Timeout(_) => "timeout",
            PampaxError::CircuitOpen(_) => "circuit_open",
            PampaxError::NotFound(_) => "not_found",
            PampaxError::Internal(_) => "internal",
        }
    }

    /// Whether the reliability envelope's retry policy should attempt this
    /// operation again. `Config` and constraint violations are never
    /// retried; timeouts and storage I/O errors are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PampaxError::Timeout(_) | PampaxError::StorageIo(_)
        )
    }

    /// Build from a `rusqlite::Error` observed while writing `entity` `id`,
    /// so a constraint violation surfaces the offending row instead of the
    /// blanket `From` impl's empty id. Non-constraint errors still fall
    /// through to `StorageIo`.
    pub fn storage_constraint(entity: &'static str, id: impl Into<String>, e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                PampaxError::StorageConstraint {
                    entity,
                    id: id.into(),
                    reason: e.to_string(),
                }
            }
            _ => PampaxError::StorageIo(e.to_string()),
        }
    }
}

impl From<rusqlite::Error> for PampaxError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                PampaxError::StorageConstraint {
                    entity: "row",
                    id: String::new(),
                    reason: e.to_string(),
                }
            }
            _ => PampaxError::StorageIo(e.to_string()),
        }
    }
}

impl From<std::io::Error> for PampaxError {
    fn from(e: std::io::Error) -> Self {
        PampaxError::StorageIo(e.to_string())
    }
}

/// Wraps a lower-level error with operation context (component, correlation
/// id, input hash) the way every subsystem is expected to before handing it
/// to the reliability envelope.
#[derive(Debug)]
pub struct Context {
    pub op: &'static str,
    pub corr_id: String,
    pub input_hash: Option<u64>,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op={} corr_id={}", self.op, self.corr_id)?;
        if let Some(h) = self.input_hash {
            write!(f, " input_hash={h:x}")?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, PampaxError>;
