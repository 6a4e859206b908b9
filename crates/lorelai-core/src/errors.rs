use thiserror::Error;

/// Domain failures that callers report distinctly (exit codes, HTTP status).
/// Everything else travels as a plain `anyhow::Error`.
#[derive(Debug, Error)]
pub enum LorelaiError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("integration error: {0}")]
    Integration(String),
    #[error("migration error: {0}")]
    Migration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integration,
    Migration,
    Internal,
}

impl LorelaiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Integration(_) => ErrorKind::Integration,
            Self::Migration(_) => ErrorKind::Migration,
        }
    }
}

/// Walks the error chain and returns the kind of the first domain error found.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<LorelaiError>() {
            return e.kind();
        }
        if cause.is::<crate::storage::migrations::MigrationError>() {
            return ErrorKind::Migration;
        }
    }
    ErrorKind::Internal
}

/// Maps SQLite unique-constraint violations to a conflict error so callers
/// don't have to parse driver messages.
pub fn map_unique_violation(err: rusqlite::Error, what: &str) -> anyhow::Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
        {
            LorelaiError::conflict(format!("{} already exists", what)).into()
        }
        _ => anyhow::Error::new(err),
    }
}
