use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("username already exists")]
    UsernameTaken,
    #[error("enrollment number already exists")]
    DuplicateEnrollment,
    #[error("unknown role {0:?} (expected \"student\" or \"warden\")")]
    UnknownRole(String),
    #[error("face encoding: {0}")]
    Encoding(#[from] attend_core::EncodingError),
    #[error("stored date {0:?} is not YYYY-MM-DD")]
    BadDate(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Whether a sqlite error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
