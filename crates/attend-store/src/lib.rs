//! attend-store: SQLite persistence for hostel attendance.
//!
//! One [`Store`] wraps one connection. Operations are grouped by table in
//! `users`, `students` and `attendance`.

mod attendance;
pub mod error;
pub mod models;
pub mod password;
mod schema;
mod students;
mod users;

use rusqlite::Connection;
use std::path::Path;

pub use error::{Result, StoreError};
pub use models::{Counts, MarkOutcome, NewStudent, NewUser, Role, Student, StudentSummary, User};

/// Username and password of the account created when no warden exists.
pub const DEFAULT_WARDEN_USERNAME: &str = "warden";
pub const DEFAULT_WARDEN_PASSWORD: &str = "warden123";

/// Handle to the attendance database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file, creating parent directories,
    /// tables and the default warden as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened database");
        Self::init(conn)
    }

    /// In-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        schema::migrate(&conn)?;
        let store = Self { conn };
        store.ensure_default_warden()?;
        Ok(store)
    }

    /// Number of rows in each table.
    pub fn counts(&self) -> Result<Counts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
            Ok(n as u64)
        };
        Ok(Counts {
            users: count("users")?,
            students: count("students")?,
            attendance: count("attendance")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("attendance.db");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.counts().unwrap().users, 1);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .register_user(&NewUser {
                    username: "alice",
                    password: "pw",
                    role: Role::Student,
                    enrollment_number: Some("E1"),
                })
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.counts().unwrap().users, 2);
    }
}
