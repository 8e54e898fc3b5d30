use crate::error::StoreError;
use attend_core::{EncodingError, FaceEncoding};
use std::fmt;
use std::str::FromStr;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Warden,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Warden => "warden",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "warden" => Ok(Role::Warden),
            _ => Err(StoreError::UnknownRole(s.to_string())),
        }
    }
}

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub role: Role,
    /// Set for students only.
    pub enrollment_number: Option<String>,
}

/// Input for [`Store::register_user`](crate::Store::register_user).
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub role: Role,
    pub enrollment_number: Option<&'a str>,
}

/// Input for [`Store::register_student`](crate::Store::register_student).
#[derive(Debug, Clone)]
pub struct NewStudent<'a> {
    pub enrollment_number: &'a str,
    pub name: &'a str,
    pub room: &'a str,
    pub hostel_location: &'a str,
    pub face: &'a FaceEncoding,
}

/// A full student row.
#[derive(Debug, Clone)]
pub struct Student {
    pub enrollment_number: String,
    pub name: String,
    pub room: Option<String>,
    pub hostel_location: Option<String>,
    pub face_blob: Option<Vec<u8>>,
}

impl Student {
    /// Decode the stored face encoding. `None` when no face was stored.
    pub fn face_encoding(&self) -> Option<Result<FaceEncoding, EncodingError>> {
        self.face_blob
            .as_deref()
            .filter(|b| !b.is_empty())
            .map(FaceEncoding::from_blob)
    }
}

/// Row of the student listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentSummary {
    pub enrollment_number: String,
    pub name: String,
    pub room: Option<String>,
}

/// Outcome of marking attendance for a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyMarked,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub users: u64,
    pub students: u64,
    pub attendance: u64,
}
