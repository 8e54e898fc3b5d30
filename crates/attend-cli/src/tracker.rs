//! Attendance workflows: sessions, signup, student registration and
//! face-verified attendance.

use crate::engine::{EngineError, FaceProbe};
use attend_core::{EncodingError, EnrolledFace};
use attend_geo::{same_place, GeoError, Locator};
use attend_hw::Frame;
use attend_store::{MarkOutcome, NewStudent, NewUser, Role, Store, StoreError, StudentSummary, User};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{username} is a {actual} account; this needs a {required} account")]
    WrongRole {
        username: String,
        actual: Role,
        required: Role,
    },
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("could not determine the current location: {0}")]
    LocationUnavailable(#[source] GeoError),
    #[error("no student with enrollment number {0}")]
    StudentNotFound(String),
    #[error("no face data stored for {0}; register the student's face first")]
    NoFaceData(String),
    #[error("stored face data for {enrollment} is unreadable; register the face again")]
    CorruptFaceData {
        enrollment: String,
        #[source]
        source: EncodingError,
    },
    #[error("location mismatch: you are at {current:?}, hostel is at {registered:?}")]
    LocationMismatch { current: String, registered: String },
    #[error("face not recognized (similarity {similarity:.2})")]
    FaceNotRecognized { similarity: f32 },
    #[error("no face detected; face the camera in good light and try again")]
    NoFaceDetected,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for AttendError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NoFaceDetected => AttendError::NoFaceDetected,
            other => AttendError::Engine(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, AttendError>;

/// Matching parameters taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct MatchSettings {
    pub threshold: f32,
    pub frames_per_verify: usize,
    pub frames_per_enroll: usize,
}

/// Input for [`Tracker::signup`].
#[derive(Debug, Clone)]
pub struct Signup<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub confirm: &'a str,
    pub role: Role,
    pub enrollment_number: Option<&'a str>,
}

/// Input for [`Tracker::register_student`].
#[derive(Debug, Clone)]
pub struct StudentForm<'a> {
    pub enrollment_number: &'a str,
    pub name: &'a str,
    pub room: &'a str,
}

/// Where the face of a newly registered student comes from.
pub enum FaceSource {
    Camera,
    Photo(Frame),
}

/// A successful registration.
#[derive(Debug, Clone)]
pub struct Registered {
    pub enrollment_number: String,
    pub hostel_location: String,
    pub quality: f32,
}

/// A successful attendance check.
#[derive(Debug, Clone)]
pub struct Marked {
    pub enrollment_number: String,
    pub date: NaiveDate,
    pub outcome: MarkOutcome,
    pub similarity: f32,
}

pub struct Tracker<L> {
    store: Store,
    locator: L,
    settings: MatchSettings,
}

impl<L: Locator> Tracker<L> {
    pub fn new(store: Store, locator: L, settings: MatchSettings) -> Self {
        Self {
            store,
            locator,
            settings,
        }
    }

    /// Authenticate and, when `required` is set, check the account's role.
    pub fn login(&self, username: &str, password: &str, required: Option<Role>) -> Result<User> {
        if username.is_empty() {
            return Err(AttendError::MissingField("username"));
        }
        if password.is_empty() {
            return Err(AttendError::MissingField("password"));
        }
        let user = self
            .store
            .authenticate(username, password)?
            .ok_or(AttendError::InvalidCredentials)?;

        match required {
            Some(role) if role != user.role => Err(AttendError::WrongRole {
                username: user.username,
                actual: user.role,
                required: role,
            }),
            _ => {
                tracing::debug!(username = %user.username, role = %user.role, "logged in");
                Ok(user)
            }
        }
    }

    pub fn signup(&self, form: &Signup<'_>) -> Result<()> {
        if form.password != form.confirm {
            return Err(AttendError::PasswordMismatch);
        }
        self.store.register_user(&NewUser {
            username: form.username,
            password: form.password,
            role: form.role,
            enrollment_number: form.enrollment_number,
        })?;
        Ok(())
    }

    /// Current address from the configured locator.
    pub async fn locate(&self) -> Result<String> {
        let location = self
            .locator
            .locate()
            .await
            .map_err(AttendError::LocationUnavailable)?;
        Ok(location.address)
    }

    /// Register a student with the current location as their hostel location.
    pub async fn register_student<P: FaceProbe>(
        &self,
        probe: &P,
        warden: &User,
        form: &StudentForm<'_>,
        face: FaceSource,
    ) -> Result<Registered> {
        require(warden, Role::Warden)?;
        let enrollment_number = form.enrollment_number.trim();
        let name = form.name.trim();
        let room = form.room.trim();
        for (value, field) in [(enrollment_number, "enrollment number"), (name, "name"), (room, "room")] {
            if value.is_empty() {
                return Err(AttendError::MissingField(field));
            }
        }

        let hostel_location = self.locate().await?;

        let captured = match face {
            FaceSource::Camera => probe.capture(self.settings.frames_per_enroll).await?,
            FaceSource::Photo(frame) => probe.encode_photo(frame).await?,
        };

        self.store.register_student(&NewStudent {
            enrollment_number,
            name,
            room,
            hostel_location: &hostel_location,
            face: &captured.encoding,
        })?;

        tracing::info!(
            enrollment = enrollment_number,
            location = %hostel_location,
            quality = captured.quality,
            "student registered"
        );
        Ok(Registered {
            enrollment_number: enrollment_number.to_string(),
            hostel_location,
            quality: captured.quality,
        })
    }

    /// Mark today's attendance for the logged-in student.
    pub async fn mark_attendance<P: FaceProbe>(&self, probe: &P, student: &User) -> Result<Marked> {
        let today = chrono::Local::now().date_naive();
        self.mark_attendance_on(probe, student, today).await
    }

    /// Geolocate, check the hostel location, verify the face, then record
    /// `date`. Each step must pass before the next runs.
    pub async fn mark_attendance_on<P: FaceProbe>(
        &self,
        probe: &P,
        student: &User,
        date: NaiveDate,
    ) -> Result<Marked> {
        require(student, Role::Student)?;
        let enrollment = student
            .enrollment_number
            .clone()
            .ok_or(AttendError::MissingField("enrollment number"))?;

        let current = self.locate().await?;

        let row = self
            .store
            .student(&enrollment)?
            .ok_or_else(|| AttendError::StudentNotFound(enrollment.clone()))?;

        let encoding = match row.face_encoding() {
            None => return Err(AttendError::NoFaceData(enrollment)),
            Some(Err(source)) => {
                return Err(AttendError::CorruptFaceData {
                    enrollment,
                    source,
                })
            }
            Some(Ok(e)) => e,
        };

        let registered = row.hostel_location.unwrap_or_default();
        if !same_place(&registered, &current) {
            tracing::warn!(enrollment = %enrollment, %current, %registered, "location mismatch");
            return Err(AttendError::LocationMismatch { current, registered });
        }

        let gallery = vec![EnrolledFace {
            enrollment_number: enrollment.clone(),
            encoding,
        }];
        let verified = probe
            .verify(gallery, self.settings.threshold, self.settings.frames_per_verify)
            .await?;
        if !verified.result.matched {
            tracing::warn!(enrollment = %enrollment, similarity = verified.result.similarity, "face not recognized");
            return Err(AttendError::FaceNotRecognized {
                similarity: verified.result.similarity,
            });
        }

        tracing::info!(
            enrollment = %enrollment,
            similarity = verified.result.similarity,
            quality = verified.best_quality,
            "face verified"
        );
        let outcome = self.store.mark_attendance(&enrollment, date)?;
        Ok(Marked {
            enrollment_number: enrollment,
            date,
            outcome,
            similarity: verified.result.similarity,
        })
    }

    /// Attendance dates for `enrollment`, or for the student's own record
    /// when none is given.
    pub fn attendance(&self, user: &User, enrollment: Option<&str>) -> Result<(String, Vec<NaiveDate>)> {
        let enrollment = match (enrollment.filter(|e| !e.is_empty()), user.role) {
            (Some(e), _) => e.to_string(),
            (None, Role::Student) => user
                .enrollment_number
                .clone()
                .ok_or(AttendError::MissingField("enrollment number"))?,
            (None, Role::Warden) => return Err(AttendError::MissingField("enrollment number")),
        };
        let dates = self.store.attendance_dates(&enrollment)?;
        Ok((enrollment, dates))
    }

    pub fn students(&self, warden: &User) -> Result<Vec<StudentSummary>> {
        require(warden, Role::Warden)?;
        Ok(self.store.list_students()?)
    }

    pub fn delete_student(&self, warden: &User, enrollment: &str) -> Result<()> {
        require(warden, Role::Warden)?;
        if enrollment.is_empty() {
            return Err(AttendError::MissingField("enrollment number"));
        }
        if !self.store.delete_student(enrollment)? {
            return Err(AttendError::StudentNotFound(enrollment.to_string()));
        }
        Ok(())
    }
}

fn require(user: &User, role: Role) -> Result<()> {
    if user.role != role {
        return Err(AttendError::WrongRole {
            username: user.username.clone(),
            actual: user.role,
            required: role,
        });
    }
    Ok(())
}
