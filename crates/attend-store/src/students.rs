use crate::error::{is_unique_violation, Result, StoreError};
use crate::models::{NewStudent, Student, StudentSummary};
use crate::Store;
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};

impl Store {
    /// Register a student with their hostel location and face encoding.
    pub fn register_student(&self, student: &NewStudent<'_>) -> Result<()> {
        for (value, field) in [
            (student.enrollment_number, "enrollment number"),
            (student.name, "name"),
            (student.room, "room"),
        ] {
            if value.is_empty() {
                return Err(StoreError::MissingField(field));
            }
        }

        let blob = student.face.to_blob()?;

        self.conn
            .execute(
                "INSERT INTO students (enrollment_number, name, room, hostel_location, face_encoding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    student.enrollment_number,
                    student.name,
                    student.room,
                    student.hostel_location,
                    blob
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateEnrollment
                } else {
                    e.into()
                }
            })?;

        tracing::info!(
            enrollment = student.enrollment_number,
            room = student.room,
            "registered student"
        );
        Ok(())
    }

    /// Fetch a student by enrollment number.
    pub fn student(&self, enrollment_number: &str) -> Result<Option<Student>> {
        let student = self
            .conn
            .query_row(
                "SELECT enrollment_number, name, room, hostel_location, face_encoding
                 FROM students WHERE enrollment_number = ?1",
                [enrollment_number],
                |r| {
                    Ok(Student {
                        enrollment_number: r.get(0)?,
                        name: r.get(1)?,
                        room: r.get(2)?,
                        hostel_location: r.get(3)?,
                        face_blob: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(student)
    }

    /// All students ordered by enrollment number.
    pub fn list_students(&self) -> Result<Vec<StudentSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT enrollment_number, name, room FROM students ORDER BY enrollment_number")?;
        let rows = stmt.query_map([], |r| {
            Ok(StudentSummary {
                enrollment_number: r.get(0)?,
                name: r.get(1)?,
                room: r.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete a student and any login accounts bound to them.
    ///
    /// Attendance history is kept. Returns whether a student row existed;
    /// when none did, nothing is deleted.
    pub fn delete_student(&self, enrollment_number: &str) -> Result<bool> {
        if enrollment_number.is_empty() {
            return Err(StoreError::MissingField("enrollment number"));
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let students = tx.execute("DELETE FROM students WHERE enrollment_number = ?1", [enrollment_number])?;
        if students == 0 {
            tracing::debug!(enrollment = enrollment_number, "no student to delete");
            return Ok(false);
        }
        let accounts = tx.execute("DELETE FROM users WHERE enrollment_number = ?1", [enrollment_number])?;
        tx.commit()?;

        tracing::info!(enrollment = enrollment_number, accounts, students, "deleted student");
        Ok(students > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Role};
    use attend_core::FaceEncoding;

    fn face() -> FaceEncoding {
        FaceEncoding {
            values: vec![0.6, 0.8],
            model_version: Some("w600k_r50".into()),
        }
    }

    fn register(store: &Store, enrollment: &str, name: &str, room: &str) -> Result<()> {
        let face = face();
        store.register_student(&NewStudent {
            enrollment_number: enrollment,
            name,
            room,
            hostel_location: "Pune, Maharashtra, IN",
            face: &face,
        })
    }

    #[test]
    fn test_register_and_fetch() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "E100", "Asha", "B-12").unwrap();

        let student = store.student("E100").unwrap().unwrap();
        assert_eq!(student.name, "Asha");
        assert_eq!(student.room.as_deref(), Some("B-12"));
        assert_eq!(student.hostel_location.as_deref(), Some("Pune, Maharashtra, IN"));
        assert_eq!(student.face_encoding().unwrap().unwrap(), face());

        assert!(store.student("E999").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_enrollment() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "E100", "Asha", "B-12").unwrap();
        assert!(matches!(
            register(&store, "E100", "Ravi", "C-1"),
            Err(StoreError::DuplicateEnrollment)
        ));
    }

    #[test]
    fn test_required_fields() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(register(&store, "", "Asha", "B-12"), Err(StoreError::MissingField(_))));
        assert!(matches!(register(&store, "E1", "", "B-12"), Err(StoreError::MissingField("name"))));
        assert!(matches!(register(&store, "E1", "Asha", ""), Err(StoreError::MissingField("room"))));
    }

    #[test]
    fn test_list_ordered() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "E300", "C", "3").unwrap();
        register(&store, "E100", "A", "1").unwrap();
        register(&store, "E200", "B", "2").unwrap();

        let ids: Vec<_> = store
            .list_students()
            .unwrap()
            .into_iter()
            .map(|s| s.enrollment_number)
            .collect();
        assert_eq!(ids, vec!["E100", "E200", "E300"]);
    }

    #[test]
    fn test_delete_removes_accounts_keeps_attendance() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "E100", "Asha", "B-12").unwrap();
        store
            .register_user(&NewUser {
                username: "asha",
                password: "pw",
                role: Role::Student,
                enrollment_number: Some("E100"),
            })
            .unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        store.mark_attendance("E100", day).unwrap();

        assert!(store.delete_student("E100").unwrap());
        assert!(store.student("E100").unwrap().is_none());
        assert!(store.authenticate("asha", "pw").unwrap().is_none());
        assert_eq!(store.attendance_dates("E100").unwrap(), vec![day]);

        assert!(!store.delete_student("E100").unwrap());
    }

    #[test]
    fn test_delete_unregistered_keeps_login() {
        let store = Store::open_in_memory().unwrap();
        store
            .register_user(&NewUser {
                username: "ravi",
                password: "pw",
                role: Role::Student,
                enrollment_number: Some("E5"),
            })
            .unwrap();

        assert!(!store.delete_student("E5").unwrap());
        assert!(store.authenticate("ravi", "pw").unwrap().is_some());
    }

    #[test]
    fn test_delete_requires_enrollment() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(store.delete_student(""), Err(StoreError::MissingField(_))));
    }

    #[test]
    fn test_corrupt_face_blob() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO students (enrollment_number, name, face_encoding) VALUES ('E1', 'X', x'80049500')",
                [],
            )
            .unwrap();
        let student = store.student("E1").unwrap().unwrap();
        assert!(student.face_encoding().unwrap().is_err());
        assert!(student.room.is_none());
    }
}
