use rusqlite::Connection;

/// Table definitions. `attendance` has no (enrollment, date) uniqueness;
/// one mark per day is enforced by `Store::mark_attendance`.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    enrollment_number TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    room TEXT,
    hostel_location TEXT,
    face_encoding BLOB
);

CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    enrollment_number TEXT NOT NULL,
    date TEXT NOT NULL,
    FOREIGN KEY (enrollment_number) REFERENCES students(enrollment_number)
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    role TEXT NOT NULL,
    enrollment_number TEXT,
    FOREIGN KEY (enrollment_number) REFERENCES students(enrollment_number)
);

CREATE INDEX IF NOT EXISTS attendance_by_student ON attendance (enrollment_number, date);
";

pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["attendance", "students", "users"]);
    }
}
