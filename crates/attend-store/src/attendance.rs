use crate::error::{Result, StoreError};
use crate::models::MarkOutcome;
use crate::Store;
use chrono::NaiveDate;
use rusqlite::{params, Transaction, TransactionBehavior};

const DATE_FORMAT: &str = "%Y-%m-%d";

impl Store {
    /// Record attendance for `date` unless already recorded that day.
    ///
    /// The check and the insert share one immediate transaction, so two
    /// concurrent marks for the same day cannot both insert.
    pub fn mark_attendance(&self, enrollment_number: &str, date: NaiveDate) -> Result<MarkOutcome> {
        if enrollment_number.is_empty() {
            return Err(StoreError::MissingField("enrollment number"));
        }
        let day = date.format(DATE_FORMAT).to_string();

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM attendance WHERE enrollment_number = ?1 AND date = ?2",
            params![enrollment_number, day],
            |r| r.get(0),
        )?;
        if existing > 0 {
            tracing::info!(enrollment = enrollment_number, date = %day, "attendance already marked");
            return Ok(MarkOutcome::AlreadyMarked);
        }

        tx.execute(
            "INSERT INTO attendance (enrollment_number, date) VALUES (?1, ?2)",
            params![enrollment_number, day],
        )?;
        tx.commit()?;

        tracing::info!(enrollment = enrollment_number, date = %day, "attendance marked");
        Ok(MarkOutcome::Marked)
    }

    /// Dates on which attendance was recorded, in insertion order.
    pub fn attendance_dates(&self, enrollment_number: &str) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date FROM attendance WHERE enrollment_number = ?1 ORDER BY id")?;
        let days = stmt
            .query_map([enrollment_number], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        days.into_iter()
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).map_err(|_| StoreError::BadDate(d)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_mark_once_per_day() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.mark_attendance("E1", day(1)).unwrap(), MarkOutcome::Marked);
        assert_eq!(store.mark_attendance("E1", day(1)).unwrap(), MarkOutcome::AlreadyMarked);
        assert_eq!(store.mark_attendance("E1", day(2)).unwrap(), MarkOutcome::Marked);
        assert_eq!(store.mark_attendance("E2", day(1)).unwrap(), MarkOutcome::Marked);

        assert_eq!(store.attendance_dates("E1").unwrap(), vec![day(1), day(2)]);
        assert_eq!(store.counts().unwrap().attendance, 3);
    }

    #[test]
    fn test_dates_stored_as_text() {
        let store = Store::open_in_memory().unwrap();
        store.mark_attendance("E1", day(9)).unwrap();
        let raw: String = store
            .conn
            .query_row("SELECT date FROM attendance", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, "2024-03-09");
    }

    #[test]
    fn test_no_records() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.attendance_dates("E1").unwrap().is_empty());
    }

    #[test]
    fn test_bad_stored_date() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO attendance (enrollment_number, date) VALUES ('E1', 'yesterday')", [])
            .unwrap();
        assert!(matches!(store.attendance_dates("E1"), Err(StoreError::BadDate(_))));
    }

    #[test]
    fn test_mark_requires_enrollment() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(store.mark_attendance("", day(1)), Err(StoreError::MissingField(_))));
    }
}
