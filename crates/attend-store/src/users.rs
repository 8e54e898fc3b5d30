use crate::error::{is_unique_violation, Result, StoreError};
use crate::models::{NewUser, Role, User};
use crate::{password, Store, DEFAULT_WARDEN_PASSWORD, DEFAULT_WARDEN_USERNAME};
use rusqlite::{params, OptionalExtension};

impl Store {
    /// Create the default warden account if no warden exists.
    ///
    /// Returns whether an account was created.
    pub fn ensure_default_warden(&self) -> Result<bool> {
        let wardens: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?1",
            [Role::Warden.as_str()],
            |r| r.get(0),
        )?;
        if wardens > 0 {
            return Ok(false);
        }

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO users (username, password, role) VALUES (?1, ?2, ?3)",
            params![
                DEFAULT_WARDEN_USERNAME,
                password::digest(DEFAULT_WARDEN_PASSWORD),
                Role::Warden.as_str()
            ],
        )?;
        if inserted > 0 {
            tracing::warn!(
                username = DEFAULT_WARDEN_USERNAME,
                "created default warden account; change its password"
            );
        }
        Ok(inserted > 0)
    }

    /// Create a login account.
    pub fn register_user(&self, user: &NewUser<'_>) -> Result<()> {
        if user.username.is_empty() {
            return Err(StoreError::MissingField("username"));
        }
        if user.password.is_empty() {
            return Err(StoreError::MissingField("password"));
        }
        let enrollment = match user.role {
            Role::Student => Some(
                user.enrollment_number
                    .filter(|e| !e.is_empty())
                    .ok_or(StoreError::MissingField("enrollment number"))?,
            ),
            Role::Warden => None,
        };

        self.conn
            .execute(
                "INSERT INTO users (username, password, role, enrollment_number) VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.username,
                    password::digest(user.password),
                    user.role.as_str(),
                    enrollment
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::UsernameTaken
                } else {
                    e.into()
                }
            })?;

        tracing::info!(username = user.username, role = %user.role, "registered user");
        Ok(())
    }

    /// Look up an account by username and password.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT role, enrollment_number FROM users WHERE username = ?1 AND password = ?2",
                params![username, password::digest(password)],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let Some((role, enrollment_number)) = row else {
            tracing::debug!(username, "authentication failed");
            return Ok(None);
        };

        Ok(Some(User {
            username: username.to_string(),
            role: role.parse()?,
            enrollment_number,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student<'a>(username: &'a str, enrollment: Option<&'a str>) -> NewUser<'a> {
        NewUser {
            username,
            password: "secret",
            role: Role::Student,
            enrollment_number: enrollment,
        }
    }

    #[test]
    fn test_default_warden_created_once() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.ensure_default_warden().unwrap());

        let user = store.authenticate("warden", "warden123").unwrap().unwrap();
        assert_eq!(user.role, Role::Warden);
        assert!(user.enrollment_number.is_none());
        assert_eq!(store.counts().unwrap().users, 1);
    }

    #[test]
    fn test_register_and_authenticate() {
        let store = Store::open_in_memory().unwrap();
        store.register_user(&student("alice", Some("E100"))).unwrap();

        let user = store.authenticate("alice", "secret").unwrap().unwrap();
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.enrollment_number.as_deref(), Some("E100"));

        assert!(store.authenticate("alice", "wrong").unwrap().is_none());
        assert!(store.authenticate("bob", "secret").unwrap().is_none());
    }

    #[test]
    fn test_password_stored_as_digest() {
        let store = Store::open_in_memory().unwrap();
        store.register_user(&student("alice", Some("E100"))).unwrap();
        let stored: String = store
            .conn
            .query_row("SELECT password FROM users WHERE username = 'alice'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, password::digest("secret"));
    }

    #[test]
    fn test_duplicate_username() {
        let store = Store::open_in_memory().unwrap();
        store.register_user(&student("alice", Some("E100"))).unwrap();
        assert!(matches!(
            store.register_user(&student("alice", Some("E200"))),
            Err(StoreError::UsernameTaken)
        ));
    }

    #[test]
    fn test_missing_fields() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.register_user(&student("", Some("E1"))),
            Err(StoreError::MissingField("username"))
        ));
        assert!(matches!(
            store.register_user(&student("alice", None)),
            Err(StoreError::MissingField("enrollment number"))
        ));
        assert!(matches!(
            store.register_user(&student("alice", Some(""))),
            Err(StoreError::MissingField("enrollment number"))
        ));
        let mut no_password = student("alice", Some("E1"));
        no_password.password = "";
        assert!(matches!(
            store.register_user(&no_password),
            Err(StoreError::MissingField("password"))
        ));
    }

    #[test]
    fn test_warden_drops_enrollment() {
        let store = Store::open_in_memory().unwrap();
        store
            .register_user(&NewUser {
                username: "head",
                password: "pw",
                role: Role::Warden,
                enrollment_number: Some("E1"),
            })
            .unwrap();
        let user = store.authenticate("head", "pw").unwrap().unwrap();
        assert!(user.enrollment_number.is_none());
    }
}
