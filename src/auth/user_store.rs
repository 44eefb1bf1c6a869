//! User Storage
//! Mission: Securely store and manage user accounts with SQLite

use crate::auth::models::User;
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Get user by username (case-sensitive exact match)
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, created_at
             FROM users WHERE username = ?1",
        )?;

        let user_result = stmt.query_row(params![username], Self::row_to_user);

        match user_result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get user by id
    pub fn get_user_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, created_at
             FROM users WHERE id = ?1",
        )?;

        let user_result = stmt.query_row(params![user_id.to_string()], Self::row_to_user);

        match user_result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        let id_str: String = row.get(0)?;
        Ok(User {
            id: Uuid::parse_str(&id_str).unwrap_or_default(),
            username: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    /// Verify username and password
    pub fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        match self.get_user_by_username(username)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid)
            }
            None => Ok(false),
        }
    }

    /// Create a new user with a bcrypt-hashed password
    pub fn create_user(&self, username: &str, password: &str) -> Result<User> {
        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;

        info!("Created user: {}", user.username);

        Ok(user)
    }

    /// Replace a user's password hash. Returns false if the user is gone.
    pub fn update_password(&self, user_id: &Uuid, new_password: &str) -> Result<bool> {
        let password_hash = hash(new_password, DEFAULT_COST).context("Failed to hash password")?;

        let conn = Connection::open(&self.db_path)?;
        let rows_affected = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id.to_string()],
        )?;

        if rows_affected > 0 {
            info!("Password updated for user {}", user_id);
        }

        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::new(db_path).unwrap();
        (store, temp_file)
    }

    #[test]
    fn test_create_and_retrieve_user() {
        let (store, _temp) = create_test_store();

        let user = store.create_user("alice", "password123").unwrap();
        assert_eq!(user.username, "alice");

        let retrieved = store.get_user_by_username("alice").unwrap();
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().id, user.id);

        let by_id = store.get_user_by_id(&user.id).unwrap();
        assert!(by_id.is_some());
    }

    #[test]
    fn test_password_verification() {
        let (store, _temp) = create_test_store();
        store.create_user("alice", "password123").unwrap();

        // Correct password
        assert!(store.verify_password("alice", "password123").unwrap());

        // Incorrect password
        assert!(!store.verify_password("alice", "wrongpassword").unwrap());

        // Non-existent user
        assert!(!store.verify_password("nonexistent", "password").unwrap());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (store, _temp) = create_test_store();

        store.create_user("alice", "pass1").unwrap();
        let result = store.create_user("alice", "pass2");
        assert!(result.is_err());
    }

    #[test]
    fn test_username_match_is_case_sensitive() {
        let (store, _temp) = create_test_store();
        store.create_user("Alice", "pass").unwrap();

        assert!(store.get_user_by_username("alice").unwrap().is_none());
        assert!(store.get_user_by_username("Alice").unwrap().is_some());
    }

    #[test]
    fn test_update_password() {
        let (store, _temp) = create_test_store();
        let user = store.create_user("alice", "oldpass").unwrap();

        assert!(store.update_password(&user.id, "newpass").unwrap());

        // Old password no longer verifies, new one does
        assert!(!store.verify_password("alice", "oldpass").unwrap());
        assert!(store.verify_password("alice", "newpass").unwrap());

        // Unknown user id
        assert!(!store.update_password(&Uuid::new_v4(), "x").unwrap());
    }
}
