use super::storage::BlogDB;
use rusqlite::{params, OptionalExtension, Result, Row};
use serde::Serialize;

/// Registered user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_admin: bool,
}

/// Data needed to insert a user; `password_hash` is already hashed.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

impl User {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            is_admin: row.get(4)?,
        })
    }
}

impl BlogDB {
    /// Insert a user. The very first user becomes the admin; the check and
    /// the insert are a single statement so two racing registrations cannot
    /// both see an empty table.
    ///
    /// Fails with a UNIQUE violation when the email is already registered.
    pub fn create_user(&self, new_user: &NewUser<'_>) -> Result<User> {
        self.conn.execute(
            "INSERT INTO users (name, email, password, is_admin)
             VALUES (?, ?, ?, NOT EXISTS (SELECT 1 FROM users))",
            params![new_user.name, new_user.email, new_user.password_hash],
        )?;

        let id = self.conn.last_insert_rowid();
        let user = self
            .get_user(id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        if user.is_admin {
            log::info!("User {} registered as the site admin", user.id);
        }
        Ok(user)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email, password, is_admin FROM users WHERE id = ?",
                params![id],
                User::from_row,
            )
            .optional()
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email, password, is_admin FROM users WHERE email = ?",
                params![email],
                User::from_row,
            )
            .optional()
    }

    /// Replace a stored password hash. Returns false for an unknown id.
    pub fn update_password(&self, id: i64, password_hash: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET password = ? WHERE id = ?",
            params![password_hash, id],
        )?;
        Ok(rows > 0)
    }

    pub fn count_users(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::storage::is_unique_violation;

    fn new_user<'a>(name: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            name,
            email,
            password_hash: "hash",
        }
    }

    #[test]
    fn test_first_user_is_admin() {
        let db = BlogDB::in_memory().unwrap();
        let alice = db.create_user(&new_user("Alice", "a@x.com")).unwrap();
        let bob = db.create_user(&new_user("Bob", "b@x.com")).unwrap();

        assert_eq!(alice.id, 1);
        assert!(alice.is_admin);
        assert!(!bob.is_admin);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = BlogDB::in_memory().unwrap();
        db.create_user(&new_user("Alice", "a@x.com")).unwrap();
        let err = db.create_user(&new_user("Other", "a@x.com")).unwrap_err();

        assert!(is_unique_violation(&err));
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn test_lookup_by_email() {
        let db = BlogDB::in_memory().unwrap();
        let created = db.create_user(&new_user("Alice", "a@x.com")).unwrap();

        let found = db.find_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.name, "Alice");
        assert!(db.find_user_by_email("nobody@x.com").unwrap().is_none());
        assert!(db.get_user(99).unwrap().is_none());
    }

    #[test]
    fn test_update_password() {
        let db = BlogDB::in_memory().unwrap();
        let user = db.create_user(&new_user("Alice", "a@x.com")).unwrap();

        assert!(db.update_password(user.id, "new-hash").unwrap());
        assert_eq!(db.get_user(user.id).unwrap().unwrap().password, "new-hash");
        assert!(!db.update_password(99, "new-hash").unwrap());
    }
}
