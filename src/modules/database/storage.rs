use rusqlite::{Connection, ErrorCode, Result};
use std::path::Path;

/// Blog database: users, posts and comments.
///
/// One `BlogDB` wraps one SQLite connection. Handlers `open` their own
/// connection per request; `new` also creates and upgrades the schema and
/// runs once at startup.
pub struct BlogDB {
    pub(crate) conn: Connection,
}

impl BlogDB {
    /// Open (or create) the blog database at `db_path` and make sure the
    /// schema is current.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db = Self::open(db_path)?;
        db.create_schema()?;
        Ok(db)
    }

    /// Connection to an already initialised database. No schema statements.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::configure(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        let db = Self { conn };
        db.create_schema()?;
        Ok(db)
    }

    fn configure(conn: &Connection) -> Result<()> {
        // SQLite leaves FK enforcement off unless asked, per connection
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        let conn = &self.conn;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blog_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL UNIQUE,
                subtitle TEXT NOT NULL,
                date TEXT NOT NULL,
                body TEXT NOT NULL,
                img_url TEXT NOT NULL,
                author_id INTEGER NOT NULL REFERENCES users(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blog_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                post_id INTEGER NOT NULL REFERENCES blog_posts(id) ON DELETE CASCADE,
                commenter_id INTEGER NOT NULL REFERENCES users(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_comments_post ON blog_comments(post_id)",
            [],
        )?;

        self.upgrade_admin_column()
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>>>()?;
        Ok(columns.iter().any(|name| name == column))
    }

    /// Databases created before the `is_admin` column existed: add it and
    /// promote the lowest user id, which was the admin under the old rule.
    fn upgrade_admin_column(&self) -> Result<()> {
        if self.has_column("users", "is_admin")? {
            return Ok(());
        }

        log::info!("Adding is_admin column to users table");
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "ALTER TABLE users ADD COLUMN is_admin INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
        let promoted = tx.execute(
            "UPDATE users SET is_admin = 1 WHERE id = (SELECT MIN(id) FROM users)",
            [],
        )?;
        tx.commit()?;

        if promoted > 0 {
            log::info!("Promoted the first registered user to admin");
        }
        Ok(())
    }
}

/// True when `err` is any constraint violation (UNIQUE, FOREIGN KEY, NOT NULL...).
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// True when `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
