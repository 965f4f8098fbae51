use super::storage::BlogDB;
use rusqlite::{params, OptionalExtension, Result, Row};
use serde::Serialize;

/// Blog post joined with its author's display name.
#[derive(Debug, Clone, Serialize)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    pub subtitle: String,
    pub date: String,
    pub body: String,
    pub img_url: String,
    pub author_id: i64,
    pub author_name: String,
}

/// Editable fields of a post.
#[derive(Debug, Clone)]
pub struct PostContent {
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub img_url: String,
}

const SELECT_POST: &str = "SELECT p.id, p.title, p.subtitle, p.date, p.body, p.img_url,
        p.author_id, u.name
    FROM blog_posts p JOIN users u ON u.id = p.author_id";

impl BlogPost {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            subtitle: row.get(2)?,
            date: row.get(3)?,
            body: row.get(4)?,
            img_url: row.get(5)?,
            author_id: row.get(6)?,
            author_name: row.get(7)?,
        })
    }
}

impl BlogDB {
    pub fn list_posts(&self) -> Result<Vec<BlogPost>> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_POST} ORDER BY p.id"))?;
        let posts = stmt
            .query_map([], BlogPost::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    pub fn get_post(&self, id: i64) -> Result<Option<BlogPost>> {
        self.conn
            .query_row(
                &format!("{SELECT_POST} WHERE p.id = ?"),
                params![id],
                BlogPost::from_row,
            )
            .optional()
    }

    /// Id of the post using `title`, if any.
    pub fn find_post_id_by_title(&self, title: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM blog_posts WHERE title = ?",
                params![title],
                |row| row.get(0),
            )
            .optional()
    }

    /// Insert a post. Fails with a UNIQUE violation if the title is taken.
    pub fn create_post(&self, content: &PostContent, author_id: i64, date: &str) -> Result<BlogPost> {
        self.conn.execute(
            "INSERT INTO blog_posts (title, subtitle, date, body, img_url, author_id)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                content.title,
                content.subtitle,
                date,
                content.body,
                content.img_url,
                author_id
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_post(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Update a post in place, keeping its id and date. Returns false when
    /// the post does not exist.
    pub fn update_post(&self, id: i64, content: &PostContent, author_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE blog_posts
             SET title = ?, subtitle = ?, body = ?, img_url = ?, author_id = ?
             WHERE id = ?",
            params![
                content.title,
                content.subtitle,
                content.body,
                content.img_url,
                author_id,
                id
            ],
        )?;
        Ok(rows > 0)
    }

    /// Delete a post together with its comments.
    pub fn delete_post(&mut self, id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let comments = tx.execute("DELETE FROM blog_comments WHERE post_id = ?", params![id])?;
        let rows = tx.execute("DELETE FROM blog_posts WHERE id = ?", params![id])?;
        tx.commit()?;

        if rows > 0 {
            log::debug!("Deleted post {} and {} comment(s)", id, comments);
        }
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::storage::is_unique_violation;
    use crate::database::users::NewUser;

    fn content(title: &str) -> PostContent {
        PostContent {
            title: title.to_string(),
            subtitle: "Subtitle".to_string(),
            body: "<p>Body</p>".to_string(),
            img_url: "https://example.com/a.jpg".to_string(),
        }
    }

    fn db_with_user() -> (BlogDB, i64) {
        let db = BlogDB::in_memory().unwrap();
        let user = db
            .create_user(&NewUser {
                name: "Admin",
                email: "admin@x.com",
                password_hash: "hash",
            })
            .unwrap();
        (db, user.id)
    }

    #[test]
    fn test_create_and_get_post() {
        let (db, author) = db_with_user();
        let post = db.create_post(&content("First"), author, "October 16, 2026").unwrap();

        let loaded = db.get_post(post.id).unwrap().unwrap();
        assert_eq!(loaded.title, "First");
        assert_eq!(loaded.author_name, "Admin");
        assert_eq!(loaded.date, "October 16, 2026");
        assert_eq!(db.list_posts().unwrap().len(), 1);
        assert!(db.get_post(post.id + 1).unwrap().is_none());
    }

    #[test]
    fn test_title_is_unique() {
        let (db, author) = db_with_user();
        db.create_post(&content("Same"), author, "d").unwrap();
        let err = db.create_post(&content("Same"), author, "d").unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_update_keeps_identity() {
        let (db, author) = db_with_user();
        let post = db.create_post(&content("Before"), author, "d").unwrap();

        assert!(db.update_post(post.id, &content("After"), author).unwrap());
        let loaded = db.get_post(post.id).unwrap().unwrap();
        assert_eq!(loaded.title, "After");
        assert_eq!(loaded.date, "d");
        assert!(!db.update_post(999, &content("Ghost"), author).unwrap());
    }

    #[test]
    fn test_update_to_taken_title_fails() {
        let (db, author) = db_with_user();
        db.create_post(&content("One"), author, "d").unwrap();
        let two = db.create_post(&content("Two"), author, "d").unwrap();

        let err = db.update_post(two.id, &content("One"), author).unwrap_err();
        assert!(is_unique_violation(&err));
        assert_eq!(db.get_post(two.id).unwrap().unwrap().title, "Two");
    }

    #[test]
    fn test_delete_missing_post() {
        let (mut db, _) = db_with_user();
        assert!(!db.delete_post(7).unwrap());
    }
}
