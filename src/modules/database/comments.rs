use super::storage::BlogDB;
use rusqlite::{params, Result};
use serde::Serialize;

/// Comment joined with its commenter.
#[derive(Debug, Serialize, Clone)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub commenter_id: i64,
    pub commenter_name: String,
    /// Only used to derive the avatar in templates.
    pub commenter_email: String,
}

impl BlogDB {
    /// Add a comment by `commenter_id` under `post_id`.
    pub fn add_comment(&self, post_id: i64, commenter_id: i64, content: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO blog_comments (content, post_id, commenter_id) VALUES (?, ?, ?)",
            params![content, post_id, commenter_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All comments of a post, oldest first.
    pub fn get_comments_for_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.content, c.post_id, c.commenter_id, u.name, u.email
             FROM blog_comments c JOIN users u ON u.id = c.commenter_id
             WHERE c.post_id = ? ORDER BY c.id",
        )?;

        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    post_id: row.get(2)?,
                    commenter_id: row.get(3)?,
                    commenter_name: row.get(4)?,
                    commenter_email: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(comments)
    }

    pub fn count_comments_for_post(&self, post_id: i64) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM blog_comments WHERE post_id = ?",
            params![post_id],
            |row| row.get(0),
        )
    }
}
