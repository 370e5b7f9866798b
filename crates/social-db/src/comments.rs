use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use social_types::models::{Comment, NewComment};
use social_types::{Error, Result};

use crate::error::{QueryResult, is_foreign_key_violation};
use crate::{Database, get_ts, ts};

const COMMENT_SELECT: &str = "
    SELECT c.id, c.content, c.author_id, u.name, c.post_id, c.created_at
    FROM comments c
    JOIN users u ON u.id = c.author_id";

impl Database {
    /// Fails with [`Error::NotFound`] if the post (or author) is gone.
    pub async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO comments (content, author_id, post_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    &comment.content,
                    comment.author_id,
                    comment.post_id,
                    ts(Utc::now()),
                ),
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_foreign_key_violation(&e) => return Err(Error::NotFound.into()),
                Err(e) => return Err(e.into()),
            }

            let id = conn.last_insert_rowid();
            Ok(query_comment(conn, id)?.ok_or(Error::Storage)?)
        })
        .await
    }

    /// Newest first, each with its author's display name.
    pub async fn get_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        self.run(move |conn| query_comments(conn, post_id)).await
    }
}

/// Newest first, each with its author's display name.
pub(crate) fn query_comments(conn: &Connection, post_id: i64) -> QueryResult<Vec<Comment>> {
    let sql = format!(
        "{} WHERE c.post_id = ?1 ORDER BY c.created_at DESC, c.id DESC",
        COMMENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([post_id], comment_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_comment(conn: &Connection, id: i64) -> QueryResult<Option<Comment>> {
    let sql = format!("{} WHERE c.id = ?1", COMMENT_SELECT);
    Ok(conn.query_row(&sql, [id], comment_from_row).optional()?)
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        content: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        post_id: row.get(4)?,
        created_at: get_ts(row, 5)?,
    })
}
