use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use social_types::models::{Comment, NewPost, Post, PostChanges, normalize_tags};
use social_types::{Error, Result};

use crate::comments::query_comments;
use crate::error::{QueryResult, is_foreign_key_violation};
use crate::{Database, get_ts, ts};

impl Database {
    /// Insert a post at version 0. Nothing pre-exists, so no version check.
    pub async fn create_post(&self, post: NewPost) -> Result<Post> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = ts(Utc::now());

            let inserted = tx.execute(
                "INSERT INTO posts (title, content, author_id, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                (&post.title, &post.content, post.author_id, &now),
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_foreign_key_violation(&e) => return Err(Error::NotFound.into()),
                Err(e) => return Err(e.into()),
            }
            let id = tx.last_insert_rowid();
            replace_tags(&tx, id, &normalize_tags(&post.tags))?;

            let created = query_post(&tx, id)?.ok_or(Error::Storage)?;
            tx.commit()?;
            debug!("Created post {} by user {}", id, created.author_id);
            Ok(created)
        })
        .await
    }

    pub async fn get_post(&self, id: i64) -> Result<Post> {
        self.run(move |conn| Ok(query_post(conn, id)?.ok_or(Error::NotFound)?))
            .await
    }

    /// The post and its comments read from one snapshot, so a concurrent
    /// delete cannot leave a post without the comments it had.
    pub async fn get_post_with_comments(&self, id: i64) -> Result<(Post, Vec<Comment>)> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let post = query_post(&tx, id)?.ok_or(Error::NotFound)?;
            let comments = query_comments(&tx, id)?;
            tx.commit()?;
            Ok((post, comments))
        })
        .await
    }

    /// Conditional write: applies `changes` and bumps the version only if
    /// the stored version still equals `expected_version`. Never retries;
    /// on [`Error::VersionConflict`] the caller re-reads and decides.
    pub async fn update_post_with_version(
        &self,
        id: i64,
        changes: PostChanges,
        expected_version: i64,
    ) -> Result<Post> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let updated = tx.execute(
                "UPDATE posts
                 SET title = COALESCE(?1, title),
                     content = COALESCE(?2, content),
                     version = version + 1,
                     updated_at = ?3
                 WHERE id = ?4 AND version = ?5",
                (
                    &changes.title,
                    &changes.content,
                    ts(Utc::now()),
                    id,
                    expected_version,
                ),
            )?;

            if updated == 0 {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
                    [id],
                    |row| row.get(0),
                )?;
                return Err(if exists {
                    debug!("Version conflict on post {} (expected {})", id, expected_version);
                    Error::VersionConflict
                } else {
                    Error::NotFound
                }
                .into());
            }

            if let Some(tags) = &changes.tags {
                replace_tags(&tx, id, &normalize_tags(tags))?;
            }

            let post = query_post(&tx, id)?.ok_or(Error::Storage)?;
            tx.commit()?;
            Ok(post)
        })
        .await
    }

    /// Hard delete. Tags and comments are removed in the same unit.
    pub async fn delete_post(&self, id: i64) -> Result<()> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let deleted = tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(Error::NotFound.into());
            }
            tx.commit()?;
            info!("Deleted post {}", id);
            Ok(())
        })
        .await
    }
}

fn query_post(conn: &Connection, id: i64) -> QueryResult<Option<Post>> {
    let post = conn
        .query_row(
            "SELECT id, title, content, author_id, version, created_at, updated_at
             FROM posts WHERE id = ?1",
            [id],
            |row| {
                Ok(Post {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    author_id: row.get(3)?,
                    tags: Vec::new(),
                    version: row.get(4)?,
                    created_at: get_ts(row, 5)?,
                    updated_at: get_ts(row, 6)?,
                })
            },
        )
        .optional()?;

    let Some(mut post) = post else {
        return Ok(None);
    };
    post.tags = load_tags(conn, &[id])?.remove(&id).unwrap_or_default();
    Ok(Some(post))
}

fn replace_tags(conn: &Connection, post_id: i64, tags: &[String]) -> QueryResult<()> {
    conn.execute("DELETE FROM post_tags WHERE post_id = ?1", [post_id])?;
    let mut stmt = conn.prepare("INSERT INTO post_tags (post_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute((post_id, tag))?;
    }
    Ok(())
}

/// Batch-fetch tags for a set of posts.
pub(crate) fn load_tags(conn: &Connection, post_ids: &[i64]) -> QueryResult<HashMap<i64, Vec<String>>> {
    let mut out: HashMap<i64, Vec<String>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(out);
    }

    let placeholders: Vec<String> = (1..=post_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT post_id, tag FROM post_tags WHERE post_id IN ({}) ORDER BY tag",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(post_ids), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (post_id, tag) = row?;
        out.entry(post_id).or_default().push(tag);
    }

    Ok(out)
}
