use chrono::Utc;
use tracing::debug;

use social_types::{Error, Result};

use crate::error::is_foreign_key_violation;
use crate::{Database, ts};

impl Database {
    /// Add the edge `follower_id -> target_id`. Following twice is a no-op;
    /// following yourself is a validation error.
    pub async fn follow(&self, target_id: i64, follower_id: i64) -> Result<()> {
        if target_id == follower_id {
            return Err(Error::validation("cannot follow yourself"));
        }

        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO followers (follower_id, target_id, created_at)
                 VALUES (?1, ?2, ?3)",
                (follower_id, target_id, ts(Utc::now())),
            );
            match inserted {
                Ok(0) => debug!("User {} already follows {}", follower_id, target_id),
                Ok(_) => debug!("User {} now follows {}", follower_id, target_id),
                Err(e) if is_foreign_key_violation(&e) => return Err(Error::NotFound.into()),
                Err(e) => return Err(e.into()),
            }
            Ok(())
        })
        .await
    }

    /// Remove the edge if present. Unfollowing someone not followed succeeds.
    pub async fn unfollow(&self, target_id: i64, follower_id: i64) -> Result<()> {
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM followers WHERE follower_id = ?1 AND target_id = ?2",
                (follower_id, target_id),
            )?;
            Ok(())
        })
        .await
    }
}
