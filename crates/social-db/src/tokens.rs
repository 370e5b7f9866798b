use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use social_types::models::User;
use social_types::{Error, Result};

use crate::credentials::token_hash;
use crate::error::QueryResult;
use crate::users::query_user;
use crate::{Database, ts};

impl Database {
    /// Redeem an activation secret: on a live match, activate the owner and
    /// consume the token in one unit. A wrong, expired or already used
    /// secret all fail the same way.
    pub async fn redeem(&self, secret: &str, now: DateTime<Utc>) -> Result<User> {
        let hash = token_hash(secret);
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let user_id: i64 = tx
                .query_row(
                    "SELECT user_id FROM activation_tokens WHERE token_hash = ?1 AND expiry > ?2",
                    (&hash, ts(now)),
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(Error::TokenInvalidOrExpired)?;

            tx.execute("UPDATE users SET is_active = 1 WHERE id = ?1", [user_id])?;
            tx.execute("DELETE FROM activation_tokens WHERE user_id = ?1", [user_id])?;
            let row = query_user(&tx, "id = ?1", user_id)?.ok_or(Error::Storage)?;

            tx.commit()?;
            info!("Activated user {}", user_id);
            Ok(row.into())
        })
        .await
    }

    /// Replace the live token of a still-inactive user. Returns the new
    /// expiry. The previous secret stops working immediately.
    pub async fn reissue_token(
        &self,
        user_id: i64,
        token_hash: String,
        ttl: Duration,
    ) -> Result<DateTime<Utc>> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let active: bool = tx
                .query_row("SELECT is_active FROM users WHERE id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or(Error::NotFound)?;
            if active {
                return Err(Error::validation("account is already active").into());
            }

            let expiry = Utc::now() + ttl;
            insert_token(&tx, user_id, &token_hash, expiry)?;

            tx.commit()?;
            info!("Reissued activation token for user {}", user_id);
            Ok(expiry)
        })
        .await
    }

    /// Drop tokens whose expiry has passed. Their users stay inactive.
    pub async fn prune_expired_tokens(&self, now: DateTime<Utc>) -> Result<usize> {
        self.run(move |conn| {
            Ok(conn.execute(
                "DELETE FROM activation_tokens WHERE expiry <= ?1",
                [ts(now)],
            )?)
        })
        .await
    }
}

/// Insert or supersede the single token row of `user_id`.
pub(crate) fn insert_token(
    conn: &Connection,
    user_id: i64,
    token_hash: &str,
    expiry: DateTime<Utc>,
) -> QueryResult<()> {
    conn.execute(
        "INSERT INTO activation_tokens (user_id, token_hash, expiry) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET token_hash = excluded.token_hash, expiry = excluded.expiry",
        (user_id, token_hash, ts(expiry)),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, new_user};

    #[tokio::test]
    async fn redeem_activates_once() {
        let t = testing::open();
        let user = t
            .db
            .create_with_invite(new_user("alice"), token_hash("s3cret"), Duration::hours(72))
            .await
            .unwrap();
        assert!(!user.active);

        let activated = t.db.redeem("s3cret", Utc::now()).await.unwrap();
        assert_eq!(activated.id, user.id);
        assert!(activated.active);
        assert!(t.db.get_user_by_id(user.id).await.unwrap().active);

        let err = t.db.redeem("s3cret", Utc::now()).await.unwrap_err();
        assert_eq!(err, Error::TokenInvalidOrExpired);
    }

    #[tokio::test]
    async fn wrong_and_expired_secrets_fail_uniformly() {
        let t = testing::open();
        t.db.create_with_invite(new_user("alice"), token_hash("s3cret"), Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(
            t.db.redeem("guess", Utc::now()).await.unwrap_err(),
            Error::TokenInvalidOrExpired
        );

        let later = Utc::now() + Duration::hours(2);
        assert_eq!(
            t.db.redeem("s3cret", later).await.unwrap_err(),
            Error::TokenInvalidOrExpired
        );

        let row = t.db.get_user_by_email_any("alice@example.com").await.unwrap();
        assert!(!row.active);
    }

    #[tokio::test]
    async fn reissue_supersedes_previous_secret() {
        let t = testing::open();
        let user = t
            .db
            .create_with_invite(new_user("alice"), token_hash("first"), Duration::hours(1))
            .await
            .unwrap();

        t.db.reissue_token(user.id, token_hash("second"), Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(
            t.db.redeem("first", Utc::now()).await.unwrap_err(),
            Error::TokenInvalidOrExpired
        );
        assert!(t.db.redeem("second", Utc::now()).await.unwrap().active);

        let err = t
            .db
            .reissue_token(user.id, token_hash("third"), Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn prune_removes_only_expired_tokens() {
        let t = testing::open();
        t.db.create_with_invite(new_user("alice"), token_hash("a"), Duration::hours(1))
            .await
            .unwrap();
        t.db.create_with_invite(new_user("bob"), token_hash("b"), Duration::hours(48))
            .await
            .unwrap();

        let pruned = t
            .db
            .prune_expired_tokens(Utc::now() + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert!(t.db.redeem("b", Utc::now()).await.is_ok());
    }
}
