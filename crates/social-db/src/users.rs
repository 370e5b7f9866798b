use chrono::{Duration, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use social_types::models::{Gender, NewUser, User};
use social_types::roles::RoleLevel;
use social_types::{Error, Result};

use crate::error::{QueryResult, is_unique_violation};
use crate::models::UserRow;
use crate::{Database, get_ts, ts};

const USER_COLUMNS: &str =
    "id, name, email, credential_hash, age, gender, role_level, is_active, created_at";

impl Database {
    /// Insert an inactive user and its activation token as one unit.
    /// Either both rows become visible or neither does.
    pub async fn create_with_invite(
        &self,
        user: NewUser,
        token_hash: String,
        ttl: Duration,
    ) -> Result<User> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = Utc::now();

            let user_id = insert_user(&tx, &user)?;
            crate::tokens::insert_token(&tx, user_id, &token_hash, now + ttl)?;
            let row = query_user(&tx, "id = ?1", user_id)?.ok_or(Error::Storage)?;

            tx.commit()?;
            info!("Created pending user {} ({})", row.id, row.name);
            Ok(row.into())
        })
        .await
    }

    /// Active accounts only.
    pub async fn get_user_by_id(&self, id: i64) -> Result<User> {
        self.run(move |conn| {
            let row = query_user(conn, "id = ?1 AND is_active = 1", id)?;
            Ok(row.ok_or(Error::NotFound)?.into())
        })
        .await
    }

    /// Any activation state, credential hash included. For authentication
    /// and authorization flows.
    pub async fn get_user_by_id_any(&self, id: i64) -> Result<UserRow> {
        self.run(move |conn| Ok(query_user(conn, "id = ?1", id)?.ok_or(Error::NotFound)?))
            .await
    }

    /// Active accounts only. Email comparison is case-insensitive.
    pub async fn get_user_by_email(&self, email: &str) -> Result<User> {
        let email = email.to_string();
        self.run(move |conn| {
            let row = query_user(conn, "email = ?1 AND is_active = 1", email)?;
            Ok(row.ok_or(Error::NotFound)?.into())
        })
        .await
    }

    /// Any activation state, credential hash included.
    pub async fn get_user_by_email_any(&self, email: &str) -> Result<UserRow> {
        let email = email.to_string();
        self.run(move |conn| Ok(query_user(conn, "email = ?1", email)?.ok_or(Error::NotFound)?))
            .await
    }

    /// Hard delete. Deleting an id that does not exist succeeds, so the
    /// registration workflow can compensate without checking first.
    /// Tokens, posts, comments and follow edges go with the user.
    pub async fn delete_user(&self, id: i64) -> Result<()> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;

            if deleted == 0 {
                debug!("delete_user: user {} already absent", id);
            } else {
                info!("Deleted user {}", id);
            }
            Ok(())
        })
        .await
    }
}

fn insert_user(conn: &Connection, user: &NewUser) -> QueryResult<i64> {
    let result = conn.execute(
        "INSERT INTO users (name, email, credential_hash, age, gender, role_level, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        rusqlite::params![
            user.name,
            user.email,
            user.credential_hash,
            user.age,
            user.gender.as_flag(),
            user.role_level.0,
            ts(Utc::now()),
        ],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(duplicate_user_error(conn, user)?.into()),
        Err(e) => Err(e.into()),
    }
}

/// Work out which uniqueness constraint an insert tripped by probing the
/// columns inside the same transaction.
fn duplicate_user_error(conn: &Connection, user: &NewUser) -> QueryResult<Error> {
    let exists = |sql: &str, value: &str| -> rusqlite::Result<bool> {
        conn.query_row(sql, [value], |row| row.get(0))
    };

    if exists("SELECT EXISTS(SELECT 1 FROM users WHERE name = ?1)", &user.name)? {
        return Ok(Error::DuplicateName);
    }
    if exists("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)", &user.email)? {
        return Ok(Error::DuplicateEmail);
    }
    Ok(Error::Storage)
}

pub(crate) fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    param: P,
) -> QueryResult<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let row = conn
        .query_row(&sql, [param], |row| {
            let gender_flag: i64 = row.get(5)?;
            let gender = Gender::from_flag(gender_flag).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Integer,
                    format!("unknown gender flag {}", gender_flag).into(),
                )
            })?;
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                credential_hash: row.get(3)?,
                age: row.get(4)?,
                gender,
                role_level: RoleLevel(row.get(6)?),
                active: row.get(7)?,
                created_at: get_ts(row, 8)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::token_hash;
    use crate::testing::{self, new_user};

    #[tokio::test]
    async fn created_user_is_inactive_and_hidden_from_active_lookups() {
        let t = testing::open();
        let user = t
            .db
            .create_with_invite(new_user("alice"), token_hash("s"), Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(user.id, 1);
        assert!(!user.active);
        assert_eq!(t.db.get_user_by_id(user.id).await, Err(Error::NotFound));
        assert_eq!(
            t.db.get_user_by_email("alice@example.com").await,
            Err(Error::NotFound)
        );

        let row = t.db.get_user_by_id_any(user.id).await.unwrap();
        assert_eq!(row.name, "alice");
        assert!(!row.active);

        let row = t.db.get_user_by_email_any("ALICE@example.com").await.unwrap();
        assert_eq!(row.id, user.id);
    }

    #[tokio::test]
    async fn duplicates_are_classified() {
        let t = testing::open();
        t.db.create_with_invite(new_user("alice"), token_hash("a"), Duration::hours(1))
            .await
            .unwrap();

        let mut same_name = new_user("alice");
        same_name.email = "other@example.com".into();
        let err = t
            .db
            .create_with_invite(same_name, token_hash("b"), Duration::hours(1))
            .await
            .unwrap_err();
        assert_eq!(err, Error::DuplicateName);

        let mut same_email = new_user("bob");
        same_email.email = "Alice@Example.com".into();
        let err = t
            .db
            .create_with_invite(same_email, token_hash("c"), Duration::hours(1))
            .await
            .unwrap_err();
        assert_eq!(err, Error::DuplicateEmail);
    }

    #[tokio::test]
    async fn failed_token_insert_rolls_back_user() {
        let t = testing::open();
        t.db.create_with_invite(new_user("alice"), token_hash("shared"), Duration::hours(1))
            .await
            .unwrap();

        // The user insert succeeds, then the token insert collides
        let err = t
            .db
            .create_with_invite(new_user("bob"), token_hash("shared"), Duration::hours(1))
            .await
            .unwrap_err();
        assert_eq!(err, Error::Storage);

        assert_eq!(
            t.db.get_user_by_email_any("bob@example.com").await.unwrap_err(),
            Error::NotFound
        );
        let tokens: i64 = t
            .db
            .run(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM activation_tokens", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(tokens, 1);
    }

    #[tokio::test]
    async fn delete_user_is_idempotent() {
        let t = testing::open();
        let id = testing::active_user(&t.db, "alice").await;

        t.db.delete_user(id).await.unwrap();
        assert_eq!(t.db.get_user_by_id_any(id).await.unwrap_err(), Error::NotFound);

        t.db.delete_user(id).await.unwrap();
        t.db.delete_user(9999).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_gender_flag_is_a_storage_error() {
        let t = testing::open();
        let id = testing::active_user(&t.db, "alice").await;

        t.db.run(move |conn| {
            conn.execute_batch("PRAGMA ignore_check_constraints = ON")?;
            conn.execute("UPDATE users SET gender = 7 WHERE id = ?1", [id])?;
            conn.execute_batch("PRAGMA ignore_check_constraints = OFF")?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(t.db.get_user_by_id_any(id).await.err(), Some(Error::Storage));
        assert_eq!(t.db.get_user_by_id(id).await, Err(Error::Storage));
    }
}
