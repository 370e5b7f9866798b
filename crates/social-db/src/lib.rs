pub mod credentials;
pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

mod comments;
mod feed;
mod follows;
mod posts;
mod tokens;
mod users;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, InterruptHandle};
use tracing::{error, info, warn};

use crate::error::QueryResult;
use crate::pool::SqlitePool;
pub use crate::pool::DbConfig;

/// Handle to the backing store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    timeout: Duration,
}

impl Database {
    pub fn open(path: &Path, config: DbConfig) -> Result<Self> {
        let pool = pool::build(path, &config)?;

        let conn = pool.get()?;
        migrations::run(&conn)?;
        drop(conn);

        info!(
            "Database opened at {} (max {} connections)",
            path.display(),
            pool.max_size()
        );
        Ok(Self {
            pool,
            timeout: config.query_timeout,
        })
    }

    /// A handle whose operations abort after `timeout` instead of the
    /// configured default.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            pool: self.pool.clone(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `f` against a pooled connection on the blocking thread pool.
    ///
    /// The statement in flight is interrupted when the deadline passes or
    /// when the returned future is dropped before completion. The
    /// connection goes back to the pool on every exit path.
    pub(crate) async fn run<T, F>(&self, f: F) -> social_types::Result<T>
    where
        F: FnOnce(&mut Connection) -> QueryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let interrupt = Arc::new(InterruptSlot::default());
        let guard = CancelOnDrop(interrupt.clone());

        let task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| {
                warn!("No database connection available: {}", e);
                social_types::Error::StorageUnavailable
            })?;
            if !interrupt.arm(conn.get_interrupt_handle()) {
                return Err(social_types::Error::StorageUnavailable.into());
            }
            let result = f(&mut conn);
            interrupt.disarm();
            result
        });

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(|e| e.into_error()),
            Ok(Err(e)) => {
                error!("spawn_blocking join error: {}", e);
                Err(social_types::Error::Storage)
            }
            Err(_) => {
                warn!("Store operation exceeded its {:?} deadline", self.timeout);
                Err(social_types::Error::StorageUnavailable)
            }
        };

        drop(guard);
        outcome
    }

    #[cfg(test)]
    pub(crate) fn pool_state(&self) -> r2d2::State {
        self.pool.state()
    }
}

#[derive(Default)]
struct InterruptState {
    handle: Option<InterruptHandle>,
    cancelled: bool,
}

/// Shared between the blocking task and its awaiting future so a dropped
/// or timed-out caller can stop the statement still running.
#[derive(Default)]
struct InterruptSlot(Mutex<InterruptState>);

impl InterruptSlot {
    /// Returns false if the caller already went away.
    fn arm(&self, handle: InterruptHandle) -> bool {
        match self.0.lock() {
            Ok(mut state) if !state.cancelled => {
                state.handle = Some(handle);
                true
            }
            _ => false,
        }
    }

    fn disarm(&self) {
        if let Ok(mut state) = self.0.lock() {
            state.handle = None;
        }
    }

    fn cancel(&self) {
        if let Ok(mut state) = self.0.lock() {
            state.cancelled = true;
            if let Some(handle) = state.handle.take() {
                handle.interrupt();
            }
        }
    }
}

struct CancelOnDrop(Arc<InterruptSlot>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        // No-op once the task has disarmed
        self.0.cancel();
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use social_types::models::{Gender, NewUser};
    use social_types::roles::DEFAULT_ROLE;

    pub struct TestDb {
        pub db: Database,
        _dir: tempfile::TempDir,
    }

    pub fn open() -> TestDb {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("social.db"), DbConfig::default()).unwrap();
        TestDb { db, _dir: dir }
    }

    pub fn new_user(name: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name),
            credential_hash: "$argon2id$v=19$placeholder".to_string(),
            age: 30,
            gender: Gender::Female,
            role_level: DEFAULT_ROLE,
        }
    }

    /// Create and activate a user, returning its id.
    pub async fn active_user(db: &Database, name: &str) -> i64 {
        let secret = format!("secret-{}", name);
        let user = db
            .create_with_invite(
                new_user(name),
                crate::credentials::token_hash(&secret),
                chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        db.redeem(&secret, Utc::now()).await.unwrap();
        user.id
    }
}
