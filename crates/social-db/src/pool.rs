use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

/// Bounds for the connection pool and per-operation deadlines.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Maximum connections open at once.
    pub max_open: usize,
    /// Idle connections kept warm; anything above this is closed once it
    /// has sat unused for `idle_timeout`.
    pub max_idle: usize,
    pub idle_timeout: Duration,
    /// How long a caller waits for a free connection before giving up.
    pub acquire_timeout: Duration,
    /// How long SQLite waits on a locked database before returning BUSY.
    pub busy_timeout: Duration,
    /// Default deadline for a single store operation.
    pub query_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_open: 10,
            max_idle: 5,
            idle_timeout: Duration::from_secs(15 * 60),
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(3 * 60),
        }
    }
}

/// Unicode-aware case folding, exposed to SQL as `fold_case`. SQLite's own
/// `lower()` only folds ASCII.
pub const FOLD_CASE: &str = "fold_case";

/// Per-connection setup: WAL, foreign keys, busy timeout and the
/// `fold_case` function.
fn init_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    // Before the WAL switch, so warm-up connections queue on it
    conn.busy_timeout(busy_timeout)?;
    // WAL mode for concurrent reads
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get::<_, String>(0)
    })?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.create_scalar_function(
        FOLD_CASE,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Build the pool for the database file at `path`. Waits until the warm
/// idle connections are open, so a bad path fails here rather than on the
/// first request.
pub fn build(path: &Path, config: &DbConfig) -> Result<SqlitePool, r2d2::Error> {
    let busy_timeout = config.busy_timeout;
    let manager = SqliteConnectionManager::file(path)
        .with_init(move |conn| init_connection(conn, busy_timeout));

    let max_size = config.max_open.max(1) as u32;
    r2d2::Pool::builder()
        .max_size(max_size)
        .min_idle(Some((config.max_idle as u32).min(max_size)))
        .idle_timeout(Some(config.idle_timeout).filter(|t| !t.is_zero()))
        .connection_timeout(config.acquire_timeout)
        .build(manager)
}
