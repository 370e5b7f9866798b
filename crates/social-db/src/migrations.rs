use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use social_types::roles::ROLES;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE roles (
                level       INTEGER PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE
            );

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
                credential_hash TEXT NOT NULL,
                age             INTEGER NOT NULL,
                gender          INTEGER NOT NULL CHECK (gender IN (0, 1)),
                role_level      INTEGER NOT NULL REFERENCES roles(level),
                is_active       INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            -- One live token per user; only the hash of the secret is kept
            CREATE TABLE activation_tokens (
                user_id     INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                token_hash  TEXT NOT NULL UNIQUE,
                expiry      TEXT NOT NULL
            );

            CREATE TABLE posts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                content     TEXT NOT NULL,
                author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                version     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_posts_author ON posts(author_id, created_at);

            CREATE TABLE post_tags (
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                tag         TEXT NOT NULL,
                PRIMARY KEY (post_id, tag)
            );

            CREATE INDEX idx_post_tags_tag ON post_tags(tag);

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                content     TEXT NOT NULL,
                author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);

            CREATE TABLE followers (
                follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                target_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (follower_id, target_id),
                CHECK (follower_id <> target_id)
            );

            CREATE INDEX idx_followers_target ON followers(target_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    // The role table mirrors the static tier table on every start
    for (name, level) in ROLES {
        conn.execute(
            "INSERT INTO roles (level, name) VALUES (?1, ?2)
             ON CONFLICT(level) DO UPDATE SET name = excluded.name",
            (level.0, *name),
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent_and_seed_roles() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let roles: i64 = conn
            .query_row("SELECT COUNT(*) FROM roles", [], |r| r.get(0))
            .unwrap();
        assert_eq!(roles, ROLES.len() as i64);

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
