//! Database row types that carry fields the public models must not expose.

use chrono::{DateTime, Utc};

use social_types::models::{Gender, User};
use social_types::roles::RoleLevel;

/// A full `users` row, credential hash included. Only handed to
/// authentication flows; everything user-facing gets a [`User`].
#[derive(Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub credential_hash: String,
    pub age: i64,
    pub gender: Gender,
    pub role_level: RoleLevel,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for UserRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            age: row.age,
            gender: row.gender,
            role_level: row.role_level,
            active: row.active,
            created_at: row.created_at,
        }
    }
}
