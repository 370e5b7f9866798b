use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Typed outcome of every store and workflow operation.
///
/// Backend failures are classified into this taxonomy once, at the store
/// boundary. Variants never carry raw backend error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("name is already taken")]
    DuplicateName,

    #[error("email is already registered")]
    DuplicateEmail,

    #[error("invalid or expired token")]
    TokenInvalidOrExpired,

    #[error("resource was modified concurrently")]
    VersionConflict,

    #[error("forbidden")]
    Forbidden,

    #[error("role not found")]
    RoleNotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    /// Transient backend failure (busy, timeout, pool exhausted). Safe to
    /// retry with the same input.
    #[error("storage temporarily unavailable")]
    StorageUnavailable,

    #[error("storage error")]
    Storage,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the caller may retry with identical input.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StorageUnavailable)
    }
}
