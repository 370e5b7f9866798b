use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};

use social_db::Database;
use social_db::credentials::{hash_password, verify_password};
use social_db::models::UserRow;
use social_types::api::{
    LoginRequest, LoginResponse, MessageResponse, RegisterRequest, RegisterResponse,
};
use social_types::models::NewUser;
use social_types::roles::DEFAULT_ROLE;

use crate::authenticator::JwtAuthenticator;
use crate::error::ApiError;
use crate::notifier::Notifier;
use crate::registration;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub authenticator: JwtAuthenticator,
    pub notifier: Arc<dyn Notifier>,
    pub invite_ttl: chrono::Duration,
}

const MAX_NAME: usize = 255;
const MIN_PASSWORD: usize = 8;
/// Argon2 itself has no limit; this keeps hashing cost bounded.
const MAX_PASSWORD: usize = 72;

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME {
        return Err(ApiError::bad_request("name must be 1-255 characters"));
    }
    if req.email.len() < 3 || !req.email.contains('@') || req.email.chars().count() > MAX_NAME {
        return Err(ApiError::bad_request("invalid email"));
    }
    let pw = req.password.chars().count();
    if !(MIN_PASSWORD..=MAX_PASSWORD).contains(&pw) {
        return Err(ApiError::bad_request("password must be 8-72 characters"));
    }
    if !(1..=100).contains(&req.age) {
        return Err(ApiError::bad_request("age must be between 1 and 100"));
    }
    Ok(())
}

/// Argon2 is deliberately slow; keep it off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
}

/// Look up an account by email and check its password. Unknown email and
/// wrong password are indistinguishable to the caller.
async fn check_credentials(db: &Database, email: &str, password: String) -> Result<UserRow, ApiError> {
    let row = match db.get_user_by_email_any(email).await {
        Ok(row) => row,
        Err(social_types::Error::NotFound) => return Err(ApiError::unauthorized()),
        Err(e) => return Err(e.into()),
    };

    let stored = row.credential_hash.clone();
    if !blocking(move || verify_password(&password, &stored)).await? {
        warn!("Failed credential check for user {}", row.id);
        return Err(ApiError::unauthorized());
    }
    Ok(row)
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_registration(&req)?;

    let password = req.password;
    let credential_hash = blocking(move || hash_password(&password)).await??;

    let user = NewUser {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        credential_hash,
        age: req.age,
        gender: req.gender,
        role_level: DEFAULT_ROLE,
    };

    let created = registration::register(
        &state.db,
        state.notifier.as_ref(),
        user,
        state.invite_ttl,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: created.id,
            message: "check your inbox to activate the account".into(),
        }),
    ))
}

pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = registration::activate(&state.db, &token, Utc::now()).await?;
    info!("User {} activated", user.id);
    Ok(Json(MessageResponse::new("account activated")))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let row = check_credentials(&state.db, req.email.trim(), req.password).await?;
    if !row.active {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "account not activated"));
    }

    let token = state.authenticator.issue(row.id).map_err(|e| {
        tracing::error!("Token signing failed: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })?;

    Ok(Json(LoginResponse {
        user_id: row.id,
        token,
    }))
}

/// Send a fresh activation token to a still-pending account. The password
/// is required so nobody can spam someone else's inbox.
pub async fn reinvite(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let row = check_credentials(&state.db, req.email.trim(), req.password).await?;

    registration::reinvite(
        &state.db,
        state.notifier.as_ref(),
        row.id,
        &row.email,
        state.invite_ttl,
    )
    .await?;

    Ok(Json(MessageResponse::new("a new activation token has been sent")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use social_types::models::Gender;

    fn request(name: &str, email: &str, password: &str, age: i64) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            age,
            gender: Gender::Male,
        }
    }

    #[test]
    fn registration_payload_rules() {
        assert!(validate_registration(&request("bob", "bob@example.com", "hunter22", 30)).is_ok());
        assert!(validate_registration(&request("  ", "bob@example.com", "hunter22", 30)).is_err());
        assert!(validate_registration(&request("bob", "bob.example.com", "hunter22", 30)).is_err());
        assert!(validate_registration(&request("bob", "bob@example.com", "short", 30)).is_err());
        assert!(validate_registration(&request("bob", "bob@example.com", &"x".repeat(73), 30)).is_err());
        assert!(validate_registration(&request("bob", "bob@example.com", "hunter22", 0)).is_err());
        assert!(validate_registration(&request("bob", "bob@example.com", "hunter22", 101)).is_err());
    }
}
