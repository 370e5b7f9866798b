use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use social_types::Error;
use social_types::roles::Actor;

use crate::auth::AppState;
use crate::error::ApiError;

/// Verify the bearer token, load the caller and attach it as an [`Actor`]
/// extension. Deleted or not-yet-activated accounts are turned away even
/// with a valid signature.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(ApiError::unauthorized)?;

    let claims = state.authenticator.verify(token).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::unauthorized()
    })?;

    let user_id = claims.user_id().ok_or_else(|| {
        debug!("Bearer token subject is not a user id");
        ApiError::unauthorized()
    })?;

    let user = match state.db.get_user_by_id_any(user_id).await {
        Ok(user) if user.active => user,
        Ok(_) | Err(Error::NotFound) => return Err(ApiError::unauthorized()),
        Err(e) => return Err(e.into()),
    };

    req.extensions_mut().insert(Actor {
        id: user.id,
        role_level: user.role_level,
    });
    Ok(next.run(req).await)
}
