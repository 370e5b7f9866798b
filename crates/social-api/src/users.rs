use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use social_types::api::MessageResponse;
use social_types::feed::FeedQuery;
use social_types::models::{FeedItem, User};
use social_types::roles::Actor;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.db.get_user_by_id(id).await?))
}

pub async fn follow(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(target_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db.follow(target_id, actor.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(target_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db.unfollow(target_id, actor.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accounts can only delete themselves.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    if id != actor.id {
        return Err(social_types::Error::Forbidden.into());
    }
    state.db.delete_user(id).await?;
    Ok(Json(MessageResponse::new("account deleted")))
}

pub async fn get_feed(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<FeedItem>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.db.get_feed(actor.id, &filter).await?))
}
