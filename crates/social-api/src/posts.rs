use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use social_types::api::{
    CreateCommentRequest, CreatePostRequest, MessageResponse, PostResponse, UpdatePostRequest,
};
use social_types::models::{NewComment, NewPost, PostChanges, normalize_tags};
use social_types::roles::{self, Actor, authorize};

use crate::auth::AppState;
use crate::error::ApiError;

const MAX_TITLE: usize = 250;
const MAX_CONTENT: usize = 1024;
const MAX_COMMENT: usize = 100;

fn check_len(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    let len = value.trim().chars().count();
    if len == 0 || len > max {
        return Err(ApiError::bad_request(format!(
            "{} must be 1-{} characters",
            field, max
        )));
    }
    Ok(())
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_len("title", &req.title, MAX_TITLE)?;
    check_len("content", &req.content, MAX_CONTENT)?;

    let post = state
        .db
        .create_post(NewPost {
            title: req.title,
            content: req.content,
            author_id: actor.id,
            tags: normalize_tags(req.tags),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostResponse>, ApiError> {
    let (post, comments) = state.db.get_post_with_comments(id).await?;
    Ok(Json(PostResponse { post, comments }))
}

/// Versioned update. A stale `expected_version` is answered with 409; the
/// client re-reads and tries again if it still wants to.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<social_types::models::Post>, ApiError> {
    if let Some(title) = &req.title {
        check_len("title", title, MAX_TITLE)?;
    }
    if let Some(content) = &req.content {
        check_len("content", content, MAX_CONTENT)?;
    }

    let existing = state.db.get_post(id).await?;
    authorize(&actor, existing.author_id, roles::resolve("moderator")?)?;

    let changes = PostChanges {
        title: req.title,
        content: req.content,
        tags: req.tags.map(normalize_tags),
    };
    let post = state
        .db
        .update_post_with_version(id, changes, req.expected_version)
        .await?;

    info!("Post {} updated to version {}", post.id, post.version);
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let existing = state.db.get_post(id).await?;
    authorize(&actor, existing.author_id, roles::resolve("admin")?)?;

    state.db.delete_post(id).await?;
    Ok(Json(MessageResponse::new("post deleted")))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(post_id): Path<i64>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_len("comment", &req.content, MAX_COMMENT)?;

    let comment = state
        .db
        .create_comment(NewComment {
            content: req.content,
            author_id: actor.id,
            post_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}
