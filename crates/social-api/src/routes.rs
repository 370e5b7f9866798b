use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{posts, users};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// The full `/v1` API. Everything except health and the account flows
/// requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/user", post(auth::register))
        .route("/auth/activate/{token}", put(auth::activate))
        .route("/auth/token", post(auth::login))
        .route("/auth/reinvite", post(auth::reinvite));

    let protected_routes = Router::new()
        .route("/post", post(posts::create_post))
        .route(
            "/post/{id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/post/{id}/comment", post(posts::create_comment))
        .route("/users/feed", get(users::get_feed))
        .route("/users/{id}", get(users::get_user).delete(users::delete_user))
        .route("/users/{id}/follow", put(users::follow))
        .route("/users/{id}/unfollow", put(users::unfollow))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/v1", public_routes.merge(protected_routes))
        .with_state(state)
}
