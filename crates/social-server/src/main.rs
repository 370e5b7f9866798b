mod cleanup;
mod config;

use std::sync::Arc;

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use social_api::auth::{AppState, AppStateInner};
use social_api::authenticator::JwtAuthenticator;
use social_api::notifier::{LogNotifier, Notifier, WebhookNotifier};
use social_api::routes;
use social_db::Database;

use crate::config::Config;

const ISSUER: &str = "social";
const TOKEN_CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "social=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };
    info!("Starting with {:?}", config);

    let db = Database::open(&config.db_path, config.db.clone())?;

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook {
        Some(url) => {
            info!("Invitations are delivered via {}", url);
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => {
            info!("SOCIAL_NOTIFY_WEBHOOK unset; invitations are only logged");
            Arc::new(LogNotifier)
        }
    };

    tokio::spawn(cleanup::run_cleanup_loop(db.clone(), TOKEN_CLEANUP_INTERVAL_SECS));

    let state: AppState = Arc::new(AppStateInner {
        db,
        authenticator: JwtAuthenticator::new(&config.jwt_secret, ISSUER, config.token_ttl),
        notifier,
        invite_ttl: config.invite_ttl,
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = routes::router(state)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Social server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
