use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use social_db::Database;

/// Background task that drops activation tokens past their expiry.
pub async fn run_cleanup_loop(db: Database, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match db.prune_expired_tokens(Utc::now()).await {
            Ok(0) => {}
            Ok(count) => info!("Cleanup: pruned {} expired activation tokens", count),
            Err(e) => warn!("Cleanup error: {}", e),
        }
    }
}
