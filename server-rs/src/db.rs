use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// The acquire timeout bounds how long a join/leave transaction can stall
/// waiting for a connection; past it the store reports unavailable and the
/// engine's retry takes over.
pub async fn create_pool(config: &Config) -> PgPool {
    let url = config.database_url();
    PgPoolOptions::new()
        .min_connections(config.db.pool_min)
        .max_connections(config.db.pool_max)
        .acquire_timeout(std::time::Duration::from_secs(config.db.acquire_timeout_secs))
        .connect(&url)
        .await
        .expect("Failed to connect to PostgreSQL")
}
