use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, post, put},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

mod cache;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod store;

use cache::Cache;
use config::{Config, StorageBackend};
use middleware::rate_limit::RateLimiter;
use services::membership::MembershipEngine;
use services::roster::RosterProjector;
use store::memory::MemoryStore;
use store::postgres::{PgProfileDirectory, PgRosterStore};
use store::{ProfileDirectory, RosterStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RosterStore>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub engine: MembershipEngine,
    pub roster: RosterProjector,
    pub cache: Cache,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimiter,
    pub membership_rate_limiter: RateLimiter,
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let match_routes = Router::new()
        .route(
            "/",
            post(routes::matches::create_match)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::auth::authenticate,
                ))
                .get(routes::matches::list_matches)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::auth::optional_auth,
                )),
        )
        .route(
            "/joined",
            get(routes::matches::joined_matches).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::auth::authenticate,
            )),
        )
        .route("/:id", get(routes::matches::get_match))
        .route(
            "/:id/participants",
            get(routes::matches::list_participants),
        )
        .route(
            "/:id/join",
            post(routes::matches::join_match)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::rate_limit::membership_rate_limit,
                ))
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::auth::authenticate,
                )),
        )
        .route(
            "/:id/leave",
            post(routes::matches::leave_match)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::rate_limit::membership_rate_limit,
                ))
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::auth::authenticate,
                )),
        );

    let profile_routes = Router::new()
        .route("/profile", put(routes::profiles::ensure_profile))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let api = Router::new()
        .nest("/matches", match_routes)
        .merge(profile_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let (roster_store, profile_directory): (Arc<dyn RosterStore>, Arc<dyn ProfileDirectory>) =
        match config.storage {
            StorageBackend::Postgres => {
                let pool = db::create_pool(&config).await;
                (
                    Arc::new(PgRosterStore::new(pool.clone())),
                    Arc::new(PgProfileDirectory::new(pool)),
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage, data will not survive a restart");
                let mem = Arc::new(MemoryStore::new());
                (mem.clone(), mem)
            }
        };

    let cache = Cache::new(&config).await;
    let engine = MembershipEngine::new(roster_store.clone(), config.retry.clone());
    let roster = RosterProjector::new(roster_store.clone(), profile_directory.clone());
    let rate_limiter =
        RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);
    let membership_rate_limiter = RateLimiter::new(
        config.rate_limit.membership_max,
        config.rate_limit.window_secs,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState {
        store: roster_store,
        profiles: profile_directory,
        engine,
        roster,
        cache,
        config: Arc::new(config),
        rate_limiter,
        membership_rate_limiter,
    };

    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind port");
    tracing::info!(%addr, "Matchday API listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
