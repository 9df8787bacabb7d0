pub mod sync;

use axum::{http::HeaderValue, routing::get, Router};
use reqwest::Client;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::{error::Error, str::FromStr, sync::Arc, time::Duration};
use tokio::runtime::Handle;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt, Registry};

use crate::{
    handlers::health::{health_check, root},
    models::reference::ReferenceData,
    routes::sync::sync_routes,
    services::{
        http::{HttpCache, JsonFetcher},
        standings::ErgastProvider,
        store::PgStore,
        telemetry::OpenF1Provider,
    },
    utils::{config::Config, rate_limiter::RateLimiter, state::AppState},
};

pub fn init_tracing(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let filter = filter::Targets::new()
        .with_target("tower_http::trace::on_response", Level::TRACE)
        .with_target("tower_http::trace::on_request", Level::TRACE)
        .with_target("tower_http::trace::make_span", Level::DEBUG)
        .with_target("axum::rejection", Level::TRACE)
        .with_target(env!("CARGO_CRATE_NAME"), level)
        .with_default(Level::INFO);

    let tracing_layer = tracing_subscriber::fmt::layer();

    Registry::default().with(tracing_layer).with(filter).init();
}

pub async fn make_app(config: &Config) -> Result<Router, Box<dyn Error>> {
    info!("Initializing application...");

    let mut reference = ReferenceData::load(config.reference_data_path.as_deref())?;
    if let Some(season) = config.current_season {
        reference = reference.with_current_season(season);
        reference.validate()?;
    }
    info!(
        "Reference data loaded: current season {}, historical floor {}",
        reference.current_season, reference.historical_floor
    );

    let connect_options = PgConnectOptions::from_str(&config.db_url)?.statement_cache_capacity(0);
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Some(Duration::from_secs(60)))
        .connect_with(connect_options)
        .await?;
    info!("Database connection pool created successfully");

    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        info!("Migrations applied");
    }

    let http_client = Client::builder()
        .timeout(Duration::from_secs(config.upstream_timeout_secs))
        .build()?;
    let cache = Arc::new(HttpCache::new(config.cache_dir.clone(), config.cache_ttl_secs));
    let fetcher = || {
        JsonFetcher::new(
            http_client.clone(),
            cache.clone(),
            RateLimiter::new(config.upstream_max_concurrent, config.upstream_min_delay_ms),
            Handle::current(),
        )
    };
    info!("External clients initialized successfully");

    let state = Arc::new(AppState {
        reference: Arc::new(reference),
        sessions: Arc::new(OpenF1Provider::new(fetcher(), &config.openf1_base_url)),
        standings: Arc::new(ErgastProvider::new(fetcher(), &config.ergast_base_url)),
        store: Arc::new(PgStore::new(db_pool)),
    });

    let app = app_router(state, &config.allowed_origins);
    info!("Application initialized successfully");

    Ok(app)
}

pub fn app_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid allowed origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/sync", sync_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        standings::fake::FakeStandingsProvider, store::memory::MemoryStore,
        telemetry::fake::FakeSessionProvider,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = Arc::new(AppState {
            reference: Arc::new(ReferenceData::builtin().unwrap()),
            sessions: Arc::new(FakeSessionProvider::new()),
            standings: Arc::new(FakeStandingsProvider::new()),
            store: Arc::new(MemoryStore::new()),
        });
        app_router(state, &["http://localhost:3001".to_string()])
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_and_info_report_the_service() {
        let (status, health) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "f1-insight-ml-service");

        let (_, info) = get_json("/api/sync/info").await;
        assert_eq!(info["status"], "operational");

        let (_, root) = get_json("/").await;
        assert_eq!(root["endpoints"]["sync_drivers"], "/api/sync/drivers");
    }

    #[tokio::test]
    async fn cors_allows_configured_origin_only() {
        let request = |origin: &str| {
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, origin)
                .body(Body::empty())
                .unwrap()
        };

        let allowed = app().oneshot(request("http://localhost:3001")).await.unwrap();
        assert_eq!(
            allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("http://localhost:3001"))
        );
        assert_eq!(
            allowed.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
            Some(&HeaderValue::from_static("true"))
        );

        let other = app().oneshot(request("http://evil.example")).await.unwrap();
        assert!(other.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
