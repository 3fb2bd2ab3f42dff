mod api;
mod cache;
mod clock;
mod config;
mod gtfs;
mod models;
mod providers;
mod services;
#[cfg(test)]
mod testing;

use axum::http::{header, HeaderValue, Method};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa_swagger_ui::SwaggerUi;

use api::AppState;
use cache::FeedCache;
use clock::{Clock, SystemClock};
use config::Config;
use providers::{GtfsRealtimeProvider, GtfsStaticProvider};
use services::TransitService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "transit_live=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        std::env::var("TRANSIT_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    info!(path = %config_path, "Loading config");
    let config = Config::load(&config_path)?;
    let tz = config.tz()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let static_provider = GtfsStaticProvider::new(config.schedule_location()?, clock.clone())?;

    if config.realtime.feeds.is_empty() {
        warn!("No realtime feeds configured, serving schedule data only");
    }
    let realtime_provider = GtfsRealtimeProvider::new(
        config.realtime.feeds.clone(),
        config.realtime.api_key.clone(),
        config.live_timeout(),
        clock.clone(),
    )?;

    let cache = Arc::new(FeedCache::new(
        Arc::new(static_provider),
        Arc::new(realtime_provider),
        clock,
        config.cache_policy(),
    ));

    // No schedule, nothing to serve: fail before binding
    info!("Warming schedule cache");
    let schedule = cache.schedule().await?;
    info!(
        agency = schedule.agency().map(|a| a.agency_name.as_str()).unwrap_or("unknown"),
        routes = schedule.routes.len(),
        timezone = %tz,
        "Schedule ready"
    );
    drop(schedule);

    let state = AppState {
        transit: TransitService::new(cache, tz),
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    let cors = if config.cors_permissive {
        warn!("CORS permissive mode enabled - allowing all origins");
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        cors.allow_origin(origins)
    };

    // Build router
    let (router, openapi) = api::router(state);
    let app = router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(address = %config.listen, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
