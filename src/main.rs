//! Request Inspection Service
//!
//! This is the main entry point for the request inspection service.
//! It initializes the application components and starts the web server.

use actix_web::middleware::Condition;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use redis::Client;
use std::sync::Arc;
use std::time::Duration;

use request_inspection_service::api::{self, ApiState};
use request_inspection_service::config::load_config;
use request_inspection_service::core::{
    AlertDispatcher, CounterStore, EmailApiTransport, MemoryCounterStore, NoopTransport,
    NotificationTransport, PatternCatalog, RateLimitGuard, RateLimiter, RedisCounterStore,
    RequestInspector, ViolationTracker,
};
use request_inspection_service::models::Config;

struct Services {
    catalog: Arc<PatternCatalog>,
    tracker: Arc<ViolationTracker>,
    alerts: Arc<AlertDispatcher>,
    limiter: Arc<RateLimiter>,
}

fn build_services(config: &Config) -> anyhow::Result<Services> {
    let catalog = Arc::new(
        PatternCatalog::from_config(&config.inspection)
            .context("failed to compile pattern catalog")?,
    );
    let tracker = Arc::new(ViolationTracker::new(&config.inspection));

    let transport: Arc<dyn NotificationTransport> = if config.alerts.enabled {
        Arc::new(EmailApiTransport::new(&config.alerts))
    } else {
        Arc::new(NoopTransport)
    };
    let alerts = Arc::new(AlertDispatcher::new(transport, &config.alerts));

    let store: Arc<dyn CounterStore> = match config.rate_limit.storage.as_str() {
        "redis" => {
            let client = Client::open(config.redis.url.as_str())
                .context("failed to create Redis client")?;
            Arc::new(RedisCounterStore::new(client))
        }
        _ => Arc::new(MemoryCounterStore::new()),
    };
    let limiter = Arc::new(RateLimiter::new(store, config.rate_limit.clone()));

    Ok(Services {
        catalog,
        tracker,
        alerts,
        limiter,
    })
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting request inspection service...");

    // Load configuration
    let config = load_config().expect("Failed to load configuration");
    let config = Arc::new(config);

    if let Err(e) = PrometheusBuilder::new().install() {
        warn!("Failed to install Prometheus recorder: {}", e);
    }

    let services = build_services(&config).expect("Failed to initialize services");
    let Services {
        catalog,
        tracker,
        alerts,
        limiter,
    } = services;

    // Periodic housekeeping bounds the memory of per-client state.
    {
        let tracker = Arc::clone(&tracker);
        let alerts = Arc::clone(&alerts);
        let limiter = Arc::clone(&limiter);
        let interval = config.housekeeping.interval_seconds;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            loop {
                ticker.tick().await;
                tracker.sweep().await;
                alerts.prune().await;
                limiter.sweep().await;
            }
        });
    }

    // Create API state
    let state = web::Data::new(ApiState {
        tracker: Arc::clone(&tracker),
        config: Arc::clone(&config),
    });

    // Pipeline composition is decided here, once, from configuration.
    let inspection_enabled = config.inspection.enabled;
    let rate_limit_enabled = config.rate_limit.enabled;
    info!(
        "pipeline: inspection={} rate_limit={} (storage: {})",
        inspection_enabled, rate_limit_enabled, config.rate_limit.storage
    );

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Condition::new(
                rate_limit_enabled,
                RateLimitGuard::new(Arc::clone(&limiter)),
            ))
            .wrap(Condition::new(
                inspection_enabled,
                RequestInspector::new(
                    Arc::clone(&catalog),
                    Arc::clone(&tracker),
                    Arc::clone(&alerts),
                ),
            ))
            .configure(api::config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
