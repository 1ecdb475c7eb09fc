pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use std::sync::Arc;
use tracing::info;

use services::{BookingEngine, Clock, DeadlineScheduler, NotificationDispatcher, SystemClock};
use store::{BookingStore, PgStore};

// Shared state для всего приложения
pub struct AppState {
    pub db: database::Database,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub engine: Arc<BookingEngine>,
    pub scheduler: Arc<DeadlineScheduler>,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::connect(&config.database).await?;
        info!("Database connected");
        db.run_migrations().await?;

        let redis = redis_client::RedisClient::connect(&config.redis.url).await?;
        info!("Redis connected");
        let cache = cache::CacheService::new(redis, config.redis.ledger_ttl_seconds);

        let store: Arc<dyn BookingStore> = Arc::new(PgStore::new(&db));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let notifier = Arc::new(NotificationDispatcher::from_config(&config.notification, &config.circuit_breaker));

        let engine = Arc::new(
            BookingEngine::new(store, Arc::clone(&clock), notifier, config.ledger.recompute_attempts)
                .with_ledger_watcher(Arc::new(cache.clone())),
        );
        let scheduler = Arc::new(DeadlineScheduler::new(Arc::clone(&engine), clock, config.scheduler.clone()));

        Ok(Arc::new(Self {
            db,
            cache,
            config,
            engine,
            scheduler,
        }))
    }
}
