use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::alerts::{AlertStore, SeaOrmAlertStore, ThresholdTable};
use crate::config::Config;
use crate::live::{SubscriptionRegistry, UpdatePublisher};
use crate::pipeline::{AlertPipeline, ReadingDispatcher, StorePolicy};
use crate::services::sensors::{self, SensorCache};

/// Everything request handlers need, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub alert_store: Arc<dyn AlertStore>,
    pub registry: Arc<SubscriptionRegistry>,
    pub dispatcher: ReadingDispatcher,
    pub sensor_cache: SensorCache,
}

impl AppState {
    /// Build the state and start the dispatch workers. Must run inside a
    /// Tokio runtime.
    pub fn new(db: DatabaseConnection, config: Config, thresholds: ThresholdTable) -> Self {
        let alert_store: Arc<dyn AlertStore> = Arc::new(SeaOrmAlertStore::new(db.clone()));
        let registry = Arc::new(SubscriptionRegistry::new(config.subscriber_buffer));

        let pipeline = AlertPipeline::new(
            Arc::new(thresholds),
            alert_store.clone(),
            UpdatePublisher::new(registry.clone()),
            StorePolicy::from_config(&config),
        );
        let dispatcher = ReadingDispatcher::spawn(
            pipeline,
            config.dispatch_shards,
            config.dispatch_queue_capacity,
        );

        Self {
            db,
            sensor_cache: sensors::build_cache(&config),
            config: Arc::new(config),
            alert_store,
            registry,
            dispatcher,
        }
    }
}
