//! Application state wiring the messaging service together.
//!
//! The core service is generic over repository and dispatcher traits;
//! AppState pins it to the SQLite repositories and the in-process event bus.

use std::sync::Arc;

use parley_core::event::EventBus;
use parley_core::service::messaging::MessagingService;
use parley_infra::config::{data_dir, load_config};
use parley_infra::sqlite::audit::SqliteAuditRepository;
use parley_infra::sqlite::conversation::SqliteConversationRepository;
use parley_infra::sqlite::message::SqliteMessageRepository;
use parley_infra::sqlite::pool::{DatabasePool, database_url};

/// The messaging facade pinned to the infra implementations.
pub type ConcreteMessagingService = MessagingService<
    SqliteConversationRepository,
    SqliteMessageRepository,
    SqliteAuditRepository,
    EventBus,
>;

/// Shared state for one CLI invocation.
#[derive(Clone)]
pub struct AppState {
    pub messaging: Arc<ConcreteMessagingService>,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        let events = EventBus::new(config.event_channel_capacity);

        let messaging = MessagingService::new(
            Arc::new(SqliteConversationRepository::new(db_pool.clone())),
            Arc::new(SqliteMessageRepository::new(db_pool.clone())),
            Arc::new(SqliteAuditRepository::new(db_pool.clone())),
            Arc::new(events),
            &config,
        );

        tracing::debug!(data_dir = %data_dir.display(), "Application state ready");

        Ok(Self {
            messaging: Arc::new(messaging),
            db_pool,
        })
    }
}
