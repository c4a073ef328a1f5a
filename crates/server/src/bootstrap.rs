use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use sokoni_core::config::{AppConfig, ConfigError, LoadOptions};
use sokoni_core::ports::ExtractError;
use sokoni_core::{ConversationMachine, MarketplaceEngine};
use sokoni_nlu::HttpIntentExtractor;
use sokoni_store::{connect_with_settings, migrations, DbPool};
use sokoni_store::{SqlConversationStore, SqlMarketStore};
use sokoni_telegram::transport::{ChatTransport, NoopTransport, TelegramTransport};
use sokoni_telegram::{PollRunner, ReconnectPolicy, TransportError, TransportNotifier};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub machine: Arc<ConversationMachine>,
    pub runner: PollRunner,
    pub noop_transport: bool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("nlu client initialization failed: {0}")]
    Extractor(#[source] ExtractError),
    #[error("telegram transport initialization failed: {0}")]
    Transport(#[source] TransportError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let users = Arc::new(SqlConversationStore::new(db_pool.clone()));
    let market_store = Arc::new(SqlMarketStore::new(db_pool.clone()));
    let extractor =
        Arc::new(HttpIntentExtractor::from_config(&config.nlu).map_err(BootstrapError::Extractor)?);

    let noop_transport = !config.telegram.has_token();
    let transport: Arc<dyn ChatTransport> = if noop_transport {
        Arc::new(NoopTransport)
    } else {
        Arc::new(TelegramTransport::from_config(&config.telegram).map_err(BootstrapError::Transport)?)
    };

    let notifier = Arc::new(TransportNotifier::new(transport.clone()));
    let engine = MarketplaceEngine::new(users.clone(), market_store, notifier)
        .with_search_radius(config.market.search_radius_m);
    let machine = Arc::new(ConversationMachine::new(users, extractor, engine));

    let runner = PollRunner::new(transport, machine.clone(), ReconnectPolicy::default());

    Ok(Application { config, db_pool, machine, runner, noop_transport })
}
