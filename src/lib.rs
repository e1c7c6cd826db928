//! Reagent dispense client.
//!
//! Re-exports the workspace crates and wires them together from an
//! [`AppConfig`]:
//!
//! ```no_run
//! # async fn run() -> Result<(), reagent_dispenser::DispenserError> {
//! use reagent_dispenser::{ConfigLoader, Dispenser};
//!
//! let config = ConfigLoader::from_file(std::path::Path::new("config/local.toml"))?;
//! let dispenser = Dispenser::from_config(&config)?;
//! dispenser.init_logging()?;
//!
//! let session = dispenser.open_plate(1).await?;
//! session.plan_operation("A1", Some(10), 25.0)?;
//! let report = session.execute(&true).await?;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use dispense_client::{Backend, ClientError, HttpBackend, MockBackend};
pub use dispense_config::{
    validate_config, AppConfig, BackendConfig, ConfigError, ConfigLoader, ExecutionConfig,
    LoggingConfig, PushConfig,
};
pub use dispense_metrics::{init_tracing, LoggingOptions, MetricsCollector, TracingError};
pub use dispense_orchestrator::{
    Confirmation, ExecutionPhase, ExecutionReport, OperationObserver, OperationPlan,
    OrchestratorConfig, OrchestratorError, PlateSession, ReconcileOutcome, SubmissionStrategy,
};
pub use dispense_push::{PushBus, PushError, PushSubscriber, StompClient, StompConfig};
pub use dispense_types as types;

#[derive(Debug, Error)]
pub enum DispenserError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Tracing(#[from] TracingError),
}

/// Session settings derived from the `backend` and `execution` sections
pub fn orchestrator_config(config: &AppConfig) -> OrchestratorConfig {
    let strategy = if config.backend.server_batch {
        SubmissionStrategy::ServerBatch
    } else {
        SubmissionStrategy::Sequential
    };

    let mut orchestrator = OrchestratorConfig::default()
        .with_strategy(strategy)
        .with_settle_delay(config.execution.settle_delay())
        .with_completion_timeout(config.execution.completion_timeout())
        .with_min_volume(config.execution.min_volume);
    orchestrator.status_topic = config.push.topic.clone();
    orchestrator
}

pub fn stomp_config(push: &PushConfig) -> StompConfig {
    StompConfig::new(push.url.clone())
        .with_host(push.host.clone())
        .with_reconnect_delay(push.reconnect_delay())
}

pub fn logging_options(logging: &LoggingConfig) -> LoggingOptions {
    LoggingOptions {
        level: logging.level.clone(),
        json: logging.json,
    }
}

/// Backend, push channel and session settings shared by every plate session
#[derive(Clone)]
pub struct Dispenser {
    backend: Arc<dyn Backend>,
    push: Option<Arc<dyn PushSubscriber>>,
    config: OrchestratorConfig,
    logging: LoggingOptions,
    metrics: Arc<MetricsCollector>,
}

impl Dispenser {
    /// Validate `config` and build the HTTP backend and STOMP client it describes
    pub fn from_config(config: &AppConfig) -> Result<Self, DispenserError> {
        validate_config(config)?;

        let backend =
            HttpBackend::with_timeout(&config.backend.base_url, config.backend.request_timeout())?;
        let push: Option<Arc<dyn PushSubscriber>> = if config.push.enabled {
            Some(Arc::new(StompClient::new(stomp_config(&config.push))))
        } else {
            None
        };

        info!(
            base_url = %config.backend.base_url,
            push = config.push.enabled,
            server_batch = config.backend.server_batch,
            "dispenser configured"
        );

        Ok(Self {
            backend: Arc::new(backend),
            push,
            config: orchestrator_config(config),
            logging: logging_options(&config.logging),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// Assemble from existing parts, e.g. a mock backend and an in-memory bus
    pub fn new(backend: Arc<dyn Backend>, config: OrchestratorConfig) -> Self {
        Self {
            backend,
            push: None,
            config,
            logging: LoggingOptions::default(),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn with_push(mut self, push: Arc<dyn PushSubscriber>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Install the global tracing subscriber
    pub fn init_logging(&self) -> Result<(), DispenserError> {
        init_tracing(&self.logging, self.metrics.clone())?;
        Ok(())
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Open a plate view
    pub async fn open_plate(&self, plate_id: i64) -> Result<PlateSession, DispenserError> {
        self.session_builder(plate_id).open().await.map_err(Into::into)
    }

    /// Open a plate view whose transitions are reported to `observer`
    pub async fn open_plate_with_observer(
        &self,
        plate_id: i64,
        observer: OperationObserver,
    ) -> Result<PlateSession, DispenserError> {
        self.session_builder(plate_id)
            .with_observer(observer)
            .open()
            .await
            .map_err(Into::into)
    }

    fn session_builder(&self, plate_id: i64) -> dispense_orchestrator::PlateSessionBuilder {
        let builder = PlateSession::builder(self.backend.clone(), plate_id)
            .with_config(self.config.clone())
            .with_metrics(self.metrics.clone());
        match &self.push {
            Some(push) => builder.with_push(push.clone()),
            None => builder,
        }
    }
}
