// DB Studio - browser-based database administration
// Table-data query layer

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod observability;

use std::sync::Arc;

use studio_core::{EngineResult, PageLimits};

use config::StudioConfig;
use engine::drivers::postgres::PostgresDriver;
use engine::EngineRegistry;

pub type SharedState = Arc<StudioState>;

/// Everything a command handler needs: the configured engines and the
/// configuration they were built from. Read-only after startup.
pub struct StudioState {
    pub registry: Arc<EngineRegistry>,
    pub config: StudioConfig,
}

impl StudioState {
    /// Builds one lazily connecting Postgres pool per configured database.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: StudioConfig) -> EngineResult<Self> {
        let mut registry = EngineRegistry::new();
        for db in &config.databases {
            registry.register(
                db.name.clone(),
                Arc::new(PostgresDriver::connect_lazy(&db.connection)),
            );
        }
        if let Some(default) = config.default_database.as_deref() {
            registry.set_default(default)?;
        }
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: StudioConfig, registry: EngineRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
        }
    }

    pub fn page_limits(&self) -> PageLimits {
        self.config.page_limits()
    }

    pub fn default_schema(&self) -> &str {
        &self.config.default_schema
    }
}

/// Entry point of the `dbstudio` binary; returns the process exit code.
pub async fn run() -> i32 {
    use clap::Parser;

    let cli = cli::Cli::parse();

    let config = match StudioConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return 1;
        }
    };

    observability::init_tracing(&config.log);

    let state = match StudioState::new(config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Startup error: {}", e);
            return 1;
        }
    };

    let outcome = cli::execute(&state, cli.command).await;
    state.registry.close_all().await;

    println!("{}", outcome.body);
    outcome.exit_code()
}
