pub mod adapters;
pub mod config;
pub mod dataset;
pub mod pipeline;
pub mod storage;
pub mod uid;

use crate::adapters::http::HttpAdapter;
use crate::adapters::ProtocolAdapter;
use crate::config::Config;
use crate::pipeline::TransmissionCoordinator;
use crate::storage::create_storage_backend;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{prelude::*, EnvFilter};

pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config)?;

    tracing::info!("🔧 Starting scopebridge '{}'", config.service.id);
    tracing::info!(
        "Storing to {} as {} ({:?} associations)",
        config.peer,
        config.dimse.local_aet,
        config.dimse.association_mode
    );

    let storage = create_storage_backend(&config.storage)?;
    let coordinator = Arc::new(TransmissionCoordinator::new(&config, storage));
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let adapter = HttpAdapter::new(config.bind_addr()?, coordinator);
    tracing::info!("Starting {}", adapter.summary());
    let handle = adapter.start(config.clone(), shutdown.clone()).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown.cancel();
    handle.await?;

    Ok(())
}

/// Install the global subscriber: stdout always, plus the log file when
/// enabled. `RUST_LOG` takes precedence over `service.log_level`.
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.service.log_level))?;

    if config.logging.log_to_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.log_file_path)?;
        let file_appender = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(Arc::new(file));
        let stdout_appender = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_appender)
            .with(stdout_appender)
            .try_init()?;
    } else {
        let stdout_appender = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_appender)
            .try_init()?;
    }

    Ok(())
}
