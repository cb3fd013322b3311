//! slirc-relay - Straylight IRC relay.

use anyhow::Context;
use slirc_relay::config::{Config, StorageBackend, validation};
use slirc_relay::network::Gateway;
use slirc_relay::plugins::PluginCatalog;
use slirc_relay::relay::Hub;
use slirc_relay::session::Supervisor;
use slirc_relay::storage::{FileStorage, SqliteStorage, Storage};
use slirc_relay::{http, metrics, telemetry};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "relay.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    telemetry::init_tracing(config.log.format);

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        server = %config.irc.server,
        port = config.irc.port,
        nick = %config.irc.nick,
        "Starting slirc-relay"
    );

    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageBackend::File => {
            info!(path = %config_path, "Using file storage");
            Arc::new(FileStorage::new(&config_path))
        }
        StorageBackend::Sqlite => {
            let path = config
                .storage
                .path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| "relay.db".to_string());
            info!(path = %path, "Using sqlite storage");
            let db = SqliteStorage::open(&path).await?;
            db.seed(
                &config.irc,
                &config.ai,
                &config.storage.modules,
                &config.storage.moderation,
            )
            .await?;
            Arc::new(db)
        }
    };

    let supervisor = Arc::new(Supervisor::new(
        storage,
        Hub::new(),
        PluginCatalog::builtin(),
        config.moderation.clone(),
    ));

    if config.irc.autoconnect {
        if let Err(e) = supervisor.connect().await {
            warn!(error = %e, "Autoconnect failed");
        }
    } else {
        info!("Autoconnect disabled, waiting for a connect request");
    }

    let cancel = CancellationToken::new();
    let gateway = if config.gateway.enabled {
        let gateway = Gateway::bind(config.gateway.clone(), Arc::clone(&supervisor)).await?;
        Some(tokio::spawn(gateway.run(cancel.child_token())))
    } else {
        info!("Observer gateway disabled");
        None
    };

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading moderation and modules");
                match supervisor.reload_moderation().await {
                    Ok(count) => info!(count, "Moderation configs reloaded"),
                    Err(e) => warn!(error = %e, "Moderation reload failed"),
                }
                match supervisor.reload_modules().await {
                    Ok(count) => info!(count, "Modules reloaded"),
                    Err(e) => warn!(error = %e, "Module reload failed"),
                }
            }
            _ = interrupt.recv() => break,
            _ = terminate.recv() => break,
        }
    }

    info!("Shutting down");
    supervisor.shutdown().await;
    cancel.cancel();
    if let Some(gateway) = gateway {
        let _ = gateway.await;
    }
    Ok(())
}
