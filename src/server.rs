use crate::config::Config;
use crate::core_network::{start_server, ServerHandle};
use anyhow::{Context, Result};
use log::{error, info};

/// Starts every configured server instance.
///
/// If one instance fails to start, the ones already running are stopped
/// before the error is returned.
pub async fn start_all(config: &Config) -> Result<Vec<ServerHandle>> {
    let mut handles = Vec::with_capacity(config.servers.len());

    for server in &config.servers {
        let started = match server.bind_addr() {
            Ok(bind_addr) => {
                start_server(
                    &server.name,
                    bind_addr,
                    server.authorizer(),
                    config.session_settings(server),
                )
                .await
            }
            Err(e) => Err(e),
        };

        match started {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!("Failed to start server {}: {:#}", server.name, e);
                stop_all(handles).await;
                return Err(e).with_context(|| format!("Server {} did not start", server.name));
            }
        }
    }

    Ok(handles)
}

pub async fn stop_all(handles: Vec<ServerHandle>) {
    for handle in handles {
        handle.stop().await;
    }
}

/// Runs the FTP server instances until Ctrl-C, then shuts them down.
pub async fn run(config: Config) -> Result<()> {
    info!("Starting {} server instance(s)", config.servers.len());
    let handles = start_all(&config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    info!("Shutdown requested");

    stop_all(handles).await;
    info!("All servers stopped");
    Ok(())
}
