use crate::core_auth::Authorizer;
use crate::session::{Session, SessionSettings};
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// A running server instance.
#[derive(Debug)]
pub struct ServerHandle {
    name: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, asks every session to close, and waits for them.
    pub async fn stop(self) {
        info!("[{}] Stopping server on {}", self.name, self.local_addr);
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("[{}] Listener task failed: {}", self.name, e);
        }
        info!("[{}] Server stopped", self.name);
    }
}

/// Binds `bind_address` and serves each accepted connection on its own task.
///
/// The `authorizer` is shared read-only by every session.
pub async fn start_server(
    name: &str,
    bind_address: SocketAddr,
    authorizer: Authorizer,
    settings: SessionSettings,
) -> Result<ServerHandle> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {} for server {}", bind_address, name))?;
    let local_addr = listener.local_addr()?;
    info!(
        "[{}] Server listening on {} ({} users)",
        name,
        local_addr,
        authorizer.len()
    );

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(accept_loop(
        name.to_string(),
        listener,
        Arc::new(authorizer),
        Arc::new(settings),
        shutdown.clone(),
    ));

    Ok(ServerHandle {
        name: name.to_string(),
        local_addr,
        shutdown,
        task,
    })
}

async fn accept_loop(
    name: String,
    listener: TcpListener,
    authorizer: Arc<Authorizer>,
    settings: Arc<SessionSettings>,
    shutdown: CancellationToken,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    info!("[{}] New connection from {}", name, addr);
                    spawn_session(
                        &mut sessions,
                        socket,
                        Arc::clone(&authorizer),
                        Arc::clone(&settings),
                        shutdown.child_token(),
                    );
                }
                Err(e) => {
                    // Usually fd exhaustion; back off instead of spinning.
                    warn!("[{}] Accept failed: {}", name, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    error!("[{}] Session task aborted: {}", name, e);
                }
            }
        }
    }

    drop(listener);
    info!(
        "[{}] No longer accepting connections, waiting for {} session(s)",
        name,
        sessions.len()
    );
    while let Some(finished) = sessions.join_next().await {
        if let Err(e) = finished {
            error!("[{}] Session task aborted: {}", name, e);
        }
    }
}

fn spawn_session(
    sessions: &mut JoinSet<()>,
    socket: TcpStream,
    authorizer: Arc<Authorizer>,
    settings: Arc<SessionSettings>,
    shutdown: CancellationToken,
) {
    let session = match Session::new(socket, authorizer, settings, shutdown) {
        Ok(session) => session,
        Err(e) => {
            warn!("Could not set up session: {}", e);
            return;
        }
    };
    let peer = session.peer_addr();

    sessions.spawn(async move {
        match session.run().await {
            Ok(()) => info!("Connection closed for {}", peer),
            Err(e) => error!("Session {} ended with error: {}", peer, e),
        }
    });
}
