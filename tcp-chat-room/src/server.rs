use std::{future::Future, net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    connection::{ConnectionSettings, handle_connection},
    coordinator::{Coordinator, CoordinatorHandle},
};

pub struct ChatServer {
    listener: TcpListener,
    settings: ConnectionSettings,
}

impl ChatServer {
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            settings: ConnectionSettings::default(),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.settings.idle_timeout = idle_timeout;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// A failed `accept` is fatal and returned to the caller.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer { listener, settings } = self;
        let (coordinator, handle) = Coordinator::new();
        let coordinator_task = tokio::spawn(coordinator.run());
        tokio::pin!(shutdown);

        let outcome = loop {
            select! {
                _ = &mut shutdown => {
                    info!("chat room shutting down");
                    break Ok(());
                }
                accept_result = listener.accept() => {
                    match accept_result.context("failed to accept connection") {
                        Ok((stream, peer)) => spawn_connection_handler(stream, peer, &handle, settings),
                        Err(err) => break Err(err),
                    }
                }
            }
        };

        coordinator_task.abort();
        outcome
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn spawn_connection_handler(
    stream: TcpStream,
    peer: SocketAddr,
    coordinator: &CoordinatorHandle,
    settings: ConnectionSettings,
) {
    debug!(%peer, "accepted connection");
    let coordinator = coordinator.clone();
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, coordinator, settings).await {
            warn!(%peer, error = ?err, "client connection closed with error");
        }
    });
}
