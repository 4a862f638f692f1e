use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use tcp_chat_room::{cli::Cli, server::ChatServer};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to listen on {}", cli.listen))?;
    let server = ChatServer::new(listener).with_idle_timeout(cli.idle_timeout);
    let addr = server.local_addr()?;
    info!("chat room listening on {}", addr);

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("chat room exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
