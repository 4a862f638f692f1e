use std::{net::SocketAddr, time::Duration};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Line-oriented TCP chat room", long_about = None)]
pub struct Cli {
    /// Socket address the chat room should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Drop a connection after this many seconds without a completed read or write.
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub idle_timeout: Option<Duration>,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: u64 = value
        .parse()
        .map_err(|err| format!("invalid number of seconds '{value}': {err}"))?;
    if seconds == 0 {
        return Err("idle timeout must be at least one second".to_string());
    }
    Ok(Duration::from_secs(seconds))
}
