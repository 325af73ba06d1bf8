// Esox WorkBroker
// Serves named work pools to WebSocket clients on /ws.
//
// A client connects to ws://host/ws?pool=jobs&limit=10, sends
// queue/requeue/release/mark commands and receives claim and load events.

use clap::Parser;
use esox_workbroker::{BrokerConfiguration, Instance, serve};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "workbroker", about = "Work-distribution broker for grouped work pools")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "WORKBROKER_ADDR", default_value = "127.0.0.1:3000")]
    addr: String,

    /// Pool joined by connections that do not name one
    #[arg(long, env = "WORKBROKER_POOL", default_value = "test")]
    pool: String,

    /// Claim budget for connections that do not request one
    #[arg(long, env = "WORKBROKER_LIMIT", default_value_t = 10)]
    limit: usize,

    /// Largest claim budget a connection may request
    #[arg(long, env = "WORKBROKER_MAX_LIMIT", default_value_t = 1024)]
    max_limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BrokerConfiguration::new()
        .with_listen_addr(cli.addr)
        .with_default_pool(cli.pool)
        .with_max_claim_limit(cli.max_limit)
        .with_claim_limit(cli.limit);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let instance = Arc::new(Instance::new());

    tokio::select! {
        result = serve(instance, listener, Arc::new(config)) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    Ok(())
}
