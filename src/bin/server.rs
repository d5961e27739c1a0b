// nexus_gateway/src/bin/server.rs
//
// Process entry point: parse CLI config, initialize structured
// logging, bind the gateway, and run the reactor loop forever.

use clap::Parser;
use nexus_gateway::config::{Cli, GatewayConfig};
use nexus_gateway::net::GatewayServer;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::from(cli);

    if let Err(err) = run(config) {
        tracing::error!(error = %err, "gateway exited with a fatal error");
        std::process::exit(1);
    }
}

fn run(config: GatewayConfig) -> Result<(), nexus_gateway::error::GatewayError> {
    tracing::info!(
        buy_limit = config.risk_limits.buy_limit,
        sell_limit = config.risk_limits.sell_limit,
        "starting gateway"
    );
    let mut server = GatewayServer::bind(&config.host, config.port, config.risk_limits)?;
    server.run()
}
