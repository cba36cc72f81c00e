//! xip DNS Server
//!
//! Resolves dotted-quad hostnames under a wildcard domain to the address they embed.
use std::sync::Arc;

use log::info;
use tokio::signal;

use xip_dns_server::{
    config::ServerConfig,
    errors::DnsError,
    handlers::{run_tcp_server, run_udp_server},
    resolver::Resolver,
};

#[tokio::main]
async fn main() -> Result<(), DnsError> {
    // Load configuration from environment variables
    let config = ServerConfig::from_env()?;

    // Initialize the logger; RUST_LOG overrides the DEBUG_LEVEL default
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.default_log_filter()),
    )
    .format_timestamp_micros()
    .init();

    // Compile the wildcard pattern once and share it between listeners
    let resolver = Arc::new(Resolver::new(config.zone.clone())?);
    info!(
        "Serving {} (ns {}, glue {}, ttl {})",
        config.zone.wildcard_domain, config.zone.ns_domain, config.zone.responder_ip, config.zone.ttl
    );

    // Set up shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    // Start UDP and TCP servers
    let udp_server = run_udp_server(config.clone(), resolver.clone());
    let tcp_server = run_tcp_server(config.clone(), resolver);

    // Wait for either a shutdown signal or server error
    tokio::select! {
        _ = shutdown_signal => {
            info!("Initiating graceful shutdown...");
            Ok(())
        },
        res = udp_server => res,
        res = tcp_server => res,
    }
}
