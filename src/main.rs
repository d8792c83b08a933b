//! Traffic balancer
//!
//! A least-traffic reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request          ┌──────────────────────────────────────────────┐
//!     ────────────────────────┼─▶ http::server ──▶ Balancer::select_backend  │
//!                             │                          │                    │
//!                             │                          ▼                    │
//!     Client Response         │                   Balancer::forward ◀─────────┼──── Backend
//!     ◀───────────────────────┼──  streaming writer ◀───┘  (credits bytes)   │     Server
//!                             │                                               │
//!                             │  health monitor: one probe task per backend   │
//!                             │  admin API: read-only snapshot of the state   │
//!                             └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use traffic_balancer::admin::setup_admin_router;
use traffic_balancer::config::{load_config, validate_config, BalancerConfig, ConfigError};
use traffic_balancer::http::HttpServer;
use traffic_balancer::lifecycle::{signals, Shutdown};
use traffic_balancer::load_balancer::Balancer;
use traffic_balancer::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "balancer", version, about = "Least-traffic HTTP load balancer")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port
    #[arg(long)]
    port: Option<u16>,

    /// Backend response timeout in seconds
    #[arg(long = "timeout-sec")]
    timeout_sec: Option<u64>,

    /// Reach backends over HTTPS
    #[arg(long)]
    https: bool,

    /// Add the lb-from header to responses
    #[arg(long)]
    trace: bool,

    /// Backend host:port, repeatable; replaces the configured pool
    #[arg(long = "server")]
    servers: Vec<String>,
}

impl Args {
    fn load(&self) -> Result<BalancerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => BalancerConfig::default(),
        };

        if let Some(port) = self.port {
            config.listener.set_port(port);
        }
        if let Some(secs) = self.timeout_sec {
            config.forwarding.timeout_secs = secs;
        }
        if self.https {
            config.pool.https = true;
        }
        if self.trace {
            config.forwarding.trace = true;
        }
        if !self.servers.is_empty() {
            config.pool.servers = self.servers.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().load()?;
    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        servers = ?config.pool.servers,
        https = config.pool.https,
        trace = config.forwarding.trace,
        timeout_secs = config.forwarding.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let balancer = Balancer::from_config(&config);
    let shutdown = Shutdown::new();

    let monitor = tokio::spawn(balancer.start_health_monitor(shutdown.subscribe()));

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let app = setup_admin_router(balancer.clone(), &config.admin.api_key);
        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, app)
                .with_graceful_shutdown(async move { admin_shutdown.recv().await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(balancer, &config);
    let serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    signals::wait_for_termination().await;
    shutdown.trigger();

    match serving.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = monitor.await {
        tracing::error!(error = %e, "Health monitor task failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
