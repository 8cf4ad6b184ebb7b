//! dthrottled - distributed rate-limiting daemon
//!
//! Clients connect over TCP or the Unix-domain socket and send one tag per
//! line; the daemon answers `OK` or `NO` per tag under the configured
//! token-bucket rules. Instances listed as gossip peers exchange hit reports
//! so the collective admitted rate, not the per-instance rate, is what the
//! rules bound.
//!
//! # Usage
//!
//! ```bash
//! # run with defaults (burst 10, rate 1/s, port 6969)
//! dthrottled
//!
//! # run with a config file
//! dthrottled --config configs/dthrottle.toml
//!
//! # ask it something
//! printf '192.168.1.1\n' | nc -q1 localhost 6969
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use dthrottle_config::Config;
use dthrottle_engine::{Clock, Parameters, Throttle};
use dthrottle_gossip::{GossipConfig, UdpGossip};
use dthrottle_server::{QueryServer, ServerConfig, Switches, run_heartbeat, spawn_engine};

/// Distributed rate-limiting daemon
#[derive(Parser, Debug)]
#[command(name = "dthrottled")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/dthrottle.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        tracing::info!(path = %cli.config.display(), "no config file, using defaults");
        Config::default()
    };

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let engine = spawn_engine(build_throttle(&config), Clock::new());
    let switches = Arc::new(Switches::new(config.never_throttle, config.radio_silence));

    let gossip = Arc::new(
        UdpGossip::bind(&GossipConfig {
            bind: config.gossip.bind.clone(),
            port: config.gossip.port,
            peers: config.gossip.peers.clone(),
        })
        .await
        .context("binding gossip socket")?,
    );

    let cancel = CancellationToken::new();
    let deliveries = gossip.spawn_receiver(cancel.clone());

    tokio::spawn(run_heartbeat(
        engine.clone(),
        Arc::clone(&gossip),
        Arc::clone(&switches),
        Duration::from_secs_f64(config.interval),
        deliveries,
        cancel.clone(),
    ));

    let server = QueryServer::bind(
        &ServerConfig {
            port: config.port,
            socket_path: config.socketpath.clone(),
            ..Default::default()
        },
        engine,
        switches,
    )
    .context("binding query listeners")?;

    let mut server_task = tokio::spawn(server.run(cancel.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            cancel.cancel();
            let _ = server_task.await;
        }
        result = &mut server_task => {
            cancel.cancel();
            result.context("query server task panicked")??;
        }
    }

    Ok(())
}

/// Build the engine from configuration: default rule, whitelist, then the
/// per-prefix rules. Malformed rules are logged and skipped; startup
/// continues with the rest.
fn build_throttle(config: &Config) -> Throttle {
    let mut throttle = Throttle::new(config.burst, config.rate);

    for prefix in &config.whitelist {
        tracing::info!(prefix = %prefix, "whitelisting");
        throttle.whitelist(prefix);
    }

    let (rules, skipped) = config.parsed_rules();
    for rule in &skipped {
        tracing::error!(prefix = %rule.prefix, reason = %rule.reason, "skipping rule");
    }
    for rule in rules {
        tracing::info!(
            prefix = %rule.prefix,
            burst = rule.burst,
            rate = rule.rate,
            "adding rule"
        );
        throttle.add_rule(&rule.prefix, Parameters::new(rule.burst, rule.rate));
    }

    throttle
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
