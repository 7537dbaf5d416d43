#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use companion_gateway::config;
use companion_gateway::logging;
use companion_gateway::room::{bootstrap, BusinessConf, CounterVerifier, LayoutOverrides};
use companion_gateway::server::{build_router, AppContext};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Companion Gateway -- API gateway for the game-companion platform
#[derive(Parser, Debug)]
#[command(name = "companion-gateway")]
#[command(about = "API gateway for AI-hosted game rooms, seat queues, and battle hand-off")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

/// Counter verification sweep interval.
const VERIFIER_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    if cli.validate_config {
        println!("Configuration validation passed");
        println!();
        println!("Configuration summary:");
        println!("  Port: {}", cfg.port);
        println!("  Deploy env: {}", cfg.server.deploy_env);
        println!("  App version gate: {}", !cfg.server.skip_app_version_check);
        println!("  Queue kick after: {}s", cfg.room.queue_kick_secs);
        println!("  Battle turn-off after: {}s", cfg.room.battle_off_secs);
        println!("  Result topic: {}", cfg.events.result_topic);
        println!("  Room event topic: {}", cfg.events.room_event_topic);
        return Ok(());
    }

    logging::init_with_config(&cfg.logging);
    tracing::info!("Starting Companion Gateway server...");

    // Declarative business configuration: games, AI personas, rooms.
    let business_conf = match &cfg.business_conf_path {
        Some(path) => BusinessConf::from_json_file(path)?,
        None => {
            tracing::warn!("no business conf configured, starting with no rooms");
            BusinessConf::default()
        }
    };
    let layout_overrides: LayoutOverrides = business_conf.layout_overrides.clone();

    let ctx = AppContext::build_in_memory(cfg.clone(), layout_overrides).await?;

    bootstrap(ctx.store.as_ref(), &business_conf).await?;
    tracing::info!("Done store bootstrap stage.");

    ctx.seed_cache().await?;
    tracing::info!("Done cache seed stage.");

    // Background counter verification.
    let shutdown = CancellationToken::new();
    let verifier = CounterVerifier::new(ctx.store.clone());
    let verifier_shutdown = shutdown.clone();
    tokio::spawn(async move {
        verifier.run(VERIFIER_INTERVAL, verifier_shutdown).await;
    });

    let router = build_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, deploy_env = %cfg.server.deploy_env, "Started Companion Gateway server");

    axum::serve(listener, router).await?;

    shutdown.cancel();
    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn test_cli_default_no_flags() {
        let cli = Cli::try_parse_from(["companion-gateway"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_flags_conflict() {
        let result =
            Cli::try_parse_from(["companion-gateway", "--validate-config", "--print-config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_short_validate_flag() {
        let cli = Cli::try_parse_from(["companion-gateway", "-c"]).unwrap();
        assert!(cli.validate_config);
    }
}
