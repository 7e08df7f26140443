//! Query Federation Service Main Binary

use anyhow::{Context, Result};
use clap::{Arg, Command};
use query_federation::config::{ConfigOverrides, Environment};
use query_federation::{telemetry, Config, Plugin, QueryFederationService};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("query-federation")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Federates time-series queries across data source plugins")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/query-federation.yaml"),
        )
        .arg(
            Arg::new("host")
                .short('H')
                .long("host")
                .value_name("HOST")
                .help("Server host (overrides config)"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port (overrides config)")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (overrides config)")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("concurrent-query-limit")
                .long("concurrent-query-limit")
                .value_name("N")
                .help("Maximum data source groups queried at once (overrides config)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("validate-config")
                .long("validate-config")
                .help("Validate configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dev")
                .long("dev")
                .help("Enable development mode")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .context("Missing configuration path")?;

    let (mut config, loaded_from_file) = if config_path.exists() {
        let config = Config::from_file(&config_path)
            .await
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        (config, true)
    } else {
        (Config::from_env()?, false)
    };

    if matches.get_flag("dev") {
        config = config.for_environment(Environment::Development);
    }

    let overrides = ConfigOverrides {
        host: matches.get_one::<String>("host").cloned(),
        port: matches.get_one::<u16>("port").copied(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        concurrent_query_limit: matches.get_one::<usize>("concurrent-query-limit").copied(),
    };
    config = config.merge_with_overrides(overrides)?;

    if matches.get_flag("validate-config") {
        config.validate()?;
        println!("Configuration is valid");
        return Ok(());
    }

    telemetry::init_tracing(&config.telemetry)?;

    if loaded_from_file {
        info!("Loaded configuration from {}", config_path.display());
    } else {
        warn!(
            "Configuration file {} not found, using defaults and environment",
            config_path.display()
        );
    }
    info!("Starting query federation service v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Server will bind to {}:{}",
        config.server.host, config.server.port
    );
    info!(
        loki = %config.datasources.loki_url,
        prometheus = %config.datasources.prometheus_url,
        concurrent_query_limit = config.query.concurrent_query_limit,
        environment = ?config.environment,
        "Effective configuration"
    );

    let service = QueryFederationService::new(config)
        .context("Failed to initialize query federation service")?;

    for ds in service.datasources.all() {
        if ds.ds_type.is_expression() {
            continue;
        }
        warn!(plugin_id = %ds.ds_type, "no backend bound for data source, registering placeholder");
        service.register_plugin(Plugin::new(ds.ds_type.as_str()));
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received, stopping query federation service...");
        signal_token.cancel();
    });

    service.start(shutdown).await?;
    info!("Query federation service has been stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM, SIGINT, or Ctrl+C)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
