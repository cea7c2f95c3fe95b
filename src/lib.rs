pub mod api;
pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod domain;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
use clap::Parser;
use cli::commands::{SearchArgs, cmd_health, cmd_platforms, cmd_search, cmd_trending};
use cli::{Cli, Commands};
pub use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::InitConfig)) {
        if Config::create_default_if_missing()? {
            println!("✓ Config file created. Edit config.toml and run again.");
        } else {
            println!("config.toml already exists, leaving it untouched.");
        }
        return Ok(());
    }

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    init_tracing(&config)?;

    match cli.command {
        None => {
            print_help();
            Ok(())
        }

        Some(Commands::Serve { port }) => run_server(config, port, prometheus_handle).await,

        Some(Commands::Search {
            query,
            platform,
            limit,
            related,
            trends,
            json,
        }) => {
            let query = query.join(" ");
            let args = SearchArgs {
                query: &query,
                platforms: &platform,
                limit,
                related,
                trends,
                json,
            };
            cmd_search(&config, args).await
        }

        Some(Commands::Trending { platform, json }) => {
            cmd_trending(&config, platform.as_deref(), json).await
        }

        Some(Commands::Platforms) => cmd_platforms(&config).await,

        Some(Commands::Health) => cmd_health(&config).await,

        Some(Commands::InitConfig) => Ok(()),
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = if config.general.json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder();
        for (key, value) in &config.observability.loki_labels {
            builder = builder.label(key.as_str(), value.as_str())?;
        }
        let (layer, task) = builder
            .extra_field("pid", std::process::id().to_string())?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

fn print_help() {
    println!("keyscout v{}", env!("CARGO_PKG_VERSION"));
    println!("Marketplace keyword research across Amazon, Etsy, eBay, Shopify and Gumroad");
    println!();
    println!("Usage: keyscout <command> [options]");
    println!();
    println!("Commands:");
    println!("  serve [--port N]               Start the HTTP API");
    println!("  search <query> [options]       Search keywords");
    println!("      -p, --platform <name>      Platform to search (repeatable)");
    println!("      -l, --limit <n>            Maximum ranked results");
    println!("      --related                  Append related keywords");
    println!("      --trends                   Show a trend summary");
    println!("      --json                     Print JSON");
    println!("  trending [-p <name>] [--json]  Trending keywords");
    println!("  platforms                      Platform status and rate limits");
    println!("  health                         Probe every enabled marketplace");
    println!("  init-config                    Create default config.toml");
    println!();
    println!("Run 'keyscout --help' for the full reference.");
}

async fn run_server(
    config: Config,
    port_override: Option<u16>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("keyscout v{} starting...", env!("CARGO_PKG_VERSION"));

    if !config.server.enabled && port_override.is_none() {
        error!("Server is disabled in config; pass --port to start it anyway");
        return Ok(());
    }
    let port = port_override.unwrap_or(config.server.port);

    let shared = Arc::new(SharedState::new(config).await?);
    let api_state = api::create_app_state(shared, prometheus_handle);
    let app = api::router(api_state).await;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Web API running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}
