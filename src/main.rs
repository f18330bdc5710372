//! # Model Dispatch
//!
//! Routes conversations to AI model endpoints using prioritized rules,
//! load-balancing strategies, circuit breakers and health scoring.
//!
//! ## Usage
//!
//! ```bash
//! # Run the maintenance loop against the persisted state
//! model-dispatch --config dispatch.yaml serve
//!
//! # Register endpoints and rules from JSON files
//! model-dispatch import --models models.json --rules rules.json
//!
//! # Route a single request and print the decision
//! model-dispatch route --request request.json
//!
//! # Summarize the last hour
//! model-dispatch report --from 2026-01-01T00:00:00Z --to 2026-01-01T01:00:00Z
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use dispatch_config::{load_config, DispatchConfig, LogFormat, StorageBackend};
use dispatch_core::{AIModel, ConversationRequest, FileStore, MemoryStore, RoutingRule, Storage};
use dispatch_resilience::CircuitBreakerConfig;
use dispatch_routing::{ConversationRouter, MaintenanceScheduler, RouterConfig, SchedulerConfig};
use dispatch_telemetry::{init_logging, LoggingConfig, RoutingMetricsExporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Model Dispatch - routes conversations to AI model endpoints
#[derive(Parser, Debug)]
#[command(name = "model-dispatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "DISPATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run health checks and breaker timeouts until interrupted
    Serve,
    /// Register endpoints and rules from JSON files
    Import {
        /// JSON array of endpoints
        #[arg(long)]
        models: Option<PathBuf>,
        /// JSON array of routing rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Route one request and print the decision as JSON
    ///
    /// Round-robin cursors and weight overrides live in memory only, so each
    /// invocation starts a fresh rotation and picks the first eligible
    /// candidate of a round-robin group.
    Route {
        /// JSON file holding the conversation request
        #[arg(long)]
        request: PathBuf,
    },
    /// Print a routing report over the persisted routing history as JSON
    Report {
        /// Window start (RFC 3339); defaults to one hour before `--to`
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Window end (RFC 3339); defaults to now
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
    /// Load and validate the configuration, then print it
    Validate,
}

/// Application entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    let logging = LoggingConfig::new(&config.logging.level)
        .with_json(config.logging.format == LogFormat::Json);
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    if let Err(e) = run(cli.command, config).await {
        error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}

async fn run(command: Command, config: DispatchConfig) -> Result<()> {
    match command {
        Command::Validate => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Serve => serve(&config).await,
        Command::Import { models, rules } => {
            let router = build_router(&config)?;
            import(&router, models.as_deref(), rules.as_deref())
        }
        Command::Route { request } => {
            let router = build_router(&config)?;
            let request: ConversationRequest = read_json(&request)?;
            let result = router.route_conversation(&request)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Report { from, to } => {
            let router = build_router(&config)?;
            let end = to.unwrap_or_else(Utc::now);
            let start = from.unwrap_or(end - ChronoDuration::hours(1));
            let report = router.generate_routing_report(start, end)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn serve(config: &DispatchConfig) -> Result<()> {
    let router = Arc::new(build_router(config)?);

    let exporter = Arc::new(RoutingMetricsExporter::new()?);
    let exporter_task = Arc::clone(&exporter).spawn(router.subscribe());

    let scheduler = MaintenanceScheduler::start(
        Arc::clone(&router),
        SchedulerConfig::new()
            .with_interval(config.health.interval)
            .with_health_checks(config.health.enabled),
    );

    info!(
        models = router.get_models().len(),
        rules = router.get_rules().len(),
        "Model dispatch running, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    scheduler.stop().await;
    exporter_task.abort();

    match exporter.render() {
        Ok(text) => info!(metrics = %text, "Final metrics"),
        Err(e) => warn!(error = %e, "Failed to render metrics"),
    }
    Ok(())
}

fn import(router: &ConversationRouter, models: Option<&Path>, rules: Option<&Path>) -> Result<()> {
    if models.is_none() && rules.is_none() {
        bail!("nothing to import, pass --models and/or --rules");
    }

    if let Some(path) = models {
        let models: Vec<AIModel> = read_json(path)?;
        for model in models {
            let id = model.id.clone();
            router
                .add_model(model)
                .with_context(|| format!("failed to add model {id}"))?;
        }
    }

    if let Some(path) = rules {
        let rules: Vec<RoutingRule> = read_json(path)?;
        for rule in rules {
            let id = rule.id.clone();
            router
                .add_rule(rule)
                .with_context(|| format!("failed to add rule {id}"))?;
        }
    }

    info!(
        models = router.get_models().len(),
        rules = router.get_rules().len(),
        "Import complete"
    );
    Ok(())
}

fn build_router(config: &DispatchConfig) -> Result<ConversationRouter> {
    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => Arc::new(
            FileStore::open(&config.storage.data_dir).with_context(|| {
                format!(
                    "failed to open data directory {}",
                    config.storage.data_dir.display()
                )
            })?,
        ),
    };

    Ok(ConversationRouter::builder()
        .config(router_config(config))
        .storage(storage)
        .build())
}

fn router_config(config: &DispatchConfig) -> RouterConfig {
    let breaker = &config.circuit_breaker;
    RouterConfig::new()
        .with_default_language(&config.routing.default_language)
        .with_health_thresholds(config.health.degraded_below, config.health.restored_above)
        .with_history_limit(config.routing.history_limit)
        .with_event_capacity(config.routing.event_capacity)
        .with_circuit_breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(breaker.failure_threshold)
                .with_success_threshold(breaker.success_threshold)
                .with_timeout(breaker.timeout),
        )
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}
