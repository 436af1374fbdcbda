//! Guardrail policy service - thin binary entry point that wires backends,
//! the validation engine, and the axum transport together.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use guardrail_engine::ValidationEngine;
use guardrail_server::{Config, GuardrailServerState};
use guardrail_session::SessionManager;
use guardrail_store::{Backends, PostgresRuleStore, RedisCache};

#[derive(Parser)]
#[command(name = "guardrail", version, about = "Policy enforcement service for AI coding assistants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP stream and IDE HTTP server.
    Serve {
        /// Override GUARDRAIL_LISTEN_ADDR for this run.
        #[arg(long)]
        listen_addr: Option<String>,
    },
    /// Ingest a markdown rules file or directory for a project.
    Ingest {
        /// Project slug the ingested rules belong to.
        #[arg(long)]
        project: String,
        /// Path to a markdown file (directories are not yet supported).
        path: PathBuf,
    },
}

fn main() -> std::process::ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to build Tokio runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("warning: failed to load .env: {err}");
        }
    }

    let cli = Cli::parse();

    let config = Config::load().context("loading configuration")?;
    initialize_tracing(&config.log_level);

    let violations = config.validate();
    if !violations.is_empty() {
        for violation in &violations {
            tracing::error!(%violation, "invalid configuration");
        }
        anyhow::bail!("{} configuration violation(s), refusing to start", violations.len());
    }

    let backends = build_backends(&config).await?;

    match cli.command {
        Commands::Serve { listen_addr } => serve(config, backends, listen_addr).await,
        Commands::Ingest { project, path } => ingest(backends, &project, &path).await,
    }
}

fn initialize_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(log_level)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// `memory://` selects the in-process store/cache for local development and
/// tests; any other DSN is treated as postgres/redis respectively.
async fn build_backends(config: &Config) -> Result<Backends> {
    if config.rule_store_dsn == "memory://" {
        tracing::warn!("using in-memory rule store and cache; data will not persist across restarts");
        return Ok(Backends::in_memory());
    }

    let store = PostgresRuleStore::connect(&config.rule_store_dsn)
        .await
        .context("connecting to rule store")?;
    store.migrate().await.context("running rule store migrations")?;

    let cache = RedisCache::connect(&config.cache_address)
        .await
        .context("connecting to shared cache")?;

    Ok(Backends::new(Arc::new(store), Arc::new(cache)))
}

async fn serve(config: Config, backends: Backends, listen_addr_override: Option<String>) -> Result<()> {
    let engine = Arc::new(
        ValidationEngine::new(backends.clone()).with_protected_branches(config.protected_branches.clone()),
    );
    let sessions = Arc::new(
        SessionManager::new(&config.session_signing_secret, backends.clone())
            .with_ttl(std::time::Duration::from_secs(config.session_ttl_secs)),
    );
    let audit = guardrail_server::audit::spawn(config.audit_channel_capacity);
    let rate_limiter = Arc::new(guardrail_server::rate_limit::RateLimiter::new(backends.clone()));

    let listen_addr = listen_addr_override.unwrap_or_else(|| config.listen_addr.clone());
    let message_base_url: Arc<str> = format!("http://{listen_addr}").into();

    let state = GuardrailServerState {
        engine,
        sessions,
        backends,
        audit,
        rate_limiter,
        mcp_api_key: Arc::from(config.mcp_api_key.as_str()),
        ide_api_key: Arc::from(config.ide_api_key.as_str()),
        rate_limit_init_per_min: config.rate_limit_init_per_min,
        rate_limit_validate_per_min: config.rate_limit_validate_per_min,
        rate_limit_stream_per_min: config.rate_limit_stream_per_min,
        message_base_url,
    };

    let router = guardrail_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    tracing::info!(%listen_addr, "guardrail server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}

async fn ingest(backends: Backends, project: &str, path: &PathBuf) -> Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let source_label = path.to_string_lossy().to_string();

    let job = guardrail_ingest::ingest_source(backends.rule_store.as_ref(), project, &source_label, &source).await;

    if !job.changes.is_empty() {
        let audit = guardrail_server::audit::spawn(job.changes.len());
        for change in &job.changes {
            let action = match change.action {
                guardrail_types::RuleChangeAction::Added => "added",
                guardrail_types::RuleChangeAction::Updated => "updated",
                guardrail_types::RuleChangeAction::Disabled => "disabled",
            };
            audit.record(guardrail_server::audit::AuditEvent::RuleChanged {
                short_id: change.short_id.clone(),
                action,
            });
        }
        // Give the background drain task a moment to flush before this
        // short-lived CLI process exits.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    println!(
        "ingest complete: {} processed, {} added, {} updated, {} disabled, {} error(s)",
        job.processed, job.added, job.updated, job.disabled, job.errors.len()
    );
    for error in &job.errors {
        match &error.short_id {
            Some(short_id) => eprintln!("  {short_id}: {}", error.message),
            None => eprintln!("  {}", error.message),
        }
    }

    if !job.errors.is_empty() {
        anyhow::bail!("ingest finished with {} error(s)", job.errors.len());
    }

    Ok(())
}
