// =============================================================================
// PriceSentry — Main Entry Point
// =============================================================================
//
// Load environment, install tracing, load configuration, construct shared
// state, spawn the supervisor loop, then block on `ctrl_c` for graceful
// shutdown.
// =============================================================================

mod catalog;
mod config;
mod cooldown;
mod detector;
mod error;
mod exchange;
mod history;
mod notifier;
mod observer;
mod supervisor;
mod types;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use parking_lot::RwLock;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{ConfigurationStore, ExchangeKind};
use exchange::binance::BinanceVariant;
use exchange::bybit::BybitVariant;
use exchange::okx::OkxVariant;
use exchange::{Exchange, ExchangeAdapter};
use notifier::{LoggingSender, Sender};
use supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "pricesentryd", about = "Real-time multi-exchange price movement sentry")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config/config.yaml")]
    config: String,

    /// Override the configured log level (e.g. "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,
}

fn install_tracing(override_level: Option<&str>, configured_level: &str) {
    let level = override_level.unwrap_or(configured_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_exchange(kind: ExchangeKind) -> Arc<dyn Exchange> {
    match kind {
        ExchangeKind::Binance => Arc::new(ExchangeAdapter::new(BinanceVariant)),
        ExchangeKind::Okx => Arc::new(ExchangeAdapter::new(OkxVariant)),
        ExchangeKind::Bybit => Arc::new(ExchangeAdapter::new(BybitVariant)),
    }
}

/// Resolve the effective symbol list: `PS_SYMBOLS` (comma-separated)
/// overrides whatever is already in the loaded config.
fn resolve_symbols(configured: &[String]) -> Vec<String> {
    if let Ok(raw) = std::env::var("PS_SYMBOLS") {
        raw.split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        configured.to_vec()
    }
}

fn resolve_exchange(configured: ExchangeKind) -> ExchangeKind {
    match std::env::var("PS_EXCHANGE").ok().as_deref() {
        Some("binance") => ExchangeKind::Binance,
        Some("okx") => ExchangeKind::Okx,
        Some("bybit") => ExchangeKind::Bybit,
        _ => configured,
    }
}

/// Boot-fatal failures (bad config, empty symbol set, adapter that refuses
/// to start) bubble up here as `anyhow::Error` with `.context(...)`
/// attached at each step — the one place that composition style applies
/// before `error.rs`'s taxonomy takes over everywhere else.
async fn try_main(cli: Cli) -> anyhow::Result<ExitCode> {
    let store = ConfigurationStore::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    install_tracing(cli.log_level.as_deref(), &store.get().log_level);
    info!(config_path = %cli.config, "pricesentryd starting");

    let mut config = store.get();
    let exchange_kind = resolve_exchange(config.exchange);
    let symbols = resolve_symbols(&config.symbols);
    if symbols.is_empty() {
        error!("no symbols configured (config.symbols and PS_SYMBOLS both empty)");
        return Ok(ExitCode::from(78)); // EX_CONFIG
    }
    config.exchange = exchange_kind;
    config.symbols = symbols.clone();
    store
        .update(config)
        .context("failed to persist resolved boot configuration")?;

    let catalog = Arc::new(catalog::MarketCatalog::with_fallbacks());
    let resolved_symbols = catalog.resolve(&symbols, exchange_kind);
    if resolved_symbols.is_empty() {
        error!("market catalog resolved zero symbols from configured/overridden list");
        return Ok(ExitCode::from(78));
    }
    info!(count = resolved_symbols.len(), exchange = %exchange_kind, "symbols resolved");

    let store = Arc::new(store);
    let exchange_factory: Arc<dyn Fn(ExchangeKind) -> Arc<dyn Exchange> + Send + Sync> =
        Arc::new(build_exchange);
    let shared_exchange = Arc::new(RwLock::new(build_exchange(exchange_kind)));
    let sender: Arc<dyn Sender> = Arc::new(LoggingSender);

    let mut supervisor = Supervisor::new(
        Arc::clone(&store),
        Arc::clone(&shared_exchange),
        exchange_factory,
        Arc::clone(&catalog),
        sender,
    );

    supervisor
        .start_exchange(resolved_symbols)
        .await
        .context("failed to start exchange adapter")?;

    tokio::spawn(async move {
        if let Err(e) = supervisor.run().await {
            error!(%e, "supervisor loop exited with error");
        }
    });

    // `0` on a clean shutdown path, `130` (128 + SIGINT) only when a real
    // SIGINT was received — failing to even install the handler is a
    // separate, non-signal failure and must not be mistaken for one.
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("shutdown signal received, exiting");
            shared_exchange.read().clone().close().await;
            Ok(ExitCode::from(130))
        }
        Err(e) => {
            error!(%e, "failed to listen for shutdown signal");
            Ok(ExitCode::from(1))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    match try_main(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            ExitCode::from(78)
        }
    }
}
