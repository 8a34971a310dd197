// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Notarization state node: replays the state logs of the tracked chains and reports their
//! notarization status.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

use crate::settings::DpowSettings;
use anyhow::Result;
use clap::Parser;
use dpow_exports::{DpowError, ShutdownFlag, ShutdownSignal};
use dpow_worker::{ChainStateRegistry, SharedRegistry};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;

mod settings;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file applied over the base configuration
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,
    /// Chain this node runs, overrides the configured symbol
    #[arg(long)]
    symbol: Option<String>,
    /// Directory of the chain state files, overrides the configured one
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn init_logging(level: usize) {
    use tracing_subscriber::prelude::*;
    let filter = match level {
        4 => LevelFilter::TRACE,
        3 => LevelFilter::DEBUG,
        2 => LevelFilter::INFO,
        1 => LevelFilter::WARN,
        _ => LevelFilter::ERROR,
    };
    let tracing_layer = tracing_subscriber::fmt::layer().with_filter(filter);
    tracing_subscriber::registry().with(tracing_layer).init();
}

/// Open the store of every chain, stops early on a shutdown request
fn load_chains(
    registry: &SharedRegistry,
    symbols: &[String],
    shutdown: &ShutdownFlag,
) -> Result<bool> {
    let mut guard = registry.write();
    for symbol in symbols {
        match guard.get_or_create(symbol, shutdown) {
            Ok(_) => {}
            Err(DpowError::Interrupted) => {
                warn!("{}: state replay interrupted", symbol);
                return Ok(false);
            }
            Err(err @ DpowError::StateFileCorrupted { .. }) => {
                error!("{}: {}", symbol, err);
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}

fn report(registry: &SharedRegistry) -> Result<()> {
    let guard = registry.read();
    let mut symbols: Vec<&str> = guard.symbols().collect();
    symbols.sort_unstable();
    for symbol in symbols {
        let tip = guard.last_notarized(symbol)?;
        let state = guard.get(symbol)?.state();
        info!(
            "{}: notarized height {} ({}) dest txid {} prev MoM height {}",
            symbol, tip.height, tip.hash, tip.dest_txid, tip.prev_mom_height
        );
        info!(
            "{}: {} events, {} checkpoints, {} ratified notary sets, kmd height {}",
            symbol,
            state.events().len(),
            state.checkpoints().len(),
            state.pubkey_events().count(),
            state.saved_height
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = DpowSettings::load(&args.config)?;
    if let Some(symbol) = args.symbol {
        settings.chain.own_symbol = symbol;
    }
    if let Some(data_dir) = args.data_dir {
        settings.chain.data_dir = data_dir;
    }
    init_logging(settings.logging.level);
    let config = settings.dpow_config()?;

    let shutdown = ShutdownFlag::new();
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("interrupt signal received");
        handler_flag.request_shutdown();
    })?;

    let mut symbols = vec![config.own_symbol.clone()];
    if !config.own_is_home() {
        symbols.push(config.home_symbol.clone());
    }
    let registry = ChainStateRegistry::new_shared(config);
    if !load_chains(&registry, &symbols, &shutdown)? {
        return Ok(());
    }
    report(&registry)
}
