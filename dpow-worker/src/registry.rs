// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::reorg_guard::NotarizedTip;
use crate::store::ChainStateStore;
use dpow_exports::{DpowConfig, DpowError, DpowResult, ShutdownSignal};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registry shared between the block-connect path and the queries of the node
pub type SharedRegistry = Arc<RwLock<ChainStateRegistry>>;

/// Stores of the chains tracked by this node, opened on first use
#[derive(Debug)]
pub struct ChainStateRegistry {
    config: DpowConfig,
    stores: HashMap<String, ChainStateStore>,
}

impl ChainStateRegistry {
    /// Empty registry
    pub fn new(config: DpowConfig) -> Self {
        ChainStateRegistry {
            config,
            stores: HashMap::new(),
        }
    }

    /// Empty registry behind a lock
    pub fn new_shared(config: DpowConfig) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(config)))
    }

    /// Configuration the stores are opened with
    pub fn config(&self) -> &DpowConfig {
        &self.config
    }

    /// Store of `symbol`, loading it from disk when not tracked yet
    pub fn get_or_create(
        &mut self,
        symbol: &str,
        shutdown: &dyn ShutdownSignal,
    ) -> DpowResult<&mut ChainStateStore> {
        if !self.stores.contains_key(symbol) {
            if self.stores.len() >= self.config.max_tracked_chains {
                return Err(DpowError::TooManyChains(symbol.to_string()));
            }
            let store = ChainStateStore::open(&self.config, symbol, shutdown)?;
            info!(
                "{}: state loaded ({:?}), notarized height {}",
                symbol,
                store.load_mode(),
                store.state().last_notarized_height
            );
            self.stores.insert(symbol.to_string(), store);
        }
        self.get_mut(symbol)
    }

    /// Store of a tracked chain
    pub fn get(&self, symbol: &str) -> DpowResult<&ChainStateStore> {
        self.stores
            .get(symbol)
            .ok_or_else(|| DpowError::UnknownChain(symbol.to_string()))
    }

    /// Mutable store of a tracked chain
    pub fn get_mut(&mut self, symbol: &str) -> DpowResult<&mut ChainStateStore> {
        self.stores
            .get_mut(symbol)
            .ok_or_else(|| DpowError::UnknownChain(symbol.to_string()))
    }

    /// Whether `symbol` is tracked
    pub fn contains(&self, symbol: &str) -> bool {
        self.stores.contains_key(symbol)
    }

    /// Tracked symbols
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(|symbol| symbol.as_str())
    }

    /// Last notarization recorded for `symbol`, without consulting the block index
    pub fn last_notarized(&self, symbol: &str) -> DpowResult<NotarizedTip> {
        let state = self.get(symbol)?.state();
        Ok(NotarizedTip {
            height: state.last_notarized_height,
            hash: state.last_notarized_hash,
            dest_txid: state.last_notarized_dest_txid,
            prev_mom_height: state.prev_mom_height(),
        })
    }
}
