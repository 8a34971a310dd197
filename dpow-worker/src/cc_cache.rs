// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Cross-chain data seen in notarizations, kept per recording height.

use dpow_models::notarization::{MoMData, MoMoMData};
use std::collections::BTreeMap;

/// MoM and MoMoM data of one notarization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossChainEntry {
    /// height of the block holding the notarization
    pub height: i32,
    /// transaction index in that block
    pub tx_index: usize,
    /// chain the notarization is recorded for
    pub symbol: String,
    /// notarized height
    pub notarized_height: i32,
    /// MoM, when valid
    pub mom: Option<MoMData>,
    /// MoMoM aggregate, when consistent
    pub momom: Option<MoMoMData>,
}

/// Cross-chain cache
#[derive(Debug, Default)]
pub struct CrossChainCache {
    entries: BTreeMap<i32, Vec<CrossChainEntry>>,
}

impl CrossChainCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache an entry
    pub fn insert(&mut self, entry: CrossChainEntry) {
        self.entries.entry(entry.height).or_default().push(entry);
    }

    /// Drop every entry recorded at or above `height`, returns how many were dropped
    pub fn purge_from(&mut self, height: i32) -> usize {
        self.entries
            .split_off(&height)
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Entries in height order
    pub fn entries(&self) -> impl Iterator<Item = &CrossChainEntry> {
        self.entries.values().flatten()
    }

    /// Latest entry for `symbol`
    pub fn latest_for(&self, symbol: &str) -> Option<&CrossChainEntry> {
        self.entries
            .values()
            .rev()
            .flat_map(|entries| entries.iter().rev())
            .find(|entry| entry.symbol == symbol)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.values().map(|entries| entries.len()).sum()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
