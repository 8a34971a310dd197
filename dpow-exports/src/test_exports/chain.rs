// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::ChainView;
use dpow_hash::hash::Hash256;
use dpow_models::block::{BlockIndexEntry, Transaction};
use std::collections::HashMap;

/// Simple active chain with a transaction store
#[derive(Debug, Clone, Default)]
pub struct InMemoryChain {
    /// active chain, index is the height
    pub active: Vec<BlockIndexEntry>,
    /// blocks known but off the active chain
    pub side: HashMap<Hash256, BlockIndexEntry>,
    /// transaction store
    pub transactions: HashMap<Hash256, Transaction>,
    /// initial block download flag
    pub initial_download: bool,
}

impl InMemoryChain {
    /// Chain of `height + 1` blocks with hashes derived from their height
    pub fn with_height(height: i32) -> Self {
        let mut chain = InMemoryChain::default();
        for h in 0..=height {
            chain.push_block(Self::block_hash(h, 0), 1_600_000_000 + h as u32);
        }
        chain
    }

    /// Deterministic hash of the block at `height` on branch `branch`
    pub fn block_hash(height: i32, branch: u8) -> Hash256 {
        let mut data = height.to_le_bytes().to_vec();
        data.push(branch);
        Hash256::compute_from(&data)
    }

    /// Append a block to the active chain
    pub fn push_block(&mut self, hash: Hash256, time: u32) -> BlockIndexEntry {
        let entry = BlockIndexEntry {
            height: self.active.len() as i32,
            hash,
            time,
        };
        self.active.push(entry);
        entry
    }

    /// Replace every block above `height` by a branch of `count` blocks
    pub fn fork_at(&mut self, height: i32, count: i32, branch: u8) {
        let keep = (height + 1).max(0) as usize;
        for entry in self.active.drain(keep.min(self.active.len())..) {
            self.side.insert(entry.hash, entry);
        }
        for h in height + 1..=height + count {
            self.push_block(Self::block_hash(h, branch), 1_600_000_000 + h as u32);
        }
    }

    /// Register a transaction
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.insert(tx.txid, tx);
    }
}

impl ChainView for InMemoryChain {
    fn tip(&self) -> Option<BlockIndexEntry> {
        self.active.last().copied()
    }

    fn block_index_by_hash(&self, hash: &Hash256) -> Option<BlockIndexEntry> {
        self.active
            .iter()
            .find(|entry| &entry.hash == hash)
            .copied()
            .or_else(|| self.side.get(hash).copied())
    }

    fn block_index_at_height(&self, height: i32) -> Option<BlockIndexEntry> {
        usize::try_from(height)
            .ok()
            .and_then(|h| self.active.get(h))
            .copied()
    }

    fn get_transaction(&self, txid: &Hash256) -> Option<Transaction> {
        self.transactions.get(txid).cloned()
    }

    fn is_initial_block_download(&self) -> bool {
        self.initial_download
    }
}
