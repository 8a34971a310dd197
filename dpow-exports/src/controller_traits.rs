// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Interfaces of the surrounding node consumed by the notarization core.

use dpow_hash::hash::Hash256;
use dpow_models::block::{BlockIndexEntry, Transaction};

/// Read access to the block index and transaction store of the node
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait ChainView: Send + Sync {
    /// Tip of the active chain
    fn tip(&self) -> Option<BlockIndexEntry>;

    /// Block index entry of a known block, whether or not it is on the active chain
    fn block_index_by_hash(&self, hash: &Hash256) -> Option<BlockIndexEntry>;

    /// Block of the active chain at `height`
    fn block_index_at_height(&self, height: i32) -> Option<BlockIndexEntry>;

    /// Fetch a transaction by id
    fn get_transaction(&self, txid: &Hash256) -> Option<Transaction>;

    /// Whether the node is still in initial block download
    fn is_initial_block_download(&self) -> bool;
}
