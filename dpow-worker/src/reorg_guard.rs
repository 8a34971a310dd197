// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Checks keeping the active chain above the last notarized block.

use crate::chain_state::ChainState;
use dpow_exports::{ChainView, ConsensusViolation, ShutdownSignal};
use dpow_hash::hash::Hash256;
use dpow_models::block::BlockIndexEntry;
use tracing::{error, warn};

/// Outcome of a checkpoint check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointVerdict {
    /// the block does not conflict with the last notarization
    Accepted,
    /// the block is below the notarized height, or at it with another hash
    Rejected,
    /// the notarized block is unknown or moved, nothing can be decided
    Inconclusive,
}

impl CheckpointVerdict {
    /// Whether the block may be accepted
    pub fn is_allowed(&self) -> bool {
        !matches!(self, CheckpointVerdict::Rejected)
    }
}

/// Last notarization, as returned to the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotarizedTip {
    /// notarized height, 0 when none
    pub height: i32,
    /// notarized block hash
    pub hash: Hash256,
    /// destination txid
    pub dest_txid: Hash256,
    /// notarized height of the latest checkpoint carrying a MoM
    pub prev_mom_height: i32,
}

/// Fork tracking of the notarization validation
#[derive(Debug, Clone)]
pub struct ReorgGuard {
    symbol: String,
    rewind_floor: i32,
    last_rewind: i32,
}

impl ReorgGuard {
    /// Guard for `symbol`, never requesting rewinds at or below `rewind_floor`
    pub fn new(symbol: &str, rewind_floor: i32) -> Self {
        ReorgGuard {
            symbol: symbol.to_string(),
            rewind_floor,
            last_rewind: 0,
        }
    }

    /// Whether the block notarized at `notarized_height` with `source_hash` is on the local chain.
    ///
    /// During initial block download nothing can be judged and the answer is yes. Otherwise a
    /// mismatch records a rewind target; it is never executed here.
    pub fn validate_chain(
        &mut self,
        chain: &dyn ChainView,
        state: &ChainState,
        source_hash: &Hash256,
        notarized_height: i32,
    ) -> bool {
        if chain.is_initial_block_download() {
            return true;
        }
        let on_chain = chain
            .block_index_by_hash(source_hash)
            .map_or(false, |entry| entry.height == notarized_height);
        if on_chain {
            return true;
        }
        let last = state.last_notarized_height;
        let target = if last > 0 && last < notarized_height {
            last - 1
        } else if notarized_height > 101 {
            notarized_height - 101
        } else {
            0
        };
        if target != 0 && target > self.rewind_floor && target > self.last_rewind {
            if self.last_rewind != 0 {
                error!(
                    "{} FORK detected. notarized.{} {} not in this chain! last notarization {} -> rewindtarget.{}",
                    self.symbol, notarized_height, source_hash, last, target
                );
            }
            self.last_rewind = target;
        }
        false
    }

    /// Last rewind target recorded, if any
    pub fn rewind_target(&self) -> Option<i32> {
        (self.last_rewind != 0).then_some(self.last_rewind)
    }
}

/// Check a block at `height` with `hash` against the checkpoint recorded below the tip
pub fn checkpoint(
    chain: &dyn ChainView,
    state: &ChainState,
    height: i32,
    hash: &Hash256,
) -> CheckpointVerdict {
    let Some(tip) = chain.tip() else {
        return CheckpointVerdict::Rejected;
    };
    let Some(cp) = state.notarized_data(tip.height) else {
        return CheckpointVerdict::Inconclusive;
    };
    if cp.notarized_height < 0 || cp.notarized_height > tip.height {
        return CheckpointVerdict::Inconclusive;
    }
    match chain.block_index_by_hash(&cp.block_hash) {
        Some(notarized) if notarized.height == cp.notarized_height => {
            if height < cp.notarized_height {
                CheckpointVerdict::Rejected
            } else if height == cp.notarized_height && hash != &cp.block_hash {
                warn!(
                    "{}: height {} is notarized with another hash",
                    state.symbol(),
                    height
                );
                CheckpointVerdict::Rejected
            } else {
                CheckpointVerdict::Accepted
            }
        }
        _ => CheckpointVerdict::Inconclusive,
    }
}

/// Refuse to disconnect the notarized block, requesting a shutdown when asked to
pub fn check_disconnect(
    state: &ChainState,
    tip: &BlockIndexEntry,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), ConsensusViolation> {
    if state.last_notarized_height > 0
        && tip.height == state.last_notarized_height
        && tip.hash == state.last_notarized_hash
    {
        error!(
            "{}: trying to disconnect notarized block {} at height {}",
            state.symbol(),
            tip.hash,
            tip.height
        );
        shutdown.request_shutdown();
        return Err(ConsensusViolation::NotarizedTipDisconnect {
            height: tip.height,
            hash: tip.hash,
        });
    }
    Ok(())
}

/// Refuse a reorganization keeping only the blocks up to `fork_height`
pub fn check_reorg(state: &ChainState, fork_height: i32) -> Result<(), ConsensusViolation> {
    if state.last_notarized_height > 0 && fork_height < state.last_notarized_height {
        warn!(
            "{}: rejecting reorganization to {} below notarized height {}",
            state.symbol(),
            fork_height,
            state.last_notarized_height
        );
        return Err(ConsensusViolation::ReorgBelowNotarized {
            fork_height,
            notarized_height: state.last_notarized_height,
        });
    }
    Ok(())
}

/// Whether `height` is at or below the last notarized height
pub fn is_notarized(state: &ChainState, height: i32) -> bool {
    state.last_notarized_height > 0 && height <= state.last_notarized_height
}

/// Last notarization, forgotten first if its block left the block index
pub fn notarized_height(chain: &dyn ChainView, state: &mut ChainState) -> NotarizedTip {
    let known = chain
        .block_index_by_hash(&state.last_notarized_hash)
        .map_or(false, |entry| entry.height >= 0);
    if !known {
        if state.last_notarized_height != 0 {
            warn!(
                "{}: orphaned notarization at height {}",
                state.symbol(),
                state.last_notarized_height
            );
        }
        state.clear_notarization();
        return NotarizedTip {
            height: 0,
            hash: Hash256::zero(),
            dest_txid: Hash256::zero(),
            prev_mom_height: 0,
        };
    }
    NotarizedTip {
        height: state.last_notarized_height,
        hash: state.last_notarized_hash,
        dest_txid: state.last_notarized_dest_txid,
        prev_mom_height: state.prev_mom_height(),
    }
}
