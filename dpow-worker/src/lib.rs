// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! The dpow worker keeps the notarization state of the chains a node tracks.
//!
//! Every chain has an append-only state log (`komodostate`) and an index of
//! its record offsets. On startup the log is replayed into a [`ChainState`],
//! through the index when it matches the log, by a full reparse otherwise.
//!
//! Blocks connected to the active chain go through the
//! [`NotarizationIntegrator`]: it resolves the notary set of the height,
//! computes which notaries signed each transaction, accepts notarizations
//! found in `OP_RETURN` outputs and ratified notary sets, and records one
//! event per connected block.
//!
//! The [`reorg_guard`] functions keep the active chain above the last
//! notarized block.

#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

/// cross-chain data of accepted notarizations
pub mod cc_cache;
/// in-memory state of one chain
pub mod chain_state;
/// block connect
pub mod connect;
/// notary set resolution
pub mod notary;
/// notarization payload decoding
pub mod opret;
/// tracked chains
pub mod registry;
/// notarized checkpoint checks
pub mod reorg_guard;
/// signed mask audit file
pub mod signed_masks;
/// offsets index of the state log
pub mod state_index;
/// append-only state log and its replay
pub mod state_log;
/// state of one chain with its log
pub mod store;

pub use chain_state::ChainState;
pub use connect::{ConnectStatus, NotarizationIntegrator};
pub use registry::{ChainStateRegistry, SharedRegistry};
pub use store::ChainStateStore;

#[cfg(test)]
mod tests;
