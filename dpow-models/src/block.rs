// Copyright (c) 2022 MASSA LABS <info@massa.net>

use dpow_hash::hash::Hash256;
use serde::{Deserialize, Serialize};

/// Reference to a previous transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// id of the funding transaction
    pub txid: Hash256,
    /// output index in that transaction
    pub vout: u32,
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// spent output
    pub prevout: OutPoint,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// amount in satoshis
    pub value: u64,
    /// locking script
    pub script_pubkey: Vec<u8>,
}

/// The parts of a transaction the notarization core looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// transaction id
    pub txid: Hash256,
    /// inputs
    pub inputs: Vec<TxIn>,
    /// outputs
    pub outputs: Vec<TxOut>,
}

/// A block being connected to the active chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// block hash
    pub hash: Hash256,
    /// header timestamp
    pub time: u32,
    /// transactions, coinbase first
    pub transactions: Vec<Transaction>,
}

/// Block index entry of the surrounding node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndexEntry {
    /// height in the chain the entry belongs to, negative when orphaned
    pub height: i32,
    /// block hash
    pub hash: Hash256,
    /// header timestamp
    pub time: u32,
}
