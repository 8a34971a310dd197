// Copyright (c) 2022 MASSA LABS <info@massa.net>

use displaydoc::Display;
use dpow_hash::hash::Hash256;
use dpow_models::ModelsError;
use dpow_serialization::SerializeError;
use thiserror::Error;

/// Result alias with `DpowError`
pub type DpowResult<T, E = DpowError> = core::result::Result<T, E>;

/// Decisions that make a block or a reorganization unacceptable
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusViolation {
    /// block contains more than one notarization
    MultipleNotarizations,
    /// notarization found in transaction {0} instead of transaction 1
    NotarizationAtWrongIndex(usize),
    /// refusing to disconnect notarized block {hash} at height {height}
    NotarizedTipDisconnect {
        /// height of the notarized tip
        height: i32,
        /// hash of the notarized tip
        hash: Hash256,
    },
    /// reorganization to height {fork_height} would cross the notarized height {notarized_height}
    ReorgBelowNotarized {
        /// height of the last block kept by the reorganization
        fork_height: i32,
        /// last notarized height
        notarized_height: i32,
    },
}

/// Notarization subsystem error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum DpowError {
    /// malformed state log record at offset {offset}: {message}
    ParseError {
        /// offset of the offending record
        offset: u64,
        /// parser message
        message: String,
    },
    /// state index does not match the state log: {0}
    IndexMismatch(String),
    /// {state_path} file is invalid ({reason}). Please remove {state_path} and {index_path} files and restart
    StateFileCorrupted {
        /// state log path
        state_path: String,
        /// index path
        index_path: String,
        /// underlying parse failure
        reason: String,
    },
    /// consensus violation: {0}
    ConsensusViolation(#[from] ConsensusViolation),
    /// cannot track chain {0}: registry is full
    TooManyChains(String),
    /// chain {0} is not tracked
    UnknownChain(String),
    /// interrupted by a shutdown request
    Interrupted,
    /// configuration error: {0}
    ConfigError(String),
    /// io error: {0}
    IoError(#[from] std::io::Error),
    /// serialization error: {0}
    SerializeError(#[from] SerializeError),
}

impl From<ModelsError> for DpowError {
    fn from(err: ModelsError) -> Self {
        match err {
            ModelsError::ParseError { offset, message } => DpowError::ParseError { offset, message },
            ModelsError::IoError(err) => DpowError::IoError(err),
            ModelsError::SerializeError(err) => DpowError::SerializeError(err),
            other => DpowError::ParseError {
                offset: 0,
                message: other.to_string(),
            },
        }
    }
}
