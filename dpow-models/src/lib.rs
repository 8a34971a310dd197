// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Data types of the notarization subsystem: state-log events and their codec,
//! transaction script helpers, notarization records and the block data handed
//! over by the surrounding node.

#![warn(missing_docs)]

pub use error::{ModelsError, ModelsResult};

/// blocks and transactions as seen by the notarization core
pub mod block;
/// protocol constants
pub mod constants;
/// models error
pub mod error;
/// state-log events and their binary codec
pub mod event;
/// sequential event readers over a slice or a stream
pub mod event_source;
/// notarization records
pub mod notarization;
/// compressed public keys
pub mod pubkey;
/// script pattern helpers
pub mod script;
