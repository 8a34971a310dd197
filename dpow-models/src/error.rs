// Copyright (c) 2022 MASSA LABS <info@massa.net>

use displaydoc::Display;
use thiserror::Error;

/// Result alias with `ModelsError`
pub type ModelsResult<T, E = ModelsError> = core::result::Result<T, E>;

/// Models error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ModelsError {
    /// malformed event record at offset {offset}: {message}
    ParseError {
        /// absolute offset of the record start
        offset: u64,
        /// what went wrong
        message: String,
    },
    /// Serialization error: {0}
    SerializeError(#[from] dpow_serialization::SerializeError),
    /// dpow_hash error: {0}
    HashError(#[from] dpow_hash::DpowHashError),
    /// invalid public key: {0}
    InvalidPublicKey(String),
    /// io error: {0}
    IoError(#[from] std::io::Error),
}
