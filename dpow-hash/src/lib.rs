// Copyright (c) 2022 MASSA LABS <info@massa.net>

#![warn(missing_docs)]
//! 256-bit and 160-bit digests used by the notarization subsystem.

pub use error::DpowHashError;
pub use settings::{HASH160_SIZE_BYTES, HASH_SIZE_BYTES};

mod error;
pub mod hash;
mod settings;
