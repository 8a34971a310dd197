// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// Size of a compressed secp256k1 public key
pub const PUBKEY_SIZE_BYTES: usize = 33;

/// Maximum number of notaries in a set
pub const MAX_NOTARIES: usize = 64;

/// Maximum number of values in a price-feed record
pub const MAX_PRICES: usize = 35;

/// Upper bound of an OP_RETURN payload carried by a state-log record
pub const MAX_OPRETURN_LEN: usize = 16384 * 4;

/// Longest chain symbol read out of a notarization payload
pub const MAX_SYMBOL_LEN: usize = 65;

/// Smallest OP_RETURN payload that can hold a notarization
pub const MIN_NOTARIZATION_LEN: usize = 34;

/// Size of a state-log record header (tag + height)
pub const EVENT_HEADER_SIZE: usize = 5;
