// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// Hash size
pub const HASH_SIZE_BYTES: usize = 32;

/// RIPEMD-160 digest size
pub const HASH160_SIZE_BYTES: usize = 20;
