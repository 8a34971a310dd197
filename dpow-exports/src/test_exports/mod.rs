// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Configuration defaults, deterministic keys and an in-memory chain for tests.

mod chain;
mod config;

pub use chain::InMemoryChain;
pub use config::*;
