// Copyright (c) 2022 MASSA LABS <info@massa.net>

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative shutdown flag of the node
pub trait ShutdownSignal: Send + Sync {
    /// Whether a shutdown was requested
    fn shutdown_requested(&self) -> bool;

    /// Request an orderly shutdown
    fn request_shutdown(&self);
}

/// Shared boolean implementation of [`ShutdownSignal`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Creates a flag in the "running" state
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShutdownSignal for ShutdownFlag {
    fn shutdown_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
