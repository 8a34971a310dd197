// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Definition and exports of the notarization subsystem configuration, errors and the
//! interfaces of the surrounding node it relies on.

#![warn(missing_docs)]

mod config;
mod controller_traits;
mod error;
mod shutdown;

pub use config::*;
pub use controller_traits::ChainView;
#[cfg(any(test, feature = "test-exports"))]
pub use controller_traits::MockChainView;
pub use error::*;
pub use shutdown::{ShutdownFlag, ShutdownSignal};

/// Test utils
#[cfg(feature = "test-exports")]
pub mod test_exports;
