// Copyright (c) 2021 MASSA LABS <info@massa.net>

/// Structured trace of a notarization subsystem event.
///
/// `dpow_trace!("state_log.append", {"symbol": symbol, "height": height})`
#[macro_export]
macro_rules! dpow_trace {
    ($evt:expr, $params:tt) => {
        tracing::trace!("dpow_trace:{}:{}", $evt, serde_json::json!($params));
    };
}
