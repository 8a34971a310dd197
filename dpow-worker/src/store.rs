// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::chain_state::ChainState;
use crate::state_log::{LoadMode, StateLog};
use dpow_exports::{DpowConfig, DpowResult, ShutdownSignal};
use dpow_hash::hash::Hash256;
use dpow_logging::dpow_trace;
use dpow_models::constants::{MAX_OPRETURN_LEN, MAX_PRICES};
use dpow_models::event::{Event, EventDeserializer, KmdHeightEvent, OpReturnEvent, PriceFeedEvent};
use tracing::{debug, warn};

/// Leading price-feed values that must all be set for the feed to be recorded
const PRICE_FEED_REQUIRED: usize = 32;

/// Notarization state of one chain and the log it is persisted to
#[derive(Debug)]
pub struct ChainStateStore {
    state: ChainState,
    log: StateLog,
    load_mode: LoadMode,
}

impl ChainStateStore {
    /// Open the state log of `symbol` and rebuild its state
    pub fn open(
        config: &DpowConfig,
        symbol: &str,
        shutdown: &dyn ShutdownSignal,
    ) -> DpowResult<Self> {
        let (state_path, index_path) = config.state_paths(symbol);
        let deserializer = EventDeserializer::new();
        let empty = ChainState::new(
            symbol,
            config.is_home_chain(symbol),
            config.max_opreturn_len,
        );
        let (log, state, load_mode) =
            StateLog::open(&state_path, &index_path, &deserializer, empty, shutdown)?;
        Ok(ChainStateStore {
            state,
            log,
            load_mode,
        })
    }

    /// Current state
    pub fn state(&self) -> &ChainState {
        &self.state
    }

    /// Mutable access for the changes that are not logged
    pub fn state_mut(&mut self) -> &mut ChainState {
        &mut self.state
    }

    /// How the log was loaded
    pub fn load_mode(&self) -> LoadMode {
        self.load_mode
    }

    /// The underlying log
    pub fn log(&self) -> &StateLog {
        &self.log
    }

    /// Persist `event` then apply it. Returns whether the state changed.
    pub fn append_event(&mut self, event: Event) -> DpowResult<bool> {
        self.log.append(&event)?;
        let applied = self.state.apply(&event);
        dpow_trace!("state_log.append", {
            "symbol": self.state.symbol(),
            "tag": (event.tag() as char).to_string(),
            "height": event.height(),
            "applied": applied,
            "position": self.log.position()
        });
        Ok(applied)
    }

    /// Record an OP_RETURN payload. Payloads the log cannot hold are skipped.
    ///
    /// Payloads at or above the configured length are logged but not kept in the state.
    pub fn record_opreturn(
        &mut self,
        height: i32,
        txid: Hash256,
        vout: u16,
        value: u64,
        opret: &[u8],
    ) -> DpowResult<bool> {
        if opret.is_empty() || opret.len() > MAX_OPRETURN_LEN.min(u16::MAX as usize) {
            warn!(
                "{}: not recording OP_RETURN of {} bytes at height {}",
                self.state.symbol(),
                opret.len(),
                height
            );
            return Ok(false);
        }
        self.append_event(Event::OpReturn(OpReturnEvent {
            height,
            txid,
            vout,
            value,
            opret: opret.to_vec(),
        }))
    }

    /// Record a price feed, only when its leading values are all set
    pub fn record_price_feed(&mut self, height: i32, prices: &[u32]) -> DpowResult<bool> {
        if prices.len() < PRICE_FEED_REQUIRED
            || prices.len() > MAX_PRICES
            || prices[..PRICE_FEED_REQUIRED].iter().any(|price| *price == 0)
        {
            debug!(
                "{}: skipping incomplete price feed at height {}",
                self.state.symbol(),
                height
            );
            return Ok(false);
        }
        self.append_event(Event::PriceFeed(PriceFeedEvent {
            height,
            prices: prices.to_vec(),
        }))
    }

    /// Record that blocks from `height` on are being replaced
    pub fn record_rewind(&mut self, height: i32, timestamp: u32) -> DpowResult<bool> {
        self.append_event(Event::KmdHeight(KmdHeightEvent {
            height,
            kmd_height: -height,
            timestamp,
        }))
    }

    /// Record the block connected at `height`
    pub fn record_block(&mut self, height: i32, timestamp: u32) -> DpowResult<bool> {
        self.append_event(Event::KmdHeight(KmdHeightEvent {
            height,
            kmd_height: height,
            timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpow_exports::ShutdownFlag;
    use dpow_models::event::TAG_OPRETURN;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> DpowConfig {
        DpowConfig {
            data_dir: dir.path().to_path_buf(),
            own_symbol: "DOC".to_string(),
            max_opreturn_len: 256,
            ..Default::default()
        }
    }

    #[test]
    fn test_auxiliary_records() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let shutdown = ShutdownFlag::new();
        let mut store = ChainStateStore::open(&config, "DOC", &shutdown).unwrap();
        assert_eq!(store.load_mode(), LoadMode::FullReparse);

        assert!(store
            .record_opreturn(5, Hash256::zero(), 1, 0, &[7u8; 100])
            .unwrap());
        // logged, not forwarded
        assert!(!store
            .record_opreturn(5, Hash256::zero(), 1, 0, &[7u8; 256])
            .unwrap());
        // not logged
        let position = store.log().position();
        assert!(!store
            .record_opreturn(5, Hash256::zero(), 1, 0, &[7u8; 70_000])
            .unwrap());
        assert_eq!(store.log().position(), position);
        assert_eq!(store.state().opreturn_events().count(), 1);

        let mut prices: Vec<u32> = (1..=35).collect();
        assert!(store.record_price_feed(6, &prices).unwrap());
        prices[31] = 0;
        assert!(!store.record_price_feed(6, &prices).unwrap());
        assert!(!store.record_price_feed(6, &prices[..20]).unwrap());
        assert_eq!(store.state().price_feed_events().count(), 1);

        let position = store.log().position();
        drop(store);
        let data = std::fs::read(config.state_paths("DOC").0).unwrap();
        assert_eq!(data.len() as u64, position);
        assert_eq!(data[0], TAG_OPRETURN);

        let reopened = ChainStateStore::open(&config, "DOC", &shutdown).unwrap();
        assert_eq!(reopened.load_mode(), LoadMode::Indexed);
        assert_eq!(reopened.state().opreturn_events().count(), 1);
        assert_eq!(reopened.state().price_feed_events().count(), 1);
    }

    #[test]
    fn test_log_replays_under_a_smaller_opreturn_bound() {
        let dir = TempDir::new().unwrap();
        let shutdown = ShutdownFlag::new();
        let wide = DpowConfig {
            max_opreturn_len: 1024,
            ..config(&dir)
        };
        let mut store = ChainStateStore::open(&wide, "DOC", &shutdown).unwrap();
        assert!(store
            .record_opreturn(5, Hash256::zero(), 1, 0, &[7u8; 300])
            .unwrap());
        drop(store);

        let narrow = config(&dir);
        let reopened = ChainStateStore::open(&narrow, "DOC", &shutdown).unwrap();
        assert_eq!(reopened.state().opreturn_events().count(), 0);
        assert_eq!(reopened.log().position(), 5 + 32 + 2 + 8 + 2 + 300);
    }
}
