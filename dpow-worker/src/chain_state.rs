// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! In-memory notarization state of one chain, rebuilt from its state log.

use dpow_hash::hash::Hash256;
use dpow_models::event::{
    Event, KmdHeightEvent, NotarizedEvent, OpReturnEvent, PriceFeedEvent, PubkeysEvent,
};
use dpow_models::notarization::MOM_DEPTH_MASK;
use tracing::{debug, warn};

/// MoM covering a height, as found in the notarization checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoMLookup {
    /// MoM root
    pub mom: Hash256,
    /// raw MoM depth
    pub mom_depth: i32,
    /// height notarized by the checkpoint
    pub notarized_height: i32,
    /// notarization txid on the destination chain
    pub dest_txid: Hash256,
    /// height at which the checkpoint was recorded
    pub recorded_height: i32,
}

/// Notarization state of one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    symbol: String,
    is_home: bool,
    max_opreturn_len: usize,
    /// highest height seen by this chain
    pub current_height: i32,
    /// highest backing-chain height recorded
    pub saved_height: i32,
    /// timestamp recorded with `saved_height`
    pub saved_timestamp: u32,
    /// last notarized height
    pub last_notarized_height: i32,
    /// block hash at `last_notarized_height`
    pub last_notarized_hash: Hash256,
    /// txid of the last notarization on the destination chain
    pub last_notarized_dest_txid: Hash256,
    /// MoM of the last notarization
    pub last_notarized_mom: Hash256,
    /// raw MoM depth of the last notarization
    pub last_notarized_mom_depth: i32,
    had_notarization: bool,
    events: Vec<Event>,
    checkpoints: Vec<NotarizedEvent>,
}

impl ChainState {
    /// Empty state for `symbol`
    pub fn new(symbol: &str, is_home: bool, max_opreturn_len: usize) -> Self {
        ChainState {
            symbol: symbol.to_string(),
            is_home,
            max_opreturn_len,
            current_height: 0,
            saved_height: 0,
            saved_timestamp: 0,
            last_notarized_height: 0,
            last_notarized_hash: Hash256::zero(),
            last_notarized_dest_txid: Hash256::zero(),
            last_notarized_mom: Hash256::zero(),
            last_notarized_mom_depth: 0,
            had_notarization: false,
            events: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Chain symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Whether this is the backing chain
    pub fn is_home(&self) -> bool {
        self.is_home
    }

    /// Apply a replayed or freshly recorded event.
    ///
    /// Returns whether the event changed the state.
    pub fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::KmdHeight(kmd) if kmd.kmd_height > 0 => {
                self.events.push(event.clone());
                self.set_kmd_height(kmd);
                true
            }
            Event::KmdHeight(kmd) => {
                // rewind marker, nothing is kept
                self.truncate(kmd.height - 1);
                true
            }
            Event::Notarized(notarized) => {
                self.events.push(event.clone());
                self.update_notarized(notarized)
            }
            Event::OpReturn(opret) => {
                if self.is_home || opret.opret.len() >= self.max_opreturn_len {
                    return false;
                }
                self.events.push(event.clone());
                true
            }
            Event::Pubkeys(_) | Event::PriceFeed(_) => {
                self.events.push(event.clone());
                true
            }
            Event::DeprecatedU(_) | Event::WriteOnlyB { .. } => false,
        }
    }

    fn set_kmd_height(&mut self, kmd: &KmdHeightEvent) {
        if kmd.kmd_height > self.saved_height {
            self.saved_height = kmd.kmd_height;
            if kmd.timestamp != 0 {
                self.saved_timestamp = kmd.timestamp;
            }
        }
        self.current_height = self.current_height.max(kmd.kmd_height);
    }

    fn update_notarized(&mut self, notarized: &NotarizedEvent) -> bool {
        if notarized.notarized_height >= notarized.height {
            warn!(
                "{}: ignoring notarization of height {} recorded at height {}",
                self.symbol, notarized.notarized_height, notarized.height
            );
            return false;
        }
        if notarized.notarized_height <= self.last_notarized_height {
            return false;
        }
        self.checkpoints.push(*notarized);
        self.set_last_notarized(notarized);
        self.had_notarization = true;
        true
    }

    fn set_last_notarized(&mut self, notarized: &NotarizedEvent) {
        self.last_notarized_height = notarized.notarized_height;
        self.last_notarized_hash = notarized.block_hash;
        self.last_notarized_dest_txid = notarized.dest_txid;
        self.last_notarized_mom = notarized.mom;
        self.last_notarized_mom_depth = notarized.mom_depth;
    }

    /// Drop every event recorded above `height` and recompute what derives from them
    pub fn truncate(&mut self, height: i32) {
        let before = self.events.len();
        self.events.retain(|event| event.height() <= height);
        self.checkpoints.retain(|cp| cp.height <= height);
        match self.checkpoints.last().copied() {
            Some(last) => self.set_last_notarized(&last),
            None => self.clear_notarization(),
        }
        self.saved_height = 0;
        self.saved_timestamp = 0;
        self.current_height = 0;
        let kmd_heights: Vec<KmdHeightEvent> = self.kmd_height_events().copied().collect();
        for kmd in &kmd_heights {
            self.set_kmd_height(kmd);
        }
        debug!(
            "{}: truncated to height {}, {} events dropped",
            self.symbol,
            height,
            before - self.events.len()
        );
    }

    /// Notarize the block at `height` with itself, used by test networks.
    ///
    /// The checkpoint is kept in memory only: it survives a `truncate` at or above `height`
    /// but not a replay of the log.
    pub fn force_notarized(&mut self, height: i32, hash: Hash256, dest_txid: Hash256) {
        let checkpoint = NotarizedEvent {
            height,
            notarized_height: height,
            block_hash: hash,
            dest_txid,
            mom: self.last_notarized_mom,
            mom_depth: self.last_notarized_mom_depth,
        };
        self.checkpoints.retain(|cp| cp.notarized_height < height);
        self.checkpoints.push(checkpoint);
        self.set_last_notarized(&checkpoint);
        self.had_notarization = true;
    }

    /// Forget the last notarization, its block left the block index
    pub fn clear_notarization(&mut self) {
        self.last_notarized_height = 0;
        self.last_notarized_hash = Hash256::zero();
        self.last_notarized_dest_txid = Hash256::zero();
        self.last_notarized_mom = Hash256::zero();
        self.last_notarized_mom_depth = 0;
    }

    /// Raise the current height
    pub fn set_current_height(&mut self, height: i32) {
        if height > self.current_height {
            self.current_height = height;
        }
    }

    /// Every event kept, in recording order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Accepted notarizations, in recording order
    pub fn checkpoints(&self) -> &[NotarizedEvent] {
        &self.checkpoints
    }

    /// Notary set changes
    pub fn pubkey_events(&self) -> impl Iterator<Item = &PubkeysEvent> {
        self.events.iter().filter_map(|event| match event {
            Event::Pubkeys(pubkeys) => Some(pubkeys),
            _ => None,
        })
    }

    /// Notarizations, accepted or not
    pub fn notarized_events(&self) -> impl Iterator<Item = &NotarizedEvent> {
        self.events.iter().filter_map(|event| match event {
            Event::Notarized(notarized) => Some(notarized),
            _ => None,
        })
    }

    /// Backing-chain height markers
    pub fn kmd_height_events(&self) -> impl Iterator<Item = &KmdHeightEvent> {
        self.events.iter().filter_map(|event| match event {
            Event::KmdHeight(kmd) => Some(kmd),
            _ => None,
        })
    }

    /// OP_RETURN payloads
    pub fn opreturn_events(&self) -> impl Iterator<Item = &OpReturnEvent> {
        self.events.iter().filter_map(|event| match event {
            Event::OpReturn(opret) => Some(opret),
            _ => None,
        })
    }

    /// Price feeds
    pub fn price_feed_events(&self) -> impl Iterator<Item = &PriceFeedEvent> {
        self.events.iter().filter_map(|event| match event {
            Event::PriceFeed(prices) => Some(prices),
            _ => None,
        })
    }

    /// Latest checkpoint recorded strictly below `height`
    pub fn notarized_data(&self, height: i32) -> Option<&NotarizedEvent> {
        self.checkpoints
            .iter()
            .take_while(|cp| cp.height < height)
            .last()
    }

    /// Latest checkpoint whose MoM covers `height`
    pub fn checkpoint_for_height(&self, height: i32) -> Option<&NotarizedEvent> {
        self.checkpoints.iter().rev().find(|cp| {
            cp.mom_depth != 0
                && height > cp.notarized_height - (cp.mom_depth & MOM_DEPTH_MASK)
                && height <= cp.notarized_height
        })
    }

    /// MoM covering `height`
    pub fn mom_data(&self, height: i32) -> Option<MoMLookup> {
        self.checkpoint_for_height(height).map(|cp| MoMLookup {
            mom: cp.mom,
            mom_depth: cp.mom_depth,
            notarized_height: cp.notarized_height,
            dest_txid: cp.dest_txid,
            recorded_height: cp.height,
        })
    }

    /// Notarized height of the latest checkpoint carrying a MoM, 0 when none
    pub fn prev_mom_height(&self) -> i32 {
        self.checkpoints
            .iter()
            .rev()
            .find(|cp| !cp.mom.is_zero())
            .map(|cp| cp.notarized_height)
            .unwrap_or(0)
    }

    /// Confirmations to report for a transaction at `tx_height`.
    ///
    /// Once notarizations exist, anything above the notarized height counts as one confirmation.
    pub fn dpow_confs(&self, tx_height: i32, confirmations: i32) -> i32 {
        if self.last_notarized_height > 0 {
            if tx_height < self.last_notarized_height {
                confirmations
            } else {
                1
            }
        } else if self.had_notarization {
            1
        } else {
            confirmations
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kmd(height: i32, kmd_height: i32) -> Event {
        Event::KmdHeight(KmdHeightEvent {
            height,
            kmd_height,
            timestamp: 1_600_000_000 + height as u32,
        })
    }

    fn notarized(height: i32, notarized_height: i32, mom_depth: i32) -> Event {
        Event::Notarized(NotarizedEvent {
            height,
            notarized_height,
            block_hash: Hash256::compute_from(&notarized_height.to_le_bytes()),
            dest_txid: Hash256::compute_from(&height.to_le_bytes()),
            mom: if mom_depth != 0 {
                Hash256::compute_from(b"mom")
            } else {
                Hash256::zero()
            },
            mom_depth,
        })
    }

    #[test]
    fn test_forced_notarization_survives_truncate_above_it() {
        let mut state = ChainState::new("TST", false, 1024);
        assert!(state.apply(&notarized(100, 90, 5)));
        let hash = Hash256::compute_from(b"block 140");
        let txid = Hash256::compute_from(b"coinbase 140");
        state.force_notarized(140, hash, txid);
        assert_eq!(state.checkpoints().len(), 2);

        state.truncate(145);
        assert_eq!(state.last_notarized_height, 140);
        assert_eq!(state.last_notarized_hash, hash);
        assert_eq!(state.last_notarized_dest_txid, txid);
        assert_eq!(state.last_notarized_mom_depth, 5);

        state.truncate(139);
        assert_eq!(state.last_notarized_height, 90);
        assert_eq!(state.checkpoints().len(), 1);
    }

    #[test]
    fn test_notarized_height_is_monotonic() {
        let mut state = ChainState::new("TST", false, 1024);
        assert!(state.apply(&notarized(20, 10, 0)));
        assert!(!state.apply(&notarized(21, 8, 0)));
        assert!(!state.apply(&notarized(22, 10, 0)));
        assert!(!state.apply(&notarized(23, 30, 0)));
        assert_eq!(state.last_notarized_height, 10);
        assert!(state.apply(&notarized(24, 15, 0)));
        assert_eq!(state.last_notarized_height, 15);
        assert_eq!(state.checkpoints().len(), 2);
        assert_eq!(state.notarized_events().count(), 5);
    }

    #[test]
    fn test_rewind_marker_truncates() {
        let mut state = ChainState::new("TST", false, 1024);
        for h in 1..=10 {
            state.apply(&kmd(h, h));
        }
        state.apply(&notarized(5, 3, 0));
        state.apply(&notarized(9, 7, 0));
        assert_eq!(state.saved_height, 10);

        state.apply(&kmd(8, -8));
        assert_eq!(state.last_notarized_height, 3);
        assert_eq!(state.saved_height, 7);
        assert_eq!(state.current_height, 7);
        assert!(state.events().iter().all(|event| event.height() <= 7));
        assert!(state.kmd_height_events().all(|k| k.kmd_height > 0));

        state.apply(&kmd(4, -4));
        assert_eq!(state.last_notarized_height, 0);
        assert!(state.last_notarized_hash.is_zero());
        assert!(state.checkpoints().is_empty());
    }

    #[test]
    fn test_opreturn_forwarding() {
        let opret = |len: usize| {
            Event::OpReturn(OpReturnEvent {
                height: 3,
                txid: Hash256::zero(),
                vout: 1,
                value: 0,
                opret: vec![1u8; len],
            })
        };
        let mut state = ChainState::new("TST", false, 64);
        assert!(state.apply(&opret(63)));
        assert!(!state.apply(&opret(64)));
        let mut home = ChainState::new("KMD", true, 64);
        assert!(!home.apply(&opret(10)));
        assert_eq!(state.opreturn_events().count(), 1);
    }

    #[test]
    fn test_checkpoint_queries() {
        let mut state = ChainState::new("TST", false, 1024);
        state.apply(&notarized(110, 100, 10));
        state.apply(&notarized(130, 120, 0));
        state.apply(&notarized(150, 140, 0x0001_0005));

        assert!(state.notarized_data(110).is_none());
        assert_eq!(state.notarized_data(111).unwrap().notarized_height, 100);
        assert_eq!(state.notarized_data(1000).unwrap().notarized_height, 140);

        assert_eq!(state.checkpoint_for_height(95).unwrap().notarized_height, 100);
        assert!(state.checkpoint_for_height(90).is_none());
        assert!(state.checkpoint_for_height(120).is_none());
        assert_eq!(state.mom_data(136).unwrap().notarized_height, 140);
        assert!(state.mom_data(135).is_none());
        assert_eq!(state.prev_mom_height(), 140);
    }

    #[test]
    fn test_dpow_confs() {
        let mut state = ChainState::new("TST", false, 1024);
        assert_eq!(state.dpow_confs(50, 12), 12);
        state.apply(&notarized(110, 100, 0));
        assert_eq!(state.dpow_confs(50, 12), 12);
        assert_eq!(state.dpow_confs(100, 12), 1);
        state.clear_notarization();
        assert_eq!(state.dpow_confs(50, 12), 1);
    }
}
