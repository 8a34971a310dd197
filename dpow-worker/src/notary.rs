// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Notary set resolution.
//!
//! The backing chain uses hardcoded seasons from `hardcoded_height` on, other chains pick their
//! season by block time, staked chains follow timestamp eras. Everything else falls back to the
//! election-indexed sets built from the genesis notaries and the ratified pubkey events.

use crate::chain_state::ChainState;
use dpow_exports::{DpowConfig, NotarySeason, StakedEra};
use dpow_models::pubkey::PublicKey;
use tracing::debug;

/// Notary set active at a height
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotaryLookup {
    /// active notaries, in election order
    Active(Vec<PublicKey>),
    /// staked chain between two eras, no notary is active
    EraGap,
    /// staked chain whose notarizations are never scanned
    Banned,
}

impl NotaryLookup {
    /// Active keys, empty in a gap or for a banned chain
    pub fn pubkeys(&self) -> &[PublicKey] {
        match self {
            NotaryLookup::Active(pubkeys) => pubkeys,
            NotaryLookup::EraGap | NotaryLookup::Banned => &[],
        }
    }

    /// Whether block transactions should be scanned for notary activity
    pub fn is_scannable(&self) -> bool {
        matches!(self, NotaryLookup::Active(_))
    }
}

/// Notary expected to sign a height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChosenNotary {
    /// index of the key in the active set
    pub notary_id: usize,
    /// whether this notary is the one elected for the height
    pub is_special: bool,
}

/// Weight test for ratifications: a majority, or more than 7 signatures including the first notary
pub fn ratify_threshold(signed_mask: u64, num_notaries: usize) -> bool {
    let considered = if num_notaries >= 64 {
        signed_mask
    } else {
        signed_mask & ((1u64 << num_notaries) - 1)
    };
    let weight = considered.count_ones() as usize;
    weight > num_notaries / 2 || (weight > 7 && signed_mask & 1 != 0)
}

/// 1-based index of the season ending at or after `value`, 0 past the last season
fn season_index(ends: impl Iterator<Item = i64>, value: i64) -> usize {
    let mut previous = None;
    for (i, end) in ends.enumerate() {
        match previous {
            None if value <= end => return 1,
            Some(prev) if value > prev && value <= end => return i + 1,
            _ => {}
        }
        previous = Some(end);
    }
    0
}

/// Resolves notary sets for the chain this node runs
#[derive(Debug, Clone)]
pub struct NotaryResolver {
    config: DpowConfig,
}

impl NotaryResolver {
    /// Resolver for `config.own_symbol`
    pub fn new(config: DpowConfig) -> Self {
        NotaryResolver { config }
    }

    /// 1-based season of a backing-chain height, 0 when past every season
    pub fn season_by_height(&self, height: i32) -> usize {
        season_index(
            self.config
                .notary
                .seasons
                .iter()
                .map(|season| i64::from(season.end_height)),
            i64::from(height),
        )
    }

    /// 1-based season of a block time, 0 when past every season
    pub fn season_by_timestamp(&self, timestamp: u32) -> usize {
        season_index(
            self.config
                .notary
                .seasons
                .iter()
                .map(|season| i64::from(season.end_timestamp)),
            i64::from(timestamp),
        )
    }

    fn season(&self, index: usize) -> Option<&NotarySeason> {
        index
            .checked_sub(1)
            .and_then(|i| self.config.notary.seasons.get(i))
    }

    /// Whether the own chain follows staked eras
    pub fn is_staked(&self) -> bool {
        let staked = &self.config.notary.staked;
        let symbol = &self.config.own_symbol;
        staked.banned_chains.iter().any(|name| name == symbol)
            || staked
                .prefixes
                .iter()
                .any(|prefix| symbol.starts_with(prefix.as_str()))
    }

    fn is_banned(&self) -> bool {
        self.config
            .notary
            .staked
            .banned_chains
            .iter()
            .any(|name| name == &self.config.own_symbol)
    }

    /// Staked era of a block time, `None` in a gap between eras or after the last one
    pub fn staked_era(&self, timestamp: u32) -> Option<&StakedEra> {
        let staked = &self.config.notary.staked;
        let mut previous_end: Option<u32> = None;
        for era in &staked.eras {
            let open = match previous_end {
                None => true,
                Some(end) => u64::from(timestamp) >= u64::from(end) + u64::from(staked.era_gap_seconds),
            };
            if timestamp <= era.end_timestamp {
                return if open { Some(era) } else { None };
            }
            previous_end = Some(era.end_timestamp);
        }
        None
    }

    fn slot_count(&self) -> i32 {
        (self.config.notary.max_blocks / self.config.notary.election_gap.max(1)).max(1)
    }

    /// Election slot a notary set recorded at `origin_height` becomes active in
    pub fn activation_slot(&self, origin_height: i32) -> i32 {
        if origin_height <= 0 {
            return 0;
        }
        let gap = self.config.notary.election_gap.max(1);
        ((origin_height + gap / 2) / gap + 1).min(self.slot_count() - 1)
    }

    /// Height from which a set ratified at `origin_height` is used
    pub fn activation_height(&self, origin_height: i32) -> i32 {
        self.activation_slot(origin_height) * self.config.notary.election_gap.max(1)
    }

    /// Election-indexed set: genesis notaries, replaced by the last ratified set already active
    pub fn fallback_notaries(&self, height: i32, state: &ChainState) -> Vec<PublicKey> {
        let gap = self.config.notary.election_gap.max(1);
        let slot = (height.max(0) / gap).min(self.slot_count() - 1);
        let mut pubkeys = &self.config.notary.genesis_notaries;
        for event in state.pubkey_events() {
            if self.activation_slot(event.height) <= slot {
                pubkeys = &event.pubkeys;
            }
        }
        pubkeys.clone()
    }

    /// Notaries of the own chain at `height`, `timestamp` being the block time
    pub fn notaries(&self, height: i32, timestamp: u32, state: &ChainState) -> NotaryLookup {
        if !self.is_staked() {
            let season = if self.config.own_is_home() {
                if height >= self.config.notary.hardcoded_height {
                    self.season_by_height(height)
                } else {
                    0
                }
            } else {
                self.season_by_timestamp(timestamp)
            };
            if let Some(season) = self.season(season) {
                return NotaryLookup::Active(season.pubkeys.clone());
            }
        } else if timestamp != 0 {
            if self.is_banned() {
                return NotaryLookup::Banned;
            }
            return match self.staked_era(timestamp) {
                Some(era) => NotaryLookup::Active(era.pubkeys.clone()),
                None => {
                    debug!(
                        "{}: block time {} falls between staked eras",
                        self.config.own_symbol, timestamp
                    );
                    NotaryLookup::EraGap
                }
            };
        }
        NotaryLookup::Active(self.fallback_notaries(height, state))
    }

    /// Index of `pubkey` in the set active at `height`, and the size of that set
    pub fn elected_notary(
        &self,
        pubkey: &PublicKey,
        height: i32,
        timestamp: u32,
        state: &ChainState,
    ) -> (Option<usize>, usize) {
        let lookup = self.notaries(height, timestamp, state);
        let pubkeys = lookup.pubkeys();
        (
            pubkeys.iter().position(|candidate| candidate == pubkey),
            pubkeys.len(),
        )
    }

    /// Notary owning `pubkey` at `height`, flagged special when it is the elected one for the height
    pub fn chosen_notary(
        &self,
        height: i32,
        pubkey: &PublicKey,
        timestamp: u32,
        state: &ChainState,
    ) -> Option<ChosenNotary> {
        if height < 0 {
            return None;
        }
        if height >= self.config.notary.hardcoded_height || !self.config.own_is_home() {
            if let (Some(notary_id), count) = self.elected_notary(pubkey, height, timestamp, state)
            {
                if count != 0 {
                    return Some(ChosenNotary {
                        notary_id,
                        is_special: height as usize % count == notary_id,
                    });
                }
            }
        }
        if height >= self.config.notary.max_blocks {
            return None;
        }
        let pubkeys = self.fallback_notaries(height, state);
        let notary_id = pubkeys.iter().position(|candidate| candidate == pubkey)?;
        Some(ChosenNotary {
            notary_id,
            is_special: height as usize % pubkeys.len() == notary_id,
        })
    }

    /// Ratification weight test against the election-indexed set at `height`
    pub fn ratify_threshold(&self, height: i32, signed_mask: u64, state: &ChainState) -> bool {
        ratify_threshold(signed_mask, self.fallback_notaries(height, state).len())
    }
}
