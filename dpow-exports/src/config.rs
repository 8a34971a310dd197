// Copyright (c) 2022 MASSA LABS <info@massa.net>

use dpow_models::pubkey::PublicKey;
use serde::Deserialize;
use std::path::PathBuf;

/// A notary season of the home chain, ending at a height and, for other chains, at a timestamp
#[derive(Debug, Clone, Deserialize)]
pub struct NotarySeason {
    /// last home-chain height of the season
    pub end_height: i32,
    /// last timestamp of the season
    pub end_timestamp: u32,
    /// elected notaries
    pub pubkeys: Vec<PublicKey>,
}

/// Notary era of a staked chain
#[derive(Debug, Clone, Deserialize)]
pub struct StakedEra {
    /// last timestamp of the era
    pub end_timestamp: u32,
    /// notaries of the era
    pub pubkeys: Vec<PublicKey>,
}

/// Staked chain policy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StakedConfig {
    /// symbols starting with one of these use staked eras
    pub prefixes: Vec<String>,
    /// symbols whose notarizations are never scanned
    pub banned_chains: Vec<String>,
    /// eras, in chronological order
    pub eras: Vec<StakedEra>,
    /// seconds after an era end during which no notary set is active
    pub era_gap_seconds: u32,
}

/// Notary election parameters
#[derive(Debug, Clone, Deserialize)]
pub struct NotaryConfig {
    /// blocks between two notary elections
    pub election_gap: i32,
    /// last height handled by election-indexed notary sets
    pub max_blocks: i32,
    /// home-chain height from which seasons apply
    pub hardcoded_height: i32,
    /// signatures required below `min_ratify_height`
    pub min_ratify_early: u32,
    /// signatures required from `min_ratify_height`
    pub min_ratify: u32,
    /// height switching the quorum, also ending the first-notary exemption
    pub min_ratify_height: i32,
    /// heights below this start the signed mask with the first notary bit set
    pub early_signed_mask_height: i32,
    /// ratifications are only accepted below this height
    pub ratification_max_height: i32,
    /// seasons, in chronological order
    pub seasons: Vec<NotarySeason>,
    /// notaries active from genesis until the first ratification
    pub genesis_notaries: Vec<PublicKey>,
    /// staked chain policy
    #[serde(default)]
    pub staked: StakedConfig,
}

/// Notarization subsystem configuration
#[derive(Debug, Clone)]
pub struct DpowConfig {
    /// directory holding one sub directory per tracked chain
    pub data_dir: PathBuf,
    /// symbol of the backing chain
    pub home_symbol: String,
    /// symbol of the chain this node runs
    pub own_symbol: String,
    /// state log file name
    pub state_file_name: String,
    /// extension appended to the state log name for its index
    pub index_extension: String,
    /// signed mask audit file name
    pub signed_masks_file_name: String,
    /// number of chains the registry may track at once
    pub max_tracked_chains: usize,
    /// test network: every 7th block is notarized
    pub regtest: bool,
    /// notary pay is active: only the first transactions carry notarizations
    pub notary_pay: bool,
    /// rewind targets at or below this height are never requested
    pub rewind_floor: i32,
    /// largest OP_RETURN payload accepted in a state-log record
    pub max_opreturn_len: usize,
    /// target chains whose notarizations count without a quorum
    pub grandfathered_chains: Vec<String>,
    /// same as `grandfathered_chains`, by symbol prefix
    pub grandfathered_prefixes: Vec<String>,
    /// key marking special transactions such as ratifications
    pub crypto777_pubkey: PublicKey,
    /// notary election parameters
    pub notary: NotaryConfig,
}

impl DpowConfig {
    /// Whether `symbol` is the backing chain
    pub fn is_home_chain(&self, symbol: &str) -> bool {
        symbol == self.home_symbol
    }

    /// Whether this node runs the backing chain
    pub fn own_is_home(&self) -> bool {
        self.is_home_chain(&self.own_symbol)
    }

    /// Directory of the state files of `symbol`
    pub fn chain_dir(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(symbol)
    }

    /// Paths of the state log of `symbol` and of its index
    pub fn state_paths(&self, symbol: &str) -> (PathBuf, PathBuf) {
        let state_path = self.chain_dir(symbol).join(&self.state_file_name);
        let index_path = self
            .chain_dir(symbol)
            .join(format!("{}.{}", self.state_file_name, self.index_extension));
        (state_path, index_path)
    }

    /// Path of the signed mask audit file
    pub fn signed_masks_path(&self) -> PathBuf {
        self.chain_dir(&self.own_symbol)
            .join(&self.signed_masks_file_name)
    }

    /// Whether notarizations for `symbol` are accepted without a quorum
    pub fn is_grandfathered(&self, symbol: &str) -> bool {
        self.grandfathered_chains.iter().any(|name| name == symbol)
            || self
                .grandfathered_prefixes
                .iter()
                .any(|prefix| symbol.starts_with(prefix.as_str()))
    }

    /// Signatures needed for a notarization or ratification at `height`
    pub fn min_ratify(&self, height: i32) -> u32 {
        if height < self.notary.min_ratify_height {
            self.notary.min_ratify_early
        } else {
            self.notary.min_ratify
        }
    }
}
