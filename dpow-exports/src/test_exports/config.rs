// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::{DpowConfig, NotaryConfig, NotarySeason, StakedConfig};
use dpow_models::pubkey::PublicKey;
use std::path::PathBuf;

/// Key used as the crypto777 key in test configurations
pub const TEST_CRYPTO777_PUBKEY: &str =
    "020e46e79a2a8d12b9b5d12c7a91adb4e454edfae43c0a0cb805427d2ac7613fd9";

/// Deterministic, distinct keys: `seed` separates sets, `index` separates keys in a set
pub fn test_pubkey(seed: u8, index: u8) -> PublicKey {
    let mut bytes = [0u8; 33];
    bytes[0] = 0x02;
    bytes[1] = seed;
    bytes[2] = index;
    bytes[32] = 0x5a;
    PublicKey::from_bytes(&bytes)
}

/// `count` deterministic keys of set `seed`
pub fn test_pubkeys(seed: u8, count: usize) -> Vec<PublicKey> {
    (0..count).map(|index| test_pubkey(seed, index as u8)).collect()
}

impl Default for NotaryConfig {
    fn default() -> Self {
        NotaryConfig {
            election_gap: 2000,
            max_blocks: 250000,
            hardcoded_height: 180000,
            min_ratify_early: 7,
            min_ratify: 11,
            min_ratify_height: 90000,
            early_signed_mask_height: 91400,
            ratification_max_height: 100000,
            seasons: vec![
                NotarySeason {
                    end_height: 814000,
                    end_timestamp: 1525132800,
                    pubkeys: test_pubkeys(1, 64),
                },
                NotarySeason {
                    end_height: 1444000,
                    end_timestamp: 1563148800,
                    pubkeys: test_pubkeys(2, 64),
                },
            ],
            genesis_notaries: test_pubkeys(0, 35),
            staked: StakedConfig::default(),
        }
    }
}

impl Default for DpowConfig {
    fn default() -> Self {
        DpowConfig {
            data_dir: PathBuf::from("."),
            home_symbol: "KMD".to_string(),
            own_symbol: "KMD".to_string(),
            state_file_name: "komodostate".to_string(),
            index_extension: "ind".to_string(),
            signed_masks_file_name: "signedmasks".to_string(),
            max_tracked_chains: 2,
            regtest: false,
            notary_pay: false,
            rewind_floor: 0,
            max_opreturn_len: dpow_models::constants::MAX_OPRETURN_LEN,
            grandfathered_chains: vec!["PIZZA".to_string(), "BEER".to_string()],
            grandfathered_prefixes: vec!["TXSCL".to_string()],
            crypto777_pubkey: TEST_CRYPTO777_PUBKEY
                .parse()
                .expect("valid crypto777 key"),
            notary: NotaryConfig::default(),
        }
    }
}
