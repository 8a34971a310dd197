// Copyright (c) 2022 MASSA LABS <info@massa.net>

use dpow_exports::{DpowConfig, DpowError, DpowResult, NotaryConfig};
use dpow_models::pubkey::PublicKey;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const BASE_CONFIG_PATH: &str = "base_config/config.toml";
const ENV_PREFIX: &str = "DPOW";

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LoggingSettings {
    /// 0 error, 1 warn, 2 info, 3 debug, 4 trace
    pub level: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub data_dir: PathBuf,
    pub home_symbol: String,
    pub own_symbol: String,
    pub state_file_name: String,
    pub index_extension: String,
    pub signed_masks_file_name: String,
    pub max_tracked_chains: usize,
    pub regtest: bool,
    pub notary_pay: bool,
    pub rewind_floor: i32,
    pub max_opreturn_len: usize,
    pub grandfathered_chains: Vec<String>,
    pub grandfathered_prefixes: Vec<String>,
    pub crypto777_pubkey: PublicKey,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DpowSettings {
    pub logging: LoggingSettings,
    pub chain: ChainSettings,
    pub notary: NotaryConfig,
}

impl DpowSettings {
    /// Base configuration, then `override_path` when it exists, then the environment
    pub fn load(override_path: &Path) -> anyhow::Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::File::with_name(BASE_CONFIG_PATH));
        if override_path.is_file() {
            builder = builder.add_source(config::File::from(override_path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Configuration of the notarization subsystem
    pub fn dpow_config(&self) -> DpowResult<DpowConfig> {
        let chain = &self.chain;
        if self.notary.election_gap <= 0 {
            return Err(DpowError::ConfigError(format!(
                "election_gap must be positive, got {}",
                self.notary.election_gap
            )));
        }
        if chain.own_symbol.is_empty() || chain.home_symbol.is_empty() {
            return Err(DpowError::ConfigError("chain symbols cannot be empty".to_string()));
        }
        if chain.max_tracked_chains == 0 {
            let message = "max_tracked_chains must be at least 1".to_string();
            return Err(DpowError::ConfigError(message));
        }
        Ok(DpowConfig {
            data_dir: chain.data_dir.clone(),
            home_symbol: chain.home_symbol.clone(),
            own_symbol: chain.own_symbol.clone(),
            state_file_name: chain.state_file_name.clone(),
            index_extension: chain.index_extension.clone(),
            signed_masks_file_name: chain.signed_masks_file_name.clone(),
            max_tracked_chains: chain.max_tracked_chains,
            regtest: chain.regtest,
            notary_pay: chain.notary_pay,
            rewind_floor: chain.rewind_floor,
            max_opreturn_len: chain.max_opreturn_len,
            grandfathered_chains: chain.grandfathered_chains.clone(),
            grandfathered_prefixes: chain.grandfathered_prefixes.clone(),
            crypto777_pubkey: chain.crypto777_pubkey,
            notary: self.notary.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(toml: &str) -> DpowSettings {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const SETTINGS: &str = r#"
[logging]
level = 2

[chain]
data_dir = "data"
home_symbol = "KMD"
own_symbol = "DOC"
state_file_name = "komodostate"
index_extension = "ind"
signed_masks_file_name = "signedmasks"
max_tracked_chains = 2
regtest = false
notary_pay = false
rewind_floor = 0
max_opreturn_len = 65536
grandfathered_chains = ["PIZZA", "BEER"]
grandfathered_prefixes = ["TXSCL"]
crypto777_pubkey = "020e46e79a2a8d12b9b5d12c7a91adb4e454edfae43c0a0cb805427d2ac7613fd9"

[notary]
election_gap = 2000
max_blocks = 250000
hardcoded_height = 180000
min_ratify_early = 7
min_ratify = 11
min_ratify_height = 90000
early_signed_mask_height = 91400
ratification_max_height = 100000
genesis_notaries = ["03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0"]

[[notary.seasons]]
end_height = 814000
end_timestamp = 1525132800
pubkeys = ["02279cac1b6f8d0b364d09deee9f578ba95ac97dd02ce337b1e39a095efecab9f3"]
"#;

    #[test]
    fn test_settings_to_config() {
        let settings = parse(SETTINGS);
        assert_eq!(settings.logging.level, 2);
        let config = settings.dpow_config().unwrap();
        assert_eq!(config.own_symbol, "DOC");
        assert!(!config.own_is_home());
        assert_eq!(config.notary.seasons.len(), 1);
        assert_eq!(config.notary.genesis_notaries.len(), 1);
        assert!(config.notary.staked.eras.is_empty());
        assert!(config.is_grandfathered("TXSCLAPP"));
        assert_eq!(
            config.state_paths("DOC").0,
            PathBuf::from("data").join("DOC").join("komodostate")
        );
    }

    #[test]
    fn test_invalid_settings() {
        let mut settings = parse(SETTINGS);
        settings.notary.election_gap = 0;
        assert!(matches!(
            settings.dpow_config(),
            Err(DpowError::ConfigError(_))
        ));
        let mut settings = parse(SETTINGS);
        settings.chain.own_symbol.clear();
        assert!(matches!(
            settings.dpow_config(),
            Err(DpowError::ConfigError(_))
        ));
    }

    #[test]
    fn test_override_file() {
        let dir = TempDir::new().unwrap();
        let base = DpowSettings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(base.chain.own_symbol, "KMD");
        assert!(base.dpow_config().unwrap().own_is_home());

        let override_path = dir.path().join("config.toml");
        let content = "[chain]\nown_symbol = \"DOC\"\nregtest = true\n";
        std::fs::write(&override_path, content).unwrap();
        let settings = DpowSettings::load(&override_path).unwrap();
        assert_eq!(settings.chain.own_symbol, "DOC");
        assert!(settings.chain.regtest);
        assert_eq!(settings.chain.home_symbol, "KMD");
    }
}
