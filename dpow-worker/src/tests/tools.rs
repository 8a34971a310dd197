// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::opret::builders::notarization_payload;
use crate::registry::ChainStateRegistry;
use crate::NotarizationIntegrator;
use dpow_exports::test_exports::{test_pubkeys, InMemoryChain};
use dpow_exports::{DpowConfig, ShutdownFlag};
use dpow_hash::hash::Hash256;
use dpow_models::block::{Block, OutPoint, Transaction, TxIn, TxOut};
use dpow_models::pubkey::PublicKey;
use dpow_models::script::{op_return_script, p2pk_script};
use tempfile::TempDir;

/// Configuration storing its files in `dir`, for a node running `own_symbol`
pub fn test_config(dir: &TempDir, own_symbol: &str) -> DpowConfig {
    DpowConfig {
        data_dir: dir.path().to_path_buf(),
        own_symbol: own_symbol.to_string(),
        ..Default::default()
    }
}

/// Genesis notaries of the test configuration
pub fn genesis_notaries() -> Vec<PublicKey> {
    test_pubkeys(0, 35)
}

/// Registry with the own chain already opened, and an integrator for it
pub fn setup(config: &DpowConfig) -> (ChainStateRegistry, NotarizationIntegrator) {
    let mut registry = ChainStateRegistry::new(config.clone());
    registry
        .get_or_create(&config.own_symbol, &ShutdownFlag::new())
        .unwrap();
    (registry, NotarizationIntegrator::new(config.clone()))
}

fn txid(label: &str, seed: u32) -> Hash256 {
    let mut data = label.as_bytes().to_vec();
    data.extend_from_slice(&seed.to_le_bytes());
    Hash256::compute_from(&data)
}

/// Inputs spending one pay-to-pubkey output of each signer, the funding transactions being
/// registered in `chain`
pub fn signed_inputs(chain: &mut InMemoryChain, signers: &[PublicKey], seed: u32) -> Vec<TxIn> {
    signers
        .iter()
        .enumerate()
        .map(|(i, signer)| {
            let funding = Transaction {
                txid: txid("funding", seed * 1000 + i as u32),
                inputs: Vec::new(),
                outputs: vec![TxOut {
                    value: 10_000,
                    script_pubkey: p2pk_script(signer),
                }],
            };
            let input = TxIn {
                prevout: OutPoint {
                    txid: funding.txid,
                    vout: 0,
                },
            };
            chain.add_transaction(funding);
            input
        })
        .collect()
}

/// Notaries 1 to 12 of the genesis set
pub fn quorum() -> Vec<PublicKey> {
    genesis_notaries()[1..13].to_vec()
}

/// Coinbase transaction
pub fn coinbase(seed: u32) -> Transaction {
    Transaction {
        txid: txid("coinbase", seed),
        inputs: vec![TxIn {
            prevout: OutPoint {
                txid: Hash256::zero(),
                vout: u32::MAX,
            },
        }],
        outputs: vec![TxOut {
            value: 3 * 100_000_000,
            script_pubkey: p2pk_script(&genesis_notaries()[0]),
        }],
    }
}

/// Transaction paying to the crypto777 key with `payload` pushed in output 1
pub fn opreturn_tx(
    config: &DpowConfig,
    inputs: Vec<TxIn>,
    payload: &[u8],
    seed: u32,
) -> Transaction {
    Transaction {
        txid: txid("notarization", seed),
        inputs,
        outputs: vec![
            TxOut {
                value: 10_000,
                script_pubkey: p2pk_script(&config.crypto777_pubkey),
            },
            TxOut {
                value: 0,
                script_pubkey: op_return_script(payload),
            },
        ],
    }
}

/// Notarization of block `notarized_height` of `chain`, signed by the quorum
pub fn notarization_tx(
    config: &DpowConfig,
    chain: &mut InMemoryChain,
    notarized_height: i32,
    seed: u32,
) -> Transaction {
    let inputs = signed_inputs(chain, &quorum(), seed);
    let payload = notarization_payload(
        &InMemoryChain::block_hash(notarized_height, 0),
        notarized_height,
        Some(&txid("kmd notarization", seed)),
        &config.own_symbol,
    );
    opreturn_tx(config, inputs, &payload, seed)
}

/// Block of the active chain at `height` holding `transactions`
pub fn block_at(height: i32, transactions: Vec<Transaction>) -> Block {
    Block {
        hash: InMemoryChain::block_hash(height, 0),
        time: 1_600_000_000 + height as u32,
        transactions,
    }
}
