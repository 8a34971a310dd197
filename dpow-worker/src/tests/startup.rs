// Copyright (c) 2022 MASSA LABS <info@massa.net>

use super::tools::test_config;
use crate::state_log::LoadMode;
use crate::ChainStateStore;
use assert_matches::assert_matches;
use dpow_exports::{DpowConfig, DpowError, ShutdownFlag, ShutdownSignal};
use dpow_hash::hash::Hash256;
use dpow_models::event::{Event, NotarizedEvent, TAG_NOTARIZED};
use serial_test::serial;
use std::io::Write;
use tempfile::TempDir;

fn notarized(height: i32, notarized_height: i32) -> Event {
    let mut data = notarized_height.to_le_bytes().to_vec();
    data.extend_from_slice(b"startup");
    Event::Notarized(NotarizedEvent {
        height,
        notarized_height,
        block_hash: Hash256::compute_from(&data),
        dest_txid: Hash256::compute_from(&height.to_le_bytes()),
        mom: if height % 20 == 0 {
            Hash256::compute_from(b"mom")
        } else {
            Hash256::zero()
        },
        mom_depth: if height % 20 == 0 { 5 } else { 0 },
    })
}

/// Write a log of every record kind over `heights` blocks
fn populate(config: &DpowConfig, heights: i32) -> ChainStateStore {
    let mut store = ChainStateStore::open(config, "DOC", &ShutdownFlag::new()).unwrap();
    for height in 1..=heights {
        store
            .record_block(height, 1_600_000_000 + height as u32)
            .unwrap();
        if height % 10 == 0 {
            store.append_event(notarized(height, height - 5)).unwrap();
        }
        if height % 25 == 0 {
            store
                .record_opreturn(height, Hash256::compute_from(b"opret"), 1, 5000, &[9u8; 80])
                .unwrap();
        }
        if height % 50 == 0 {
            let prices: Vec<u32> = (1..=33).map(|p| p * height as u32).collect();
            assert!(store.record_price_feed(height, &prices).unwrap());
        }
        if height == heights / 2 {
            store.record_rewind(height - 3, 0).unwrap();
        }
    }
    store
}

#[test]
#[serial]
fn test_indexed_and_full_replay_agree() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "DOC");
    let live = populate(&config, 300).state().clone();
    let (_, index_path) = config.state_paths("DOC");

    let shutdown = ShutdownFlag::new();
    let indexed = ChainStateStore::open(&config, "DOC", &shutdown).unwrap();
    assert_eq!(indexed.load_mode(), LoadMode::Indexed);
    assert_eq!(indexed.state(), &live);
    drop(indexed);

    std::fs::remove_file(&index_path).unwrap();
    let reparsed = ChainStateStore::open(&config, "DOC", &shutdown).unwrap();
    assert_eq!(reparsed.load_mode(), LoadMode::FullReparse);
    assert_eq!(reparsed.state(), &live);
    drop(reparsed);

    // the rebuilt index is used again
    let reindexed = ChainStateStore::open(&config, "DOC", &shutdown).unwrap();
    assert_eq!(reindexed.load_mode(), LoadMode::Indexed);
    assert_eq!(reindexed.state(), &live);
    assert!(live.last_notarized_height > 0);
    assert_eq!(live.prev_mom_height(), 295);
}

#[test]
#[serial]
fn test_unindexed_tail_is_replayed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "DOC");
    let live = populate(&config, 40).state().clone();
    let (state_path, index_path) = config.state_paths("DOC");

    // index stops 10 records short of the log
    let index = std::fs::read(&index_path).unwrap();
    std::fs::write(&index_path, &index[..index.len() - 40]).unwrap();

    let store = ChainStateStore::open(&config, "DOC", &ShutdownFlag::new()).unwrap();
    assert_eq!(store.load_mode(), LoadMode::Indexed);
    assert_eq!(store.state(), &live);
    assert_eq!(
        store.log().position(),
        std::fs::metadata(&state_path).unwrap().len()
    );
    drop(store);
    assert_eq!(std::fs::read(&index_path).unwrap().len(), index.len());
}

#[test]
#[serial]
fn test_index_tag_mismatch_falls_back_to_full_reparse() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "DOC");
    let mut store = ChainStateStore::open(&config, "DOC", &ShutdownFlag::new()).unwrap();
    for height in 1..=60 {
        if height == 57 {
            // 57th record, described by slot 57
            store
                .record_opreturn(height, Hash256::zero(), 1, 0, &[1u8; 40])
                .unwrap();
        } else {
            store.record_block(height, 0).unwrap();
        }
    }
    let live = store.state().clone();
    drop(store);

    let (_, index_path) = config.state_paths("DOC");
    let mut index = std::fs::read(&index_path).unwrap();
    index[57 * 4] = TAG_NOTARIZED;
    std::fs::write(&index_path, &index).unwrap();

    let shutdown = ShutdownFlag::new();
    let store = ChainStateStore::open(&config, "DOC", &shutdown).unwrap();
    assert_eq!(store.load_mode(), LoadMode::FullReparse);
    assert_eq!(store.state(), &live);
    assert_eq!(store.state().opreturn_events().count(), 1);
    drop(store);

    let store = ChainStateStore::open(&config, "DOC", &shutdown).unwrap();
    assert_eq!(store.load_mode(), LoadMode::Indexed);
    assert_eq!(store.state(), &live);
}

#[test]
#[serial]
fn test_truncated_log_is_reported_as_corrupted() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "DOC");
    drop(populate(&config, 20));
    let (state_path, index_path) = config.state_paths("DOC");
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&state_path)
        .unwrap();
    file.write_all(&[TAG_NOTARIZED, 1, 0]).unwrap();
    drop(file);

    let expected_state = state_path.display().to_string();
    let expected_index = index_path.display().to_string();
    let shutdown = ShutdownFlag::new();
    // through the index tail, then through a full reparse
    for remove_index in [false, true] {
        if remove_index {
            std::fs::remove_file(&index_path).unwrap();
        }
        let err = ChainStateStore::open(&config, "DOC", &shutdown).unwrap_err();
        assert_matches!(
            &err,
            DpowError::StateFileCorrupted { state_path, index_path, .. }
                if state_path == &expected_state && index_path == &expected_index
        );
        let message = err.to_string();
        assert!(message.contains("Please remove"));
        assert!(message.contains(&expected_state));
    }
}

#[test]
#[serial]
fn test_shutdown_interrupts_replay() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "DOC");
    drop(populate(&config, 20));
    let (state_path, _) = config.state_paths("DOC");
    let size = std::fs::metadata(&state_path).unwrap().len();

    let shutdown = ShutdownFlag::new();
    shutdown.request_shutdown();
    assert_matches!(
        ChainStateStore::open(&config, "DOC", &shutdown),
        Err(DpowError::Interrupted)
    );
    assert_eq!(std::fs::metadata(&state_path).unwrap().len(), size);

    let store = ChainStateStore::open(&config, "DOC", &ShutdownFlag::new()).unwrap();
    // blocks 7 to 10 were rewound
    assert_eq!(store.state().kmd_height_events().count(), 16);
}
