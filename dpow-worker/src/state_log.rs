// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Append-only state log of one chain and its startup replay.

use crate::chain_state::ChainState;
use crate::state_index::{self, IndexScan, StateIndex};
use dpow_exports::{DpowError, DpowResult, ShutdownSignal};
use dpow_logging::dpow_trace;
use dpow_models::event::{Event, EventDeserializer, EventSerializer};
use dpow_models::event_source::{read_event_at, EventSource, SliceEventSource, StreamEventSource};
use dpow_serialization::Serializer;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Largest log the index can describe
const MAX_INDEXED_LOG_SIZE: u64 = u32::MAX as u64;

/// How the log was loaded at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// records were located through the index
    Indexed,
    /// the whole log was parsed, the index was rebuilt
    FullReparse,
    /// the log is too large to be indexed and was parsed without one
    Unindexed,
}

/// Open state log of one chain
pub struct StateLog {
    state_path: PathBuf,
    index_path: PathBuf,
    file: File,
    index: Option<StateIndex>,
    position: u64,
    serializer: EventSerializer,
}

impl std::fmt::Debug for StateLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateLog")
            .field("state_path", &self.state_path)
            .field("index_path", &self.index_path)
            .field("position", &self.position)
            .field("indexed", &self.index.is_some())
            .finish()
    }
}

impl StateLog {
    /// Open the log at `state_path`, creating it when absent, and replay it into `state`.
    ///
    /// A malformed log is reported as `StateFileCorrupted` naming both files.
    pub fn open(
        state_path: &Path,
        index_path: &Path,
        deserializer: &EventDeserializer,
        state: ChainState,
        shutdown: &dyn ShutdownSignal,
    ) -> DpowResult<(StateLog, ChainState, LoadMode)> {
        if let Some(dir) = state_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(state_path)?;
        let mut log = StateLog {
            state_path: state_path.to_path_buf(),
            index_path: index_path.to_path_buf(),
            file,
            index: None,
            position: 0,
            serializer: EventSerializer::new(),
        };
        let (state, mode) = match log.replay(deserializer, state, shutdown) {
            Err(DpowError::ParseError { offset, message }) => {
                return Err(DpowError::StateFileCorrupted {
                    state_path: state_path.display().to_string(),
                    index_path: index_path.display().to_string(),
                    reason: format!("offset {}: {}", offset, message),
                })
            }
            other => other?,
        };
        info!(
            "loaded {} ({:?}): {} events up to offset {}",
            state_path.display(),
            mode,
            state.events().len(),
            log.position
        );
        Ok((log, state, mode))
    }

    fn replay(
        &mut self,
        deserializer: &EventDeserializer,
        state: ChainState,
        shutdown: &dyn ShutdownSignal,
    ) -> DpowResult<(ChainState, LoadMode)> {
        let log_size = self.file.metadata()?.len();
        if log_size > MAX_INDEXED_LOG_SIZE {
            warn!(
                "{} exceeds {} bytes, loading without index",
                self.state_path.display(),
                MAX_INDEXED_LOG_SIZE
            );
            self.drop_index();
            let state = self.full_reparse(deserializer, state, shutdown, false)?;
            return Ok((state, LoadMode::Unindexed));
        }
        if self.index_path.exists() {
            let data = std::fs::read(&self.state_path)?;
            let index = std::fs::read(&self.index_path)?;
            let indexed = state_index::validate(&index, &data).and_then(|scan| {
                let replayed = replay_indexed(&data, &scan, deserializer, state.clone(), shutdown)?;
                Ok((scan, replayed))
            });
            match indexed {
                Ok((scan, replayed)) => {
                    self.index = Some(StateIndex::resume(&self.index_path, &scan)?);
                    self.position = scan.end;
                    let state = self.replay_tail(&data, deserializer, replayed, shutdown)?;
                    return Ok((state, LoadMode::Indexed));
                }
                Err(DpowError::IndexMismatch(reason)) => {
                    warn!(
                        "{} does not match {}: {}, reparsing the whole log",
                        self.index_path.display(),
                        self.state_path.display(),
                        reason
                    );
                    dpow_trace!("state_log.index_fallback", {
                        "state_path": self.state_path.display().to_string(),
                        "reason": reason
                    });
                }
                Err(err) => return Err(err),
            }
        }
        let state = self.full_reparse(deserializer, state, shutdown, true)?;
        Ok((state, LoadMode::FullReparse))
    }

    /// Parse the records written after the indexed part of the log
    fn replay_tail(
        &mut self,
        data: &[u8],
        deserializer: &EventDeserializer,
        mut state: ChainState,
        shutdown: &dyn ShutdownSignal,
    ) -> DpowResult<ChainState> {
        let mut source = SliceEventSource::new(data, self.position as usize);
        while let Some(recorded) = source.next_event(deserializer)? {
            if shutdown.shutdown_requested() {
                return Err(DpowError::Interrupted);
            }
            state.apply(&recorded.event);
            self.index_record(recorded.end, recorded.tag);
            self.position = recorded.end;
        }
        if let Some(index) = self.index.as_mut() {
            index.flush()?;
        }
        Ok(state)
    }

    /// Parse every record from the start of the log, optionally rebuilding the index
    fn full_reparse(
        &mut self,
        deserializer: &EventDeserializer,
        mut state: ChainState,
        shutdown: &dyn ShutdownSignal,
        rebuild_index: bool,
    ) -> DpowResult<ChainState> {
        self.index = if rebuild_index {
            Some(StateIndex::create(&self.index_path)?)
        } else {
            None
        };
        let reader = BufReader::new(File::open(&self.state_path)?);
        let mut source = StreamEventSource::new(reader, 0);
        loop {
            if shutdown.shutdown_requested() {
                return Err(DpowError::Interrupted);
            }
            let Some(recorded) = source.next_event(deserializer)? else {
                break;
            };
            state.apply(&recorded.event);
            self.index_record(recorded.end, recorded.tag);
            self.position = recorded.end;
        }
        if let Some(index) = self.index.as_mut() {
            index.flush()?;
            debug!(
                "rebuilt {} with {} slots",
                self.index_path.display(),
                index.counter()
            );
        }
        Ok(state)
    }

    fn index_record(&mut self, end: u64, tag: u8) {
        if let Some(index) = self.index.as_mut() {
            if let Err(err) = index.update(end, tag) {
                warn!("disabling {}: {}", self.index_path.display(), err);
                self.drop_index();
            }
        }
    }

    fn drop_index(&mut self) {
        self.index = None;
        if self.index_path.exists() {
            if let Err(err) = std::fs::remove_file(&self.index_path) {
                warn!("could not remove {}: {}", self.index_path.display(), err);
            }
        }
    }

    /// Append `event`, flush it to disk and index it
    pub fn append(&mut self, event: &Event) -> DpowResult<()> {
        let mut buffer = Vec::new();
        self.serializer.serialize(event, &mut buffer)?;
        self.file.write_all(&buffer)?;
        self.file.flush()?;
        self.file.sync_data()?;
        let end = self.position + buffer.len() as u64;
        self.index_record(end, event.tag());
        if let Some(index) = self.index.as_mut() {
            index.flush()?;
        }
        self.position = end;
        Ok(())
    }

    /// Offset of the next record
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether records are still indexed
    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// State log path
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Index path
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

/// Decode every record the index points at, in order.
///
/// A record that does not fill its window means the index is stale.
fn replay_indexed(
    data: &[u8],
    scan: &IndexScan,
    deserializer: &EventDeserializer,
    mut state: ChainState,
    shutdown: &dyn ShutdownSignal,
) -> DpowResult<ChainState> {
    for record in &scan.records {
        if shutdown.shutdown_requested() {
            return Err(DpowError::Interrupted);
        }
        let mut offset = record.start as usize;
        let length = (record.end - record.start) as usize;
        let event = read_event_at(deserializer, data, &mut offset, length)
            .map_err(|err| DpowError::IndexMismatch(err.to_string()))?;
        state.apply(&event);
    }
    Ok(state)
}
