// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Companion index of a state log.
//!
//! The index is an array of little-endian `u32` slots. Every 100th slot (slot 0 included)
//! holds the absolute end offset of the last record written before it. Every other slot
//! describes one record: `(end - last_checkpoint) << 8 | tag`.

use dpow_exports::{DpowError, DpowResult};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Slots between two checkpoints, checkpoint included
pub const CHECKPOINT_INTERVAL: u32 = 100;

const SLOT_SIZE: usize = 4;
const MAX_OFFSET_DELTA: u64 = (1 << 24) - 1;

/// Location of one record, as described by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedRecord {
    /// tag byte of the record
    pub tag: u8,
    /// offset of the record start
    pub start: u64,
    /// offset just past the record
    pub end: u64,
}

/// Result of a successful index validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexScan {
    /// records in log order
    pub records: Vec<IndexedRecord>,
    /// offset of the first byte not covered by the index
    pub end: u64,
    /// number of slots
    pub counter: u32,
    /// value of the last checkpoint slot
    pub prev_checkpoint: u32,
}

/// Check that `index` describes `data` and return the record boundaries it gives.
///
/// Every record slot must point at a byte of `data` holding the slot's tag.
pub fn validate(index: &[u8], data: &[u8]) -> DpowResult<IndexScan> {
    if index.len() % SLOT_SIZE != 0 {
        return Err(DpowError::IndexMismatch(format!(
            "index size {} is not a multiple of {}",
            index.len(),
            SLOT_SIZE
        )));
    }
    if index.is_empty() {
        return Err(DpowError::IndexMismatch("empty index".to_string()));
    }
    let mut scan = IndexScan::default();
    let mut last_fpos: u64 = 0;
    let mut fpos: u64 = 0;
    for (i, chunk) in index.chunks_exact(SLOT_SIZE).enumerate() {
        let slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if i as u32 % CHECKPOINT_INTERVAL == 0 {
            if u64::from(slot) != fpos {
                return Err(DpowError::IndexMismatch(format!(
                    "slot {}: checkpoint {} does not follow record end {}",
                    i, slot, fpos
                )));
            }
            scan.prev_checkpoint = slot;
        } else {
            let tag = (slot & 0xff) as u8;
            fpos = u64::from(scan.prev_checkpoint) + u64::from(slot >> 8);
            let found = usize::try_from(last_fpos).ok().and_then(|pos| data.get(pos));
            if found != Some(&tag) || fpos <= last_fpos || fpos > data.len() as u64 {
                return Err(DpowError::IndexMismatch(format!(
                    "slot {}: tag {:?} at offset {} but the log holds {:?}",
                    i,
                    tag as char,
                    last_fpos,
                    found.map(|b| *b as char)
                )));
            }
            scan.records.push(IndexedRecord {
                tag,
                start: last_fpos,
                end: fpos,
            });
        }
        last_fpos = fpos;
    }
    scan.counter = (index.len() / SLOT_SIZE) as u32;
    scan.end = fpos;
    Ok(scan)
}

/// Append the slot of a record ending at `new_fpos`, and a checkpoint slot every 100 slots.
///
/// Returns `new_fpos`, the start of the next record.
pub fn update<W: Write>(
    index_file: &mut W,
    prev_checkpoint: &mut u32,
    last_fpos: u64,
    new_fpos: u64,
    tag: u8,
    counter: &mut u32,
) -> DpowResult<u64> {
    let delta = new_fpos
        .checked_sub(u64::from(*prev_checkpoint))
        .filter(|delta| *delta <= MAX_OFFSET_DELTA && new_fpos > last_fpos)
        .ok_or_else(|| {
            DpowError::IndexMismatch(format!(
                "record ending at {} cannot be indexed from checkpoint {}",
                new_fpos, prev_checkpoint
            ))
        })?;
    let checkpoint = u32::try_from(new_fpos).map_err(|_| {
        DpowError::IndexMismatch(format!("offset {} exceeds the index range", new_fpos))
    })?;
    let slot = ((delta as u32) << 8) | u32::from(tag);
    index_file.write_all(&slot.to_le_bytes())?;
    *counter += 1;
    if *counter % CHECKPOINT_INTERVAL == 0 {
        *prev_checkpoint = checkpoint;
        index_file.write_all(&prev_checkpoint.to_le_bytes())?;
        *counter += 1;
    }
    Ok(new_fpos)
}

/// Open index file kept in step with the log
#[derive(Debug)]
pub struct StateIndex {
    file: File,
    counter: u32,
    prev_checkpoint: u32,
    last_fpos: u64,
}

impl StateIndex {
    /// Start a fresh index holding only the initial checkpoint
    pub fn create(path: &Path) -> DpowResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&0u32.to_le_bytes())?;
        Ok(StateIndex {
            file,
            counter: 1,
            prev_checkpoint: 0,
            last_fpos: 0,
        })
    }

    /// Reopen a validated index to append after its last slot
    pub fn resume(path: &Path, scan: &IndexScan) -> DpowResult<Self> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        let len = u64::from(scan.counter) * SLOT_SIZE as u64;
        file.set_len(len)?;
        file.seek(SeekFrom::Start(len))?;
        debug!(
            "resuming index {} at slot {} (log offset {})",
            path.display(),
            scan.counter,
            scan.end
        );
        Ok(StateIndex {
            file,
            counter: scan.counter,
            prev_checkpoint: scan.prev_checkpoint,
            last_fpos: scan.end,
        })
    }

    /// Record a record of tag `tag` ending at `new_fpos`
    pub fn update(&mut self, new_fpos: u64, tag: u8) -> DpowResult<()> {
        self.last_fpos = update(
            &mut self.file,
            &mut self.prev_checkpoint,
            self.last_fpos,
            new_fpos,
            tag,
            &mut self.counter,
        )?;
        Ok(())
    }

    /// Flush the index to disk
    pub fn flush(&mut self) -> DpowResult<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Number of slots written
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// Log of `count` fake records of `len` bytes with tag `tag`, and its index
    fn build(count: usize, len: u64, tag: u8) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        let mut index = 0u32.to_le_bytes().to_vec();
        let (mut prev_checkpoint, mut counter, mut last_fpos) = (0u32, 1u32, 0u64);
        for _ in 0..count {
            let mut record = vec![0u8; len as usize];
            record[0] = tag;
            data.extend_from_slice(&record);
            last_fpos = update(
                &mut index,
                &mut prev_checkpoint,
                last_fpos,
                data.len() as u64,
                tag,
                &mut counter,
            )
            .unwrap();
        }
        assert_eq!(index.len() / 4, counter as usize);
        (data, index)
    }

    #[test]
    fn test_checkpoint_every_hundred_slots() {
        let (data, index) = build(250, 9, b'K');
        // 1 initial checkpoint, 250 records, 2 more checkpoints
        assert_eq!(index.len() / 4, 253);
        let checkpoint = u32::from_le_bytes([index[400], index[401], index[402], index[403]]);
        assert_eq!(checkpoint, 99 * 9);
        let scan = validate(&index, &data).unwrap();
        assert_eq!(scan.records.len(), 250);
        assert_eq!(scan.end, data.len() as u64);
        assert_eq!(scan.counter, 253);
        assert_eq!(scan.prev_checkpoint, 198 * 9);
        assert_eq!(
            scan.records[57],
            IndexedRecord {
                tag: b'K',
                start: 57 * 9,
                end: 58 * 9
            }
        );
    }

    #[test]
    fn test_tag_mismatch_is_detected() {
        let (mut data, index) = build(80, 73, b'N');
        // the record described by slot 57 now starts with an R
        data[56 * 73] = b'R';
        assert_matches!(validate(&index, &data), Err(DpowError::IndexMismatch(_)));
    }

    #[test]
    fn test_partial_index_covers_a_prefix() {
        let (data, index) = build(30, 13, b'T');
        let scan = validate(&index[..4 * 21], &data).unwrap();
        assert_eq!(scan.end, 20 * 13);
        assert_eq!(scan.counter, 21);
    }

    #[test]
    fn test_invalid_shapes() {
        let (data, index) = build(3, 13, b'T');
        assert_matches!(validate(&index[..6], &data), Err(DpowError::IndexMismatch(_)));
        assert_matches!(validate(&[], &data), Err(DpowError::IndexMismatch(_)));
        assert_matches!(validate(&index, &data[..20]), Err(DpowError::IndexMismatch(_)));
    }

    #[test]
    fn test_resume_appends_after_last_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("komodostate.ind");
        let mut data = Vec::new();
        let mut index = StateIndex::create(&path).unwrap();
        for _ in 0..3 {
            data.extend_from_slice(&[b'K', 0, 0, 0, 0, 0, 0, 0, 0]);
            index.update(data.len() as u64, b'K').unwrap();
        }
        index.flush().unwrap();
        drop(index);

        let scan = validate(&std::fs::read(&path).unwrap(), &data).unwrap();
        let mut index = StateIndex::resume(&path, &scan).unwrap();
        data.extend_from_slice(&[b'B', 0, 0, 0, 0]);
        index.update(data.len() as u64, b'B').unwrap();
        index.flush().unwrap();
        assert_eq!(index.counter(), 5);

        let scan = validate(&std::fs::read(&path).unwrap(), &data).unwrap();
        assert_eq!(scan.records.last().unwrap().tag, b'B');
        assert_eq!(scan.end, data.len() as u64);
    }
}
