// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Audit file of the signer bitmasks of notarizing transactions: `height:i32 mask:u64` pairs.

use dpow_exports::DpowResult;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Size of one audit record
pub const SIGNED_MASK_RECORD_SIZE: usize = 12;

/// Lazily opened signed mask audit file
#[derive(Debug)]
pub struct SignedMasksLog {
    path: PathBuf,
    file: Option<File>,
}

impl SignedMasksLog {
    /// Audit file at `path`, opened on the first append
    pub fn new(path: &Path) -> Self {
        SignedMasksLog {
            path: path.to_path_buf(),
            file: None,
        }
    }

    /// Append one record and flush it
    pub fn append(&mut self, height: i32, signed_mask: u64) -> DpowResult<()> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                if let Some(dir) = self.path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                self.file.insert(file)
            }
        };
        let mut record = [0u8; SIGNED_MASK_RECORD_SIZE];
        record[..4].copy_from_slice(&height.to_le_bytes());
        record[4..].copy_from_slice(&signed_mask.to_le_bytes());
        file.write_all(&record)?;
        file.flush()?;
        Ok(())
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decode an audit file
pub fn read_signed_masks(path: &Path) -> DpowResult<Vec<(i32, u64)>> {
    let data = std::fs::read(path)?;
    Ok(data
        .chunks_exact(SIGNED_MASK_RECORD_SIZE)
        .map(|record| {
            let mut height = [0u8; 4];
            let mut mask = [0u8; 8];
            height.copy_from_slice(&record[..4]);
            mask.copy_from_slice(&record[4..]);
            (i32::from_le_bytes(height), u64::from_le_bytes(mask))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KMD").join("signedmasks");
        let mut log = SignedMasksLog::new(&path);
        log.append(100, 0b1011).unwrap();
        drop(log);
        let mut log = SignedMasksLog::new(&path);
        log.append(-5, u64::MAX).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 24);
        assert_eq!(
            read_signed_masks(&path).unwrap(),
            vec![(100, 0b1011), (-5, u64::MAX)]
        );
    }
}
