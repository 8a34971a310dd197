// Copyright (c) 2022 MASSA LABS <info@massa.net>

use dpow_hash::hash::Hash256;
use serde::{Deserialize, Serialize};

/// Low 16 bits of a raw MoM depth hold the depth, the high bits flag a cross-chain id
pub const MOM_DEPTH_MASK: i32 = 0xffff;

/// One entry of a MoMoM aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoMoMPair {
    /// notarized height of the aggregated MoM
    pub notarized_height: i32,
    /// position of that MoM inside the MoMoM tree
    pub momom_offset: i32,
}

/// Merkle-of-MoMs aggregate carried by notarizations back to an assetchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoMoMData {
    /// first backing-chain notarization index covered
    pub kmd_start_i: i32,
    /// last backing-chain notarization index covered
    pub kmd_end_i: i32,
    /// aggregate root
    pub momom: Hash256,
    /// number of MoMs aggregated
    pub momom_depth: i32,
    /// per-MoM offsets
    pub pairs: Vec<MoMoMPair>,
}

/// Merkle-of-Merkles extension of a notarization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoMData {
    /// MoM root
    pub mom: Hash256,
    /// raw depth word, see [`MOM_DEPTH_MASK`]
    pub mom_depth: i32,
    /// cross-chain id, when present
    pub ccid: Option<u32>,
}

impl MoMData {
    /// Number of blocks covered by the MoM
    pub fn depth(&self) -> i32 {
        self.mom_depth & MOM_DEPTH_MASK
    }
}
