// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Decoding of notarization payloads carried by `OP_RETURN` outputs.
//!
//! Payload layout, offsets relative to the first pushed byte:
//!
//! ```text
//! current format (own symbol found at 68):
//!   block_hash[32] notarized_height:i32 dest_txid[32] symbol\0 [MoM[32] MoM_depth:i32 [CCid:u32 [MoMoM]]]
//! legacy format:
//!   block_hash[32] notarized_height:i32 symbol\0 [MoM[32] MoM_depth:i32 [CCid:u32 [MoMoM]]]
//! MoMoM:
//!   kmd_start_i:i32 kmd_end_i:i32 MoMoM[32] MoMoM_depth:i32 numpairs:i32 (height:i32 offset:i32)[numpairs]
//! ```

use dpow_hash::hash::Hash256;
use dpow_models::constants::{MAX_SYMBOL_LEN, MIN_NOTARIZATION_LEN};
use dpow_models::notarization::{MoMData, MoMoMData, MoMoMPair, MOM_DEPTH_MASK};
use dpow_models::script::decode_op_return;
use tracing::debug;

const HASH_LEN: usize = 32;
/// Offset of the own symbol in the current format
const MATCHED_NAME_OFFSET: usize = 2 * HASH_LEN + 4;
/// Size of the fixed part of a MoMoM aggregate
const MOMOM_HEADER_LEN: usize = 48;

/// Notarization decoded from the second output of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotarizationCandidate {
    /// payload follows the current format, with the own symbol at offset 68
    pub matched: bool,
    /// chain the notarization is recorded for
    pub symbol: String,
    /// notarized height
    pub notarized_height: i32,
    /// notarized block hash
    pub source_block_hash: Hash256,
    /// destination txid, zero in the legacy format
    pub dest_txid: Hash256,
    /// MoM extension, dropped when zero or deeper than the notarized height
    pub mom: Option<MoMData>,
    /// MoMoM aggregate, dropped unless its pairs fill the payload exactly
    pub momom: Option<MoMoMData>,
    /// pushed payload length
    pub payload_len: usize,
}

impl NotarizationCandidate {
    /// MoM that may replace the last notarized MoM
    pub fn usable_mom(&self) -> Option<&MoMData> {
        self.mom.as_ref().filter(|mom| mom.depth() > 0)
    }
}

/// What a notarization-sized `OP_RETURN` payload holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpReturnKind {
    /// notarization found in output 1
    Notarization(NotarizationCandidate),
    /// current-format payload with a zero block hash outside output 1
    Ratification,
    /// any other payload naming a chain
    Other,
}

/// Parser bound to the symbol of the chain this node runs
#[derive(Debug, Clone)]
pub struct NotarizationParser {
    own_symbol: String,
    own_is_home: bool,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining_fits(&self, len: usize) -> bool {
        self.pos + len <= self.data.len()
    }

    fn hash(&mut self) -> Option<Hash256> {
        let bytes = self.data.get(self.pos..self.pos + HASH_LEN)?;
        self.pos += HASH_LEN;
        Hash256::from_slice(bytes).ok()
    }

    fn i32(&mut self) -> Option<i32> {
        let bytes = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.i32().map(|value| value as u32)
    }
}

impl NotarizationParser {
    /// Parser for a node running `own_symbol`
    pub fn new(own_symbol: &str, own_is_home: bool) -> Self {
        NotarizationParser {
            own_symbol: own_symbol.to_string(),
            own_is_home,
        }
    }

    /// Whether the own symbol, NUL terminated, starts at `offset` of the script
    fn own_name_at(&self, script: &[u8], offset: usize) -> bool {
        let name = self.own_symbol.as_bytes();
        offset + name.len() < script.len()
            && &script[offset..offset + name.len()] == name
            && script[offset + name.len()] == 0
    }

    /// Symbol starting at `offset` of the script, up to a NUL or the end of the script.
    ///
    /// Returns the symbol as text with the number of raw bytes it spans.
    fn name_at(script: &[u8], offset: usize) -> (String, usize) {
        let bytes = script.get(offset..).unwrap_or_default();
        let len = bytes
            .iter()
            .take(MAX_SYMBOL_LEN)
            .take_while(|b| **b != 0)
            .count();
        (String::from_utf8_lossy(&bytes[..len]).into_owned(), len)
    }

    /// Decode the payload of `script`, found at output `vout_index`.
    ///
    /// Returns `None` for scripts that cannot carry a notarization: not an `OP_RETURN`, a push
    /// running past the script, a payload shorter than 34 bytes or one naming no chain.
    pub fn parse(&self, script: &[u8], vout_index: usize) -> Option<OpReturnKind> {
        let push = decode_op_return(script)?;
        let payload = push.data;
        if payload.len() < MIN_NOTARIZATION_LEN {
            return None;
        }
        let matched = self.own_name_at(script, push.offset + MATCHED_NAME_OFFSET);
        let offset = HASH_LEN * (1 + usize::from(matched)) + 4;
        let (symbol, symbol_len) = Self::name_at(script, push.offset + offset);
        if symbol_len == 0 {
            return None;
        }
        if vout_index == 1 && payload.len() >= offset {
            return self
                .read_notarization(payload, matched, offset + symbol_len + 1, symbol)
                .map(OpReturnKind::Notarization);
        }
        if matched
            && payload.len() >= MATCHED_NAME_OFFSET
            && payload[..HASH_LEN].iter().all(|b| *b == 0)
        {
            return Some(OpReturnKind::Ratification);
        }
        Some(OpReturnKind::Other)
    }

    fn read_notarization(
        &self,
        payload: &[u8],
        matched: bool,
        extension_offset: usize,
        symbol: String,
    ) -> Option<NotarizationCandidate> {
        let mut cursor = Cursor {
            data: payload,
            pos: 0,
        };
        let source_block_hash = cursor.hash()?;
        let notarized_height = cursor.i32()?;
        let dest_txid = if matched {
            cursor.hash()?
        } else {
            Hash256::zero()
        };
        cursor.pos = extension_offset;
        let mut candidate = NotarizationCandidate {
            matched,
            symbol,
            notarized_height,
            source_block_hash,
            dest_txid,
            mom: None,
            momom: None,
            payload_len: payload.len(),
        };
        if !cursor.remaining_fits(HASH_LEN + 4) {
            return Some(candidate);
        }
        let mom = cursor.hash()?;
        let mom_depth = cursor.i32()?;
        let mut ccid = None;
        if cursor.remaining_fits(4) {
            ccid = cursor.u32();
            if !self.own_is_home {
                candidate.momom = self.read_momom(&mut cursor, &candidate.symbol);
            }
        }
        let depth = mom_depth & MOM_DEPTH_MASK;
        if mom.is_zero() || depth > notarized_height {
            debug!(
                "{}: dropping MoM of notarization {} (depth {})",
                candidate.symbol, notarized_height, depth
            );
        } else {
            candidate.mom = Some(MoMData {
                mom,
                mom_depth,
                ccid,
            });
        }
        Some(candidate)
    }

    fn read_momom(&self, cursor: &mut Cursor, symbol: &str) -> Option<MoMoMData> {
        if !cursor.remaining_fits(MOMOM_HEADER_LEN) || symbol != self.own_symbol {
            return None;
        }
        let kmd_start_i = cursor.i32()?;
        let kmd_end_i = cursor.i32()?;
        let momom = cursor.hash()?;
        let momom_depth = cursor.i32()?;
        let num_pairs = cursor.i32()?;
        let pairs_len = usize::try_from(num_pairs).ok()?.checked_mul(8)?;
        if cursor.pos + pairs_len != cursor.data.len() {
            debug!(
                "{}: discarding MoMoM, {} pairs do not fill the {} remaining bytes",
                symbol,
                num_pairs,
                cursor.data.len() - cursor.pos
            );
            return None;
        }
        let mut pairs = Vec::with_capacity(num_pairs as usize);
        for _ in 0..num_pairs {
            pairs.push(MoMoMPair {
                notarized_height: cursor.i32()?,
                momom_offset: cursor.i32()?,
            });
        }
        Some(MoMoMData {
            kmd_start_i,
            kmd_end_i,
            momom,
            momom_depth,
            pairs,
        })
    }
}

/// Builders of notarization payloads
#[cfg(any(test, feature = "test-exports"))]
pub mod builders {
    use dpow_hash::hash::Hash256;

    /// Notarization payload for `symbol`, in the legacy format when `dest_txid` is `None`
    pub fn notarization_payload(
        block_hash: &Hash256,
        notarized_height: i32,
        dest_txid: Option<&Hash256>,
        symbol: &str,
    ) -> Vec<u8> {
        let mut payload = block_hash.to_bytes().to_vec();
        payload.extend_from_slice(&notarized_height.to_le_bytes());
        if let Some(txid) = dest_txid {
            payload.extend_from_slice(&txid.to_bytes());
        }
        payload.extend_from_slice(symbol.as_bytes());
        payload.push(0);
        payload
    }

    /// Append a MoM extension
    pub fn with_mom(mut payload: Vec<u8>, mom: &Hash256, mom_depth: i32, ccid: Option<u32>) -> Vec<u8> {
        payload.extend_from_slice(&mom.to_bytes());
        payload.extend_from_slice(&mom_depth.to_le_bytes());
        if let Some(ccid) = ccid {
            payload.extend_from_slice(&ccid.to_le_bytes());
        }
        payload
    }

    /// Append a MoMoM aggregate declaring `num_pairs` pairs and holding `pairs`
    pub fn with_momom(mut payload: Vec<u8>, num_pairs: i32, pairs: &[(i32, i32)]) -> Vec<u8> {
        payload.extend_from_slice(&100i32.to_le_bytes());
        payload.extend_from_slice(&110i32.to_le_bytes());
        payload.extend_from_slice(&Hash256::compute_from(b"momom").to_bytes());
        payload.extend_from_slice(&10i32.to_le_bytes());
        payload.extend_from_slice(&num_pairs.to_le_bytes());
        for (height, offset) in pairs {
            payload.extend_from_slice(&height.to_le_bytes());
            payload.extend_from_slice(&offset.to_le_bytes());
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::builders::*;
    use super::*;
    use assert_matches::assert_matches;
    use dpow_models::script::op_return_script;

    fn block_hash() -> Hash256 {
        Hash256::compute_from(b"notarized block")
    }

    #[test]
    fn test_short_payload_is_not_a_notarization() {
        let mut script = vec![0x6a, 0x20];
        script.extend_from_slice(&[0u8; 32]);
        script.push(0x04);
        script.extend_from_slice(&1000i32.to_le_bytes());
        let parser = NotarizationParser::new("DOC", false);
        assert_eq!(parser.parse(&script, 1), None);
        // a push longer than the script
        let mut truncated = op_return_script(&[1u8; 80]);
        truncated.truncate(60);
        assert_eq!(parser.parse(&truncated, 1), None);
    }

    #[test]
    fn test_current_format() {
        let txid = Hash256::compute_from(b"kmd tx");
        let payload = notarization_payload(&block_hash(), 1234, Some(&txid), "DOC");
        let parser = NotarizationParser::new("DOC", false);
        let candidate = assert_matches!(
            parser.parse(&op_return_script(&payload), 1),
            Some(OpReturnKind::Notarization(candidate)) => candidate
        );
        assert!(candidate.matched);
        assert_eq!(candidate.symbol, "DOC");
        assert_eq!(candidate.notarized_height, 1234);
        assert_eq!(candidate.source_block_hash, block_hash());
        assert_eq!(candidate.dest_txid, txid);
        assert_eq!(candidate.mom, None);
        assert_eq!(candidate.momom, None);
    }

    #[test]
    fn test_legacy_format() {
        let payload = notarization_payload(&block_hash(), 77, None, "MARTY");
        let parser = NotarizationParser::new("DOC", false);
        let candidate = assert_matches!(
            parser.parse(&op_return_script(&payload), 1),
            Some(OpReturnKind::Notarization(candidate)) => candidate
        );
        assert!(!candidate.matched);
        assert_eq!(candidate.symbol, "MARTY");
        assert_eq!(candidate.notarized_height, 77);
        assert!(candidate.dest_txid.is_zero());
    }

    #[test]
    fn test_extension_follows_raw_symbol_bytes() {
        let mom = Hash256::compute_from(b"mom");
        let mut payload = block_hash().to_bytes().to_vec();
        payload.extend_from_slice(&1234i32.to_le_bytes());
        payload.extend_from_slice(&[0xff, 0xfe, b'X', 0]);
        let payload = with_mom(payload, &mom, 10, Some(7));
        let parser = NotarizationParser::new("DOC", false);
        let candidate = assert_matches!(
            parser.parse(&op_return_script(&payload), 1),
            Some(OpReturnKind::Notarization(candidate)) => candidate
        );
        assert!(!candidate.matched);
        assert_eq!(candidate.symbol, "\u{fffd}\u{fffd}X");
        assert_eq!(
            candidate.mom,
            Some(MoMData {
                mom,
                mom_depth: 10,
                ccid: Some(7)
            })
        );
    }

    #[test]
    fn test_mom_validation() {
        let txid = Hash256::compute_from(b"kmd tx");
        let mom = Hash256::compute_from(b"mom");
        let parser = NotarizationParser::new("DOC", false);
        let parse = |payload: Vec<u8>| {
            assert_matches!(
                parser.parse(&op_return_script(&payload), 1),
                Some(OpReturnKind::Notarization(candidate)) => candidate
            )
        };
        let base = notarization_payload(&block_hash(), 500, Some(&txid), "DOC");

        let valid = parse(with_mom(base.clone(), &mom, 0x0002_0010, Some(7)));
        let data = valid.mom.unwrap();
        assert_eq!((data.depth(), data.ccid), (16, Some(7)));
        assert!(valid.usable_mom().is_some());

        let too_deep = parse(with_mom(base.clone(), &mom, 501, None));
        assert_eq!(too_deep.mom, None);
        let zero = parse(with_mom(base.clone(), &Hash256::zero(), 10, None));
        assert_eq!(zero.mom, None);
        let flat = parse(with_mom(base, &mom, 0, None));
        assert!(flat.mom.is_some());
        assert!(flat.usable_mom().is_none());
    }

    #[test]
    fn test_momom_pairs_must_fill_payload() {
        let txid = Hash256::compute_from(b"kmd tx");
        let mom = Hash256::compute_from(b"mom");
        let parser = NotarizationParser::new("DOC", false);
        let base = with_mom(
            notarization_payload(&block_hash(), 500, Some(&txid), "DOC"),
            &mom,
            20,
            Some(1),
        );

        let exact = with_momom(base.clone(), 2, &[(480, 0), (490, 1)]);
        let candidate = assert_matches!(
            parser.parse(&op_return_script(&exact), 1),
            Some(OpReturnKind::Notarization(candidate)) => candidate
        );
        assert_eq!(candidate.momom.unwrap().pairs.len(), 2);

        let short = with_momom(base, 3, &[(480, 0), (490, 1)]);
        let candidate = assert_matches!(
            parser.parse(&op_return_script(&short), 1),
            Some(OpReturnKind::Notarization(candidate)) => candidate
        );
        assert_eq!(candidate.momom, None);
        assert_eq!(candidate.notarized_height, 500);
        assert_eq!(candidate.usable_mom().unwrap().mom, mom);

        // the backing chain never reads MoMoM data
        let home = NotarizationParser::new("DOC", true);
        let candidate = assert_matches!(
            home.parse(&op_return_script(&exact), 1),
            Some(OpReturnKind::Notarization(candidate)) => candidate
        );
        assert_eq!(candidate.momom, None);
    }

    #[test]
    fn test_ratification_and_other_outputs() {
        let parser = NotarizationParser::new("KMD", true);
        let payload =
            notarization_payload(&Hash256::zero(), 0, Some(&Hash256::compute_from(b"x")), "KMD");
        let script = op_return_script(&payload);
        assert_eq!(parser.parse(&script, 2), Some(OpReturnKind::Ratification));
        let payload = notarization_payload(&block_hash(), 10, Some(&block_hash()), "KMD");
        assert_eq!(
            parser.parse(&op_return_script(&payload), 0),
            Some(OpReturnKind::Other)
        );
        assert_eq!(parser.parse(&op_return_script(&[0u8; 40]), 1), None);
    }
}
