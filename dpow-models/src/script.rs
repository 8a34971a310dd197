// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::constants::PUBKEY_SIZE_BYTES;
use crate::pubkey::PublicKey;

/// `OP_RETURN`
pub const OP_RETURN: u8 = 0x6a;
/// `OP_PUSHDATA1`
pub const OP_PUSHDATA1: u8 = 0x4c;
/// `OP_PUSHDATA2`
pub const OP_PUSHDATA2: u8 = 0x4d;
/// `OP_PUSHDATA4`
pub const OP_PUSHDATA4: u8 = 0x4e;
/// `OP_CHECKSIG`
pub const OP_CHECKSIG: u8 = 0xac;

/// Length of a `<push 33> <pubkey> OP_CHECKSIG` script
pub const P2PK_SCRIPT_LEN: usize = 35;
/// Length of a pay-to-pubkey-hash script
pub const P2PKH_SCRIPT_LEN: usize = 25;

/// Payload pushed right after an `OP_RETURN`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpReturnPush<'a> {
    /// offset of the first payload byte within the script
    pub offset: usize,
    /// declared payload
    pub data: &'a [u8],
}

/// Decode `OP_RETURN <push>` and return the pushed bytes.
///
/// Returns `None` when the script is not an `OP_RETURN`, when the opcode after it is not a
/// push, or when the declared length runs past the end of the script.
pub fn decode_op_return(script: &[u8]) -> Option<OpReturnPush<'_>> {
    let (&first, rest) = script.split_first()?;
    if first != OP_RETURN {
        return None;
    }
    let (&opcode, rest) = rest.split_first()?;
    let (len, header) = match opcode {
        op if op < OP_PUSHDATA1 => (op as usize, 0),
        OP_PUSHDATA1 => (*rest.first()? as usize, 1),
        OP_PUSHDATA2 => {
            let bytes = rest.get(..2)?;
            (u16::from_le_bytes([bytes[0], bytes[1]]) as usize, 2)
        }
        OP_PUSHDATA4 => {
            let bytes = rest.get(..4)?;
            let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            (usize::try_from(len).ok()?, 4)
        }
        _ => return None,
    };
    let offset: usize = 2 + header;
    let end = offset.checked_add(len)?;
    let data = script.get(offset..end)?;
    Some(OpReturnPush { offset, data })
}

/// Public key of a `<push 33> <pubkey> OP_CHECKSIG` script
pub fn p2pk_pubkey(script: &[u8]) -> Option<&[u8]> {
    if script.len() == P2PK_SCRIPT_LEN
        && script[0] as usize == PUBKEY_SIZE_BYTES
        && script[P2PK_SCRIPT_LEN - 1] == OP_CHECKSIG
    {
        Some(&script[1..1 + PUBKEY_SIZE_BYTES])
    } else {
        None
    }
}

/// The 20 byte key hash slot of a pay-to-pubkey-hash sized script
pub fn p2pkh_hash(script: &[u8]) -> Option<&[u8]> {
    if script.len() == P2PKH_SCRIPT_LEN {
        Some(&script[3..23])
    } else {
        None
    }
}

/// Build a pay-to-pubkey script
pub fn p2pk_script(pubkey: &PublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(P2PK_SCRIPT_LEN);
    script.push(PUBKEY_SIZE_BYTES as u8);
    script.extend_from_slice(pubkey.as_bytes());
    script.push(OP_CHECKSIG);
    script
}

/// Build a pay-to-pubkey-hash script
pub fn p2pkh_script(pubkey: &PublicKey) -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&pubkey.hash160().to_bytes());
    script.extend_from_slice(&[0x88, OP_CHECKSIG]);
    script
}

/// Build `OP_RETURN <push payload>` using the smallest push opcode
pub fn op_return_script(payload: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_RETURN];
    match payload.len() {
        len if len < OP_PUSHDATA1 as usize => script.push(len as u8),
        len if len <= u8::MAX as usize => script.extend_from_slice(&[OP_PUSHDATA1, len as u8]),
        len if len <= u16::MAX as usize => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(len as u16).to_le_bytes());
        }
        len => {
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&(len as u32).to_le_bytes());
        }
    }
    script.extend_from_slice(payload);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_variants() {
        let small = op_return_script(&[7u8; 40]);
        assert_eq!(small[1], 40);
        let push = decode_op_return(&small).unwrap();
        assert_eq!((push.offset, push.data.len()), (2, 40));

        let medium = op_return_script(&[7u8; 200]);
        assert_eq!(medium[1], OP_PUSHDATA1);
        let push = decode_op_return(&medium).unwrap();
        assert_eq!((push.offset, push.data.len()), (3, 200));

        let large = op_return_script(&[7u8; 300]);
        assert_eq!(large[1], OP_PUSHDATA2);
        let push = decode_op_return(&large).unwrap();
        assert_eq!((push.offset, push.data.len()), (4, 300));

        let mut huge = vec![OP_RETURN, OP_PUSHDATA4, 3, 0, 0, 0];
        huge.extend_from_slice(&[1, 2, 3]);
        let push = decode_op_return(&huge).unwrap();
        assert_eq!((push.offset, push.data), (6, &[1u8, 2, 3][..]));
    }

    #[test]
    fn test_rejects_overlong_push_and_non_push() {
        let mut script = op_return_script(&[7u8; 40]);
        script.truncate(30);
        assert!(decode_op_return(&script).is_none());
        assert!(decode_op_return(&[OP_RETURN, 0x51]).is_none());
        assert!(decode_op_return(&[OP_RETURN]).is_none());
        assert!(decode_op_return(&[0x76, 1, 1]).is_none());
    }

    #[test]
    fn test_p2pk_detection() {
        let key = PublicKey::from_bytes(&[3u8; 33]);
        let script = p2pk_script(&key);
        assert_eq!(p2pk_pubkey(&script), Some(&key.as_bytes()[..]));
        assert!(p2pk_pubkey(&script[..34]).is_none());
        let p2pkh = p2pkh_script(&key);
        assert!(key.hash160().matches(p2pkh_hash(&p2pkh).unwrap()));
    }
}
