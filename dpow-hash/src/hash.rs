// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::DpowHashError;
use crate::settings::{HASH160_SIZE_BYTES, HASH_SIZE_BYTES};
use dpow_serialization::{Deserializer, SerializeError, Serializer};
use nom::{
    bytes::streaming::take,
    error::{context, ContextError, ParseError},
    IResult,
};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::{convert::TryInto, str::FromStr};

/// 256-bit value stored in wire (little-endian) order.
///
/// Block hashes, transaction ids and Merkle roots are all carried as `Hash256`.
/// Like the node's block explorer output, the hex form is the byte-reversed wire order.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Default)]
pub struct Hash256([u8; HASH_SIZE_BYTES]);

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Hash256 {
    /// The all-zero value
    pub const fn zero() -> Self {
        Hash256([0u8; HASH_SIZE_BYTES])
    }

    /// True when every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Double SHA-256 of `data`.
    ///
    /// # Example
    ///  ```
    /// # use dpow_hash::hash::Hash256;
    /// let hash = Hash256::compute_from(&"hello world".as_bytes());
    /// assert!(!hash.is_zero());
    /// ```
    pub fn compute_from(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        Hash256(Sha256::digest(first).into())
    }

    /// Wire-order bytes
    pub fn to_bytes(&self) -> [u8; HASH_SIZE_BYTES] {
        self.0
    }

    /// Convert into wire-order bytes
    pub fn into_bytes(self) -> [u8; HASH_SIZE_BYTES] {
        self.0
    }

    /// Build from wire-order bytes
    pub const fn from_bytes(data: &[u8; HASH_SIZE_BYTES]) -> Self {
        Hash256(*data)
    }

    /// Build from a wire-order slice of exactly 32 bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, DpowHashError> {
        let bytes: [u8; HASH_SIZE_BYTES] = data.try_into().map_err(|_| {
            DpowHashError::ParsingError(format!(
                "expected {} bytes, got {}",
                HASH_SIZE_BYTES,
                data.len()
            ))
        })?;
        Ok(Hash256(bytes))
    }

    /// Byte-reversed hex form
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }

    /// Parse the byte-reversed hex form.
    ///
    /// # Example
    ///  ```
    /// # use dpow_hash::hash::Hash256;
    /// let hash = Hash256::compute_from(&"hello world".as_bytes());
    /// let parsed = Hash256::from_hex(&hash.to_hex()).unwrap();
    /// assert_eq!(hash, parsed);
    /// ```
    pub fn from_hex(data: &str) -> Result<Self, DpowHashError> {
        let mut bytes: [u8; HASH_SIZE_BYTES] = [0u8; HASH_SIZE_BYTES];
        hex::decode_to_slice(data, &mut bytes)
            .map_err(|err| DpowHashError::ParsingError(format!("{}", err)))?;
        bytes.reverse();
        Ok(Hash256(bytes))
    }
}

impl FromStr for Hash256 {
    type Err = DpowHashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash256::from_hex(s)
    }
}

impl ::serde::Serialize for Hash256 {
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(&self.to_hex())
        } else {
            s.serialize_bytes(&self.0)
        }
    }
}

impl<'de> ::serde::Deserialize<'de> for Hash256 {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<Hash256, D::Error> {
        if d.is_human_readable() {
            struct HexVisitor;

            impl<'de> ::serde::de::Visitor<'de> for HexVisitor {
                type Value = Hash256;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("a 64 character hex string")
                }

                fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Hash256::from_hex(v).map_err(E::custom)
                }
            }
            d.deserialize_str(HexVisitor)
        } else {
            struct BytesVisitor;

            impl<'de> ::serde::de::Visitor<'de> for BytesVisitor {
                type Value = Hash256;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("a bytestring")
                }

                fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Hash256::from_slice(v).map_err(E::custom)
                }
            }

            d.deserialize_bytes(BytesVisitor)
        }
    }
}

/// Serializer for `Hash256`
#[derive(Default, Clone)]
pub struct Hash256Serializer;

impl Hash256Serializer {
    /// Creates a serializer for `Hash256`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<Hash256> for Hash256Serializer {
    fn serialize(&self, value: &Hash256, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend_from_slice(&value.0);
        Ok(())
    }
}

/// Deserializer for `Hash256`
#[derive(Default, Clone)]
pub struct Hash256Deserializer;

impl Hash256Deserializer {
    /// Creates a deserializer for `Hash256`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<Hash256> for Hash256Deserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Hash256, E> {
        context("Failed Hash256 deserialization", |input: &'a [u8]| {
            let (rest, bytes) = take(HASH_SIZE_BYTES)(input)?;
            let mut hash = [0u8; HASH_SIZE_BYTES];
            hash.copy_from_slice(bytes);
            Ok((rest, Hash256(hash)))
        })(buffer)
    }
}

/// RIPEMD-160 of SHA-256, used to match pay-to-pubkey-hash scripts against notary keys
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Default)]
pub struct Hash160([u8; HASH160_SIZE_BYTES]);

impl Hash160 {
    /// Compute `ripemd160(sha256(data))`
    pub fn compute_from(data: &[u8]) -> Self {
        let sha = Sha256::digest(data);
        Hash160(Ripemd160::digest(sha).into())
    }

    /// Digest bytes
    pub fn to_bytes(&self) -> [u8; HASH160_SIZE_BYTES] {
        self.0
    }

    /// Compare against a raw 20 byte slice
    pub fn matches(&self, data: &[u8]) -> bool {
        data == self.0.as_slice()
    }
}

impl std::fmt::Display for Hash160 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpow_serialization::DeserializeError;
    use hex_literal::hex;

    #[test]
    fn test_serde_json() {
        let hash = Hash256::compute_from("hello world".as_bytes());
        let serialized = serde_json::to_string(&hash).unwrap();
        let deserialized: Hash256 = serde_json::from_str(&serialized).unwrap();
        assert_eq!(hash, deserialized)
    }

    #[test]
    fn test_double_sha256() {
        let hash = Hash256::compute_from("hello".as_bytes());
        assert_eq!(
            hex::encode(hash.to_bytes()),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test]
    fn test_display_is_reversed() {
        let mut bytes = [0u8; HASH_SIZE_BYTES];
        bytes[0] = 0xab;
        let hash = Hash256::from_bytes(&bytes);
        assert!(hash.to_string().ends_with("ab"));
        assert_eq!(Hash256::from_hex(&hash.to_string()).unwrap(), hash);
    }

    #[test]
    fn test_hash160_of_compressed_pubkey() {
        let pubkey = hex!("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798");
        let digest = Hash160::compute_from(&pubkey);
        assert_eq!(
            digest.to_bytes(),
            hex!("751e76e8199196d454941c45d1b3a323f1433bd6")
        );
    }

    #[test]
    fn test_binary_roundtrip() {
        let hash = Hash256::compute_from(&[1, 2, 3]);
        let mut buffer = Vec::new();
        Hash256Serializer::new().serialize(&hash, &mut buffer).unwrap();
        let (rest, parsed) = Hash256Deserializer::new()
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, hash);
    }
}
