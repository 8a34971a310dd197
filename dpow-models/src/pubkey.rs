// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::constants::PUBKEY_SIZE_BYTES;
use crate::error::ModelsError;
use dpow_hash::hash::Hash160;
use dpow_serialization::{Deserializer, SerializeError, Serializer};
use nom::{
    bytes::streaming::take,
    error::{context, ContextError, ParseError},
    IResult,
};
use std::str::FromStr;

/// Compressed secp256k1 public key of a notary
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash)]
pub struct PublicKey([u8; PUBKEY_SIZE_BYTES]);

impl PublicKey {
    /// Build from raw bytes
    pub const fn from_bytes(data: &[u8; PUBKEY_SIZE_BYTES]) -> Self {
        PublicKey(*data)
    }

    /// Build from a slice of exactly 33 bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, ModelsError> {
        let bytes: [u8; PUBKEY_SIZE_BYTES] = data.try_into().map_err(|_| {
            ModelsError::InvalidPublicKey(format!("expected 33 bytes, got {}", data.len()))
        })?;
        Ok(PublicKey(bytes))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE_BYTES] {
        &self.0
    }

    /// RIPEMD-160 of SHA-256 of the key, as embedded in pay-to-pubkey-hash scripts
    pub fn hash160(&self) -> Hash160 {
        Hash160::compute_from(&self.0)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; PUBKEY_SIZE_BYTES];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|err| ModelsError::InvalidPublicKey(format!("{}: {}", s, err)))?;
        Ok(PublicKey(bytes))
    }
}

impl ::serde::Serialize for PublicKey {
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> ::serde::Deserialize<'de> for PublicKey {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<PublicKey, D::Error> {
        let encoded = String::deserialize(d)?;
        PublicKey::from_str(&encoded).map_err(::serde::de::Error::custom)
    }
}

/// Serializer for `PublicKey`
#[derive(Default, Clone)]
pub struct PublicKeySerializer;

impl PublicKeySerializer {
    /// Creates a serializer for `PublicKey`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<PublicKey> for PublicKeySerializer {
    fn serialize(&self, value: &PublicKey, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend_from_slice(&value.0);
        Ok(())
    }
}

/// Deserializer for `PublicKey`
#[derive(Default, Clone)]
pub struct PublicKeyDeserializer;

impl PublicKeyDeserializer {
    /// Creates a deserializer for `PublicKey`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<PublicKey> for PublicKeyDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], PublicKey, E> {
        context("Failed PublicKey deserialization", |input: &'a [u8]| {
            let (rest, bytes) = take(PUBKEY_SIZE_BYTES)(input)?;
            let mut key = [0u8; PUBKEY_SIZE_BYTES];
            key.copy_from_slice(bytes);
            Ok((rest, PublicKey(key)))
        })(buffer)
    }
}
