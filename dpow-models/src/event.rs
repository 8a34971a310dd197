// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! State-log events.
//!
//! Every record starts with a one byte tag and the little-endian `i32` height at which the
//! event was recorded, followed by a tag specific payload:
//!
//! | tag | payload |
//! |-----|---------|
//! | `P` | `num:u8 pubkeys[num][33]` |
//! | `N` | `notarized_height:i32 block_hash[32] dest_txid[32]` |
//! | `M` | `N` payload followed by `MoM[32] MoM_depth:i32` |
//! | `K` | `kmd_height:i32` |
//! | `T` | `kmd_height:i32 timestamp:u32` |
//! | `R` | `txid[32] vout:u16 value:u64 len:u16 opret[len]` |
//! | `V` | `num:u8 prices[num]:u32` |
//! | `U` | `n:u8 nid:u8 mask[8] hash[32]`, obsolete |
//! | `B` | nothing, written on rewinds and never replayed |

use crate::constants::{MAX_NOTARIES, MAX_OPRETURN_LEN, MAX_PRICES};
use crate::pubkey::{PublicKey, PublicKeyDeserializer, PublicKeySerializer};
use dpow_hash::hash::{Hash256, Hash256Deserializer, Hash256Serializer};
use dpow_serialization::{
    Deserializer, I32LeDeserializer, I32LeSerializer, SerializeError, Serializer,
    U16LeDeserializer, U16LeSerializer, U32LeDeserializer, U32LeSerializer, U64LeDeserializer,
    U64LeSerializer, U8Deserializer, U8Serializer,
};
use nom::{
    bytes::streaming::take,
    error::{context, ContextError, ErrorKind, ParseError},
    multi::{length_count, length_data},
    sequence::tuple,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

/// `P` tag
pub const TAG_PUBKEYS: u8 = b'P';
/// `N` tag
pub const TAG_NOTARIZED: u8 = b'N';
/// `M` tag, notarization with MoM
pub const TAG_NOTARIZED_MOM: u8 = b'M';
/// `K` tag
pub const TAG_KMD_HEIGHT: u8 = b'K';
/// `T` tag, KMD height with timestamp
pub const TAG_KMD_HEIGHT_TIMESTAMP: u8 = b'T';
/// `R` tag
pub const TAG_OPRETURN: u8 = b'R';
/// `V` tag
pub const TAG_PRICE_FEED: u8 = b'V';
/// `U` tag
pub const TAG_DEPRECATED_U: u8 = b'U';
/// `B` tag
pub const TAG_REWIND: u8 = b'B';

/// Notary set change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubkeysEvent {
    /// recording height
    pub height: i32,
    /// new notary keys, at most 64
    pub pubkeys: Vec<PublicKey>,
}

/// Notarization checkpoint, or the running notarization state at a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotarizedEvent {
    /// recording height
    pub height: i32,
    /// notarized height
    pub notarized_height: i32,
    /// notarized block hash
    pub block_hash: Hash256,
    /// notarization txid on the destination chain
    pub dest_txid: Hash256,
    /// MoM root, zero when absent
    pub mom: Hash256,
    /// raw MoM depth, zero when absent
    pub mom_depth: i32,
}

impl NotarizedEvent {
    /// Whether the record carries the MoM extension (`M` rather than `N`)
    pub fn has_mom(&self) -> bool {
        !self.mom.is_zero() || self.mom_depth != 0
    }
}

/// Backing-chain height marker.
///
/// A non-positive `kmd_height` is a rewind marker: replaying it truncates the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmdHeightEvent {
    /// recording height
    pub height: i32,
    /// backing-chain height, or the negated rewind height
    pub kmd_height: i32,
    /// backing-chain block time, zero when unknown
    pub timestamp: u32,
}

/// OP_RETURN payload recorded for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpReturnEvent {
    /// recording height
    pub height: i32,
    /// transaction id
    pub txid: Hash256,
    /// output index
    pub vout: u16,
    /// output value
    pub value: u64,
    /// payload bytes
    pub opret: Vec<u8>,
}

/// Price feed values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeedEvent {
    /// recording height
    pub height: i32,
    /// prices, at most 35
    pub prices: Vec<u32>,
}

/// Obsolete notary utxo record, decoded and then ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecatedUEvent {
    /// recording height
    pub height: i32,
    /// number of outputs
    pub n: u8,
    /// notary id
    pub nid: u8,
    /// output mask
    pub mask: [u8; 8],
    /// transaction hash
    pub hash: [u8; 32],
}

/// A state-log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// `P`
    Pubkeys(PubkeysEvent),
    /// `N` or `M`
    Notarized(NotarizedEvent),
    /// `K` or `T`
    KmdHeight(KmdHeightEvent),
    /// `R`
    OpReturn(OpReturnEvent),
    /// `V`
    PriceFeed(PriceFeedEvent),
    /// `U`
    DeprecatedU(DeprecatedUEvent),
    /// `B`, carries only the height
    WriteOnlyB {
        /// recording height
        height: i32,
    },
}

impl Event {
    /// Height at which the event was recorded
    pub fn height(&self) -> i32 {
        match self {
            Event::Pubkeys(event) => event.height,
            Event::Notarized(event) => event.height,
            Event::KmdHeight(event) => event.height,
            Event::OpReturn(event) => event.height,
            Event::PriceFeed(event) => event.height,
            Event::DeprecatedU(event) => event.height,
            Event::WriteOnlyB { height } => *height,
        }
    }

    /// Wire tag this event is written with
    pub fn tag(&self) -> u8 {
        match self {
            Event::Pubkeys(_) => TAG_PUBKEYS,
            Event::Notarized(event) if event.has_mom() => TAG_NOTARIZED_MOM,
            Event::Notarized(_) => TAG_NOTARIZED,
            Event::KmdHeight(event) if event.timestamp != 0 => TAG_KMD_HEIGHT_TIMESTAMP,
            Event::KmdHeight(_) => TAG_KMD_HEIGHT,
            Event::OpReturn(_) => TAG_OPRETURN,
            Event::PriceFeed(_) => TAG_PRICE_FEED,
            Event::DeprecatedU(_) => TAG_DEPRECATED_U,
            Event::WriteOnlyB { .. } => TAG_REWIND,
        }
    }
}

/// Serializer for `Event`
#[derive(Clone, Default)]
pub struct EventSerializer {
    u8_serializer: U8Serializer,
    u16_serializer: U16LeSerializer,
    u32_serializer: U32LeSerializer,
    u64_serializer: U64LeSerializer,
    i32_serializer: I32LeSerializer,
    hash_serializer: Hash256Serializer,
    pubkey_serializer: PublicKeySerializer,
}

impl EventSerializer {
    /// Creates a new `EventSerializer`
    pub const fn new() -> Self {
        Self {
            u8_serializer: U8Serializer::new(),
            u16_serializer: U16LeSerializer::new(),
            u32_serializer: U32LeSerializer::new(),
            u64_serializer: U64LeSerializer::new(),
            i32_serializer: I32LeSerializer::new(),
            hash_serializer: Hash256Serializer::new(),
            pubkey_serializer: PublicKeySerializer::new(),
        }
    }
}

impl Serializer<Event> for EventSerializer {
    /// ## Example
    /// ```
    /// use dpow_models::event::{Event, KmdHeightEvent, EventSerializer};
    /// use dpow_serialization::Serializer;
    ///
    /// let event = Event::KmdHeight(KmdHeightEvent { height: 10, kmd_height: 12, timestamp: 0 });
    /// let mut buffer = Vec::new();
    /// EventSerializer::new().serialize(&event, &mut buffer).unwrap();
    /// assert_eq!(buffer, vec![b'K', 10, 0, 0, 0, 12, 0, 0, 0]);
    /// ```
    fn serialize(&self, value: &Event, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.u8_serializer.serialize(&value.tag(), buffer)?;
        self.i32_serializer.serialize(&value.height(), buffer)?;
        match value {
            Event::Pubkeys(event) => {
                if event.pubkeys.len() > MAX_NOTARIES {
                    return Err(SerializeError::NumberTooBig(format!(
                        "{} pubkeys",
                        event.pubkeys.len()
                    )));
                }
                self.u8_serializer
                    .serialize(&(event.pubkeys.len() as u8), buffer)?;
                for pubkey in &event.pubkeys {
                    self.pubkey_serializer.serialize(pubkey, buffer)?;
                }
            }
            Event::Notarized(event) => {
                self.i32_serializer
                    .serialize(&event.notarized_height, buffer)?;
                self.hash_serializer.serialize(&event.block_hash, buffer)?;
                self.hash_serializer.serialize(&event.dest_txid, buffer)?;
                if event.has_mom() {
                    self.hash_serializer.serialize(&event.mom, buffer)?;
                    self.i32_serializer.serialize(&event.mom_depth, buffer)?;
                }
            }
            Event::KmdHeight(event) => {
                self.i32_serializer.serialize(&event.kmd_height, buffer)?;
                if event.timestamp != 0 {
                    self.u32_serializer.serialize(&event.timestamp, buffer)?;
                }
            }
            Event::OpReturn(event) => {
                let len = u16::try_from(event.opret.len()).map_err(|_| {
                    SerializeError::NumberTooBig(format!("opret of {} bytes", event.opret.len()))
                })?;
                self.hash_serializer.serialize(&event.txid, buffer)?;
                self.u16_serializer.serialize(&event.vout, buffer)?;
                self.u64_serializer.serialize(&event.value, buffer)?;
                self.u16_serializer.serialize(&len, buffer)?;
                buffer.extend_from_slice(&event.opret);
            }
            Event::PriceFeed(event) => {
                if event.prices.len() > MAX_PRICES {
                    return Err(SerializeError::NumberTooBig(format!(
                        "{} prices",
                        event.prices.len()
                    )));
                }
                self.u8_serializer
                    .serialize(&(event.prices.len() as u8), buffer)?;
                for price in &event.prices {
                    self.u32_serializer.serialize(price, buffer)?;
                }
            }
            Event::DeprecatedU(event) => {
                self.u8_serializer.serialize(&event.n, buffer)?;
                self.u8_serializer.serialize(&event.nid, buffer)?;
                buffer.extend_from_slice(&event.mask);
                buffer.extend_from_slice(&event.hash);
            }
            Event::WriteOnlyB { .. } => {}
        }
        Ok(())
    }
}

/// Deserializer for `Event`
#[derive(Clone)]
pub struct EventDeserializer {
    tag_deserializer: U8Deserializer,
    height_deserializer: I32LeDeserializer,
    pubkey_count_deserializer: U8Deserializer,
    price_count_deserializer: U8Deserializer,
    opret_len_deserializer: U16LeDeserializer,
    u8_deserializer: U8Deserializer,
    u16_deserializer: U16LeDeserializer,
    u32_deserializer: U32LeDeserializer,
    u64_deserializer: U64LeDeserializer,
    hash_deserializer: Hash256Deserializer,
    pubkey_deserializer: PublicKeyDeserializer,
}

impl Default for EventDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDeserializer {
    /// Creates a new `EventDeserializer`.
    ///
    /// The payload of `R` records is bounded by [`MAX_OPRETURN_LEN`].
    pub fn new() -> Self {
        let max_opreturn_len = u16::try_from(MAX_OPRETURN_LEN).unwrap_or(u16::MAX);
        Self {
            tag_deserializer: U8Deserializer::unbounded(),
            height_deserializer: I32LeDeserializer::unbounded(),
            pubkey_count_deserializer: U8Deserializer::new(
                Included(0),
                Included(MAX_NOTARIES as u8),
            ),
            price_count_deserializer: U8Deserializer::new(Included(0), Included(MAX_PRICES as u8)),
            opret_len_deserializer: U16LeDeserializer::new(Included(0), Included(max_opreturn_len)),
            u8_deserializer: U8Deserializer::unbounded(),
            u16_deserializer: U16LeDeserializer::unbounded(),
            u32_deserializer: U32LeDeserializer::unbounded(),
            u64_deserializer: U64LeDeserializer::unbounded(),
            hash_deserializer: Hash256Deserializer::new(),
            pubkey_deserializer: PublicKeyDeserializer::new(),
        }
    }

    fn payload<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        tag: u8,
        height: i32,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Event, E> {
        match tag {
            TAG_PUBKEYS => context(
                "Failed pubkeys event deserialization",
                length_count(
                    |input| self.pubkey_count_deserializer.deserialize(input),
                    |input| self.pubkey_deserializer.deserialize(input),
                ),
            )
            .map(|pubkeys| Event::Pubkeys(PubkeysEvent { height, pubkeys }))
            .parse(buffer),
            TAG_NOTARIZED => context(
                "Failed notarized event deserialization",
                tuple((
                    |input| self.height_deserializer.deserialize(input),
                    |input| self.hash_deserializer.deserialize(input),
                    |input| self.hash_deserializer.deserialize(input),
                )),
            )
            .map(|(notarized_height, block_hash, dest_txid)| {
                Event::Notarized(NotarizedEvent {
                    height,
                    notarized_height,
                    block_hash,
                    dest_txid,
                    mom: Hash256::zero(),
                    mom_depth: 0,
                })
            })
            .parse(buffer),
            TAG_NOTARIZED_MOM => context(
                "Failed notarized MoM event deserialization",
                tuple((
                    |input| self.height_deserializer.deserialize(input),
                    |input| self.hash_deserializer.deserialize(input),
                    |input| self.hash_deserializer.deserialize(input),
                    |input| self.hash_deserializer.deserialize(input),
                    |input| self.height_deserializer.deserialize(input),
                )),
            )
            .map(|(notarized_height, block_hash, dest_txid, mom, mom_depth)| {
                Event::Notarized(NotarizedEvent {
                    height,
                    notarized_height,
                    block_hash,
                    dest_txid,
                    mom,
                    mom_depth,
                })
            })
            .parse(buffer),
            TAG_KMD_HEIGHT => context("Failed kmd height event deserialization", |input| {
                self.height_deserializer.deserialize(input)
            })
            .map(|kmd_height| {
                Event::KmdHeight(KmdHeightEvent {
                    height,
                    kmd_height,
                    timestamp: 0,
                })
            })
            .parse(buffer),
            TAG_KMD_HEIGHT_TIMESTAMP => context(
                "Failed kmd height timestamp event deserialization",
                tuple((
                    |input| self.height_deserializer.deserialize(input),
                    |input| self.u32_deserializer.deserialize(input),
                )),
            )
            .map(|(kmd_height, timestamp)| {
                Event::KmdHeight(KmdHeightEvent {
                    height,
                    kmd_height,
                    timestamp,
                })
            })
            .parse(buffer),
            TAG_OPRETURN => context(
                "Failed opreturn event deserialization",
                tuple((
                    |input| self.hash_deserializer.deserialize(input),
                    |input| self.u16_deserializer.deserialize(input),
                    |input| self.u64_deserializer.deserialize(input),
                    length_data(|input| self.opret_len_deserializer.deserialize(input)),
                )),
            )
            .map(|(txid, vout, value, opret): (Hash256, u16, u64, &[u8])| {
                Event::OpReturn(OpReturnEvent {
                    height,
                    txid,
                    vout,
                    value,
                    opret: opret.to_vec(),
                })
            })
            .parse(buffer),
            TAG_PRICE_FEED => context(
                "Failed price feed event deserialization",
                length_count(
                    |input| self.price_count_deserializer.deserialize(input),
                    |input| self.u32_deserializer.deserialize(input),
                ),
            )
            .map(|prices| Event::PriceFeed(PriceFeedEvent { height, prices }))
            .parse(buffer),
            TAG_DEPRECATED_U => context(
                "Failed deprecated U event deserialization",
                tuple((
                    |input| self.u8_deserializer.deserialize(input),
                    |input| self.u8_deserializer.deserialize(input),
                    take(8usize),
                    take(32usize),
                )),
            )
            .map(|(n, nid, mask, hash): (u8, u8, &[u8], &[u8])| {
                let mut event = DeprecatedUEvent {
                    height,
                    n,
                    nid,
                    mask: [0u8; 8],
                    hash: [0u8; 32],
                };
                event.mask.copy_from_slice(mask);
                event.hash.copy_from_slice(hash);
                Event::DeprecatedU(event)
            })
            .parse(buffer),
            TAG_REWIND => Ok((buffer, Event::WriteOnlyB { height })),
            _ => Err(nom::Err::Failure(E::add_context(
                buffer,
                "Unknown event tag",
                E::from_error_kind(buffer, ErrorKind::Tag),
            ))),
        }
    }
}

impl Deserializer<Event> for EventDeserializer {
    /// ## Example
    /// ```
    /// use dpow_models::event::{Event, KmdHeightEvent, EventDeserializer};
    /// use dpow_serialization::{DeserializeError, Deserializer};
    ///
    /// let bytes = [b'T', 10, 0, 0, 0, 12, 0, 0, 0, 1, 0, 0, 0];
    /// let (rest, event) = EventDeserializer::default()
    ///     .deserialize::<DeserializeError>(&bytes)
    ///     .unwrap();
    /// assert!(rest.is_empty());
    /// assert_eq!(event, Event::KmdHeight(KmdHeightEvent { height: 10, kmd_height: 12, timestamp: 1 }));
    /// ```
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Event, E> {
        let (rest, (tag, height)) = context(
            "Failed event header deserialization",
            tuple((
                |input| self.tag_deserializer.deserialize(input),
                |input| self.height_deserializer.deserialize(input),
            )),
        )
        .parse(buffer)?;
        self.payload(tag, height, rest)
    }
}
