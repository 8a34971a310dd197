// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Binary (de)serialization traits shared by the dPoW crates.
//!
//! Deserializers are nom parsers built from *streaming* primitives: when the input is
//! too short they return `nom::Err::Incomplete` instead of a hard error. In-memory
//! callers treat that as truncation, stream-backed callers read more bytes and retry.

#![warn(missing_docs)]

use displaydoc::Display;
use nom::{
    error::{context, ContextError, ErrorKind, ParseError},
    IResult,
};
use std::{
    fmt,
    ops::{Bound, RangeBounds},
};
use thiserror::Error;

/// Errors raised while serializing
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone)]
pub enum SerializeError {
    /// Number {0} is too big to be serialized
    NumberTooBig(String),
    /// General error {0}
    GeneralError(String),
}

/// Trait that define the deserialize method of a type.
pub trait Deserializer<T> {
    /// Deserialize a value `T` from a buffer of `u8`.
    ///
    /// Returns the rest of the buffer and the deserialized value.
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], T, E>;
}

/// Trait that define the serialize method of a type.
pub trait Serializer<T> {
    /// Serialize a value `T` and append it to `buffer`.
    fn serialize(&self, value: &T, buffer: &mut Vec<u8>) -> Result<(), SerializeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeserializeErrorKind {
    Context(&'static str),
    Nom(ErrorKind),
}

/// Error type collecting the nom error stack with the contexts that were traversed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializeError<'a> {
    errors: Vec<(&'a [u8], DeserializeErrorKind)>,
}

impl<'a> DeserializeError<'a> {
    /// Length of the input that remained when the innermost error was raised
    pub fn remaining_len(&self) -> Option<usize> {
        self.errors.first().map(|(input, _)| input.len())
    }
}

impl<'a> ParseError<&'a [u8]> for DeserializeError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        Self {
            errors: vec![(input, DeserializeErrorKind::Nom(kind))],
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, DeserializeErrorKind::Nom(kind)));
        other
    }
}

impl<'a> ContextError<&'a [u8]> for DeserializeError<'a> {
    fn add_context(input: &'a [u8], ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, DeserializeErrorKind::Context(ctx)));
        other
    }
}

impl<'a> fmt::Display for DeserializeError<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (_, kind) in self.errors.iter().rev() {
            if let DeserializeErrorKind::Context(ctx) = kind {
                if !first {
                    write!(f, " / ")?;
                }
                write!(f, "{}", ctx)?;
                first = false;
            }
        }
        if let Some((input, DeserializeErrorKind::Nom(kind))) = self.errors.first() {
            if !first {
                write!(f, ": ")?;
            }
            write!(f, "{:?} with {} bytes left", kind, input.len())?;
        }
        Ok(())
    }
}

macro_rules! gen_fixed_int {
    ($($type:ident, $s:ident, $d:ident, $parser:ident, $ctx:expr);*) => {
        $(
            #[doc = concat!("Serializer for a little-endian fixed-width `", stringify!($type), "`")]
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $s;

            impl $s {
                #[doc = concat!("Creates a new `", stringify!($s), "`")]
                pub const fn new() -> Self {
                    Self
                }
            }

            impl Serializer<$type> for $s {
                fn serialize(&self, value: &$type, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
                    buffer.extend_from_slice(&value.to_le_bytes());
                    Ok(())
                }
            }

            #[doc = concat!("Bounded deserializer for a little-endian fixed-width `", stringify!($type), "`")]
            #[derive(Debug, Clone, Copy)]
            pub struct $d {
                range: (Bound<$type>, Bound<$type>),
            }

            impl $d {
                #[doc = concat!("Creates a new `", stringify!($d), "` accepting values within the bounds")]
                pub const fn new(min: Bound<$type>, max: Bound<$type>) -> Self {
                    Self { range: (min, max) }
                }

                #[doc = concat!("Creates a new `", stringify!($d), "` accepting any value")]
                pub const fn unbounded() -> Self {
                    Self::new(Bound::Unbounded, Bound::Unbounded)
                }
            }

            impl Deserializer<$type> for $d {
                fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
                    &self,
                    buffer: &'a [u8],
                ) -> IResult<&'a [u8], $type, E> {
                    context($ctx, |input: &'a [u8]| {
                        let (rest, value) = nom::number::streaming::$parser(input)?;
                        if !self.range.contains(&value) {
                            return Err(nom::Err::Error(E::from_error_kind(
                                input,
                                ErrorKind::TooLarge,
                            )));
                        }
                        Ok((rest, value))
                    })(buffer)
                }
            }
        )*
    };
}

gen_fixed_int!(
    u8, U8Serializer, U8Deserializer, le_u8, "Failed u8 deserialization";
    u16, U16LeSerializer, U16LeDeserializer, le_u16, "Failed u16 deserialization";
    u32, U32LeSerializer, U32LeDeserializer, le_u32, "Failed u32 deserialization";
    u64, U64LeSerializer, U64LeDeserializer, le_u64, "Failed u64 deserialization";
    i32, I32LeSerializer, I32LeDeserializer, le_i32, "Failed i32 deserialization"
);

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::ops::Bound::{Excluded, Included};

    #[test]
    fn test_fixed_ints_are_little_endian() {
        let mut buffer = Vec::new();
        U16LeSerializer::new().serialize(&0x0102, &mut buffer).unwrap();
        I32LeSerializer::new().serialize(&-2, &mut buffer).unwrap();
        assert_eq!(buffer, vec![0x02, 0x01, 0xfe, 0xff, 0xff, 0xff]);

        let (rest, value) = U16LeDeserializer::unbounded()
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert_eq!(value, 0x0102);
        let (rest, value) = I32LeDeserializer::unbounded()
            .deserialize::<DeserializeError>(rest)
            .unwrap();
        assert_eq!(value, -2);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_bounds_are_enforced() {
        let deserializer = U8Deserializer::new(Included(0), Excluded(65));
        assert_matches!(
            deserializer.deserialize::<DeserializeError>(&[64]),
            Ok((_, 64))
        );
        assert_matches!(
            deserializer.deserialize::<DeserializeError>(&[65]),
            Err(nom::Err::Error(_))
        );
    }

    #[test]
    fn test_short_input_is_incomplete() {
        assert_matches!(
            U32LeDeserializer::unbounded().deserialize::<DeserializeError>(&[1, 2]),
            Err(nom::Err::Incomplete(_))
        );
    }
}
