// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Sequential record readers.
//!
//! Both readers drive the same [`EventDeserializer`], so a record decoded from a file stream
//! and the same bytes decoded from memory always give the same [`Event`].

use crate::error::ModelsError;
use crate::event::{Event, EventDeserializer};
use dpow_serialization::{DeserializeError, Deserializer};
use nom::Needed;
use std::io::Read;

/// An event together with its position in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// decoded event
    pub event: Event,
    /// raw tag byte as found in the log
    pub tag: u8,
    /// offset of the record start
    pub offset: u64,
    /// offset just past the record
    pub end: u64,
}

/// Cursor over a sequence of state-log records
pub trait EventSource {
    /// Decode the next record.
    ///
    /// Returns `Ok(None)` when the input ends exactly on a record boundary and a
    /// `ParseError` when it ends inside a record or the record is malformed.
    fn next_event(
        &mut self,
        deserializer: &EventDeserializer,
    ) -> Result<Option<RecordedEvent>, ModelsError>;

    /// Offset of the next record
    fn position(&self) -> u64;
}

enum Step {
    Decoded(usize, Event),
    Need(usize),
    Invalid(String),
}

fn step(deserializer: &EventDeserializer, buffer: &[u8]) -> Step {
    match deserializer.deserialize::<DeserializeError>(buffer) {
        Ok((rest, event)) => Step::Decoded(buffer.len() - rest.len(), event),
        Err(nom::Err::Incomplete(Needed::Size(needed))) => Step::Need(needed.get()),
        Err(nom::Err::Incomplete(Needed::Unknown)) => Step::Need(1),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Step::Invalid(err.to_string()),
    }
}

/// Reader over an in-memory copy of the log
pub struct SliceEventSource<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> SliceEventSource<'a> {
    /// Start reading `buffer` at `offset`
    pub fn new(buffer: &'a [u8], offset: usize) -> Self {
        Self { buffer, offset }
    }
}

impl<'a> EventSource for SliceEventSource<'a> {
    fn next_event(
        &mut self,
        deserializer: &EventDeserializer,
    ) -> Result<Option<RecordedEvent>, ModelsError> {
        let remaining = self.buffer.get(self.offset..).unwrap_or_default();
        if remaining.is_empty() {
            return Ok(None);
        }
        let offset = self.offset as u64;
        match step(deserializer, remaining) {
            Step::Decoded(len, event) => {
                self.offset += len;
                Ok(Some(RecordedEvent {
                    event,
                    tag: remaining[0],
                    offset,
                    end: self.offset as u64,
                }))
            }
            Step::Need(needed) => Err(ModelsError::ParseError {
                offset,
                message: format!("record truncated, {} more bytes expected", needed),
            }),
            Step::Invalid(message) => Err(ModelsError::ParseError { offset, message }),
        }
    }

    fn position(&self) -> u64 {
        self.offset as u64
    }
}

/// Decode exactly one record located at `buffer[*offset..*offset + length]`, advancing `offset`.
///
/// The record must fill the given window.
pub fn read_event_at(
    deserializer: &EventDeserializer,
    buffer: &[u8],
    offset: &mut usize,
    length: usize,
) -> Result<Event, ModelsError> {
    let start = *offset;
    let window = start
        .checked_add(length)
        .and_then(|end| buffer.get(start..end))
        .ok_or_else(|| ModelsError::ParseError {
            offset: start as u64,
            message: format!("window of {} bytes runs past the end of the log", length),
        })?;
    let mut source = SliceEventSource::new(window, 0);
    match source.next_event(deserializer) {
        Ok(Some(recorded)) if recorded.end as usize == length => {
            *offset += length;
            Ok(recorded.event)
        }
        Ok(Some(recorded)) => Err(ModelsError::ParseError {
            offset: start as u64,
            message: format!(
                "record spans {} bytes, window holds {}",
                recorded.end, length
            ),
        }),
        Ok(None) => Err(ModelsError::ParseError {
            offset: start as u64,
            message: "empty record window".to_string(),
        }),
        Err(ModelsError::ParseError { message, .. }) => Err(ModelsError::ParseError {
            offset: start as u64,
            message,
        }),
        Err(err) => Err(err),
    }
}

/// Reader pulling records out of a byte stream, typically a buffered log file
pub struct StreamEventSource<R: Read> {
    reader: R,
    pending: Vec<u8>,
    position: u64,
}

impl<R: Read> StreamEventSource<R> {
    /// Read records from `reader`, whose first byte sits at `position` in the log
    pub fn new(reader: R, position: u64) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            position,
        }
    }

    fn fill(&mut self, wanted: usize) -> Result<usize, ModelsError> {
        let read = (&mut self.reader)
            .take(wanted as u64)
            .read_to_end(&mut self.pending)?;
        Ok(read)
    }
}

impl<R: Read> EventSource for StreamEventSource<R> {
    fn next_event(
        &mut self,
        deserializer: &EventDeserializer,
    ) -> Result<Option<RecordedEvent>, ModelsError> {
        if self.pending.is_empty() && self.fill(1)? == 0 {
            return Ok(None);
        }
        loop {
            match step(deserializer, &self.pending) {
                Step::Decoded(len, event) => {
                    let offset = self.position;
                    let tag = self.pending[0];
                    self.pending.drain(..len);
                    self.position += len as u64;
                    return Ok(Some(RecordedEvent {
                        event,
                        tag,
                        offset,
                        end: self.position,
                    }));
                }
                Step::Need(needed) => {
                    if self.fill(needed)? == 0 {
                        return Err(ModelsError::ParseError {
                            offset: self.position,
                            message: format!(
                                "record truncated, {} more bytes expected",
                                needed
                            ),
                        });
                    }
                }
                Step::Invalid(message) => {
                    return Err(ModelsError::ParseError {
                        offset: self.position,
                        message,
                    })
                }
            }
        }
    }

    fn position(&self) -> u64 {
        self.position
    }
}
