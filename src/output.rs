//! Decoded event batches and their serialized forms
//!
//! A [`DecodedEvent`] bundles the records of one event with the decoder state
//! readable after the decode call. Events are written either as JSON lines or
//! as MessagePack frames, each frame prefixed with its length (u32, little
//! endian).

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::DigitizationRecord;
use crate::decoder::{CodaDecoder, HelicityBit, HelicityDecoderRecord};

/// Output errors
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame length {declared} exceeds the remaining {available} bytes")]
    TruncatedFrame { declared: usize, available: usize },
}

/// One decoded event with its run/trigger context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub run: i32,
    pub event: i32,
    pub unix_time: i32,
    /// Synchronized TI timestamp, -1 when unknown
    pub timestamp: i64,
    pub trigger_bits: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_words: Option<[u32; 3]>,
    pub helicity_level3: HelicityBit,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub epics: BTreeMap<String, f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helicity_decoder: Option<HelicityDecoderRecord>,
    pub records: Vec<DigitizationRecord>,
}

impl DecodedEvent {
    /// Snapshot the decoder state after `decode_event` returned `records`
    pub fn from_decoder(decoder: &CodaDecoder, records: Vec<DigitizationRecord>) -> Self {
        Self {
            run: decoder.run_number(),
            event: decoder.event_number(),
            unix_time: decoder.unix_time(),
            timestamp: decoder.timestamp(),
            trigger_bits: decoder.trigger_bits(),
            trigger_words: decoder.trigger_words(),
            helicity_level3: decoder.helicity_level3(),
            epics: decoder.epics().clone(),
            helicity_decoder: decoder.helicity_decoder().cloned(),
            records,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, OutputError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(data: &[u8]) -> Result<Self, OutputError> {
        Ok(rmp_serde::from_slice(data)?)
    }

    pub fn to_json(&self) -> Result<String, OutputError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write one length-prefixed MessagePack frame, returning the bytes written
    pub fn write_frame<W: Write>(&self, writer: &mut W) -> Result<usize, OutputError> {
        let bytes = self.to_msgpack()?;
        let len = bytes.len() as u32;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&bytes)?;
        Ok(4 + bytes.len())
    }

    /// Read the next frame, `None` at a clean end of stream
    pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Self>, OutputError> {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mut data = Vec::with_capacity(len.min(1 << 20));
        reader.take(len as u64).read_to_end(&mut data)?;
        if data.len() < len {
            return Err(OutputError::TruncatedFrame {
                declared: len,
                available: data.len(),
            });
        }
        Self::from_msgpack(&data).map(Some)
    }
}
