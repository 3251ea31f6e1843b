//! Decoder state
//!
//! State is split by lifetime. [`PersistentState`] carries over from one
//! event to the next when an event has no header bank; [`PerEventState`] is
//! rebuilt from scratch at the start of every decode call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ancillary::HelicityDecoderRecord;
use super::sync::DesyncLog;
use crate::common::DecodeError;

/// Run number substituted when the header bank cannot be read
pub const SENTINEL_RUN: i32 = 10;
/// Event number substituted when the header bank cannot be read
pub const SENTINEL_EVENT: i32 = 1;
/// Event timestamp when crates disagree or no TI bank was seen
pub const UNSYNCED_TIMESTAMP: i64 = -1;

/// Level-3 helicity state from the header bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HelicityBit {
    Plus,
    Minus,
    /// Helicity word present but flagged as not usable
    #[default]
    Undefined,
    /// Header bank carries no helicity word
    DoesNotExist,
}

impl HelicityBit {
    pub fn value(self) -> i8 {
        match self {
            HelicityBit::Plus => 1,
            HelicityBit::Minus => -1,
            HelicityBit::Undefined => 0,
            HelicityBit::DoesNotExist => 9,
        }
    }

    /// Decode the header helicity word: bit 0 = defined, bit 1 = sign
    pub fn from_word(word: u32) -> Self {
        if word & 0x1 == 0 {
            HelicityBit::Undefined
        } else if (word >> 1) & 0x1 == 0 {
            HelicityBit::Minus
        } else {
            HelicityBit::Plus
        }
    }
}

/// State that persists across events of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    pub run_number: i32,
    pub event_number: i32,
    pub unix_time: i32,
    /// Synchronized TI timestamp of the last event, -1 if unknown
    pub timestamp: i64,
    /// Number of crate timestamp mismatches seen so far
    pub timestamp_error_count: u32,
    pub helicity_level3: HelicityBit,
    /// Crate that carried the last header bank
    pub ti_master: Option<u16>,
    /// Wide trigger words from the last 7-word TI bank
    pub trigger_words: Option<[u32; 3]>,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            run_number: 0,
            event_number: 0,
            unix_time: 0,
            timestamp: 0,
            timestamp_error_count: 0,
            helicity_level3: HelicityBit::Undefined,
            ti_master: None,
            trigger_words: None,
        }
    }
}

/// State rebuilt for every event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerEventState {
    pub trigger_bits: u64,
    /// EPICS key/value pairs of this event
    pub epics: BTreeMap<String, f32>,
    pub helicity_decoder: Option<HelicityDecoderRecord>,
    /// Bank-level problems met while decoding this event
    pub diagnostics: Vec<DecodeError>,
    /// Log output of the timestamp mismatches of this event
    pub desync_log: Vec<DesyncLog>,
}
