//! Ancillary banks: scalers, EPICS text, helicity decoder and VTP words

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::bits::BitField;
use crate::common::{mask_timestamp, DecodeError, DigitizationRecord, ScalerPayload};
use crate::evio::EvioNode;

mod scaler {
    use super::BitField;

    pub const HELICITY: BitField = BitField::bit(31);
    pub const QUARTET: BitField = BitField::bit(30);
    pub const INTERVAL: BitField = BitField::bit(29);
    pub const ID: BitField = BitField::range(24, 28);
    pub const VALUE: BitField = BitField::range(0, 23);

    /// Only the first ids of each interval are kept
    pub const MAX_ID: u32 = 3;
    pub const INTERVAL_CHANNEL_STRIDE: i32 = 32;

    /// Flat array: leading words before the first scaler
    pub const FLAT_FIRST_WORD: usize = 3;
    pub const FLAT_PER_SLOT: usize = 16;
    pub const FLAT_MAX_SLOT: usize = 4;
}

/// 57637: helicity-gated scaler words
pub fn decode_helicity_scalers<N: EvioNode>(crate_id: i32, node: &N, out: &mut Vec<DigitizationRecord>) {
    let slot = node.num() as i32;
    for word in node.words() {
        let id = scaler::ID.get(word);
        if id >= scaler::MAX_ID {
            continue;
        }
        let channel = id as i32 + scaler::INTERVAL_CHANNEL_STRIDE * scaler::INTERVAL.get(word) as i32;
        out.push(DigitizationRecord::new(crate_id, slot, channel).with_scaler(ScalerPayload {
            helicity: scaler::HELICITY.get(word) as u8,
            quartet: scaler::QUARTET.get(word) as u8,
            value: scaler::VALUE.get(word) as u64,
        }));
    }
}

/// 57621: flat scaler array, 16 counters per slot
pub fn decode_flat_scalers<N: EvioNode>(crate_id: i32, node: &N, out: &mut Vec<DigitizationRecord>) {
    let slot = node.num() as i32;
    let words = node.words();
    for (k, &word) in words.iter().enumerate().skip(scaler::FLAT_FIRST_WORD) {
        let k = k - scaler::FLAT_FIRST_WORD;
        let id = k % scaler::FLAT_PER_SLOT;
        let group = k / scaler::FLAT_PER_SLOT;
        if id >= scaler::MAX_ID as usize || group >= scaler::FLAT_MAX_SLOT {
            continue;
        }
        out.push(DigitizationRecord::new(crate_id, slot, k as i32).with_scaler(ScalerPayload {
            value: word as u64,
            ..Default::default()
        }));
    }
}

/// 57634: one record per trigger-processor word
pub fn decode_vtp<N: EvioNode>(crate_id: i32, node: &N, out: &mut Vec<DigitizationRecord>) {
    for word in node.words() {
        out.push(DigitizationRecord::new(crate_id, 0, 0).with_vtp(word));
    }
}

/// 57620: parse `value key` rows into `epics`
///
/// Rows without exactly two fields are skipped silently; rows whose value
/// is not a number are returned as diagnostics.
pub fn parse_epics(text: &str, epics: &mut BTreeMap<String, f32>) -> Vec<DecodeError> {
    let mut rejected = Vec::new();
    let is_blank = |c: char| c <= ' ';
    for row in text.trim_matches(is_blank).split('\n') {
        let cleaned = row.trim_matches(is_blank).replace("  ", " ");
        let fields: Vec<&str> = cleaned.split(' ').collect();
        let [value, key] = fields.as_slice() else {
            continue;
        };
        match value.parse::<f32>() {
            Ok(v) => {
                epics.insert(key.to_string(), v);
            }
            Err(_) => rejected.push(DecodeError::NonNumericSideChannel {
                row: row.to_string(),
            }),
        }
    }
    rejected
}

/// Text payload of an EPICS bank
pub fn epics_text<N: EvioNode>(node: &N) -> String {
    String::from_utf8_lossy(node.payload()).into_owned()
}

/// Helicity decoder board readout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelicityDecoderRecord {
    /// 48-bit board timestamp
    pub timestamp: u64,
    pub helicity: i8,
    pub pair_sync: i8,
    pub pattern_sync: i8,
    pub tsettle: i8,
    /// Helicity at the start of the pattern
    pub helicity_pattern: i8,
    pub polarity: i8,
    pub pattern_phase_count: u8,
    pub helicity_seed: i32,
    pub n_tstable_rising_edge: i32,
    pub n_tstable_falling_edge: i32,
    pub n_pattern: i32,
    pub n_pair: i32,
    pub tstable_start: i32,
    pub tstable_end: i32,
    pub tstable_time: i32,
    pub tsettle_time: i32,
    pub pattern_windows: i32,
    pub pair_windows: i32,
    pub helicity_windows: i32,
    pub helicity_pattern_windows: i32,
}

mod helicity {
    use super::BitField;

    pub const MIN_WORDS: usize = 19;
    pub const TIMESTAMP_WORD: usize = 2;
    pub const SEED_WORD: usize = 5;
    pub const STATUS_WORD: usize = 14;
    pub const PATTERN_WINDOWS_WORD: usize = 15;

    pub const TSETTLE: BitField = BitField::bit(0);
    pub const PATTERN_SYNC: BitField = BitField::bit(1);
    pub const PAIR_SYNC: BitField = BitField::bit(2);
    pub const HELICITY: BitField = BitField::bit(3);
    pub const PATTERN_START: BitField = BitField::bit(4);
    pub const POLARITY: BitField = BitField::bit(5);
    pub const PHASE_COUNT: BitField = BitField::range(8, 11);
}

/// 57651: decode the helicity board bank, `None` when it is too short
pub fn decode_helicity_decoder<N: EvioNode>(node: &N) -> Option<HelicityDecoderRecord> {
    let words = node.words();
    if words.len() < helicity::MIN_WORDS {
        return None;
    }
    let timestamp = mask_timestamp(node.long_at_word(helicity::TIMESTAMP_WORD)? as i64);
    let counters: Vec<i32> = words[helicity::SEED_WORD..helicity::STATUS_WORD]
        .iter()
        .map(|&w| w as i32)
        .collect();
    let windows: Vec<i32> = words[helicity::PATTERN_WINDOWS_WORD..helicity::MIN_WORDS]
        .iter()
        .map(|&w| w as i32)
        .collect();
    let status = words[helicity::STATUS_WORD];

    Some(HelicityDecoderRecord {
        timestamp,
        helicity: helicity::HELICITY.sign(status),
        pair_sync: helicity::PAIR_SYNC.sign(status),
        pattern_sync: helicity::PATTERN_SYNC.sign(status),
        tsettle: helicity::TSETTLE.sign(status),
        helicity_pattern: helicity::PATTERN_START.sign(status),
        polarity: helicity::POLARITY.sign(status),
        pattern_phase_count: helicity::PHASE_COUNT.get(status) as u8,
        helicity_seed: counters[0],
        n_tstable_rising_edge: counters[1],
        n_tstable_falling_edge: counters[2],
        n_pattern: counters[3],
        n_pair: counters[4],
        tstable_start: counters[5],
        tstable_end: counters[6],
        tstable_time: counters[7],
        tsettle_time: counters[8],
        pattern_windows: windows[0],
        pair_windows: windows[1],
        helicity_windows: windows[2],
        helicity_pattern_windows: windows[3],
    })
}
