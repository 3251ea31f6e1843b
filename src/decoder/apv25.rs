//! SRS/APV25 frames (57631)
//!
//! Only a single FEC in a single crate is supported: hybrids are told apart
//! by their hybrid id alone, and the FEC id is read but not used.
//!
//! Decoding runs in two passes. First the byte-swapped word stream is split
//! into per-hybrid sample buffers, then each buffer is scanned for APV
//! frames (3 header samples, 8 address samples, 1 error sample, then one
//! sample per channel) and every frame is common-mode corrected.

use std::collections::BTreeMap;

use crate::common::{AdcPayload, DigitizationRecord};
use crate::composite::CompositeError;
use crate::evio::EvioNode;

mod constants {
    /// `ADC` marker in bits 8..32 of a hybrid header word
    pub const HYBRID_MARKER: u32 = 0x41_4443;
    pub const END_OF_DATA: u32 = 0xFAFA_FAFA;
    /// Samples below this value are frame header candidates
    pub const HEADER_THRESHOLD: i16 = 1500;
    /// 3 header + 8 address + 1 error sample
    pub const FRAME_PREAMBLE: usize = 12;
    pub const CHANNELS: usize = 128;
    /// Buffers above this size at a repeated header are reported
    pub const MIN_BUFFER_LENGTH: usize = 64;
    /// Smallest samples excluded from the common-mode mean
    pub const CM_DROP_LOWEST: usize = 5;
    /// Hybrid slots where only half of the channels see the detector
    pub const UPPER_HALF_SLOT: i32 = 0;
    pub const LOWER_HALF_SLOT: i32 = 6;
}

use constants::CHANNELS;

/// Split one data word into its two samples
pub fn word_samples(word: u32) -> [i16; 2] {
    let hi = ((word >> 16) & 0xffff) as u16;
    let lo = (word & 0xffff) as u16;
    [hi.swap_bytes() as i16, lo.swap_bytes() as i16]
}

/// Split the swapped word stream into sample buffers per hybrid id
pub fn hybrid_buffers(words: &[u32]) -> BTreeMap<i32, Vec<i16>> {
    let mut buffers: BTreeMap<i32, Vec<i16>> = BTreeMap::new();
    let mut current: Option<i32> = None;
    let mut orphan_words = 0usize;

    let mut i = 0;
    while i < words.len() {
        let next = words.get(i + 1).copied();
        match next {
            Some(w) if (w >> 8) & 0xff_ffff == constants::HYBRID_MARKER => {
                let hybrid = (w & 0xff) as i32;
                let fec = words.get(i + 2).map(|f| (f >> 16) & 0xff);
                if buffers
                    .get(&hybrid)
                    .is_some_and(|b| b.len() > constants::MIN_BUFFER_LENGTH)
                {
                    tracing::warn!(hybrid, "Duplicate entry for the same APV hybrid");
                }
                tracing::trace!(hybrid, ?fec, "APV hybrid header");
                buffers.insert(hybrid, Vec::new());
                current = Some(hybrid);
                i += 3;
                continue;
            }
            _ => {}
        }

        match current.and_then(|h| buffers.get_mut(&h)) {
            Some(buffer) => buffer.extend_from_slice(&word_samples(words[i])),
            None => orphan_words += 1,
        }
        i += if next == Some(constants::END_OF_DATA) { 2 } else { 1 };
    }

    if orphan_words > 0 {
        tracing::warn!(words = orphan_words, "Ignoring APV data before the first hybrid header");
    }
    buffers
}

/// Whether channel `ich` of the given slot contributes to the common mode
fn in_common_mode(slot: i32, ich: usize) -> bool {
    let strip = (32 * (ich % 4) + 8 * (ich / 4)) as i64 - 31 * (ich / 16) as i64;
    match slot {
        constants::UPPER_HALF_SLOT => strip >= 64,
        constants::LOWER_HALF_SLOT => strip < 64,
        _ => true,
    }
}

/// Trimmed mean of one frame's contributing samples
pub fn common_mode(slot: i32, frame: &[i16]) -> f64 {
    let mut selected: Vec<i32> = frame
        .iter()
        .enumerate()
        .filter(|(ich, _)| in_common_mode(slot, *ich))
        .map(|(_, &s)| s as i32)
        .collect();
    selected.sort_unstable();
    let kept = &selected[constants::CM_DROP_LOWEST.min(selected.len())..];
    if kept.is_empty() {
        return 0.0;
    }
    kept.iter().map(|&s| s as f64).sum::<f64>() / kept.len() as f64
}

/// Common-mode corrected frames of one hybrid buffer, in time-sample order
pub fn frames(slot: i32, buffer: &[i16]) -> Vec<[i32; CHANNELS]> {
    let mut out = Vec::new();
    let threshold = constants::HEADER_THRESHOLD;
    let mut i = 0;
    while i + 3 < buffer.len() {
        let is_header = buffer[i] < threshold && buffer[i + 1] < threshold && buffer[i + 2] < threshold;
        let start = i + constants::FRAME_PREAMBLE;
        if !is_header || start + CHANNELS > buffer.len() {
            i += 1;
            continue;
        }
        let frame = &buffer[start..start + CHANNELS];
        let cm = common_mode(slot, frame);
        let mut corrected = [0i32; CHANNELS];
        for (c, &raw) in corrected.iter_mut().zip(frame) {
            *c = (raw as f64 - cm) as i32;
        }
        out.push(corrected);
        i = start + CHANNELS;
    }
    out
}

/// 57631: one record per hybrid channel, one ADC payload per time sample
pub fn decode_srs<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let words: Vec<u32> = node.words().into_iter().map(u32::swap_bytes).collect();
    for (slot, buffer) in hybrid_buffers(&words) {
        let mut records: Vec<DigitizationRecord> = (0..CHANNELS)
            .map(|ich| DigitizationRecord::new(crate_id, slot, ich as i32))
            .collect();
        for (ts, frame) in frames(slot, &buffer).iter().enumerate() {
            for (record, &integral) in records.iter_mut().zip(frame.iter()) {
                record.adc.push(AdcPayload {
                    integral,
                    pedestal: ts as i16,
                    ..Default::default()
                });
            }
        }
        out.extend(records);
    }
    Ok(())
}
