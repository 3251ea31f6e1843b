//! Bit-packed MicroMegas (57640) and RTPC (57641) banks
//!
//! Samples are 12 bits wide, two samples packed into three bytes. The middle
//! byte of each triplet carries the high nibbles: its low nibble belongs to
//! the first sample and its high nibble to the second.

use super::catalog::BankTag;
use super::composite_payload;
use crate::common::{mask_timestamp, AdcPayload, DigitizationRecord};
use crate::composite::{CompositeError, ItemCursor};
use crate::evio::EvioNode;

/// Unpack 12-bit samples from a packed byte array
pub fn unpack_12bit(bytes: &[u8]) -> Vec<i16> {
    let n_samples = bytes.len() * 8 / 12;
    let mut samples = vec![0i16; n_samples];
    for (b, &byte) in bytes.iter().enumerate() {
        let s = b * 2 / 3;
        if b % 3 != 1 {
            if let Some(sample) = samples.get_mut(s) {
                *sample = sample.wrapping_add(byte as i16);
            }
        } else {
            if let Some(sample) = samples.get_mut(s) {
                *sample = sample.wrapping_add(((byte & 0x0f) as i16) << 8);
            }
            if let Some(sample) = samples.get_mut(s + 1) {
                *sample = sample.wrapping_add((((byte & 0xf0) >> 4) as i16) << 8);
            }
        }
    }
    samples
}

/// Header shared by both packed layouts: slot, event id, coarse time, channel count
fn read_header(cursor: &mut ItemCursor<'_>) -> Result<(i32, i64, u32), CompositeError> {
    let slot = cursor.take_i8()? as i32;
    let _event_id = cursor.take_i32()?;
    let time = cursor.take_i64()?;
    let channels = cursor.take_repeat()?;
    Ok((slot, time, channels))
}

fn take_bytes(cursor: &mut ItemCursor<'_>, n: u32) -> Result<Vec<u8>, CompositeError> {
    (0..n).map(|_| cursor.take_i8().map(|b| b as u8)).collect()
}

/// 57640: one packed pulse per channel
pub fn decode_packed<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::MicroMegasPacked)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let (slot, time, channels) = read_header(&mut cursor)?;
        for _ in 0..channels {
            let channel = cursor.take_i16()?;
            let n_bytes = cursor.take_len()?;
            let bytes = take_bytes(&mut cursor, n_bytes)?;
            let payload = AdcPayload {
                timestamp: Some(mask_timestamp(time)),
                pulse: unpack_12bit(&bytes),
                ..Default::default()
            };
            out.push(DigitizationRecord::new(crate_id, slot, channel as i32).with_adc(payload));
        }
    }
    Ok(())
}

/// 57641: several packed pulses per channel, each with its first-sample offset
pub fn decode_rtpc<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::Rtpc)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let (slot, time, channels) = read_header(&mut cursor)?;
        for _ in 0..channels {
            let channel = cursor.take_i16()?;
            let pulses = cursor.take_repeat()?;
            for _ in 0..pulses {
                let first_sample = cursor.take_i8()?;
                let n_bytes = cursor.take_len()?;
                let bytes = take_bytes(&mut cursor, n_bytes)?;
                let payload = AdcPayload {
                    time: first_sample as i32,
                    timestamp: Some(mask_timestamp(time)),
                    pulse: unpack_12bit(&bytes),
                    ..Default::default()
                };
                out.push(DigitizationRecord::new(crate_id, slot, channel as i32).with_adc(payload));
            }
        }
    }
    Ok(())
}
