//! Flash-ADC pulse banks and the FSSR (SVT) bank
//!
//! All of these follow the slot-group layout: a slot header (slot, trigger,
//! coarse time, channel count) followed by the channel entries. The whole
//! layout repeats until the item stream ends.

use super::bits::BitField;
use super::catalog::BankTag;
use super::composite_payload;
use crate::common::{mask_timestamp, AdcPayload, DigitizationRecord, FadcRecord};
use crate::composite::{CompositeError, ItemCursor};
use crate::evio::EvioNode;

/// Slot header of the composite slot-group layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SlotHeader {
    pub slot: i8,
    /// Coarse time (raw, unmasked)
    pub time: i64,
    pub channels: u32,
}

impl SlotHeader {
    /// Read slot, trigger (ignored), coarse time and the channel count
    ///
    /// The channel count must be a repetition marker; anything else means
    /// the bank does not follow its schema.
    pub fn read(cursor: &mut ItemCursor<'_>) -> Result<Self, CompositeError> {
        let slot = cursor.take_i8()?;
        let _trigger = cursor.take_i32()?;
        let time = cursor.take_i64()?;
        let channels = cursor.take_repeat()?;
        Ok(Self {
            slot,
            time,
            channels,
        })
    }
}

/// 57601: full window samples per channel
pub fn decode_pulse_window<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::PulseWindow)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let header = SlotHeader::read(&mut cursor)?;
        for _ in 0..header.channels {
            let channel = cursor.take_i8()?;
            let len = cursor.take_len()?;
            let samples = cursor.take_i16_array(len)?;
            out.push(
                DigitizationRecord::new(crate_id, header.slot as i32, channel as i32)
                    .with_pulse(samples)
                    .with_timestamp(header.time),
            );
        }
    }
    Ok(())
}

/// 57602: pulse summary hits (time word, integral, min, max)
pub fn decode_pulse_summary<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::PulseSummary)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let header = SlotHeader::read(&mut cursor)?;
        for _ in 0..header.channels {
            let channel = cursor.take_i8()?;
            let hits = cursor.take_repeat()?;
            for _ in 0..hits {
                let tdc = cursor.take_i16()?;
                let adc = cursor.take_i32()?;
                let pmin = cursor.take_i16()?;
                let pmax = cursor.take_i16()?;
                let payload = AdcPayload {
                    integral: adc,
                    time_word: Some(tdc as i32),
                    pedestal: pmin,
                    height: pmax,
                    ..Default::default()
                };
                out.push(
                    DigitizationRecord::new(crate_id, header.slot as i32, channel as i32)
                        .with_adc(payload)
                        .with_timestamp(header.time),
                );
            }
        }
    }
    Ok(())
}

mod fssr {
    use super::BitField;

    /// Half byte value marking a TDC entry
    pub const TDC_ENTRY: i8 = -128;

    pub const CHIP: BitField = BitField::range(0, 2);
    pub const HALF: BitField = BitField::bit(3);
    pub const TDC_CHIP: BitField = BitField::range(0, 1);
    pub const TDC_HALF: BitField = BitField::bit(2);
}

/// One FSSR hit as packed in the SVT bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct FssrHit {
    pub channel_id: i32,
    pub adc: i32,
    pub tdc: i16,
}

impl FssrHit {
    pub fn unpack(half: i8, channel: i8, tdc_byte: i8, adc_byte: i8) -> Self {
        if half == fssr::TDC_ENTRY {
            let word = channel as u8 as u32;
            let half_id = fssr::TDC_HALF.get(word) as i32;
            let chip = fssr::TDC_CHIP.get(word) as i32 + 1;
            let tdc = (((adc_byte as i32) << 8) | (tdc_byte as u8 as i32)) as i16;
            return Self {
                channel_id: half_id * 10000 + chip * 1000,
                adc: -1,
                tdc,
            };
        }
        let word = half as u8 as u32;
        let half_id = fssr::HALF.get(word) as i32;
        let chip = fssr::CHIP.get(word) as i32;
        Self {
            channel_id: half_id * 10000 + chip * 1000 + channel as i32,
            adc: adc_byte as i32,
            tdc: tdc_byte as u8 as i16,
        }
    }
}

/// 57617: SVT FSSR hits
pub fn decode_svt<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::Svt)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let header = SlotHeader::read(&mut cursor)?;
        for _ in 0..header.channels {
            let half = cursor.take_i8()?;
            let channel = cursor.take_i8()?;
            let tdc_byte = cursor.take_i8()?;
            let adc_byte = cursor.take_i8()?;
            let hit = FssrHit::unpack(half, channel, tdc_byte, adc_byte);
            let payload = AdcPayload {
                integral: hit.adc,
                pedestal: 0,
                time: hit.tdc as i32,
                timestamp: Some(mask_timestamp(header.time)),
                ..Default::default()
            };
            out.push(DigitizationRecord::new(crate_id, header.slot as i32, hit.channel_id).with_adc(payload));
        }
    }
    Ok(())
}

/// 57622: drift-chamber TDC hits
pub fn decode_drift_chamber<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::DriftChamberTdc)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let header = SlotHeader::read(&mut cursor)?;
        for _ in 0..header.channels {
            let channel = cursor.take_i8()?;
            let tdc = cursor.take_i16()?;
            out.push(
                DigitizationRecord::new(crate_id, header.slot as i32, channel as i32)
                    .with_tdc(tdc as i32)
                    .with_timestamp(header.time),
            );
        }
    }
    Ok(())
}

/// 57627: uncompressed MicroMegas samples (16-bit channel numbers)
pub fn decode_micromegas_raw<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::MicroMegasRaw)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let header = SlotHeader::read(&mut cursor)?;
        for _ in 0..header.channels {
            let channel = cursor.take_i16()?;
            let len = cursor.take_len()?;
            let samples = cursor.take_i16_array(len)?;
            let payload = AdcPayload {
                timestamp: Some(mask_timestamp(header.time)),
                pulse: samples,
                ..Default::default()
            };
            out.push(DigitizationRecord::new(crate_id, header.slot as i32, channel as i32).with_adc(payload));
        }
    }
    Ok(())
}

/// Raw sample buffers of a slot-group bank with 8-bit channels
///
/// Returns the buffers decoded before any error alongside the error.
pub fn raw_sample_buffers<N: EvioNode>(
    crate_id: i32,
    node: &N,
    bank: BankTag,
    out: &mut Vec<FadcRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, bank)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let header = SlotHeader::read(&mut cursor)?;
        for _ in 0..header.channels {
            let channel = cursor.take_i8()?;
            let len = cursor.take_len()?;
            let samples = cursor.take_i16_array(len)?;
            out.push(FadcRecord::new(crate_id, header.slot as i32, channel as i32, samples));
        }
    }
    Ok(())
}

/// 57638: legacy packed FADC windows, decoded straight from the bytes
///
/// Layout per slot: `slot:u8, count:u8` then `count` channels of
/// `channel:u8, n:u8, n x i16`. Channels with `min_samples` samples or fewer
/// are dropped. Decoding stops at the first incomplete channel.
pub fn decode_packed_fadc<N: EvioNode>(
    crate_id: i32,
    node: &N,
    min_samples: usize,
    out: &mut Vec<FadcRecord>,
) -> Result<(), CompositeError> {
    let bytes = node.payload();
    let order = node.byte_order();
    let mut pos = packed_data_offset(node);
    let exhausted = |position: usize, expected: &'static str| CompositeError::Exhausted { position, expected };

    while pos + 3 < bytes.len() {
        let slot = bytes[pos] as i32;
        let count = bytes[pos + 1];
        pos += 2;
        for _ in 0..count {
            let (channel, n) = match bytes.get(pos..pos + 2) {
                Some(b) => (b[0] as i32, b[1] as usize),
                None => return Err(exhausted(pos, "channel header")),
            };
            pos += 2;
            let raw = bytes
                .get(pos..pos + 2 * n)
                .ok_or_else(|| exhausted(pos, "int16"))?;
            pos += 2 * n;
            let samples: Vec<i16> = raw
                .chunks_exact(2)
                .map(|c| order.read_u16([c[0], c[1]]) as i16)
                .collect();
            if samples.len() > min_samples {
                out.push(FadcRecord::new(crate_id, slot, channel, samples));
            }
        }
    }
    Ok(())
}

/// Byte offset of the packed data inside a 57638 payload
///
/// Composite-typed payloads start with the format tag segment and the inner
/// bank header; other payloads are bare data.
fn packed_data_offset<N: EvioNode>(node: &N) -> usize {
    if node.data_type() != crate::evio::DataType::Composite {
        return 0;
    }
    match node.byte_order().u32_at(node.payload(), 0) {
        Some(tagseg) => 4 + (tagseg & 0xffff) as usize * 4 + 8,
        None => 0,
    }
}
