//! TDC banks: RICH (57636), XY hodoscope (57655) and legacy TDC words (57607)

use super::bits::BitField;
use super::catalog::BankTag;
use super::composite_payload;
use super::pulse::SlotHeader;
use crate::common::DigitizationRecord;
use crate::composite::CompositeError;
use crate::evio::EvioNode;

mod constants {
    use super::BitField;

    pub const EDGE: BitField = BitField::bit(15);
    pub const TDC_VALUE: BitField = BitField::range(0, 14);

    /// Channels per RICH fiber
    pub const RICH_FIBER_CHANNELS: i32 = 192;
    /// Channels per hodoscope MAROC chip
    pub const MAROC_CHANNELS: i32 = 64;
    /// Added to hodoscope slots to keep them apart from detectors sharing the crate
    pub const HODO_SLOT_OFFSET: i32 = 20;

    // Legacy TDC word
    pub const LEGACY_SLOT: BitField = BitField::range(27, 31);
    pub const LEGACY_CHANNEL: BitField = BitField::range(19, 25);
    pub const LEGACY_VALUE: BitField = BitField::range(0, 18);
}

/// Split a raw 16-bit TDC into (edge, value)
pub fn split_edge(raw: i16) -> (i32, i32) {
    let word = raw as u16 as u32;
    (
        constants::EDGE.get(word) as i32,
        constants::TDC_VALUE.get(word) as i32,
    )
}

/// RICH output channel: fiber and channel combined, doubled, plus the edge
pub fn rich_channel(fiber: u8, channel: u8, edge: i32) -> i32 {
    2 * (fiber as i32 * constants::RICH_FIBER_CHANNELS + channel as i32) + edge
}

/// Hodoscope output channel within its MAROC chip, doubled, plus the edge
pub fn hodoscope_channel(channel: u8, edge: i32) -> i32 {
    2 * (channel as i32 % constants::MAROC_CHANNELS) + edge
}

/// 57636: RICH hits
pub fn decode_rich<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::RichTdc)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let header = SlotHeader::read(&mut cursor)?;
        for _ in 0..header.channels {
            let fiber = cursor.take_i8()? as u8;
            let channel = cursor.take_i8()? as u8;
            let (edge, tdc) = split_edge(cursor.take_i16()?);
            out.push(
                DigitizationRecord::new(crate_id, header.slot as i32, rich_channel(fiber, channel, edge))
                    .with_tdc(tdc),
            );
        }
    }
    Ok(())
}

/// 57655: XY hodoscope hits
pub fn decode_hodoscope<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let data = composite_payload(node, BankTag::Hodoscope)?;
    let mut cursor = data.cursor();
    while !cursor.is_empty() {
        let header = SlotHeader::read(&mut cursor)?;
        let slot = header.slot as i32 + constants::HODO_SLOT_OFFSET;
        for _ in 0..header.channels {
            let channel = cursor.take_i8()? as u8;
            let (edge, tdc) = split_edge(cursor.take_i16()?);
            out.push(DigitizationRecord::new(crate_id, slot, hodoscope_channel(channel, edge)).with_tdc(tdc));
        }
    }
    Ok(())
}

/// 57607: one TDC hit per data word
pub fn decode_legacy_tdc<N: EvioNode>(crate_id: i32, node: &N, out: &mut Vec<DigitizationRecord>) {
    for word in node.words() {
        let slot = constants::LEGACY_SLOT.get(word) as i32;
        let channel = constants::LEGACY_CHANNEL.get(word) as i32;
        let value = constants::LEGACY_VALUE.get(word) as i32;
        out.push(DigitizationRecord::new(crate_id, slot, channel).with_tdc(value));
    }
}
