//! VMM3 hit words (57653)
//!
//! The payload is a stream of 32-bit words. A chip header word announces how
//! many hit words follow it; words outside a header/hit run are skipped.

use super::bits::BitField;
use crate::common::{AdcPayload, DigitizationRecord};
use crate::composite::CompositeError;
use crate::evio::EvioNode;

mod constants {
    use super::BitField;

    pub const WORD_TYPE: BitField = BitField::range(28, 31);
    pub const CHIP1_HEADER: u32 = 3;
    pub const CHIP2_HEADER: u32 = 5;
    pub const CHIP2_CHANNEL_OFFSET: i32 = 64;
    pub const HIT_COUNT: BitField = BitField::range(16, 23);

    pub const CHANNEL: BitField = BitField::range(22, 27);
    pub const ADC: BitField = BitField::range(12, 21);
    pub const TDC: BitField = BitField::range(4, 11);
    pub const REL_BCID: BitField = BitField::range(0, 2);
    pub const FLAG_N: BitField = BitField::bit(3);
    pub const FLAG_T: BitField = BitField::bit(28);
    pub const FLAG_R: BitField = BitField::bit(29);
    pub const FLAG_P: BitField = BitField::bit(30);

    /// No hardware slot in the data; hits are assigned this one
    pub const SLOT: i32 = 30;
}

/// One decoded VMM3 hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vmm3Hit {
    pub channel: i32,
    pub adc: i32,
    pub tdc: i32,
    pub rel_bcid: i16,
    /// Flags packed as N | T<<1 | R<<2 | P<<3
    pub prtn: i16,
}

impl Vmm3Hit {
    pub fn unpack(word: u32, channel_offset: i32) -> Self {
        use constants::*;
        let mut prtn = 0i16;
        for (i, flag) in [FLAG_N, FLAG_T, FLAG_R, FLAG_P].into_iter().enumerate() {
            if flag.is_set(word) {
                prtn |= 1 << i;
            }
        }
        Self {
            channel: CHANNEL.get(word) as i32 + channel_offset,
            adc: ADC.get(word) as i32,
            tdc: TDC.get(word) as i32,
            rel_bcid: REL_BCID.get(word) as i16,
            prtn,
        }
    }

    fn into_record(self, crate_id: i32) -> DigitizationRecord {
        let payload = AdcPayload {
            integral: self.adc,
            time: self.tdc,
            height: self.rel_bcid,
            pedestal: self.prtn,
            ..Default::default()
        };
        DigitizationRecord::new(crate_id, constants::SLOT, self.channel).with_adc(payload)
    }
}

/// Channel offset for a chip header word, `None` for any other word
pub fn chip_offset(word: u32) -> Option<i32> {
    match constants::WORD_TYPE.get(word) {
        constants::CHIP1_HEADER => Some(0),
        constants::CHIP2_HEADER => Some(constants::CHIP2_CHANNEL_OFFSET),
        _ => None,
    }
}

/// 57653: decode every chip header and its hits
pub fn decode_vmm3<N: EvioNode>(
    crate_id: i32,
    node: &N,
    out: &mut Vec<DigitizationRecord>,
) -> Result<(), CompositeError> {
    let words = node.words();
    let mut i = 0;
    while i < words.len() {
        let Some(offset) = chip_offset(words[i]) else {
            i += 1;
            continue;
        };
        let hits = constants::HIT_COUNT.get(words[i]) as usize;
        for h in 1..=hits {
            let word = words.get(i + h).ok_or(CompositeError::Exhausted {
                position: i + h,
                expected: "vmm3 hit word",
            })?;
            out.push(Vmm3Hit::unpack(*word, offset).into_record(crate_id));
        }
        i += hits + 1;
    }
    Ok(())
}
