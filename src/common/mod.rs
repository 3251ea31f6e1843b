//! Common data types shared across decoders
//!
//! This module defines the digitization records emitted by the decoders and
//! the payloads attached to them.

use serde::{Deserialize, Serialize};

pub mod cli;
pub mod error;

pub use error::DecodeError;

/// Mask applied to hardware coarse timestamps (48 bits)
pub const TIMESTAMP_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Apply the 48-bit timestamp mask to a raw value
#[inline]
pub fn mask_timestamp(raw: i64) -> u64 {
    (raw as u64) & TIMESTAMP_MASK
}

/// Physical address of a digitizer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    /// Crate (chassis) identifier, the parent bank tag
    pub crate_id: i32,
    /// Module position within the crate
    pub slot: i32,
    /// Input line (or remapped channel index)
    pub channel: i32,
}

impl ChannelKey {
    pub fn new(crate_id: i32, slot: i32, channel: i32) -> Self {
        Self {
            crate_id,
            slot,
            channel,
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.crate_id, self.slot, self.channel)
    }
}

/// Flash-ADC measurement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdcPayload {
    /// Pulse integral (charge)
    pub integral: i32,
    pub pedestal: i16,
    pub height: i16,
    /// Raw time value
    pub time: i32,
    /// Encoded fine-time word, when the format provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_word: Option<i32>,
    /// Coarse timestamp of the readout window (48-bit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Full pulse samples
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pulse: Vec<i16>,
}

/// TDC hit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdcPayload {
    pub value: i32,
}

/// Scaler reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalerPayload {
    pub helicity: u8,
    pub quartet: u8,
    pub value: u64,
}

/// Raw pulse samples (window readout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulsePayload {
    pub samples: Vec<i16>,
}

/// Trigger-processor word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VtpPayload {
    pub word: u32,
}

/// Decoded data for one crate/slot/channel
///
/// The same key may appear in several records of one event (e.g. multiple
/// ADC hits); merging is left to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitizationRecord {
    pub key: ChannelKey,
    /// Coarse timestamp (48-bit), when the bank provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adc: Vec<AdcPayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tdc: Vec<TdcPayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scaler: Vec<ScalerPayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pulse: Vec<PulsePayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vtp: Vec<VtpPayload>,
}

impl DigitizationRecord {
    pub fn new(crate_id: i32, slot: i32, channel: i32) -> Self {
        Self {
            key: ChannelKey::new(crate_id, slot, channel),
            timestamp: None,
            adc: Vec::new(),
            tdc: Vec::new(),
            scaler: Vec::new(),
            pulse: Vec::new(),
            vtp: Vec::new(),
        }
    }

    pub fn crate_id(&self) -> i32 {
        self.key.crate_id
    }

    pub fn slot(&self) -> i32 {
        self.key.slot
    }

    pub fn channel(&self) -> i32 {
        self.key.channel
    }

    /// Set the coarse timestamp, masked to 48 bits
    pub fn set_timestamp(&mut self, raw: i64) {
        self.timestamp = Some(mask_timestamp(raw));
    }

    pub fn with_timestamp(mut self, raw: i64) -> Self {
        self.set_timestamp(raw);
        self
    }

    pub fn with_adc(mut self, adc: AdcPayload) -> Self {
        self.adc.push(adc);
        self
    }

    pub fn with_tdc(mut self, value: i32) -> Self {
        self.tdc.push(TdcPayload { value });
        self
    }

    pub fn with_scaler(mut self, scaler: ScalerPayload) -> Self {
        self.scaler.push(scaler);
        self
    }

    pub fn with_pulse(mut self, samples: Vec<i16>) -> Self {
        self.pulse.push(PulsePayload { samples });
        self
    }

    pub fn with_vtp(mut self, word: u32) -> Self {
        self.vtp.push(VtpPayload { word });
        self
    }

    /// Format record for display
    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        if !self.adc.is_empty() {
            parts.push(format!("adc={}", self.adc.len()));
        }
        if !self.tdc.is_empty() {
            parts.push(format!("tdc={}", self.tdc.len()));
        }
        if !self.scaler.is_empty() {
            parts.push(format!("scaler={}", self.scaler.len()));
        }
        if !self.pulse.is_empty() {
            parts.push(format!("pulse={}", self.pulse.len()));
        }
        if !self.vtp.is_empty() {
            parts.push(format!("vtp={}", self.vtp.len()));
        }
        format!(
            "[{}]{} {}",
            self.key,
            self.timestamp
                .map(|t| format!(" T:{}", t))
                .unwrap_or_default(),
            parts.join(" ")
        )
    }
}

impl std::fmt::Display for DigitizationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Raw flash-ADC sample buffer for one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FadcRecord {
    pub key: ChannelKey,
    pub samples: Vec<i16>,
}

impl FadcRecord {
    pub fn new(crate_id: i32, slot: i32, channel: i32, samples: Vec<i16>) -> Self {
        Self {
            key: ChannelKey::new(crate_id, slot, channel),
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_masked_to_48_bits() {
        let record = DigitizationRecord::new(1, 2, 3).with_timestamp(-1);
        assert_eq!(record.timestamp, Some(TIMESTAMP_MASK));

        let record = DigitizationRecord::new(1, 2, 3).with_timestamp(0x7abc_0000_0000_0042);
        assert_eq!(record.timestamp, Some(0x0000_0000_0000_0042));
    }

    #[test]
    fn record_builders_attach_payloads() {
        let record = DigitizationRecord::new(5, 6, 7)
            .with_tdc(120)
            .with_tdc(130)
            .with_vtp(0xdead_beef);
        assert_eq!(record.crate_id(), 5);
        assert_eq!(record.slot(), 6);
        assert_eq!(record.channel(), 7);
        assert_eq!(record.tdc.len(), 2);
        assert_eq!(record.vtp[0].word, 0xdead_beef);
        assert!(record.adc.is_empty());
    }

    #[test]
    fn display_lists_payload_kinds() {
        let record = DigitizationRecord::new(1, 2, 3)
            .with_timestamp(10)
            .with_adc(AdcPayload::default());
        assert_eq!(record.to_string(), "[1/2/3] T:10 adc=1");
    }

    #[test]
    fn json_skips_empty_payloads() {
        let record = DigitizationRecord::new(1, 2, 3).with_tdc(4);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"tdc\""));
        assert!(!json.contains("\"adc\""));
        let back: DigitizationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn channel_keys_order_by_crate_slot_channel() {
        let mut keys = vec![
            ChannelKey::new(2, 0, 0),
            ChannelKey::new(1, 5, 1),
            ChannelKey::new(1, 5, 0),
        ];
        keys.sort();
        assert_eq!(keys[0], ChannelKey::new(1, 5, 0));
        assert_eq!(keys[2], ChannelKey::new(2, 0, 0));
    }
}
