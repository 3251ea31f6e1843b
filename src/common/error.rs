//! Error types for the decoder core
//!
//! None of these conditions abort the decode of a whole event. Decoders
//! record them as per-event diagnostics and log them; the affected bank is
//! either dropped (`CorruptBank`) or kept partially (`TruncatedBank`).

use thiserror::Error;

use crate::composite::CompositeError;

/// Bank- and event-level decode conditions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Structural schema mismatch: the bank is dropped
    #[error("corrupted bank tag={tag} num={num} in crate {crate_id}: {source}")]
    CorruptBank {
        crate_id: i32,
        tag: u16,
        num: u8,
        #[source]
        source: CompositeError,
    },

    /// Bank shorter than declared: records decoded before the cut are kept
    #[error("truncated bank tag={tag} num={num} in crate {crate_id}: {detail}")]
    TruncatedBank {
        crate_id: i32,
        tag: u16,
        num: u8,
        detail: String,
    },

    /// Header bank unreadable: sentinel run/event numbers substituted
    #[error("can not read header bank in crate {crate_id}: {reason}")]
    MalformedHeader { crate_id: i32, reason: String },

    /// Trigger-interface timestamps disagree across crates
    #[error("mismatch in TI time stamps: crate {crate_id} reports {reported} instead of {reference} from crate {reference_crate}")]
    DesyncTimestamp {
        crate_id: i32,
        reported: u64,
        reference: u64,
        reference_crate: i32,
    },

    /// Slow-controls row without a numeric value
    #[error("ignoring EPICS bank row: {row}")]
    NonNumericSideChannel { row: String },
}

impl DecodeError {
    /// Classify a composite walk failure for a bank
    pub fn from_composite(crate_id: i32, tag: u16, num: u8, err: CompositeError) -> Self {
        if err.is_truncation() {
            Self::TruncatedBank {
                crate_id,
                tag,
                num,
                detail: err.to_string(),
            }
        } else {
            Self::CorruptBank {
                crate_id,
                tag,
                num,
                source: err,
            }
        }
    }

    pub fn malformed_header(crate_id: i32, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            crate_id,
            reason: reason.into(),
        }
    }

    /// Whether the affected bank's records were discarded
    pub fn drops_bank(&self) -> bool {
        matches!(self, Self::CorruptBank { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_stream_is_truncation() {
        let err = DecodeError::from_composite(
            1,
            57601,
            0,
            CompositeError::Exhausted {
                position: 9,
                expected: "int16",
            },
        );
        assert!(matches!(err, DecodeError::TruncatedBank { .. }));
        assert!(!err.drops_bank());
        assert!(err.to_string().contains("truncated bank tag=57601"));
    }

    #[test]
    fn schema_mismatch_is_corruption() {
        let err = DecodeError::from_composite(
            3,
            57636,
            2,
            CompositeError::SchemaMismatch {
                position: 3,
                expected: "repeat count",
                found: "int32",
            },
        );
        assert!(err.drops_bank());
        let msg = err.to_string();
        assert!(msg.contains("corrupted bank tag=57636 num=2"));
        assert!(msg.contains("repeat count"));
    }

    #[test]
    fn desync_message_names_both_crates() {
        let err = DecodeError::DesyncTimestamp {
            crate_id: 7,
            reported: 150,
            reference: 100,
            reference_crate: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("crate 7 reports 150"));
        assert!(msg.contains("100 from crate 2"));
    }
}
