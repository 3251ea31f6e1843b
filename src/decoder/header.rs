//! Header (57615) and trigger-interface (57610) banks

use super::state::{HelicityBit, PerEventState, PersistentState, SENTINEL_EVENT, SENTINEL_RUN};
use crate::common::{mask_timestamp, DecodeError};
use crate::evio::EvioNode;

mod layout {
    // Header bank data words
    pub const RUN_WORD: usize = 1;
    pub const EVENT_WORD: usize = 2;
    pub const UNIX_TIME_WORD: usize = 3;
    pub const HELICITY_WORD: usize = 5;
    pub const MIN_HEADER_WORDS: usize = 4;

    // TI bank data words
    pub const TI_TIMESTAMP_WORD: usize = 2;
    pub const TI_TRIGGER_WORD: usize = 4;
    pub const TI_PLAIN_LENGTH: usize = 4;
    pub const TI_SUPERVISOR_LENGTH: usize = 5;
    pub const TI_SHORT_BITS_LENGTH: usize = 6;
    pub const TI_WIDE_BITS_LENGTH: usize = 7;
}

/// Timestamp reported by one crate's trigger interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiEntry {
    pub crate_id: u16,
    /// 48-bit masked timestamp
    pub timestamp: u64,
}

/// Update run/event/helicity state from a header bank
///
/// Unreadable banks set the sentinel run/event pair and report
/// `MalformedHeader`; the rest of the event is unaffected.
pub fn read_header<N: EvioNode>(
    crate_id: u16,
    node: &N,
    state: &mut PersistentState,
) -> Result<(), DecodeError> {
    let fail = |state: &mut PersistentState, reason: String| {
        state.run_number = SENTINEL_RUN;
        state.event_number = SENTINEL_EVENT;
        Err(DecodeError::malformed_header(crate_id as i32, reason))
    };

    if !node.data_type().is_int32() {
        return fail(state, format!("unexpected data type {:?}", node.data_type()));
    }
    let words = node.words();
    if words.len() < layout::MIN_HEADER_WORDS {
        return fail(state, format!("only {} data words", words.len()));
    }

    state.run_number = words[layout::RUN_WORD] as i32;
    state.event_number = words[layout::EVENT_WORD] as i32;
    if words[layout::UNIX_TIME_WORD] != 0 {
        state.unix_time = words[layout::UNIX_TIME_WORD] as i32;
    }
    state.helicity_level3 = words
        .get(layout::HELICITY_WORD)
        .map(|w| HelicityBit::from_word(*w))
        .unwrap_or(HelicityBit::DoesNotExist);
    Ok(())
}

/// Read a trigger-interface bank
///
/// Only plain 4-word banks contribute a timestamp entry. Longer banks come
/// from the trigger supervisor and carry the trigger bits instead.
pub fn read_trigger_interface<N: EvioNode>(
    crate_id: u16,
    node: &N,
    persistent: &mut PersistentState,
    event: &mut PerEventState,
) -> Option<TiEntry> {
    let words = node.words();
    let word = |i: usize| words.get(i).copied().unwrap_or(0);
    let trig = layout::TI_TRIGGER_WORD;

    match node.data_words() {
        layout::TI_PLAIN_LENGTH => {
            let raw = node.long_at_word(layout::TI_TIMESTAMP_WORD)?;
            return Some(TiEntry {
                crate_id,
                timestamp: mask_timestamp(raw as i64),
            });
        }
        layout::TI_SUPERVISOR_LENGTH => {
            event.trigger_bits = word(trig) as i32 as i64 as u64;
        }
        layout::TI_SHORT_BITS_LENGTH => {
            let bits = (word(trig) << 16) | word(trig + 1);
            event.trigger_bits = bits as i32 as i64 as u64;
        }
        layout::TI_WIDE_BITS_LENGTH => {
            event.trigger_bits = ((word(trig + 1) as u64) << 32) | word(trig) as u64;
            persistent.trigger_words = Some([word(trig), word(trig + 1), word(trig + 2)]);
        }
        other => {
            tracing::debug!(crate_id, length = other, "Ignoring TI bank of unexpected length");
        }
    }
    None
}
