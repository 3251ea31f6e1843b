//! Minimal EVIO structure parser
//!
//! Materializes a [`RawNode`] tree from serialized EVIO banks. Only the
//! structure headers are interpreted here:
//!
//! ```text
//! Bank (2 words)        : length | tag:16 pad:2 type:6 num:8
//! Segment (1 word)      : tag:8 pad:2 type:6 length:16
//! Tag segment (1 word)  : tag:12 type:4 length:16
//! ```
//!
//! Lengths count the 32-bit words that follow the length field. Payload
//! slices share the input buffer.

use bytes::Bytes;
use thiserror::Error;

use super::{ByteOrder, DataType, RawNode};

/// Structure parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("buffer too short: need {needed} bytes at offset {offset}, have {available}")]
    TooShort {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("structure at offset {offset} declares {declared} words, exceeding its parent")]
    LengthOverflow { offset: usize, declared: usize },

    #[error("padding of {pad} bytes exceeds payload of {payload} bytes at offset {offset}")]
    BadPadding {
        offset: usize,
        pad: usize,
        payload: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructureKind {
    Bank,
    Segment,
    TagSegment,
}

impl StructureKind {
    fn of_children(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::Bank | DataType::AlsoBank => Some(StructureKind::Bank),
            DataType::Segment | DataType::AlsoSegment => Some(StructureKind::Segment),
            DataType::TagSegment => Some(StructureKind::TagSegment),
            _ => None,
        }
    }
}

/// Parse one bank (and its descendants) from the start of `data`
pub fn parse_bank(data: &Bytes, order: ByteOrder) -> Result<RawNode, TreeError> {
    let (node, _) = parse_structure(data, 0, data.len(), order, StructureKind::Bank)?;
    Ok(node)
}

fn word_at(data: &Bytes, offset: usize, order: ByteOrder) -> Result<u32, TreeError> {
    order.u32_at(data, offset).ok_or(TreeError::TooShort {
        offset,
        needed: 4,
        available: data.len().saturating_sub(offset),
    })
}

/// Parse the structure starting at `offset`; returns it with the offset just past it.
fn parse_structure(
    data: &Bytes,
    offset: usize,
    limit: usize,
    order: ByteOrder,
    kind: StructureKind,
) -> Result<(RawNode, usize), TreeError> {
    let first = word_at(data, offset, order)?;

    let (tag, num, type_code, pad, header_bytes, total_bytes) = match kind {
        StructureKind::Bank => {
            let second = word_at(data, offset + 4, order)?;
            let length = first as usize;
            if length == 0 {
                return Err(TreeError::LengthOverflow {
                    offset,
                    declared: length,
                });
            }
            (
                (second >> 16) as u16,
                (second & 0xff) as u8,
                ((second >> 8) & 0x3f) as u8,
                ((second >> 14) & 0x3) as usize,
                8usize,
                (length + 1) * 4,
            )
        }
        StructureKind::Segment => (
            (first >> 24) as u16,
            0u8,
            ((first >> 16) & 0x3f) as u8,
            ((first >> 22) & 0x3) as usize,
            4usize,
            ((first & 0xffff) as usize + 1) * 4,
        ),
        StructureKind::TagSegment => (
            (first >> 20) as u16,
            0u8,
            ((first >> 16) & 0xf) as u8,
            0usize,
            4usize,
            ((first & 0xffff) as usize + 1) * 4,
        ),
    };

    let end = offset + total_bytes;
    if end > limit {
        return Err(TreeError::LengthOverflow {
            offset,
            declared: total_bytes / 4 - 1,
        });
    }

    let data_type = DataType::from_code(type_code);
    let payload_start = offset + header_bytes;
    let payload_len = end - payload_start;
    if pad > payload_len {
        return Err(TreeError::BadPadding {
            offset,
            pad,
            payload: payload_len,
        });
    }
    let payload = data.slice(payload_start..end - pad);

    let mut node = RawNode::leaf(tag, num, data_type, order, payload);

    if let Some(child_kind) = StructureKind::of_children(data_type) {
        let mut children = Vec::new();
        let mut cursor = payload_start;
        while cursor < end {
            let (child, next) = parse_structure(data, cursor, end, order, child_kind)?;
            children.push(child);
            cursor = next;
        }
        node = node.with_children(children);
    }

    Ok((node, end))
}

/// Iterator over consecutive top-level banks in a buffer
///
/// Stops at the first malformed bank after yielding its error.
pub struct EventBuffer {
    data: Bytes,
    order: ByteOrder,
    offset: usize,
    failed: bool,
}

impl EventBuffer {
    pub fn new(data: impl Into<Bytes>, order: ByteOrder) -> Self {
        Self {
            data: data.into(),
            order,
            offset: 0,
            failed: false,
        }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }
}

impl Iterator for EventBuffer {
    type Item = Result<RawNode, TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining() < 8 {
            return None;
        }
        match parse_structure(
            &self.data,
            self.offset,
            self.data.len(),
            self.order,
            StructureKind::Bank,
        ) {
            Ok((node, next)) => {
                self.offset = next;
                Some(Ok(node))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Serialize a bank header pair (used to build synthetic events)
pub fn bank_header(length_words: u32, tag: u16, data_type: DataType, pad: u8, num: u8) -> [u32; 2] {
    [
        length_words,
        ((tag as u32) << 16)
            | (((pad & 0x3) as u32) << 14)
            | (((data_type.code() & 0x3f) as u32) << 8)
            | num as u32,
    ]
}
