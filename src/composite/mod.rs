//! Composite data decoding
//!
//! Most front-end banks carry "composite" payloads: packed, heterogeneously
//! typed values laid out by a small format string (see [`format`]). Walking
//! the bytes against the format yields a flat [`CompositeItem`] stream;
//! decoders then consume it through an [`ItemCursor`], which fails with
//! [`CompositeError::SchemaMismatch`] when an item is not of the expected
//! kind and [`CompositeError::Exhausted`] when the stream ends early.
//!
//! On the wire a composite bank is wrapped as:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ tag segment header (tag:12 type:4 len:16)│
//! │ format string, NUL then 0x04 padded      │
//! ├──────────────────────────────────────────┤
//! │ bank header (length, tag/pad/type/num)   │
//! │ packed data, pad bytes at the end        │
//! └──────────────────────────────────────────┘
//! ```

pub mod format;
mod walker;

pub use format::{CompositeFormat, CountWidth, FormatNode, Multiplier, Scalar};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evio::{ByteOrder, DataType, EvioNode};

/// Composite decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    /// The format string could not be compiled
    #[error("invalid format string at {position}: {reason}")]
    Format { position: usize, reason: String },

    /// The tag segment / bank wrapper around the data is malformed
    #[error("invalid composite wrapper: {0}")]
    Wrapper(String),

    /// An item had a different kind than the schema requires
    #[error("item {position}: expected {expected}, found {found}")]
    SchemaMismatch {
        position: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// The item stream ended before the schema was satisfied
    #[error("item stream exhausted at {position} while reading {expected}")]
    Exhausted {
        position: usize,
        expected: &'static str,
    },
}

impl CompositeError {
    /// Whether partial results decoded before this error remain valid
    pub fn is_truncation(&self) -> bool {
        matches!(self, CompositeError::Exhausted { .. })
    }
}

/// One decoded value of a composite payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeItem {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    /// Length of the array that follows
    ArrayLen(u32),
    /// Repetition count of the group that follows
    Repeat(u32),
}

impl CompositeItem {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CompositeItem::Int8(_) => "int8",
            CompositeItem::UInt8(_) => "uint8",
            CompositeItem::Int16(_) => "int16",
            CompositeItem::UInt16(_) => "uint16",
            CompositeItem::Int32(_) => "int32",
            CompositeItem::UInt32(_) => "uint32",
            CompositeItem::Int64(_) => "int64",
            CompositeItem::UInt64(_) => "uint64",
            CompositeItem::ArrayLen(_) => "array length",
            CompositeItem::Repeat(_) => "repeat count",
        }
    }
}

/// Typed, sequential reader over an item stream
#[derive(Debug, Clone)]
pub struct ItemCursor<'a> {
    items: &'a [CompositeItem],
    pos: usize,
}

macro_rules! take_scalar {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $label:literal, $signed:ident, $unsigned:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self) -> Result<$ty, CompositeError> {
            match self.next_item($label)? {
                CompositeItem::$signed(v) => Ok(v as $ty),
                CompositeItem::$unsigned(v) => Ok(v as $ty),
                other => Err(self.mismatch($label, &other)),
            }
        }
    };
}

impl<'a> ItemCursor<'a> {
    pub fn new(items: &'a [CompositeItem]) -> Self {
        Self { items, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn next_item(&mut self, expected: &'static str) -> Result<CompositeItem, CompositeError> {
        let item = self
            .items
            .get(self.pos)
            .copied()
            .ok_or(CompositeError::Exhausted {
                position: self.pos,
                expected,
            })?;
        self.pos += 1;
        Ok(item)
    }

    fn mismatch(&self, expected: &'static str, found: &CompositeItem) -> CompositeError {
        CompositeError::SchemaMismatch {
            position: self.pos - 1,
            expected,
            found: found.kind_name(),
        }
    }

    take_scalar!(
        /// Next 8-bit value, signed or unsigned bits reinterpreted as i8
        take_i8, i8, "int8", Int8, UInt8
    );
    take_scalar!(
        /// Next 16-bit value as i16
        take_i16, i16, "int16", Int16, UInt16
    );
    take_scalar!(
        /// Next 32-bit value as i32
        take_i32, i32, "int32", Int32, UInt32
    );
    take_scalar!(
        /// Next 64-bit value as i64
        take_i64, i64, "int64", Int64, UInt64
    );

    /// Next array-length marker
    pub fn take_len(&mut self) -> Result<u32, CompositeError> {
        match self.next_item("array length")? {
            CompositeItem::ArrayLen(n) => Ok(n),
            other => Err(self.mismatch("array length", &other)),
        }
    }

    /// Next group-repetition marker
    pub fn take_repeat(&mut self) -> Result<u32, CompositeError> {
        match self.next_item("repeat count")? {
            CompositeItem::Repeat(n) => Ok(n),
            other => Err(self.mismatch("repeat count", &other)),
        }
    }

    /// Next `n` 16-bit values
    pub fn take_i16_array(&mut self, n: u32) -> Result<Vec<i16>, CompositeError> {
        let mut out = Vec::with_capacity((n as usize).min(self.remaining()));
        for _ in 0..n {
            out.push(self.take_i16()?);
        }
        Ok(out)
    }
}

/// Items decoded from one composite payload
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeData {
    format: CompositeFormat,
    items: Vec<CompositeItem>,
    truncated: bool,
}

const FORMAT_PAD: u8 = 0x04;

impl CompositeData {
    /// Walk raw data (no wrapper) against a known format
    pub fn walk(format: &CompositeFormat, data: &[u8], order: ByteOrder) -> Self {
        let (items, truncated) = walker::walk_items(format, data, order);
        Self {
            format: format.clone(),
            items,
            truncated,
        }
    }

    /// Decode a wrapped composite payload using its embedded format string
    pub fn from_wrapped(payload: &[u8], order: ByteOrder) -> Result<Self, CompositeError> {
        let (format, data) = unwrap_payload(payload, order)?;
        Ok(Self::walk(&format, data, order))
    }

    /// Decode a node's payload
    ///
    /// Composite-typed nodes carry their own format string. Any other node is
    /// taken as bare packed data laid out by `implicit`.
    pub fn from_node<N: EvioNode>(node: &N, implicit: &CompositeFormat) -> Result<Self, CompositeError> {
        if node.data_type() == DataType::Composite {
            let data = Self::from_wrapped(node.payload(), node.byte_order())?;
            if data.format.text() != implicit.text() {
                tracing::debug!(
                    tag = node.tag(),
                    embedded = %data.format,
                    expected = %implicit,
                    "Composite format differs from the catalog schema"
                );
            }
            Ok(data)
        } else {
            Ok(Self::walk(implicit, node.payload(), node.byte_order()))
        }
    }

    /// Build a wrapped composite payload (tag segment + format, bank + data)
    pub fn wrap(format: &str, data: &[u8], order: ByteOrder) -> Vec<u8> {
        let mut fmt_bytes = format.as_bytes().to_vec();
        fmt_bytes.push(0);
        while fmt_bytes.len() % 4 != 0 {
            fmt_bytes.push(FORMAT_PAD);
        }
        let data_pad = (4 - data.len() % 4) % 4;
        let data_words = (data.len() + data_pad) / 4;

        let mut out = Vec::with_capacity(12 + fmt_bytes.len() + data.len() + data_pad);
        let tagseg = (DataType::CharStar8.code() as u32) << 16 | (fmt_bytes.len() / 4) as u32;
        out.extend_from_slice(&order.write_u32(tagseg));
        out.extend_from_slice(&fmt_bytes);
        out.extend_from_slice(&order.write_u32(data_words as u32 + 1));
        out.extend_from_slice(&order.write_u32((data_pad as u32) << 14));
        out.extend_from_slice(data);
        out.resize(out.len() + data_pad, 0);
        out
    }

    pub fn format(&self) -> &CompositeFormat {
        &self.format
    }

    pub fn items(&self) -> &[CompositeItem] {
        &self.items
    }

    /// Whether the data ended inside a format element
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn cursor(&self) -> ItemCursor<'_> {
        ItemCursor::new(&self.items)
    }
}

/// Split a wrapped payload into its format and its data bytes
fn unwrap_payload(payload: &[u8], order: ByteOrder) -> Result<(CompositeFormat, &[u8]), CompositeError> {
    let tagseg = order
        .u32_at(payload, 0)
        .ok_or_else(|| CompositeError::Wrapper("missing tag segment header".into()))?;
    let seg_type = ((tagseg >> 16) & 0xf) as u8;
    if DataType::from_code(seg_type) != DataType::CharStar8 {
        return Err(CompositeError::Wrapper(format!(
            "format segment has type 0x{:x}, expected string",
            seg_type
        )));
    }
    let fmt_len = (tagseg & 0xffff) as usize * 4;
    let fmt_bytes = payload
        .get(4..4 + fmt_len)
        .ok_or_else(|| CompositeError::Wrapper("format string exceeds payload".into()))?;
    let fmt_end = fmt_bytes
        .iter()
        .position(|&b| b == 0 || b == FORMAT_PAD)
        .unwrap_or(fmt_bytes.len());
    let text = std::str::from_utf8(&fmt_bytes[..fmt_end])
        .map_err(|_| CompositeError::Wrapper("format string is not ASCII".into()))?;
    let format = CompositeFormat::parse(text)?;

    let bank_at = 4 + fmt_len;
    let bank_len = order
        .u32_at(payload, bank_at)
        .ok_or_else(|| CompositeError::Wrapper("missing data bank header".into()))? as usize;
    let bank_word = order
        .u32_at(payload, bank_at + 4)
        .ok_or_else(|| CompositeError::Wrapper("missing data bank header".into()))?;
    let pad = ((bank_word >> 14) & 0x3) as usize;
    let data_start = bank_at + 8;
    let data_end = (bank_at + 4 + bank_len * 4).min(payload.len());
    if data_end < data_start + pad {
        return Err(CompositeError::Wrapper(format!(
            "data bank length {} too small",
            bank_len
        )));
    }
    Ok((format, &payload[data_start..data_end - pad]))
}
