//! EVIO bank-tree adapter
//!
//! The decoder core only needs a small view of each node in the event tree:
//! its (tag, num) identity, declared element type, payload bytes with their
//! byte order, and the ordered child list. [`EvioNode`] captures that view so
//! any container-format reader can feed the decoder; [`RawNode`] is the owned
//! implementation used by the built-in bank parser and by tests.

pub mod branch;
pub mod tree;

pub use branch::{build_branches, find_branch, Branch};
pub use tree::{parse_bank, EventBuffer, TreeError};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Byte order of a bank payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Network order, the CODA default
    #[default]
    Big,
    Little,
}

impl ByteOrder {
    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        }
    }

    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }

    pub fn read_u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            ByteOrder::Big => u64::from_be_bytes(bytes),
            ByteOrder::Little => u64::from_le_bytes(bytes),
        }
    }

    pub fn write_u16(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        }
    }

    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        }
    }

    pub fn write_u64(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        }
    }

    /// Read a u32 at `offset` bytes, if the slice is long enough
    pub fn u32_at(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes = data.get(offset..offset + 4)?;
        Some(self.read_u32([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a u64 at `offset` bytes, if the slice is long enough
    pub fn u64_at(self, data: &[u8], offset: usize) -> Option<u64> {
        let bytes = data.get(offset..offset + 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Some(self.read_u64(buf))
    }
}

/// Declared element type of an EVIO structure (6-bit type code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Unknown32,
    UInt32,
    Float32,
    CharStar8,
    Short16,
    UShort16,
    Char8,
    UChar8,
    Double64,
    Long64,
    ULong64,
    Int32,
    TagSegment,
    AlsoSegment,
    AlsoBank,
    Composite,
    Bank,
    Segment,
    /// Type code outside the known table
    Other(u8),
}

impl DataType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x0 => DataType::Unknown32,
            0x1 => DataType::UInt32,
            0x2 => DataType::Float32,
            0x3 => DataType::CharStar8,
            0x4 => DataType::Short16,
            0x5 => DataType::UShort16,
            0x6 => DataType::Char8,
            0x7 => DataType::UChar8,
            0x8 => DataType::Double64,
            0x9 => DataType::Long64,
            0xa => DataType::ULong64,
            0xb => DataType::Int32,
            0xc => DataType::TagSegment,
            0xd => DataType::AlsoSegment,
            0xe => DataType::AlsoBank,
            0xf => DataType::Composite,
            0x10 => DataType::Bank,
            0x20 => DataType::Segment,
            other => DataType::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            DataType::Unknown32 => 0x0,
            DataType::UInt32 => 0x1,
            DataType::Float32 => 0x2,
            DataType::CharStar8 => 0x3,
            DataType::Short16 => 0x4,
            DataType::UShort16 => 0x5,
            DataType::Char8 => 0x6,
            DataType::UChar8 => 0x7,
            DataType::Double64 => 0x8,
            DataType::Long64 => 0x9,
            DataType::ULong64 => 0xa,
            DataType::Int32 => 0xb,
            DataType::TagSegment => 0xc,
            DataType::AlsoSegment => 0xd,
            DataType::AlsoBank => 0xe,
            DataType::Composite => 0xf,
            DataType::Bank => 0x10,
            DataType::Segment => 0x20,
            DataType::Other(code) => code,
        }
    }

    /// Whether structures of this type hold child structures
    pub fn is_container(self) -> bool {
        matches!(
            self,
            DataType::Bank
                | DataType::AlsoBank
                | DataType::Segment
                | DataType::AlsoSegment
                | DataType::TagSegment
        )
    }

    /// Whether the payload is a sequence of 32-bit integers
    pub fn is_int32(self) -> bool {
        matches!(self, DataType::Int32 | DataType::UInt32)
    }
}

/// Read-only view of one node of the event tree
pub trait EvioNode {
    fn tag(&self) -> u16;
    fn num(&self) -> u8;
    fn data_type(&self) -> DataType;
    /// Payload bytes, excluding structure headers and trailing padding
    fn payload(&self) -> &[u8];
    fn byte_order(&self) -> ByteOrder;
    fn children(&self) -> &[Self]
    where
        Self: Sized;

    /// Payload length in 32-bit words
    fn data_words(&self) -> usize {
        self.payload().len().div_ceil(4)
    }

    /// Payload as 32-bit words in the node's byte order
    fn words(&self) -> Vec<u32> {
        let order = self.byte_order();
        self.payload()
            .chunks_exact(4)
            .map(|c| order.read_u32([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// 64-bit value starting at the given 32-bit word index
    fn long_at_word(&self, word_index: usize) -> Option<u64> {
        self.byte_order().u64_at(self.payload(), word_index * 4)
    }
}

/// Owned event-tree node
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    tag: u16,
    num: u8,
    data_type: DataType,
    order: ByteOrder,
    payload: Bytes,
    children: Vec<RawNode>,
}

impl RawNode {
    /// Create a leaf node holding raw payload bytes
    pub fn leaf(
        tag: u16,
        num: u8,
        data_type: DataType,
        order: ByteOrder,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            tag,
            num,
            data_type,
            order,
            payload: payload.into(),
            children: Vec::new(),
        }
    }

    /// Create a leaf node from 32-bit words, encoded in `order`
    pub fn from_words(tag: u16, num: u8, data_type: DataType, order: ByteOrder, words: &[u32]) -> Self {
        let mut payload = Vec::with_capacity(words.len() * 4);
        for w in words {
            payload.extend_from_slice(&order.write_u32(*w));
        }
        Self::leaf(tag, num, data_type, order, payload)
    }

    /// Create a bank-of-banks node
    pub fn container(tag: u16, num: u8, children: Vec<RawNode>) -> Self {
        let order = children.first().map(|c| c.order).unwrap_or_default();
        Self {
            tag,
            num,
            data_type: DataType::Bank,
            order,
            payload: Bytes::new(),
            children,
        }
    }

    pub(crate) fn with_children(mut self, children: Vec<RawNode>) -> Self {
        self.children = children;
        self
    }
}

impl EvioNode for RawNode {
    fn tag(&self) -> u16 {
        self.tag
    }

    fn num(&self) -> u8 {
        self.num
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn byte_order(&self) -> ByteOrder {
        self.order
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}
