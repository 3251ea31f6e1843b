//! Walks packed bytes against a compiled format

use super::format::{CompositeFormat, CountWidth, FormatNode, Multiplier, Scalar};
use super::CompositeItem;
use crate::evio::ByteOrder;

/// Data ran out in the middle of a format element
struct OutOfData;

struct Walker<'d> {
    data: &'d [u8],
    order: ByteOrder,
    pos: usize,
    items: Vec<CompositeItem>,
}

impl<'d> Walker<'d> {
    fn take<const W: usize>(&mut self) -> Result<[u8; W], OutOfData> {
        let bytes = self.data.get(self.pos..self.pos + W).ok_or(OutOfData)?;
        self.pos += W;
        let mut buf = [0u8; W];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    fn read_scalar(&mut self, kind: Scalar) -> Result<CompositeItem, OutOfData> {
        let order = self.order;
        Ok(match kind {
            Scalar::Int8 => CompositeItem::Int8(self.take::<1>()?[0] as i8),
            Scalar::UInt8 => CompositeItem::UInt8(self.take::<1>()?[0]),
            Scalar::Int16 => CompositeItem::Int16(order.read_u16(self.take::<2>()?) as i16),
            Scalar::UInt16 => CompositeItem::UInt16(order.read_u16(self.take::<2>()?)),
            Scalar::Int32 => CompositeItem::Int32(order.read_u32(self.take::<4>()?) as i32),
            Scalar::UInt32 => CompositeItem::UInt32(order.read_u32(self.take::<4>()?)),
            Scalar::Int64 => CompositeItem::Int64(order.read_u64(self.take::<8>()?) as i64),
            Scalar::UInt64 => CompositeItem::UInt64(order.read_u64(self.take::<8>()?)),
        })
    }

    fn read_count(&mut self, width: CountWidth) -> Result<u32, OutOfData> {
        let order = self.order;
        Ok(match width {
            CountWidth::U8 => self.take::<1>()?[0] as u32,
            CountWidth::U16 => order.read_u16(self.take::<2>()?) as u32,
            CountWidth::U32 => order.read_u32(self.take::<4>()?),
        })
    }

    fn walk_list(&mut self, nodes: &[FormatNode]) -> Result<(), OutOfData> {
        for node in nodes {
            match node {
                FormatNode::Scalar { kind, times } => {
                    let count = match times {
                        Multiplier::Once => 1,
                        Multiplier::Fixed(n) => *n,
                        Multiplier::FromData(width) => {
                            let n = self.read_count(*width)?;
                            self.items.push(CompositeItem::ArrayLen(n));
                            n
                        }
                    };
                    for _ in 0..count {
                        let item = self.read_scalar(*kind)?;
                        self.items.push(item);
                    }
                }
                FormatNode::Group { items, times } => {
                    let count = match times {
                        Multiplier::Once => 1,
                        Multiplier::Fixed(n) => *n,
                        Multiplier::FromData(width) => {
                            let n = self.read_count(*width)?;
                            self.items.push(CompositeItem::Repeat(n));
                            n
                        }
                    };
                    for _ in 0..count {
                        self.walk_list(items)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Apply `format` repeatedly over `data` until the bytes are used up
///
/// Returns the items decoded and whether the data ended inside a format
/// element.
pub(super) fn walk_items(
    format: &CompositeFormat,
    data: &[u8],
    order: ByteOrder,
) -> (Vec<CompositeItem>, bool) {
    let mut walker = Walker {
        data,
        order,
        pos: 0,
        items: Vec::new(),
    };
    let mut truncated = false;
    while walker.pos < data.len() {
        let start = walker.pos;
        if walker.walk_list(format.nodes()).is_err() {
            truncated = true;
            break;
        }
        if walker.pos == start {
            break;
        }
    }
    (walker.items, truncated)
}
