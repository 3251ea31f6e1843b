//! Composite format strings
//!
//! A format string describes the repeating layout of a composite payload:
//!
//! ```text
//! c C  int8 / uint8        N  32-bit count read from the data
//! s S  int16 / uint16      n  16-bit count read from the data
//! i I  int32 / uint32      m  8-bit count read from the data
//! l L  int64 / uint64      3  literal repeat count
//! ```
//!
//! A count placed before a scalar sizes an array (`Ns`), placed before a
//! parenthesized group it repeats the group (`N(c,Ns)`).

use std::iter::Peekable;
use std::str::Chars;

use super::CompositeError;

/// Primitive item types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
}

impl Scalar {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'c' => Some(Scalar::Int8),
            'C' => Some(Scalar::UInt8),
            's' => Some(Scalar::Int16),
            'S' => Some(Scalar::UInt16),
            'i' => Some(Scalar::Int32),
            'I' => Some(Scalar::UInt32),
            'l' => Some(Scalar::Int64),
            'L' => Some(Scalar::UInt64),
            _ => None,
        }
    }
}

/// Width of a count read from the data stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWidth {
    /// `m`
    U8,
    /// `n`
    U16,
    /// `N`
    U32,
}

impl CountWidth {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'm' => Some(CountWidth::U8),
            'n' => Some(CountWidth::U16),
            'N' => Some(CountWidth::U32),
            _ => None,
        }
    }
}

/// How many times a format element is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplier {
    Once,
    Fixed(u32),
    FromData(CountWidth),
}

/// One compiled element of a format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatNode {
    Scalar { kind: Scalar, times: Multiplier },
    Group { items: Vec<FormatNode>, times: Multiplier },
}

/// A compiled composite format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeFormat {
    text: String,
    nodes: Vec<FormatNode>,
}

impl CompositeFormat {
    /// Compile a format string
    pub fn parse(text: &str) -> Result<Self, CompositeError> {
        let mut parser = Parser {
            chars: text.chars().peekable(),
            position: 0,
        };
        let nodes = parser.parse_list(false)?;
        Ok(Self {
            text: text.trim().to_string(),
            nodes,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn nodes(&self) -> &[FormatNode] {
        &self.nodes
    }
}

impl std::fmt::Display for CompositeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> CompositeError {
        CompositeError::Format {
            position: self.position,
            reason: reason.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn parse_list(&mut self, in_group: bool) -> Result<Vec<FormatNode>, CompositeError> {
        let mut nodes = Vec::new();
        loop {
            nodes.push(self.parse_item()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(')') if in_group => return Ok(nodes),
                None if !in_group => return Ok(nodes),
                None => return Err(self.error("unclosed group")),
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            }
        }
    }

    fn parse_item(&mut self) -> Result<FormatNode, CompositeError> {
        self.skip_whitespace();
        let times = self.parse_multiplier()?;
        self.skip_whitespace();
        match self.bump() {
            Some('(') => {
                let items = self.parse_list(true)?;
                Ok(FormatNode::Group { items, times })
            }
            Some(c) => match Scalar::from_char(c) {
                Some(kind) => Ok(FormatNode::Scalar { kind, times }),
                None => Err(self.error(format!("unsupported item type '{}'", c))),
            },
            None => Err(self.error("expected an item type")),
        }
    }

    fn parse_multiplier(&mut self) -> Result<Multiplier, CompositeError> {
        match self.chars.peek().copied() {
            Some(c) if c.is_ascii_digit() => {
                let mut value: u32 = 0;
                while let Some(d) = self.chars.peek().and_then(|c| c.to_digit(10)) {
                    self.bump();
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(d))
                        .ok_or_else(|| self.error("repeat count overflow"))?;
                }
                if value == 0 {
                    return Err(self.error("repeat count must be positive"));
                }
                Ok(Multiplier::Fixed(value))
            }
            Some(c) => match CountWidth::from_char(c) {
                Some(width) => {
                    self.bump();
                    Ok(Multiplier::FromData(width))
                }
                None => Ok(Multiplier::Once),
            },
            None => Ok(Multiplier::Once),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(kind: Scalar) -> FormatNode {
        FormatNode::Scalar {
            kind,
            times: Multiplier::Once,
        }
    }

    #[test]
    fn parses_pulse_format() {
        let format = CompositeFormat::parse("c,i,l,N(c,Ns)").unwrap();
        assert_eq!(format.text(), "c,i,l,N(c,Ns)");
        assert_eq!(
            format.nodes(),
            &[
                scalar(Scalar::Int8),
                scalar(Scalar::Int32),
                scalar(Scalar::Int64),
                FormatNode::Group {
                    items: vec![
                        scalar(Scalar::Int8),
                        FormatNode::Scalar {
                            kind: Scalar::Int16,
                            times: Multiplier::FromData(CountWidth::U32),
                        },
                    ],
                    times: Multiplier::FromData(CountWidth::U32),
                },
            ]
        );
    }

    #[test]
    fn parses_nested_short_counts() {
        let format = CompositeFormat::parse("c,i,l,n(s,m(c,mc))").unwrap();
        match &format.nodes()[3] {
            FormatNode::Group { items, times } => {
                assert_eq!(*times, Multiplier::FromData(CountWidth::U16));
                match &items[1] {
                    FormatNode::Group { times, items } => {
                        assert_eq!(*times, Multiplier::FromData(CountWidth::U8));
                        assert_eq!(items.len(), 2);
                    }
                    other => panic!("expected group, got {:?}", other),
                }
            }
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn literal_repeat_and_whitespace() {
        let format = CompositeFormat::parse(" 2i , 3(S,C) ").unwrap();
        assert_eq!(
            format.nodes()[0],
            FormatNode::Scalar {
                kind: Scalar::Int32,
                times: Multiplier::Fixed(2)
            }
        );
        assert!(matches!(
            format.nodes()[1],
            FormatNode::Group {
                times: Multiplier::Fixed(3),
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_formats() {
        for bad in ["", "c,", "N(c", "c)", "x", "0i", "c,,i", "N"] {
            assert!(
                matches!(
                    CompositeFormat::parse(bad),
                    Err(CompositeError::Format { .. })
                ),
                "format {:?} should be rejected",
                bad
            );
        }
    }
}
