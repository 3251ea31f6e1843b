//! Named bit-field accessors for packed 32-bit words

/// Contiguous bit range of a 32-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub start: u32,
    pub width: u32,
}

impl BitField {
    pub const fn new(start: u32, width: u32) -> Self {
        Self { start, width }
    }

    /// Inclusive bit range `lo..=hi`
    pub const fn range(lo: u32, hi: u32) -> Self {
        Self::new(lo, hi - lo + 1)
    }

    pub const fn bit(pos: u32) -> Self {
        Self::new(pos, 1)
    }

    #[inline]
    pub const fn mask(self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    #[inline]
    pub const fn get(self, word: u32) -> u32 {
        (word >> self.start) & self.mask()
    }

    #[inline]
    pub const fn is_set(self, word: u32) -> bool {
        self.get(word) != 0
    }

    /// Single-bit field as +1 / -1
    #[inline]
    pub const fn sign(self, word: u32) -> i8 {
        if self.is_set(word) {
            1
        } else {
            -1
        }
    }
}
