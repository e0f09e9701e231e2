//! Block descriptor codec
//!
//! A block's entire header is one machine word: the block's total size
//! (header plus data) stored as a multiple of [`ALIGNMENT`], with the free
//! flag packed into the most-significant bit. The tagged [`Descriptor`]
//! struct is the in-code representation; the raw bit layout exists only at
//! the encode/decode boundary where header words are read from or written to
//! heap memory.

use core::mem;

use static_assertions::const_assert;

/// Alignment unit: all block sizes are multiples of one machine word
pub const ALIGNMENT: usize = mem::size_of::<usize>();

/// A block header is exactly one descriptor word
pub const HEADER_SIZE: usize = ALIGNMENT;

const FLAG_SHIFT: u32 = usize::BITS - 1;
const FLAG_MASK: usize = 1 << FLAG_SHIFT;

const_assert!(ALIGNMENT.is_power_of_two());
const_assert!(mem::size_of::<usize>() == mem::align_of::<usize>());

/// Decoded form of a block header word
///
/// `size_units` is the block's total span (header + data) in [`ALIGNMENT`]
/// units and is always at least 1. Malformed words are a programming
/// contract violation, not a runtime-checked condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub free: bool,
    pub size_units: usize,
}

impl Descriptor {
    /// Build a descriptor for a block spanning `total_bytes`.
    ///
    /// `total_bytes` must be a positive multiple of [`ALIGNMENT`].
    pub fn new(total_bytes: usize, free: bool) -> Self {
        debug_assert!(total_bytes > 0);
        debug_assert!(total_bytes % ALIGNMENT == 0);
        Self {
            free,
            size_units: total_bytes / ALIGNMENT,
        }
    }

    /// Pack into a header word
    pub fn encode(self) -> usize {
        let word = self.size_units & !FLAG_MASK;
        if self.free {
            word | FLAG_MASK
        } else {
            word
        }
    }

    /// Unpack a header word, masking the flag bit out of the magnitude
    pub fn decode(word: usize) -> Self {
        Self {
            free: word & FLAG_MASK != 0,
            size_units: word & !FLAG_MASK,
        }
    }

    /// Total block span in bytes (header + data)
    pub fn total_bytes(self) -> usize {
        self.size_units * ALIGNMENT
    }

    /// Usable data bytes behind the header
    pub fn data_bytes(self) -> usize {
        self.total_bytes() - HEADER_SIZE
    }
}

/// Mark a raw header word free without touching its size
pub fn set_free(word: usize) -> usize {
    word | FLAG_MASK
}

/// Mark a raw header word in-use without touching its size
pub fn set_in_use(word: usize) -> usize {
    word & !FLAG_MASK
}

/// Round a requested size up to the alignment unit. Never returns 0.
pub fn align_up(size: usize) -> usize {
    if size == 0 {
        return ALIGNMENT;
    }
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}
