//! MSB-first bit reader over a byte slice.

/// Reads variable-width codes, most significant bit first, across byte
/// boundaries.
#[derive(Debug, Clone)]
pub struct BitStream<'a> {
    data: &'a [u8],
    byte: usize,
    /// Bits already consumed from `data[byte]` (0..8).
    bit: u8,
}

impl<'a> BitStream<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte: 0,
            bit: 0,
        }
    }

    /// Number of unread bits.
    pub const fn remaining_bits(&self) -> usize {
        if self.byte >= self.data.len() {
            0
        } else {
            (self.data.len() - self.byte) * 8 - self.bit as usize
        }
    }

    /// Read the next `bits` bits (1..=16) as an unsigned value.
    ///
    /// Returns `None` once fewer than `bits` bits remain; the cursor does
    /// not move in that case.
    pub fn get(&mut self, bits: u8) -> Option<u32> {
        debug_assert!((1..=16).contains(&bits));
        if self.remaining_bits() < bits as usize {
            return None;
        }

        let mut value: u32 = 0;
        let mut needed = bits;
        while needed > 0 {
            let available = 8 - self.bit;
            let take = needed.min(available);
            let current = u32::from(self.data[self.byte]);
            let shift = available - take;
            let chunk = (current >> shift) & ((1u32 << take) - 1);
            value = (value << take) | chunk;

            needed -= take;
            self.bit += take;
            if self.bit == 8 {
                self.bit = 0;
                self.byte += 1;
            }
        }
        Some(value)
    }
}
