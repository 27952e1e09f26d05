//! Fixed-width bit vector tracking which hour pairs are joinable.
//!
//! Bit `k` covers hour pair `k` (slots `2k` and `2k+1`). A set bit means
//! every person column holds identical values in both subslots, so the pair
//! can be rendered as a single merged hour. Widths never exceed 15 bits
//! (the day-2 pair count), so a single `u64` backs the whole mask.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeMask {
    bits: u64,
    len: usize,
}

impl MergeMask {
    /// A mask of `len` set bits. An empty grid is trivially joinable
    /// everywhere, so this is the starting state.
    pub fn filled(len: usize) -> MergeMask {
        debug_assert!(len <= 64);
        let bits = if len == 64 { u64::MAX } else { (1u64 << len) - 1 };
        MergeMask { bits, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        self.bits >> index & 1 == 1
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len);
        if value {
            self.bits |= 1 << index;
        } else {
            self.bits &= !(1 << index);
        }
    }

    /// Bitwise AND of two masks of equal width.
    pub fn and(&self, other: &MergeMask) -> MergeMask {
        debug_assert_eq!(self.len, other.len);
        MergeMask {
            bits: self.bits & other.bits,
            len: self.len,
        }
    }

    /// Indices of set bits, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|i| self.get(*i))
    }

    /// `"1011…"` with bit 0 first.
    pub fn to_bit_string(&self) -> String {
        (0..self.len)
            .map(|i| if self.get(i) { '1' } else { '0' })
            .collect()
    }

    /// Inverse of [`to_bit_string`](Self::to_bit_string). Rejects characters
    /// outside `0`/`1` and widths over 64.
    pub fn from_bit_string(s: &str) -> Option<MergeMask> {
        if s.len() > 64 {
            return None;
        }
        let mut mask = MergeMask { bits: 0, len: s.len() };
        for (i, c) in s.chars().enumerate() {
            match c {
                '1' => mask.set(i, true),
                '0' => {}
                _ => return None,
            }
        }
        Some(mask)
    }
}

impl fmt::Display for MergeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bit_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_is_all_ones() {
        let mask = MergeMask::filled(14);
        assert_eq!(mask.len(), 14);
        assert!((0..14).all(|i| mask.get(i)));
        assert_eq!(mask.to_bit_string(), "11111111111111");
    }

    #[test]
    fn test_set_and_get() {
        let mut mask = MergeMask::filled(10);
        mask.set(3, false);
        assert!(!mask.get(3));
        assert!(mask.get(2));
        mask.set(3, true);
        assert!(mask.get(3));
    }

    #[test]
    fn test_and() {
        let mut a = MergeMask::filled(4);
        let mut b = MergeMask::filled(4);
        a.set(0, false);
        b.set(3, false);
        let c = a.and(&b);
        assert_eq!(c.to_bit_string(), "0110");
        assert_eq!(c.ones().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_bit_string_round_trip() {
        let mut mask = MergeMask::filled(15);
        mask.set(1, false);
        mask.set(14, false);
        let s = mask.to_bit_string();
        assert_eq!(MergeMask::from_bit_string(&s), Some(mask));
    }

    #[test]
    fn test_from_bit_string_rejects_garbage() {
        assert_eq!(MergeMask::from_bit_string("10x1"), None);
        assert!(MergeMask::from_bit_string("").is_some());
    }
}
