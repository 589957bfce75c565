//! WOTS+ parameter computation

use crate::error::{Error, Result};

/// `w`, `n`, and the derived chain counts (`len1`, `len2`, `len`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WOTSParams {
    pub w: u32,
    pub n: usize,
    pub len1: usize,
    pub len2: usize,
    pub len: usize,
}

fn is_power_of_two(n: u32) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

fn log2_u32(n: u32) -> u32 {
    debug_assert!(is_power_of_two(n));
    n.trailing_zeros()
}

impl WOTSParams {
    /// `w` must be one of `{4, 16, 256}`; any power of two is accepted by
    /// the arithmetic below, but the service layer restricts pools to the
    /// three blessed values.
    pub fn new(w: u32, n: usize) -> Result<Self> {
        if !is_power_of_two(w) {
            return Err(Error::InvalidW(w));
        }

        let log2w = log2_u32(w) as usize;
        // len1 = ceil(8n / log2(w))
        let len1 = (8 * n + log2w - 1) / log2w;
        // len2 = floor(log2(len1 * (w - 1)) / log2(w)) + 1
        let max_checksum = len1 as u64 * (w as u64 - 1);
        let len2 = (63 - max_checksum.leading_zeros()) as usize / log2w + 1;
        let len = len1 + len2;

        Ok(Self { w, n, len1, len2, len })
    }

    /// the standard 32-byte-message parameterization with `w=16`.
    pub fn standard() -> Self {
        Self::new(16, 32).expect("w=16 is a valid power of two")
    }

    pub fn log2w(&self) -> u32 {
        log2_u32(self.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        assert_eq!(WOTSParams::new(10, 32).unwrap_err(), Error::InvalidW(10));
    }

    #[test]
    fn w16_matches_known_values() {
        // w=16, n=32: len1 = ceil(256/4) = 64; len2 = floor(log2(64*15)/4)+1 = floor(log2(960)/4)+1
        // log2(960) ~= 9.9 -> floor(9.9/4)=2 -> len2=3; len=67
        let p = WOTSParams::new(16, 32).unwrap();
        assert_eq!(p.len1, 64);
        assert_eq!(p.len2, 3);
        assert_eq!(p.len, 67);
    }

    #[test]
    fn w4_and_w256_are_accepted() {
        assert!(WOTSParams::new(4, 32).is_ok());
        assert!(WOTSParams::new(256, 32).is_ok());
    }
}
