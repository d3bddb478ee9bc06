//! A counter wide enough for the size of the whole IPv6 space.
//!
//! A `/0` IPv6 block holds `2^128` addresses, one more than `u128::MAX`.
//! [`Count`] carries a single extra high bit so block sizes, set totals and
//! range bounds never overflow.

use std::convert::TryFrom;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Count {
    // Field order matters for the derived ordering.
    high: bool,
    low: u128,
}

impl Count {
    pub const ZERO: Count = Count {
        high: false,
        low: 0,
    };
    pub const ONE: Count = Count {
        high: false,
        low: 1,
    };

    /// `2^bits`, for `bits <= 128`.
    pub fn pow2(bits: u32) -> Option<Count> {
        match bits {
            128 => Some(Count {
                high: true,
                low: 0,
            }),
            b if b < 128 => Some(Count::from(1u128 << b)),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Count::ZERO
    }

    pub fn to_u128(&self) -> Option<u128> {
        if self.high {
            None
        } else {
            Some(self.low)
        }
    }

    pub fn checked_add(self, rhs: Count) -> Option<Count> {
        let (low, carry) = self.low.overflowing_add(rhs.low);
        match (self.high, rhs.high, carry) {
            (false, false, false) => Some(Count { high: false, low }),
            (true, false, false) | (false, true, false) | (false, false, true) => {
                Some(Count { high: true, low })
            }
            _ => None,
        }
    }

    pub fn checked_sub(self, rhs: Count) -> Option<Count> {
        if self < rhs {
            return None;
        }
        let (low, borrow) = self.low.overflowing_sub(rhs.low);
        let high = self.high ^ rhs.high ^ borrow;
        Some(Count { high, low })
    }

    pub fn saturating_add(self, rhs: Count) -> Count {
        self.checked_add(rhs).unwrap_or(Count {
            high: true,
            low: u128::MAX,
        })
    }

    /// Clamps to `usize`, for iterator size hints.
    pub(crate) fn saturating_usize(&self) -> usize {
        match self.to_u128() {
            Some(v) => usize::try_from(v).unwrap_or(usize::MAX),
            None => usize::MAX,
        }
    }
}

impl From<u128> for Count {
    fn from(low: u128) -> Self {
        Count { high: false, low }
    }
}

impl From<u64> for Count {
    fn from(v: u64) -> Self {
        Count::from(u128::from(v))
    }
}

impl From<u32> for Count {
    fn from(v: u32) -> Self {
        Count::from(u128::from(v))
    }
}

impl TryFrom<Count> for u128 {
    type Error = crate::Error;

    fn try_from(c: Count) -> Result<Self, Self::Error> {
        c.to_u128()
            .ok_or_else(|| crate::Error::Range(format!("{} does not fit in 128 bits", c)))
    }
}

impl PartialEq<u128> for Count {
    fn eq(&self, other: &u128) -> bool {
        !self.high && self.low == *other
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.high {
            return fmt::Display::fmt(&self.low, f);
        }
        // Long division by 10^19 over three 64-bit limbs, most significant first.
        const CHUNK: u128 = 10_000_000_000_000_000_000;
        let mut limbs = [1u64, (self.low >> 64) as u64, self.low as u64];
        let mut chunks = Vec::new();
        while limbs.iter().any(|&l| l != 0) {
            let mut rem: u128 = 0;
            for limb in limbs.iter_mut() {
                let cur = (rem << 64) | u128::from(*limb);
                *limb = (cur / CHUNK) as u64;
                rem = cur % CHUNK;
            }
            chunks.push(rem as u64);
        }
        let mut s = chunks.pop().map(|c| c.to_string()).unwrap_or_default();
        while let Some(c) = chunks.pop() {
            s.push_str(&format!("{:019}", c));
        }
        f.pad(&s)
    }
}
