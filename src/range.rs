//! Lazy integer ranges over [`Count`] bounds.
//!
//! These back block iteration, where a native counter would overflow on
//! large IPv6 blocks. Nothing here allocates in proportion to the range.

use crate::count::Count;
use crate::error::{Error, Result};
use rand::Rng;

/// Restartable `[start, stop)` range with a step.
///
/// The descriptor itself holds no cursor; every call to [`XLongRange::iter`]
/// starts again from `start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XLongRange {
    start: Count,
    stop: Count,
    step: Count,
}

/// Builds an [`XLongRange`], failing with [`Error::Value`] on a zero step.
pub fn xlongrange<A, B, C>(start: A, stop: B, step: C) -> Result<XLongRange>
where
    A: Into<Count>,
    B: Into<Count>,
    C: Into<Count>,
{
    XLongRange::new(start.into(), stop.into(), step.into())
}

impl XLongRange {
    pub fn new(start: Count, stop: Count, step: Count) -> Result<Self> {
        if step.is_zero() {
            return Err(Error::Value("range step must not be zero".to_owned()));
        }
        Ok(XLongRange { start, stop, step })
    }

    pub fn start(&self) -> Count {
        self.start
    }

    pub fn stop(&self) -> Count {
        self.stop
    }

    pub fn step(&self) -> Count {
        self.step
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.stop
    }

    pub fn iter(&self) -> XLongIter {
        XLongIter {
            next: Some(self.start),
            stop: self.stop,
            step: self.step,
        }
    }
}

impl IntoIterator for XLongRange {
    type Item = Count;
    type IntoIter = XLongIter;

    fn into_iter(self) -> XLongIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &'a XLongRange {
    type Item = Count;
    type IntoIter = XLongIter;

    fn into_iter(self) -> XLongIter {
        self.iter()
    }
}

#[derive(Clone, Debug)]
pub struct XLongIter {
    // None once stepping past the representable maximum.
    next: Option<Count>,
    stop: Count,
    step: Count,
}

impl Iterator for XLongIter {
    type Item = Count;

    fn next(&mut self) -> Option<Count> {
        let cur = self.next?;
        if cur >= self.stop {
            return None;
        }
        self.next = cur.checked_add(self.step);
        Some(cur)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.next {
            Some(next) if next < self.stop => self.stop.checked_sub(next).unwrap_or(Count::ZERO),
            _ => return (0, Some(0)),
        };
        let step = match self.step.to_u128() {
            Some(s) => s,
            None => return (1, Some(2)),
        };
        match remaining.to_u128() {
            Some(d) => {
                let n = Count::from(d / step + u128::from(d % step != 0)).saturating_usize();
                (n, Some(n))
            }
            // Only a full 2^128 span lands here.
            None if step == 1 => (usize::MAX, None),
            None => (0, None),
        }
    }
}

/// Every integer of `[start, stop)` exactly once, in shuffled order.
///
/// The order comes from a full-period linear congruential generator over the
/// smallest power of two covering the span; outputs past the span are
/// skipped, so each element costs at most two generator steps on average.
#[derive(Clone, Debug)]
pub struct RandomRange {
    start: Count,
    span: Count,
    mask: u128,
    multiplier: u128,
    increment: u128,
    state: u128,
    emitted: Count,
}

pub fn xrandrange<A, B, R>(start: A, stop: B, rng: &mut R) -> RandomRange
where
    A: Into<Count>,
    B: Into<Count>,
    R: Rng + ?Sized,
{
    RandomRange::new(start.into(), stop.into(), rng)
}

impl RandomRange {
    pub fn new<R: Rng + ?Sized>(start: Count, stop: Count, rng: &mut R) -> Self {
        let span = stop.checked_sub(start).unwrap_or(Count::ZERO);
        let mask = match span.to_u128() {
            None => u128::MAX,
            Some(n) if n <= 1 => 0,
            Some(n) => {
                let bits = 128 - (n - 1).leading_zeros();
                if bits == 128 {
                    u128::MAX
                } else {
                    (1u128 << bits) - 1
                }
            }
        };
        // Hull-Dobell: modulus 2^k, increment odd, multiplier = 1 mod 4.
        RandomRange {
            start,
            span,
            mask,
            multiplier: (rng.gen::<u128>() << 2) | 1,
            increment: rng.gen::<u128>() | 1,
            state: rng.gen::<u128>() & mask,
            emitted: Count::ZERO,
        }
    }

    fn step(&mut self) -> u128 {
        let x = self.state;
        self.state = self
            .multiplier
            .wrapping_mul(x)
            .wrapping_add(self.increment)
            & self.mask;
        x
    }
}

impl Iterator for RandomRange {
    type Item = Count;

    fn next(&mut self) -> Option<Count> {
        if self.emitted >= self.span {
            return None;
        }
        loop {
            let x = Count::from(self.step());
            if x < self.span {
                self.emitted = self.emitted.saturating_add(Count::ONE);
                return Some(self.start.saturating_add(x));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.span.checked_sub(self.emitted).unwrap_or(Count::ZERO);
        match left.to_u128() {
            Some(_) => {
                let n = left.saturating_usize();
                (n, Some(n))
            }
            None => (usize::MAX, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn values(r: XLongRange) -> Vec<u128> {
        r.iter().map(|c| c.to_u128().unwrap()).collect()
    }

    #[test]
    fn steps_and_bounds() {
        assert_eq!(vec![0, 1, 2, 3], values(xlongrange(0u32, 4u32, 1u32).unwrap()));
        assert_eq!(vec![3, 6, 9], values(xlongrange(3u32, 10u32, 3u32).unwrap()));
        assert!(values(xlongrange(5u32, 5u32, 1u32).unwrap()).is_empty());
        assert!(values(xlongrange(9u32, 2u32, 1u32).unwrap()).is_empty());
    }

    #[test]
    fn zero_step_is_rejected() {
        match xlongrange(0u32, 10u32, 0u32) {
            Err(Error::Value(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn restartable() {
        let r = xlongrange(0u32, 3u32, 1u32).unwrap();
        assert_eq!(values(r), values(r));
        let mut it = r.iter();
        assert_eq!(Some(Count::ZERO), it.next());
        assert_eq!(3, r.iter().count());
        assert_eq!(Some(Count::ONE), it.next());
    }

    #[test]
    fn past_u128_is_lazy() {
        let stop = Count::pow2(128).unwrap();
        let start = Count::from(u128::MAX - 1);
        let r = XLongRange::new(start, stop, Count::ONE).unwrap();
        let got: Vec<Count> = r.iter().collect();
        assert_eq!(vec![Count::from(u128::MAX - 1), Count::from(u128::MAX)], got);

        let all = XLongRange::new(Count::ZERO, stop, Count::ONE).unwrap();
        assert_eq!(
            vec![0, 1, 2],
            all.iter().take(3).map(|c| c.to_u128().unwrap()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn random_range_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let got: Vec<u128> = xrandrange(10u32, 110u32, &mut rng)
            .map(|c| c.to_u128().unwrap())
            .collect();
        assert_eq!(100, got.len());
        let uniq: HashSet<u128> = got.iter().copied().collect();
        assert_eq!((10..110).collect::<HashSet<u128>>(), uniq);
    }

    #[test]
    fn random_range_over_full_space() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut r = RandomRange::new(Count::ZERO, Count::pow2(128).unwrap(), &mut rng);
        let first: HashSet<Count> = r.by_ref().take(64).collect();
        assert_eq!(64, first.len());
    }

    #[quickcheck]
    fn random_range_small_spans(start: u16, len: u8, seed: u64) -> bool {
        let mut rng = StdRng::seed_from_u64(seed);
        let start = u128::from(start);
        let stop = start + u128::from(len);
        let got: HashSet<Count> = xrandrange(start, stop, &mut rng).collect();
        got.len() == usize::from(len)
            && got
                .iter()
                .all(|c| *c >= Count::from(start) && *c < Count::from(stop))
    }

    #[quickcheck]
    fn size_hint_matches_count(start: u16, len: u16, step: u8) -> bool {
        let step = u128::from(step.max(1));
        let start = u128::from(start);
        let r = xlongrange(start, start + u128::from(len), step).unwrap();
        r.iter().size_hint().0 == r.iter().count()
    }
}
