use crate::address::{host_bits, mask_bits, Address, Version};
use crate::count::Count;
use crate::error::{parse_err, range_err, Error, Result};
use crate::range::{RandomRange, XLongIter, XLongRange};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::{Shl, Shr};
use std::str::FromStr;

/// An address together with a prefix length, denoting the block of
/// addresses that share the first `prefix` bits.
///
/// The stored address may carry host bits; [`Cidr::network`] drops them.
/// Equality, hashing and ordering only look at the family, the network
/// address and the prefix.
#[derive(Clone, Copy, Debug)]
pub struct Cidr {
    address: Address,
    prefix: u8,
    inclusive: bool,
}

impl Cidr {
    pub fn new(address: Address, prefix: u8) -> Result<Self> {
        if prefix > address.max_prefix() {
            return Err(range_err(format!(
                "prefix /{} is longer than {} bits",
                prefix,
                address.max_prefix()
            )));
        }
        Ok(Cidr {
            address,
            prefix,
            inclusive: true,
        })
    }

    /// Whether the network and broadcast addresses count as members.
    ///
    /// Only blocks of more than two addresses are affected; `/31` and host
    /// blocks always keep every address.
    pub fn inclusive(mut self, inclusive: bool) -> Self {
        self.inclusive = inclusive;
        self
    }

    pub fn is_inclusive(&self) -> bool {
        self.inclusive
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn version(&self) -> Version {
        self.address.version()
    }

    fn bits(&self) -> u8 {
        self.address.max_prefix()
    }

    fn network_bits(&self) -> u128 {
        self.address.to_integer() & mask_bits(self.version(), self.prefix)
    }

    fn broadcast_bits(&self) -> u128 {
        self.address.to_integer() | host_bits(self.version(), self.prefix)
    }

    fn excludes_edges(&self) -> bool {
        !self.inclusive && self.bits() - self.prefix >= 2
    }

    pub fn netmask(&self) -> Address {
        Address::from_parts(self.version(), mask_bits(self.version(), self.prefix))
    }

    pub fn hostmask(&self) -> Address {
        Address::from_parts(self.version(), host_bits(self.version(), self.prefix))
    }

    /// The same block with host bits cleared.
    pub fn network(&self) -> Cidr {
        Cidr {
            address: self.routing_address(),
            ..*self
        }
    }

    pub fn routing_address(&self) -> Address {
        Address::from_parts(self.version(), self.network_bits())
    }

    pub fn broadcast_address(&self) -> Address {
        Address::from_parts(self.version(), self.broadcast_bits())
    }

    /// Lowest and highest address of the block.
    pub fn network_range(&self) -> (Address, Address) {
        (self.routing_address(), self.broadcast_address())
    }

    /// Number of addresses spanned, `2^(width - prefix)`.
    pub fn size(&self) -> Count {
        Count::pow2(u32::from(self.bits() - self.prefix)).unwrap_or(Count::ZERO)
    }

    /// Number of member addresses; two fewer than [`Cidr::size`] when the
    /// edges are excluded.
    pub fn len(&self) -> Count {
        let size = self.size();
        if self.excludes_edges() {
            size.checked_sub(Count::from(2u32)).unwrap_or(Count::ZERO)
        } else {
            size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len().is_zero()
    }

    fn first_offset(&self) -> u128 {
        u128::from(self.excludes_edges())
    }

    /// The member address at `offset`, counting from the first member.
    pub fn get_address(&self, offset: u128) -> Result<Address> {
        if Count::from(offset) >= self.len() {
            return Err(Error::Index(format!(
                "offset {} is outside {} ({} addresses)",
                offset,
                self,
                self.len()
            )));
        }
        Address::new(
            self.version(),
            self.network_bits() + self.first_offset() + offset,
        )
    }

    pub fn has_address(&self, address: &Address) -> bool {
        if address.version() != self.version() {
            return false;
        }
        let v = address.to_integer();
        let (lo, hi) = (self.network_bits(), self.broadcast_bits());
        if self.excludes_edges() {
            lo < v && v < hi
        } else {
            lo <= v && v <= hi
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.has_address(address)
    }

    pub fn is_superset_of(&self, other: &Cidr) -> bool {
        self.version() == other.version()
            && self.prefix <= other.prefix
            && other.network_bits() & mask_bits(self.version(), self.prefix) == self.network_bits()
    }

    pub fn is_subset_of(&self, other: &Cidr) -> bool {
        other.is_superset_of(self)
    }

    pub fn contains_cidr(&self, other: &Cidr) -> bool {
        self.is_superset_of(other)
    }

    /// Aligned blocks either nest or are disjoint.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.is_superset_of(other) || other.is_superset_of(self)
    }

    /// The enclosing block one bit shorter.
    pub fn supernet(&self) -> Option<Cidr> {
        if self.prefix == 0 {
            return None;
        }
        Some(
            Cidr {
                prefix: self.prefix - 1,
                ..*self
            }
            .network(),
        )
    }

    /// Lower and upper halves of the block.
    pub fn split(&self) -> Option<(Cidr, Cidr)> {
        if self.prefix == self.bits() {
            return None;
        }
        let prefix = self.prefix + 1;
        let half = 1u128 << (self.bits() - prefix);
        let lower = Cidr {
            address: self.routing_address(),
            prefix,
            inclusive: self.inclusive,
        };
        let upper = Cidr {
            address: Address::from_parts(self.version(), self.network_bits() | half),
            ..lower
        };
        Some((lower, upper))
    }

    /// The other half of this block's supernet.
    pub(crate) fn buddy(&self) -> Option<Cidr> {
        if self.prefix == 0 {
            return None;
        }
        let bit = 1u128 << (self.bits() - self.prefix);
        Some(Cidr {
            address: Address::from_parts(self.version(), self.network_bits() ^ bit),
            ..*self
        })
    }

    /// The blocks covering `self` minus `other`, in ascending order.
    pub fn exclude(&self, other: &Cidr) -> Vec<Cidr> {
        if !self.overlaps(other) {
            return vec![self.network()];
        }
        if other.is_superset_of(self) {
            return Vec::new();
        }
        let mut rest = Vec::with_capacity(usize::from(other.prefix - self.prefix));
        let mut cur = self.network();
        while cur.prefix < other.prefix {
            let (lower, upper) = match cur.split() {
                Some(halves) => halves,
                None => break,
            };
            if lower.is_superset_of(other) {
                rest.push(upper);
                cur = lower;
            } else {
                rest.push(lower);
                cur = upper;
            }
        }
        rest.sort();
        rest
    }

    /// Narrows the block by `n` bits.
    pub fn narrow(&self, n: u8) -> Result<Cidr> {
        match self.prefix.checked_add(n) {
            Some(prefix) if prefix <= self.bits() => Ok(Cidr { prefix, ..*self }),
            _ => Err(range_err(format!("{} cannot be narrowed by {} bits", self, n))),
        }
    }

    /// Widens the block by `n` bits.
    pub fn widen(&self, n: u8) -> Result<Cidr> {
        match self.prefix.checked_sub(n) {
            Some(prefix) => Ok(Cidr { prefix, ..*self }),
            None => Err(range_err(format!("{} cannot be widened by {} bits", self, n))),
        }
    }

    /// Minimal list of blocks covering `first..=last`.
    pub fn from_range(first: Address, last: Address) -> Result<Vec<Cidr>> {
        if first.try_cmp(&last)? == Ordering::Greater {
            return Err(range_err(format!("{} is after {}", first, last)));
        }
        let version = first.version();
        let width = u32::from(version.bits());
        let last = last.to_integer();
        let mut cur = first.to_integer();
        let mut blocks = Vec::new();
        loop {
            let align = if cur == 0 {
                width
            } else {
                cur.trailing_zeros().min(width)
            };
            // Largest k with 2^k <= last - cur + 1.
            let fit = match (last - cur).checked_add(1) {
                Some(n) => 127 - n.leading_zeros(),
                None => 128,
            };
            let k = align.min(fit);
            let prefix = (width - k) as u8;
            blocks.push(Cidr::new(Address::from_parts(version, cur), prefix)?);
            let block_last = cur | host_bits(version, prefix);
            if block_last >= last {
                break;
            }
            cur = block_last + 1;
        }
        Ok(blocks)
    }

    /// Every member address in ascending order.
    pub fn iter(&self) -> CidrIter {
        let start = Count::from(self.network_bits()).saturating_add(Count::from(self.first_offset()));
        let stop = start.saturating_add(self.len());
        let offsets = XLongRange::new(start, stop, Count::ONE)
            .map(|r| r.iter())
            .ok();
        CidrIter {
            version: self.version(),
            offsets,
        }
    }

    /// Every member address exactly once, in shuffled order.
    pub fn random_iter<R: Rng + ?Sized>(&self, rng: &mut R) -> CidrRandomIter {
        let start = Count::from(self.network_bits()).saturating_add(Count::from(self.first_offset()));
        CidrRandomIter {
            version: self.version(),
            values: RandomRange::new(start, start.saturating_add(self.len()), rng),
        }
    }

    fn key(&self) -> (Version, u128, u8) {
        (self.version(), self.network_bits(), self.prefix)
    }
}

impl PartialEq for Cidr {
    fn eq(&self, other: &Cidr) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Cidr {}

impl Hash for Cidr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

impl PartialOrd for Cidr {
    fn partial_cmp(&self, other: &Cidr) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// IPv4 before IPv6, then by network address, shorter prefix first.
impl Ord for Cidr {
    fn cmp(&self, other: &Cidr) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Shl<u8> for Cidr {
    type Output = Result<Cidr>;

    fn shl(self, n: u8) -> Result<Cidr> {
        self.widen(n)
    }
}

impl Shr<u8> for Cidr {
    type Output = Result<Cidr>;

    fn shr(self, n: u8) -> Result<Cidr> {
        self.narrow(n)
    }
}

impl FromStr for Cidr {
    type Err = Error;

    /// `"address/prefix"`; a bare address is a host block.
    fn from_str(s: &str) -> Result<Self> {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^([^/]+)(?:/([0-9]{1,3}))?$").expect("Not possible");
        }
        let caps = RE
            .captures(s.trim())
            .ok_or_else(|| parse_err(format!("invalid CIDR {:?}", s)))?;
        let address: Address = match caps.get(1) {
            Some(a) => a.as_str().parse()?,
            None => return Err(parse_err(format!("invalid CIDR {:?}", s))),
        };
        let prefix = match caps.get(2) {
            Some(p) => p
                .as_str()
                .parse::<u8>()
                .map_err(|_| range_err(format!("prefix in {:?} is out of range", s)))?,
            None => address.max_prefix(),
        };
        Cidr::new(address, prefix)
    }
}

impl Display for Cidr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.routing_address(), self.prefix)
    }
}

impl IntoIterator for Cidr {
    type Item = Address;
    type IntoIter = CidrIter;

    fn into_iter(self) -> CidrIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &'a Cidr {
    type Item = Address;
    type IntoIter = CidrIter;

    fn into_iter(self) -> CidrIter {
        self.iter()
    }
}

#[derive(Clone, Debug)]
pub struct CidrIter {
    version: Version,
    offsets: Option<XLongIter>,
}

impl Iterator for CidrIter {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        let value = self.offsets.as_mut()?.next()?.to_u128()?;
        Some(Address::from_parts(self.version, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.offsets {
            Some(it) => it.size_hint(),
            None => (0, Some(0)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CidrRandomIter {
    version: Version,
    values: RandomRange,
}

impl Iterator for CidrRandomIter {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        let value = self.values.next()?.to_u128()?;
        Some(Address::from_parts(self.version, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.values.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn cidr(s: &str) -> Cidr {
        s.parse().unwrap()
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn some_tests() {
        assert_eq!("0.0.0.0/0", Cidr::new(Address::v4(0), 0).unwrap().to_string());
        assert_eq!(
            "255.255.255.255/32",
            Cidr::new(Address::v4(u32::MAX), 32).unwrap().to_string()
        );
        assert_eq!(
            "127.0.0.0/8",
            Cidr::new(Address::v4(127 << 24), 8).unwrap().to_string()
        );
        assert_eq!("10.0.0.0/24", cidr("10.0.0.7/24").to_string());
        assert_eq!(addr("10.0.0.7"), cidr("10.0.0.7/24").address());
        assert_eq!("10.0.0.7/32", cidr("10.0.0.7").to_string());
        assert_eq!("2001:db8::/32", cidr("2001:db8::/32").to_string());
        assert_eq!("::1/128", cidr("::1").to_string());
    }

    #[test]
    fn parse_errors() {
        match "10.0.0.0/33".parse::<Cidr>() {
            Err(Error::Range(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match "10.0.0.0/8/8".parse::<Cidr>() {
            Err(Error::Parse(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match "10.0.0.0/".parse::<Cidr>() {
            Err(Error::Parse(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!("::/129".parse::<Cidr>().is_err());
        assert!("::/128".parse::<Cidr>().is_ok());
        assert!("nope/8".parse::<Cidr>().is_err());
    }

    #[test]
    fn ranges_and_masks() {
        let c = cidr("192.168.0.0/24");
        assert_eq!((addr("192.168.0.0"), addr("192.168.0.255")), c.network_range());
        assert_eq!(256u128, c.len().to_u128().unwrap());
        assert_eq!(addr("255.255.255.0"), c.netmask());
        assert_eq!(addr("0.0.0.255"), c.hostmask());
        assert_eq!(addr("192.168.0.255"), c.broadcast_address());
        assert_eq!(addr("192.168.0.0"), c.routing_address());
        assert_eq!(Count::pow2(128).unwrap(), cidr("::/0").len());
        assert_eq!(Count::pow2(96).unwrap(), cidr("2001:db8::/32").len());
    }

    #[test]
    fn positional_access() {
        let c = cidr("10.0.0.0/30");
        assert_eq!(addr("10.0.0.3"), c.get_address(3).unwrap());
        match c.get_address(4) {
            Err(Error::Index(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        let all = cidr("::/0");
        assert_eq!(Address::v6(u128::MAX), all.get_address(u128::MAX).unwrap());
    }

    #[test]
    fn exclusive_blocks() {
        let c = cidr("10.0.0.0/30").inclusive(false);
        assert_eq!(2u128, c.len().to_u128().unwrap());
        assert_eq!(
            vec![addr("10.0.0.1"), addr("10.0.0.2")],
            c.iter().collect::<Vec<_>>()
        );
        assert_eq!(addr("10.0.0.1"), c.get_address(0).unwrap());
        assert!(c.get_address(2).is_err());
        assert!(!c.has_address(&addr("10.0.0.0")));
        assert!(!c.has_address(&addr("10.0.0.3")));
        assert!(c.has_address(&addr("10.0.0.2")));
        // Point-to-point links keep both ends.
        assert_eq!(2, cidr("10.0.0.0/31").inclusive(false).iter().count());
    }

    #[test]
    fn membership() {
        let c = cidr("192.168.0.0/24");
        assert!(c.has_address(&addr("192.168.0.0")));
        assert!(c.contains(&addr("192.168.0.255")));
        assert!(!c.has_address(&addr("192.168.1.0")));
        assert!(!c.has_address(&addr("::1")));
        assert!(cidr("10.0.0.0/8").is_superset_of(&cidr("10.1.0.0/16")));
        assert!(cidr("10.1.0.0/16").is_subset_of(&cidr("10.0.0.0/8")));
        assert!(!cidr("10.1.0.0/16").is_superset_of(&cidr("10.0.0.0/8")));
        assert!(!cidr("10.0.0.0/8").overlaps(&cidr("11.0.0.0/8")));
        assert!(!cidr("::/0").overlaps(&cidr("0.0.0.0/0")));
    }

    #[test]
    fn shifts() {
        let c = cidr("10.1.2.0/24");
        assert_eq!(cidr("10.0.0.0/8"), (c << 16).unwrap());
        assert_eq!(cidr("10.1.2.0/28"), (c >> 4).unwrap());
        assert!((c << 25).is_err());
        assert!((c >> 9).is_err());
        assert!((cidr("::/120") >> 8).is_ok());
    }

    #[test]
    fn halves_and_exclusion() {
        let (lo, hi) = cidr("10.0.0.0/24").split().unwrap();
        assert_eq!(cidr("10.0.0.0/25"), lo);
        assert_eq!(cidr("10.0.0.128/25"), hi);
        assert_eq!(Some(cidr("10.0.0.0/24")), hi.supernet());
        assert_eq!(Some(lo), hi.buddy());
        assert!(cidr("10.0.0.1/32").split().is_none());
        assert!(cidr("0.0.0.0/0").supernet().is_none());

        let rest = cidr("10.0.0.0/24").exclude(&cidr("10.0.0.64/26"));
        assert_eq!(
            vec![cidr("10.0.0.0/26"), cidr("10.0.0.128/25")],
            rest
        );
        assert!(cidr("10.0.0.0/24").exclude(&cidr("10.0.0.0/8")).is_empty());
        assert_eq!(
            vec![cidr("10.0.0.0/24")],
            cidr("10.0.0.0/24").exclude(&cidr("11.0.0.0/8"))
        );
    }

    #[test]
    fn ranges_to_blocks() {
        let blocks = Cidr::from_range(addr("10.0.0.1"), addr("10.0.0.6")).unwrap();
        let text: Vec<String> = blocks.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            vec!["10.0.0.1/32", "10.0.0.2/31", "10.0.0.4/31", "10.0.0.6/32"],
            text
        );
        assert_eq!(
            vec![cidr("0.0.0.0/0")],
            Cidr::from_range(addr("0.0.0.0"), addr("255.255.255.255")).unwrap()
        );
        assert_eq!(
            vec![cidr("::/0")],
            Cidr::from_range(Address::v6(0), Address::v6(u128::MAX)).unwrap()
        );
        assert!(Cidr::from_range(addr("10.0.0.2"), addr("10.0.0.1")).is_err());
        assert!(Cidr::from_range(addr("10.0.0.2"), addr("::1")).is_err());
    }

    #[test]
    fn huge_blocks_iterate_lazily() {
        let c = cidr("2001:db8::/32");
        let first: Vec<Address> = c.iter().take(3).collect();
        assert_eq!(
            vec![addr("2001:db8::"), addr("2001:db8::1"), addr("2001:db8::2")],
            first
        );
        let last = cidr("::/0").iter().nth(5).unwrap();
        assert_eq!(addr("::5"), last);
    }

    #[test]
    fn restartable_iteration() {
        let c = cidr("10.0.0.0/29");
        assert_eq!(c.iter().collect::<Vec<_>>(), c.into_iter().collect::<Vec<_>>());
        assert_eq!(8, (&c).into_iter().count());
    }

    #[test]
    fn random_iteration_covers_block() {
        let mut rng = StdRng::seed_from_u64(42);
        let c = cidr("10.0.0.0/26");
        let got: HashSet<Address> = c.random_iter(&mut rng).collect();
        let want: HashSet<Address> = c.iter().collect();
        assert_eq!(want, got);
    }

    #[quickcheck]
    fn convert_tests(xs: u32, ys: u8) -> bool {
        match Cidr::new(Address::v4(xs), ys % 33) {
            Ok(c) => c == c.to_string().parse::<Cidr>().unwrap(),
            _ => false,
        }
    }

    #[quickcheck]
    fn check_contains_ip(ip: u32, i: u8) -> bool {
        Cidr::new(Address::v4(ip), i % 33)
            .unwrap()
            .has_address(&Address::v4(ip))
    }

    #[quickcheck]
    fn check_contains_cidr(ip: u128, i: u8) -> bool {
        let i = i % 128;
        let a0 = Cidr::new(Address::v6(ip), i).unwrap();
        let a1 = Cidr::new(Address::v6(ip), i + 1).unwrap();
        a0.contains_cidr(&a1) && !a1.contains_cidr(&a0)
    }

    #[quickcheck]
    fn iteration_matches_len(ip: u32, i: u8) -> bool {
        let c = Cidr::new(Address::v4(ip), 24 + i % 9).unwrap();
        let all: Vec<Address> = c.iter().collect();
        c.len() == all.len() as u128 && all.iter().all(|a| c.has_address(a))
    }

    #[quickcheck]
    fn from_range_covers_exactly(a: u32, b: u16) -> bool {
        let first = Address::v4(a);
        let last = Address::v4(a.saturating_add(u32::from(b)));
        let blocks = Cidr::from_range(first, last).unwrap();
        let total = blocks
            .iter()
            .fold(Count::ZERO, |acc, c| acc.saturating_add(c.len()));
        blocks.first().map(|c| c.routing_address()) == Some(first)
            && blocks.last().map(|c| c.broadcast_address()) == Some(last)
            && total == u128::from(last.to_integer() - first.to_integer() + 1)
    }
}
