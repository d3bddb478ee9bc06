use crate::error::{parse_err, range_err, Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::{Add, BitAnd, BitOr, Sub};
use std::str::FromStr;

/// Address family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    V4,
    V6,
}

impl Version {
    /// Address width in bits.
    pub fn bits(self) -> u8 {
        match self {
            Version::V4 => 32,
            Version::V6 => 128,
        }
    }

    /// Largest address value of the family.
    pub fn max_value(self) -> u128 {
        match self {
            Version::V4 => u128::from(u32::MAX),
            Version::V6 => u128::MAX,
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Version::V4 => f.write_str("IPv4"),
            Version::V6 => f.write_str("IPv6"),
        }
    }
}

/// Bits of a netmask with `prefix` leading ones, assuming `prefix` is valid.
pub(crate) fn mask_bits(version: Version, prefix: u8) -> u128 {
    let bits = version.bits();
    if prefix == 0 {
        0
    } else {
        (u128::MAX << (bits - prefix)) & version.max_value()
    }
}

pub(crate) fn host_bits(version: Version, prefix: u8) -> u128 {
    !mask_bits(version, prefix) & version.max_value()
}

/// A single IPv4 or IPv6 host address.
///
/// Values are immutable; arithmetic and bitwise operators return new
/// addresses wrapped in [`Result`], failing when the result would leave the
/// family's range or when families are mixed.
///
/// Addresses of different families never compare: `partial_cmp` yields
/// `None` and [`Address::try_cmp`] an [`Error::VersionMismatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    version: Version,
    value: u128,
}

impl Address {
    pub fn new(version: Version, value: u128) -> Result<Self> {
        if value > version.max_value() {
            return Err(range_err(format!(
                "{:#x} exceeds the {} address range",
                value, version
            )));
        }
        Ok(Address { version, value })
    }

    pub(crate) fn from_parts(version: Version, value: u128) -> Self {
        Address {
            version,
            value: value & version.max_value(),
        }
    }

    pub fn v4(value: u32) -> Self {
        Address {
            version: Version::V4,
            value: u128::from(value),
        }
    }

    pub fn v6(value: u128) -> Self {
        Address {
            version: Version::V6,
            value,
        }
    }

    /// Netmask with the top `prefix` bits set.
    pub fn from_prefix(version: Version, prefix: u8) -> Result<Self> {
        if prefix > version.bits() {
            return Err(range_err(format!(
                "prefix /{} is longer than {} bits",
                prefix,
                version.bits()
            )));
        }
        Ok(Address::from_parts(version, mask_bits(version, prefix)))
    }

    /// Parses dotted-quad notation. Missing trailing octets are zero, so
    /// `"10.1"` is `10.1.0.0`.
    pub fn from_string_v4(s: &str) -> Result<Self> {
        parse_v4(s, false).map(Address::v4)
    }

    pub fn from_string_v6(s: &str) -> Result<Self> {
        parse_v6(s).map(Address::v6)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn max_prefix(&self) -> u8 {
        self.version.bits()
    }

    pub fn to_integer(&self) -> u128 {
        self.value
    }

    pub fn checked_add(self, offset: u128) -> Result<Self> {
        self.value
            .checked_add(offset)
            .ok_or_else(|| range_err(format!("{} + {} overflows", self, offset)))
            .and_then(|v| Address::new(self.version, v))
    }

    pub fn checked_sub(self, offset: u128) -> Result<Self> {
        self.value
            .checked_sub(offset)
            .ok_or_else(|| range_err(format!("{} - {} underflows", self, offset)))
            .map(|v| Address::from_parts(self.version, v))
    }

    pub fn bit_and(self, other: Address) -> Result<Self> {
        self.same_version(&other)?;
        Ok(Address::from_parts(self.version, self.value & other.value))
    }

    pub fn bit_or(self, other: Address) -> Result<Self> {
        self.same_version(&other)?;
        Ok(Address::from_parts(self.version, self.value | other.value))
    }

    pub fn try_cmp(&self, other: &Address) -> Result<Ordering> {
        self.same_version(other)?;
        Ok(self.value.cmp(&other.value))
    }

    fn same_version(&self, other: &Address) -> Result<()> {
        if self.version == other.version {
            Ok(())
        } else {
            Err(Error::VersionMismatch(self.version, other.version))
        }
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Address) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl Add<u128> for Address {
    type Output = Result<Address>;

    fn add(self, offset: u128) -> Result<Address> {
        self.checked_add(offset)
    }
}

impl Sub<u128> for Address {
    type Output = Result<Address>;

    fn sub(self, offset: u128) -> Result<Address> {
        self.checked_sub(offset)
    }
}

impl BitAnd for Address {
    type Output = Result<Address>;

    fn bitand(self, other: Address) -> Result<Address> {
        self.bit_and(other)
    }
}

impl BitOr for Address {
    type Output = Result<Address>;

    fn bitor(self, other: Address) -> Result<Address> {
        self.bit_or(other)
    }
}

fn parse_v4(s: &str, full: bool) -> Result<u32> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^[0-9]{1,3}(\.[0-9]{1,3}){0,3}$").expect("Not possible");
    }
    if !RE.is_match(s) {
        return Err(parse_err(format!("invalid IPv4 address {:?}", s)));
    }
    let octets = s
        .split('.')
        .map(|o| {
            o.parse::<u8>()
                .map_err(|_| parse_err(format!("octet {} of {:?} is not in 0..=255", o, s)))
        })
        .collect::<Result<Vec<u8>>>()?;
    if full && octets.len() != 4 {
        return Err(parse_err(format!("{:?} does not have four octets", s)));
    }
    let mut value = 0u32;
    for i in 0..4 {
        value = (value << 8) | u32::from(octets.get(i).copied().unwrap_or(0));
    }
    Ok(value)
}

fn parse_groups(part: &str, last: bool, whole: &str) -> Result<Vec<u16>> {
    if part.is_empty() {
        return Ok(Vec::new());
    }
    let pieces: Vec<&str> = part.split(':').collect();
    let mut groups = Vec::with_capacity(pieces.len() + 1);
    for (i, piece) in pieces.iter().enumerate() {
        if last && i == pieces.len() - 1 && piece.contains('.') {
            let v4 = parse_v4(piece, true)?;
            groups.push((v4 >> 16) as u16);
            groups.push(v4 as u16);
        } else if piece.is_empty() || piece.len() > 4 {
            return Err(parse_err(format!("bad group {:?} in {:?}", piece, whole)));
        } else {
            let g = u16::from_str_radix(piece, 16)
                .map_err(|_| parse_err(format!("bad group {:?} in {:?}", piece, whole)))?;
            groups.push(g);
        }
    }
    Ok(groups)
}

fn parse_v6(s: &str) -> Result<u128> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^[0-9A-Fa-f:.]{2,45}$").expect("Not possible");
    }
    if !RE.is_match(s) {
        return Err(parse_err(format!("invalid IPv6 address {:?}", s)));
    }
    let (head, tail) = match s.find("::") {
        Some(i) => (&s[..i], Some(&s[i + 2..])),
        None => (s, None),
    };
    let groups = match tail {
        None => {
            let groups = parse_groups(head, true, s)?;
            if groups.len() != 8 {
                return Err(parse_err(format!("{:?} does not have eight groups", s)));
            }
            groups
        }
        Some(tail) => {
            if tail.contains("::") {
                return Err(parse_err(format!("{:?} has more than one '::'", s)));
            }
            let left = parse_groups(head, false, s)?;
            let right = parse_groups(tail, true, s)?;
            if left.len() + right.len() > 7 {
                return Err(parse_err(format!("{:?} has too many groups", s)));
            }
            let mut groups = left;
            groups.resize(8 - right.len(), 0);
            groups.extend(right);
            groups
        }
    };
    Ok(groups
        .into_iter()
        .fold(0u128, |acc, g| (acc << 16) | u128::from(g)))
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.version {
            Version::V4 => f.pad(&Ipv4Addr::from(self.value as u32).to_string()),
            Version::V6 => f.pad(&Ipv6Addr::from(self.value).to_string()),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Detects the family: dotted-quad first, then colon-hex.
    fn from_str(s: &str) -> Result<Self> {
        Address::from_string_v4(s)
            .or_else(|_| Address::from_string_v6(s))
            .map_err(|_| parse_err(format!("{:?} is neither an IPv4 nor an IPv6 address", s)))
    }
}

impl From<Ipv4Addr> for Address {
    fn from(a: Ipv4Addr) -> Self {
        Address::v4(u32::from(a))
    }
}

impl From<Ipv6Addr> for Address {
    fn from(a: Ipv6Addr) -> Self {
        Address::v6(u128::from(a))
    }
}

impl From<IpAddr> for Address {
    fn from(a: IpAddr) -> Self {
        match a {
            IpAddr::V4(a) => a.into(),
            IpAddr::V6(a) => a.into(),
        }
    }
}

impl From<Address> for IpAddr {
    fn from(a: Address) -> Self {
        match a.version {
            Version::V4 => IpAddr::V4(Ipv4Addr::from(a.value as u32)),
            Version::V6 => IpAddr::V6(Ipv6Addr::from(a.value)),
        }
    }
}
