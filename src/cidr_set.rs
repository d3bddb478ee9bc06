use crate::address::{Address, Version};
use crate::cidr::Cidr;
use crate::count::Count;
use crate::error::{range_err, Error, Result};
use crate::range::RandomRange;
use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::ops::{Shl, Shr};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge nested and buddy blocks on insertion, keeping the set at the
    /// fewest blocks that describe its address space.
    pub coalesce: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        SetOptions { coalesce: true }
    }
}

/// A collection of CIDR blocks of one address family.
///
/// Blocks are kept in ascending network-address order. With coalescing on,
/// blocks are stored by their network address and no stored block overlaps
/// or is the buddy of another.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CidrSet {
    options: SetOptions,
    version: Option<Version>,
    inner: BTreeSet<Cidr>,
}

impl CidrSet {
    pub fn new() -> Self {
        CidrSet::default()
    }

    pub fn with_options(options: SetOptions) -> Self {
        CidrSet {
            options,
            version: None,
            inner: BTreeSet::new(),
        }
    }

    /// Builds a coalescing set from `blocks`.
    pub fn from_blocks<I: IntoIterator<Item = Cidr>>(blocks: I) -> Result<Self> {
        let mut set = CidrSet::new();
        for block in blocks {
            set.add(block)?;
        }
        Ok(set)
    }

    /// The coalescing set covering exactly `first..=last`.
    pub fn from_range(first: Address, last: Address) -> Result<Self> {
        CidrSet::from_blocks(Cidr::from_range(first, last)?)
    }

    pub fn options(&self) -> SetOptions {
        self.options
    }

    /// Family of the stored blocks; `None` while the set is empty.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn check_version(&self, version: Version) -> Result<()> {
        match self.version {
            Some(v) if v != version => Err(Error::VersionMismatch(v, version)),
            _ => Ok(()),
        }
    }

    pub fn add(&mut self, cidr: Cidr) -> Result<()> {
        self.check_version(cidr.version())?;
        self.version = Some(cidr.version());
        if !self.options.coalesce {
            self.inner.insert(cidr);
            return Ok(());
        }
        self.insert_coalesced(cidr);
        Ok(())
    }

    // Merge loop of a coalescing set; the caller has checked the family.
    fn insert_coalesced(&mut self, cidr: Cidr) {
        let mut cidr = cidr.network().inclusive(true);
        loop {
            if let Some(v) = self.inner.iter().find(|v| v.contains_cidr(&cidr)) {
                trace!("{} already covered by {}", cidr, v);
                return;
            }
            let absorbed: Vec<Cidr> = self
                .inner
                .iter()
                .filter(|v| cidr.contains_cidr(v))
                .copied()
                .collect();
            for k in absorbed {
                trace!("{} absorbs {}", cidr, k);
                self.inner.remove(&k);
            }
            if let (Some(pair), Some(parent)) = (cidr.buddy(), cidr.supernet()) {
                if self.inner.remove(&pair) {
                    debug!("merging {} and {} into {}", cidr, pair, parent);
                    cidr = parent;
                    continue;
                }
            }
            self.inner.insert(cidr);
            break;
        }
    }

    /// Drops the address space of `cidr` from the set, splitting stored
    /// blocks that only partly overlap it. Returns whether anything changed.
    pub fn discard(&mut self, cidr: &Cidr) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        self.check_version(cidr.version())?;
        let target = cidr.network();
        let hit: Vec<Cidr> = self
            .inner
            .iter()
            .filter(|b| b.overlaps(&target))
            .copied()
            .collect();
        if hit.is_empty() {
            return Ok(false);
        }
        for block in hit {
            self.inner.remove(&block);
            let rest = block.exclude(&target);
            if !rest.is_empty() {
                debug!("splitting {} around {} into {} blocks", block, target, rest.len());
            }
            self.inner.extend(rest);
        }
        if self.inner.is_empty() {
            self.version = None;
        }
        Ok(true)
    }

    /// Like [`CidrSet::discard`], but fails with [`Error::Key`] unless the
    /// set covers every address of `cidr`. The set is unchanged on failure.
    pub fn remove(&mut self, cidr: &Cidr) -> Result<()> {
        if !self.is_empty() {
            self.check_version(cidr.version())?;
        }
        if !self.has_cidr(cidr) {
            return Err(Error::Key(format!("{} is not in the set", cidr)));
        }
        self.discard(cidr).map(|_| ())
    }

    pub fn has_address(&self, address: &Address) -> bool {
        self.inner.iter().any(|b| {
            let (lo, hi) = b.network_range();
            lo.version() == address.version() && lo <= *address && *address <= hi
        })
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.has_address(address)
    }

    /// Whether the union of the stored blocks covers all of `cidr`.
    pub fn has_cidr(&self, cidr: &Cidr) -> bool {
        self.coalesced().covers(cidr)
    }

    // Only meaningful on a coalesced set, where a covered block always sits
    // inside a single stored block.
    fn covers(&self, cidr: &Cidr) -> bool {
        self.inner.iter().any(|b| b.contains_cidr(cidr))
    }

    fn coalesced(&self) -> CidrSet {
        if self.options.coalesce {
            return self.clone();
        }
        let mut set = CidrSet::with_options(SetOptions { coalesce: true });
        set.version = self.version;
        for block in &self.inner {
            set.insert_coalesced(*block);
        }
        set
    }

    pub fn is_subset_of(&self, other: &CidrSet) -> bool {
        if self.is_empty() {
            return true;
        }
        let other = other.coalesced();
        self.inner.iter().all(|b| other.covers(b))
    }

    pub fn is_superset_of(&self, other: &CidrSet) -> bool {
        other.is_subset_of(self)
    }

    /// Copy of the set with every block expressed by its network address.
    pub fn network_set(&self) -> CidrSet {
        CidrSet {
            options: self.options,
            version: self.version,
            inner: self.inner.iter().map(Cidr::network).collect(),
        }
    }

    /// Number of distinct addresses covered.
    pub fn address_length(&self) -> Count {
        self.coalesced()
            .inner
            .iter()
            .fold(Count::ZERO, |acc, b| acc.saturating_add(b.size()))
    }

    pub fn copy(&self) -> CidrSet {
        self.clone()
    }

    /// Stored blocks in ascending network-address order.
    pub fn iter(&self) -> impl Iterator<Item = &Cidr> + '_ {
        self.inner.iter()
    }

    /// Every distinct covered address, ascending.
    pub fn addresses(&self) -> impl Iterator<Item = Address> {
        self.coalesced().inner.into_iter().flat_map(|c| c.iter())
    }

    /// Every distinct covered address exactly once, in shuffled order.
    ///
    /// Draws offsets into the whole covered space from a [`RandomRange`] and
    /// maps each one back to its block, so memory stays proportional to the
    /// number of blocks.
    pub fn random_addresses<R: Rng + ?Sized>(&self, rng: &mut R) -> RandomAddresses {
        let mut blocks = Vec::with_capacity(self.inner.len());
        let mut total = Count::ZERO;
        for block in self.coalesced().inner {
            blocks.push((total, block));
            total = total.saturating_add(block.size());
        }
        RandomAddresses {
            blocks,
            offsets: RandomRange::new(Count::ZERO, total, rng),
        }
    }

    /// Stored blocks in random order.
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Cidr> {
        let mut blocks: Vec<Cidr> = self.inner.iter().copied().collect();
        blocks.shuffle(rng);
        blocks
    }

    pub fn with_block(&self, cidr: &Cidr) -> Result<CidrSet> {
        let mut set = self.clone();
        set.add(*cidr)?;
        Ok(set)
    }

    pub fn without_block(&self, cidr: &Cidr) -> Result<CidrSet> {
        let mut set = self.clone();
        set.discard(cidr)?;
        Ok(set)
    }

    pub fn union(&self, other: &CidrSet) -> Result<CidrSet> {
        let mut set = self.clone();
        for block in &other.inner {
            set.add(*block)?;
        }
        Ok(set)
    }

    pub fn difference(&self, other: &CidrSet) -> Result<CidrSet> {
        let mut set = self.clone();
        for block in &other.inner {
            set.discard(block)?;
        }
        Ok(set)
    }

    /// Removes every block, keeping the options.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.version = None;
    }

    /// The single block covering the whole set, if the set is one block.
    pub fn as_block(&self) -> Result<Cidr> {
        let set = self.coalesced();
        match (set.inner.len(), set.inner.iter().next()) {
            (1, Some(b)) => Ok(*b),
            (n, _) => Err(range_err(format!("set holds {} blocks, not one", n))),
        }
    }
}

/// Iterator returned by [`CidrSet::random_addresses`].
#[derive(Clone, Debug)]
pub struct RandomAddresses {
    // Blocks in ascending order, each with the offset of its first address.
    blocks: Vec<(Count, Cidr)>,
    offsets: RandomRange,
}

impl Iterator for RandomAddresses {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        let offset = self.offsets.next()?;
        let i = self.blocks.partition_point(|(start, _)| *start <= offset);
        let (start, block) = self.blocks.get(i.checked_sub(1)?)?;
        let within = offset.checked_sub(*start)?.to_u128()?;
        block.get_address(within).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.offsets.size_hint()
    }
}

impl<'a> IntoIterator for &'a CidrSet {
    type Item = &'a Cidr;
    type IntoIter = std::collections::btree_set::Iter<'a, Cidr>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<'a> Shl<&'a Cidr> for &'a CidrSet {
    type Output = Result<CidrSet>;

    fn shl(self, cidr: &'a Cidr) -> Result<CidrSet> {
        self.with_block(cidr)
    }
}

impl<'a> Shr<&'a Cidr> for &'a CidrSet {
    type Output = Result<CidrSet>;

    fn shr(self, cidr: &'a Cidr) -> Result<CidrSet> {
        self.without_block(cidr)
    }
}

impl<'a> Shl<&'a CidrSet> for &'a CidrSet {
    type Output = Result<CidrSet>;

    fn shl(self, other: &'a CidrSet) -> Result<CidrSet> {
        self.union(other)
    }
}

impl<'a> Shr<&'a CidrSet> for &'a CidrSet {
    type Output = Result<CidrSet>;

    fn shr(self, other: &'a CidrSet) -> Result<CidrSet> {
        self.difference(other)
    }
}

impl Display for CidrSet {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for v in self.inner.iter() {
            writeln!(f, "{}", v)?;
        }
        Ok(())
    }
}
