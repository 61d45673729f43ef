// ── Allocation pools ──
//
// A bounded range of values handed out round-robin. Two instances back the
// registry: per-device IMSI suffixes and UE addresses. Pools are plain data;
// the registry serializes access to them.

mod address;

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::net::Ipv4Addr;

pub use address::Ipv4Cidr;

use crate::error::PoolError;
use crate::model::{SUFFIX_MAX, SUFFIX_MIN};

/// A value that maps onto a contiguous `u32` index space.
pub trait PoolKey: Copy + fmt::Display {
    fn to_index(self) -> u32;
    fn from_index(index: u32) -> Self;
}

impl PoolKey for u16 {
    fn to_index(self) -> u32 {
        u32::from(self)
    }

    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    fn from_index(index: u32) -> Self {
        // Pool ranges are built from u16 bounds, so indices always fit.
        index as u16
    }
}

impl PoolKey for Ipv4Addr {
    fn to_index(self) -> u32 {
        u32::from(self)
    }

    fn from_index(index: u32) -> Self {
        Ipv4Addr::from(index)
    }
}

/// Tracks which values of an inclusive range are held.
///
/// Automatic reservation scans forward from a cursor and wraps once, so
/// released values are not immediately reissued.
#[derive(Debug, Clone)]
pub struct AllocationPool<K> {
    name: &'static str,
    first: u32,
    last: u32,
    cursor: u32,
    held: BTreeSet<u32>,
    _key: PhantomData<K>,
}

impl<K: PoolKey> AllocationPool<K> {
    pub fn new(name: &'static str, first: K, last: K) -> Result<Self, PoolError> {
        let (lo, hi) = (first.to_index(), last.to_index());
        if lo > hi {
            return Err(PoolError::InvalidRange {
                pool: name,
                first: first.to_string(),
                last: last.to_string(),
            });
        }
        Ok(Self {
            name,
            first: lo,
            last: hi,
            cursor: lo,
            held: BTreeSet::new(),
            _key: PhantomData,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn first(&self) -> K {
        K::from_index(self.first)
    }

    pub fn last(&self) -> K {
        K::from_index(self.last)
    }

    pub fn capacity(&self) -> usize {
        usize::try_from(self.last - self.first).map_or(usize::MAX, |n| n.saturating_add(1))
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.held.len())
    }

    pub fn contains(&self, value: K) -> bool {
        (self.first..=self.last).contains(&value.to_index())
    }

    pub fn is_held(&self, value: K) -> bool {
        self.held.contains(&value.to_index())
    }

    /// Held values in ascending order.
    pub fn held(&self) -> impl Iterator<Item = K> + '_ {
        self.held.iter().copied().map(K::from_index)
    }

    /// Reserve `preferred`, or the next free value when `None`.
    ///
    /// A preferred value that is held or out of range is an error; there is
    /// no fallback to another value.
    pub fn reserve(&mut self, preferred: Option<K>) -> Result<K, PoolError> {
        match preferred {
            Some(value) => self.reserve_exact(value),
            None => self.reserve_next(),
        }
    }

    fn reserve_exact(&mut self, value: K) -> Result<K, PoolError> {
        if !self.contains(value) {
            return Err(PoolError::OutOfRange {
                pool: self.name,
                value: value.to_string(),
            });
        }
        if !self.held.insert(value.to_index()) {
            return Err(PoolError::Unavailable {
                pool: self.name,
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    fn reserve_next(&mut self) -> Result<K, PoolError> {
        let found = (self.cursor..=self.last)
            .chain(self.first..self.cursor)
            .find(|index| !self.held.contains(index))
            .ok_or(PoolError::Exhausted { pool: self.name })?;

        self.held.insert(found);
        self.cursor = if found >= self.last {
            self.first
        } else {
            found + 1
        };
        Ok(K::from_index(found))
    }

    /// Forget every held value. The scan cursor is kept.
    pub fn clear(&mut self) {
        self.held.clear();
    }

    /// Return a value to the pool. Releasing a free or foreign value is a
    /// no-op; the return value says whether anything changed.
    pub fn release(&mut self, value: K) -> bool {
        self.held.remove(&value.to_index())
    }
}

impl AllocationPool<u16> {
    /// Per-device IMSI suffixes `0001..=9999`.
    pub fn imsi_suffixes() -> Self {
        Self {
            name: "IMSI suffix",
            first: u32::from(SUFFIX_MIN),
            last: u32::from(SUFFIX_MAX),
            cursor: u32::from(SUFFIX_MIN),
            held: BTreeSet::new(),
            _key: PhantomData,
        }
    }
}

impl AllocationPool<Ipv4Addr> {
    /// Host addresses of `cidr`, with `gateway` held permanently when it
    /// falls inside the range.
    pub fn ue_addresses(cidr: Ipv4Cidr, gateway: Option<Ipv4Addr>) -> Result<Self, PoolError> {
        let mut pool = Self::new("UE address", cidr.first_host(), cidr.last_host())?;
        if let Some(gateway) = gateway {
            if pool.contains(gateway) {
                pool.reserve(Some(gateway))?;
            }
        }
        Ok(pool)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn small_pool() -> AllocationPool<u16> {
        AllocationPool::new("test", 1, 3).unwrap()
    }

    #[test]
    fn reserves_in_ascending_order() {
        let mut pool = small_pool();
        assert_eq!(pool.reserve(None).unwrap(), 1);
        assert_eq!(pool.reserve(None).unwrap(), 2);
        assert_eq!(pool.reserve(None).unwrap(), 3);
        assert_eq!(pool.reserve(None), Err(PoolError::Exhausted { pool: "test" }));
    }

    #[test]
    fn released_values_are_not_reissued_until_wrap() {
        let mut pool = small_pool();
        pool.reserve(None).unwrap();
        pool.reserve(None).unwrap();
        assert!(pool.release(1));

        assert_eq!(pool.reserve(None).unwrap(), 3);
        // cursor wrapped; 1 is the only free value left
        assert_eq!(pool.reserve(None).unwrap(), 1);
    }

    #[test]
    fn preferred_value_never_falls_back() {
        let mut pool = small_pool();
        pool.reserve(Some(2)).unwrap();

        assert!(matches!(
            pool.reserve(Some(2)),
            Err(PoolError::Unavailable { .. })
        ));
        assert!(matches!(
            pool.reserve(Some(9)),
            Err(PoolError::OutOfRange { .. })
        ));
        assert_eq!(pool.held_count(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let mut pool = small_pool();
        pool.reserve(Some(1)).unwrap();
        assert!(pool.release(1));
        assert!(!pool.release(1));
        assert!(!pool.release(42));
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            AllocationPool::<u16>::new("test", 5, 1),
            Err(PoolError::InvalidRange { .. })
        ));
    }

    #[test]
    fn imsi_suffix_pool_covers_four_digits() {
        let mut pool = AllocationPool::imsi_suffixes();
        assert_eq!(pool.capacity(), 9999);
        assert_eq!(pool.reserve(None).unwrap(), 1);
        assert!(!pool.contains(0));
        assert!(!pool.contains(10_000));
    }

    #[test]
    fn ue_pool_skips_gateway() {
        let cidr: Ipv4Cidr = "10.48.99.0/24".parse().unwrap();
        let mut pool =
            AllocationPool::ue_addresses(cidr, Some(Ipv4Addr::new(10, 48, 99, 1))).unwrap();

        assert_eq!(pool.capacity(), 254);
        assert_eq!(pool.available(), 253);
        assert_eq!(pool.reserve(None).unwrap(), Ipv4Addr::new(10, 48, 99, 2));
        assert_eq!(pool.last(), Ipv4Addr::new(10, 48, 99, 254));
    }

    #[test]
    fn exhausting_every_address() {
        let cidr: Ipv4Cidr = "192.168.1.0/30".parse().unwrap();
        let mut pool = AllocationPool::ue_addresses(cidr, None).unwrap();
        assert_eq!(pool.reserve(None).unwrap(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(pool.reserve(None).unwrap(), Ipv4Addr::new(192, 168, 1, 2));
        assert!(matches!(
            pool.reserve(None),
            Err(PoolError::Exhausted { .. })
        ));
    }
}
