//! Device identity registry
//!
//! Every attached device gets a minor number drawn from a fixed-size bitmap
//! and is listed as a member until it detaches. The registry is an explicit
//! service shared between controllers through an `Arc`; nothing here is
//! global.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

/// Size of the identity pool
pub const MINOR_POOL_SIZE: usize = 32;

const POOL_WORDS: usize = MINOR_POOL_SIZE.div_ceil(64);

/// Minor number of an attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Minor(u8);

impl Minor {
    /// Numeric value
    pub fn get(self) -> u8 {
        self.0
    }

    fn index(self) -> (usize, u64) {
        let bit = self.0 as usize;
        (bit / 64, 1u64 << (bit % 64))
    }
}

impl fmt::Display for Minor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Slots {
    bitmap: [u64; POOL_WORDS],
    members: BTreeMap<Minor, String>,
}

impl Slots {
    fn is_set(&self, minor: Minor) -> bool {
        let (word, mask) = minor.index();
        self.bitmap[word] & mask != 0
    }

    fn first_zero(&self, capacity: usize) -> Option<Minor> {
        (0..capacity)
            .map(|bit| Minor(bit as u8))
            .find(|m| !self.is_set(*m))
    }
}

/// Identity pool plus membership list
#[derive(Debug)]
pub struct Registry {
    capacity: usize,
    slots: Mutex<Slots>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry with the full pool
    pub fn new() -> Self {
        Self::with_capacity(MINOR_POOL_SIZE)
    }

    /// Registry limited to the first `capacity` slots
    ///
    /// Capacity is clamped to [`MINOR_POOL_SIZE`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(MINOR_POOL_SIZE),
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Pool capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take the lowest free minor for `owner`
    pub fn allocate(&self, owner: &str) -> Result<Minor> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let minor = slots
            .first_zero(self.capacity)
            .ok_or(Error::IdentityPoolExhausted {
                capacity: self.capacity,
            })?;
        let (word, mask) = minor.index();
        slots.bitmap[word] |= mask;
        slots.members.insert(minor, owner.to_string());
        log::debug!("registry: minor {} -> {}", minor, owner);
        Ok(minor)
    }

    /// Return a minor to the pool
    pub fn release(&self, minor: Minor) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.is_set(minor) {
            log::warn!("registry: minor {} released but not allocated", minor);
            return;
        }
        let (word, mask) = minor.index();
        slots.bitmap[word] &= !mask;
        if let Some(owner) = slots.members.remove(&minor) {
            log::debug!("registry: minor {} released by {}", minor, owner);
        }
    }

    /// Whether a minor is currently taken
    pub fn is_allocated(&self, minor: Minor) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.is_set(minor)
    }

    /// Number of taken minors
    pub fn in_use(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.bitmap.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Live members, ordered by minor
    pub fn members(&self) -> Vec<(Minor, String)> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .members
            .iter()
            .map(|(m, name)| (*m, name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocate_lowest_first() {
        let registry = Registry::new();
        let a = registry.allocate("a").unwrap();
        let b = registry.allocate("b").unwrap();
        assert_eq!((a.get(), b.get()), (0, 1));

        registry.release(a);
        assert_eq!(registry.allocate("c").unwrap().get(), 0);
        assert_eq!(registry.in_use(), 2);
    }

    #[test]
    fn test_exhaustion_keeps_bitmap() {
        let registry = Registry::with_capacity(2);
        registry.allocate("a").unwrap();
        registry.allocate("b").unwrap();
        let err = registry.allocate("c").unwrap_err();
        assert!(matches!(err, Error::IdentityPoolExhausted { capacity: 2 }));
        assert_eq!(registry.in_use(), 2);
        assert_eq!(registry.members().len(), 2);
    }

    #[test]
    fn test_double_release_is_harmless() {
        let registry = Registry::with_capacity(4);
        let a = registry.allocate("a").unwrap();
        let b = registry.allocate("b").unwrap();
        registry.release(a);
        registry.release(a);
        assert!(registry.is_allocated(b));
        assert_eq!(registry.in_use(), 1);
    }

    #[test]
    fn test_capacity_clamped() {
        assert_eq!(Registry::with_capacity(1000).capacity(), MINOR_POOL_SIZE);
    }

    #[test]
    fn test_concurrent_allocations_unique() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..MINOR_POOL_SIZE)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.allocate(&format!("dev{}", i)).unwrap())
            })
            .collect();
        let minors: HashSet<Minor> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(minors.len(), MINOR_POOL_SIZE);
        assert!(registry.allocate("one-too-many").is_err());
    }
}
