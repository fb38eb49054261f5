//! Bounded 16-bit id-space allocator (spec §4.E), shared by the topic,
//! message, request and registration id spaces.
//!
//! `0` is always reserved as "none"; callers never insert it into `used`.
//! Inserting `0`, or inserting `UINT16_MAX` into a space with `allow_max =
//! false`, is a programmer error and raises a [`crate::error::Trap`] rather
//! than being handled as a runtime condition.

use ahash::AHashSet;

use crate::error::Trap;

/// A single bounded id space with a scan cursor (spec §4.E).
///
/// Kept as a plain single-owned struct, not `DashMap`-backed: the id
/// allocator is core state, touched only from the gateway's single
/// execution context.
#[derive(Debug, Default, Clone)]
pub struct IdSpace {
    used: AHashSet<u16>,
    cursor: u16,
    allow_max: bool,
}

impl IdSpace {
    pub fn new(allow_max: bool) -> Self {
        Self {
            used: AHashSet::new(),
            cursor: 0,
            allow_max,
        }
    }

    fn max(&self) -> u16 {
        if self.allow_max {
            u16::MAX
        } else {
            u16::MAX - 1
        }
    }

    /// Scan from `cursor + 1`, wrapping, for the first id not in `used`.
    /// `None` when the space is full.
    pub fn next_id(&mut self) -> Option<u16> {
        let max = self.max();
        let span = max; // ids 1..=max
        let mut probe = self.cursor;
        for _ in 0..span {
            probe = if probe >= max { 1 } else { probe + 1 };
            if !self.used.contains(&probe) {
                self.cursor = probe;
                return Some(probe);
            }
        }
        None
    }

    /// Reserve `id` explicitly (used for predefined topic ids seeded at
    /// boot, which are never returned by `next_id` after this call).
    pub fn reserve(&mut self, id: u16) {
        if id == 0 {
            Trap::ReservedIdInUse { space: "id-space" }.raise();
        }
        if id == u16::MAX && !self.allow_max {
            Trap::MaxIdInDisallowedSpace { space: "id-space" }.raise();
        }
        self.used.insert(id);
    }

    pub fn release(&mut self, id: u16) {
        self.used.remove(&id);
    }

    pub fn contains(&self, id: u16) -> bool {
        self.used.contains(&id)
    }

    pub fn congested(&self) -> bool {
        self.used.len() as u32 == self.max() as u32
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially_and_wraps() {
        let mut ids = IdSpace::new(false);
        assert_eq!(ids.next_id(), Some(1));
        assert_eq!(ids.next_id(), Some(2));
        ids.release(1);
        // cursor has moved past 1, so it won't be reused until a full wrap
        let third = ids.next_id().unwrap();
        assert_eq!(third, 3);
    }

    #[test]
    fn disallowed_max_is_never_returned() {
        let mut ids = IdSpace::new(false);
        for i in 1..u16::MAX {
            ids.reserve(i);
        }
        assert!(ids.congested());
        assert_eq!(ids.next_id(), None);
    }

    #[test]
    fn allow_max_space_can_allocate_max_value() {
        let mut ids = IdSpace::new(true);
        for i in 1..u16::MAX {
            ids.reserve(i);
        }
        assert!(!ids.congested());
        assert_eq!(ids.next_id(), Some(u16::MAX));
        assert!(ids.congested());
    }

    #[test]
    #[should_panic]
    fn reserving_zero_traps() {
        let mut ids = IdSpace::new(false);
        ids.reserve(0);
    }

    #[test]
    #[should_panic]
    fn reserving_max_in_disallowed_space_traps() {
        let mut ids = IdSpace::new(false);
        ids.reserve(u16::MAX);
    }
}
