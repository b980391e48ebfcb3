//! Per-process capability table (spec §3 "Capability table", §4.2), grounded
//! in `original_source/neeraj/trunk/include/es/objectTable.h`'s
//! `ObjectTable<K,V,capacity>`: a fixed-capacity array of slots threaded
//! into a free list, guarded here by a single monitor rather than the
//! original's spinlock since callers run as OS threads.

use std::sync::Mutex;

use abi::idl::ObjectRef;

#[derive(Clone, Debug)]
enum Slot {
    Free { next: Option<usize> },
    Occupied { ref_: ObjectRef, refcount: u32 },
}

struct Inner {
    slots: Vec<Slot>,
    free_head: Option<usize>,
}

/// A fixed-capacity table mapping process-local integer handles to remote
/// object references. Invariant (spec §3): a slot is either fully free (on
/// the free list) or fully occupied (`refcount >= 1`).
pub struct CapTable {
    inner: Mutex<Inner>,
}

impl CapTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Slot::Free {
                next: if i + 1 < capacity { Some(i + 1) } else { None },
            });
        }
        CapTable {
            inner: Mutex::new(Inner {
                slots,
                free_head: if capacity > 0 { Some(0) } else { None },
            }),
        }
    }

    /// Installs `ref_` in a free slot with refcount 1. Returns `-1` when the
    /// table is full, matching the original `ObjectTable::add` convention.
    pub fn add(&self, ref_: ObjectRef) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let Some(head) = inner.free_head else {
            return -1;
        };
        let next = match &inner.slots[head] {
            Slot::Free { next } => *next,
            Slot::Occupied { .. } => unreachable!("free list pointed at an occupied slot"),
        };
        inner.free_head = next;
        inner.slots[head] = Slot::Occupied { ref_, refcount: 1 };
        head as i64
    }

    /// Looks up a handle, incrementing its refcount. Returns `None` if the
    /// slot is free or mid-teardown (refcount already at zero).
    pub fn get(&self, handle: i64) -> Option<ObjectRef> {
        let mut inner = self.inner.lock().unwrap();
        let idx = usize::try_from(handle).ok()?;
        match inner.slots.get_mut(idx)? {
            Slot::Occupied { ref_, refcount } if *refcount > 0 => {
                *refcount += 1;
                Some(ref_.clone())
            }
            _ => None,
        }
    }

    /// Decrements a handle's refcount, reclaiming its slot onto the free
    /// list when it reaches zero. Returns the new refcount.
    pub fn put(&self, handle: i64) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        let Ok(idx) = usize::try_from(handle) else {
            return 0;
        };
        let Some(slot) = inner.slots.get_mut(idx) else {
            return 0;
        };
        let new_count = match slot {
            Slot::Occupied { refcount, .. } => {
                *refcount = refcount.saturating_sub(1);
                *refcount
            }
            Slot::Free { .. } => return 0,
        };
        if new_count == 0 {
            let free_head = inner.free_head;
            inner.slots[idx] = Slot::Free { next: free_head };
            inner.free_head = Some(idx);
        }
        new_count
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(id: u64) -> ObjectRef {
        ObjectRef::new(1, id, "Widget")
    }

    #[test]
    fn capability_lifecycle_matches_spec_scenario() {
        let table = CapTable::new(4);
        assert_eq!(table.add(r(0xA)), 0);
        assert_eq!(table.add(r(0xB)), 1);
        assert_eq!(table.add(r(0xA)), 2);
        assert_eq!(table.put(0), 0);
        assert_eq!(table.add(r(0xC)), 0);
    }

    #[test]
    fn full_table_returns_negative_one() {
        let table = CapTable::new(2);
        assert_eq!(table.add(r(1)), 0);
        assert_eq!(table.add(r(2)), 1);
        assert_eq!(table.add(r(3)), -1);
    }

    #[test]
    fn get_increments_refcount_and_put_decrements() {
        let table = CapTable::new(2);
        let h = table.add(r(1));
        assert!(table.get(h).is_some());
        assert_eq!(table.put(h), 1);
        assert_eq!(table.put(h), 0);
        assert!(table.get(h).is_none());
    }
}
