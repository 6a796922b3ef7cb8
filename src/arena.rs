//! Arena storage backing the object heap.
//!
//! Provides contiguous slot storage with free-list reuse, addressed by
//! `ObjId`. The design requirement behind this module is an explicit index
//! (arena + identifier) in place of collector-driven weak maps: object
//! identity is the slot index, and teardown happens at well-defined points
//! (revocation, deletion) rather than at garbage-collection time.
//!
//! # Determinism
//! - Iteration order over slots is by index (0..capacity).
//! - Free-list reuse is LIFO: the most recently freed slot is reused first,
//!   so the same allocation/free sequence yields the same handles across runs.

use crate::value::ObjId;

/// Slot in the arena.
#[derive(Debug, Clone)]
struct Slot<T> {
    data: Option<T>,
    next_free: Option<u32>, // index of next free slot, if any
}

/// Contiguous storage with free-list reuse.
#[derive(Debug, Clone)]
pub struct ObjectArena<T> {
    slots: Vec<Slot<T>>,
    free_list_head: Option<u32>,
    /// Number of live entries (slots with `data.is_some()`).
    live_count: usize,
}

impl<T> ObjectArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list_head: None,
            live_count: 0,
        }
    }

    /// Allocates a slot for `data` and returns its handle.
    ///
    /// Reuses a free slot when one is available, otherwise grows the slot
    /// vector.
    pub fn allocate(&mut self, data: T) -> ObjId {
        if let Some(idx) = self.free_list_head {
            let slot = &mut self.slots[idx as usize];
            debug_assert!(slot.data.is_none(), "free slot should have no data");
            self.free_list_head = slot.next_free;
            slot.data = Some(data);
            slot.next_free = None;
            self.live_count += 1;
            ObjId::new(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                data: Some(data),
                next_free: None,
            });
            self.live_count += 1;
            ObjId::new(idx)
        }
    }

    /// Frees the slot identified by `id`.
    ///
    /// Returns `true` if the slot was live and is now free. Freed slots go
    /// onto the free list for future reuse.
    pub fn free(&mut self, id: ObjId) -> bool {
        let idx = id.as_u32() as usize;
        if idx >= self.slots.len() {
            return false;
        }
        let slot = &mut self.slots[idx];
        if slot.data.is_none() {
            return false; // already free
        }
        slot.data = None;
        slot.next_free = self.free_list_head;
        self.free_list_head = Some(idx as u32);
        self.live_count -= 1;
        true
    }

    /// Returns a reference to the data stored at `id`, if live.
    pub fn get(&self, id: ObjId) -> Option<&T> {
        self.slots
            .get(id.as_u32() as usize)
            .and_then(|slot| slot.data.as_ref())
    }

    /// Returns a mutable reference to the data stored at `id`, if live.
    pub fn get_mut(&mut self, id: ObjId) -> Option<&mut T> {
        self.slots
            .get_mut(id.as_u32() as usize)
            .and_then(|slot| slot.data.as_mut())
    }

    /// Number of live entries.
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Total number of slots, including free ones.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over all live entries in deterministic order (by index).
    pub fn iter(&self) -> impl Iterator<Item = (ObjId, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.data.as_ref().map(|data| (ObjId::new(idx as u32), data))
        })
    }
}

impl<T> Default for ObjectArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
