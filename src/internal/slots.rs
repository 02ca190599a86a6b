//! Generation-counted slot table of weak handles.
//!
//! The registry tracks live scopes without owning them. Each scope occupies a
//! slot; a slot whose handle can no longer be upgraded belongs to a scope that
//! was dropped without being closed and is reclaimed on the next sweep.

use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotId {
    index: u32,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    entry: Option<Weak<T>>,
}

pub(crate) struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> SlotTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, value: Weak<T>) -> SlotId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(value);
            return SlotId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(value),
        });
        SlotId { index, generation: 0 }
    }

    /// Frees the slot if `id` still refers to it. Stale ids are ignored.
    pub(crate) fn remove(&mut self, id: SlotId) -> bool {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.entry.is_some() => {
                Self::release(slot, &mut self.free, id.index);
                true
            }
            _ => false,
        }
    }

    /// Upgrades every live entry, reclaiming slots whose owner is gone.
    pub(crate) fn live(&mut self) -> Vec<Arc<T>> {
        let mut live = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(weak) = &slot.entry else { continue };
            match weak.upgrade() {
                Some(strong) => live.push(strong),
                None => Self::release(slot, &mut self.free, index as u32),
            }
        }
        live
    }

    /// Removes every entry, returning those still alive.
    pub(crate) fn drain(&mut self) -> Vec<Arc<T>> {
        let live = self.live();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.is_some() {
                Self::release(slot, &mut self.free, index as u32);
            }
        }
        live
    }

    fn release(slot: &mut Slot<T>, free: &mut Vec<u32>, index: u32) {
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        free.push(index);
    }
}
