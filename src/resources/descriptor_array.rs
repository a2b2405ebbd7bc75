//! Bindless descriptor arrays.
//!
//! Each occupied slot names the resource currently bound there; each bound
//! resource keeps the set of slots that reference it so a destroyed
//! resource's slots can be found and nulled. That back-reference table is
//! maintained with the swap-remove + forward-index-fixup technique instead
//! of genuine pointers, so there is nothing to invalidate when a slot
//! moves.

use crate::graveyard::{DropNotify, PendingDrops};
use crate::ids::UniqueResourceId;
use fxhash::FxHashMap;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DescriptorArrayKind {
    Image,
    Buffer,
}

struct Slot {
    resource: UniqueResourceId,
    /// Index of this slot's entry within `resource_slots[resource]`; kept
    /// in sync so an unlink is O(1) instead of a scan.
    back_ref_pos: usize,
}

pub struct DescriptorArray {
    pub id: UniqueResourceId,
    pub kind: DescriptorArrayKind,
    pub capacity: u32,
    pub(crate) native: std::sync::Mutex<Option<Box<dyn crate::backend::BackendDescriptorSet>>>,
    inner: std::sync::Mutex<Inner>,
    _drop_notify: DropNotify,
}

#[derive(Default)]
struct Inner {
    slots: Vec<Option<Slot>>,
    resource_slots: FxHashMap<UniqueResourceId, Vec<u32>>,
    staged_writes: Vec<u32>,
    has_descriptor_overwrites: bool,
}

impl DescriptorArray {
    pub fn new(
        id: UniqueResourceId,
        kind: DescriptorArrayKind,
        capacity: u32,
        drop_sink: PendingDrops,
    ) -> DescriptorArray {
        let mut inner = Inner::default();
        inner.slots.resize_with(capacity as usize, || None);
        DescriptorArray {
            id,
            kind,
            capacity,
            native: std::sync::Mutex::new(None),
            inner: std::sync::Mutex::new(inner),
            _drop_notify: DropNotify::new(id, drop_sink),
        }
    }

    /// Stages slot `index` to hold a view of `resource`, unlinking whatever
    /// was bound there before. Sets `has_descriptor_overwrites` if the slot
    /// was occupied.
    pub fn write(&self, index: u32, resource: UniqueResourceId) {
        let mut inner = self.inner.lock().unwrap();
        let was_occupied = inner.slots[index as usize].is_some();
        if was_occupied {
            Self::unlink(&mut inner, index);
            inner.has_descriptor_overwrites = true;
        }
        let back_ref_pos = {
            let v = inner.resource_slots.entry(resource).or_insert_with(Vec::new);
            v.push(index);
            v.len() - 1
        };
        inner.slots[index as usize] = Some(Slot {
            resource,
            back_ref_pos,
        });
        inner.staged_writes.push(index);
    }

    /// Clears slot `index`, if occupied. Used when a back-referenced
    /// resource is destroyed - the final step of destroying a resource is
    /// rewriting any descriptor slot still pointing at it to null.
    pub fn clear_slot(&self, index: u32) {
        let mut inner = self.inner.lock().unwrap();
        if inner.slots[index as usize].is_some() {
            Self::unlink(&mut inner, index);
            inner.slots[index as usize] = None;
            inner.staged_writes.push(index);
        }
    }

    fn unlink(inner: &mut Inner, index: u32) {
        let (resource, pos) = {
            let slot = inner.slots[index as usize].as_ref().unwrap();
            (slot.resource, slot.back_ref_pos)
        };
        let slots_for_resource = inner.resource_slots.get_mut(&resource).unwrap();
        slots_for_resource.swap_remove(pos);
        if let Some(&moved_slot_index) = slots_for_resource.get(pos) {
            inner.slots[moved_slot_index as usize]
                .as_mut()
                .unwrap()
                .back_ref_pos = pos;
        }
        if slots_for_resource.is_empty() {
            inner.resource_slots.remove(&resource);
        }
    }

    /// All slots currently bound to `resource` - used to verify that a
    /// resource referenced `k` times has back-ref count `k`.
    pub fn slots_for(&self, resource: UniqueResourceId) -> Vec<u32> {
        self.inner
            .lock()
            .unwrap()
            .resource_slots
            .get(&resource)
            .cloned()
            .unwrap_or_default()
    }

    pub fn occupied_slots(&self) -> Vec<u32> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i as u32))
            .collect()
    }

    pub fn has_descriptor_overwrites(&self) -> bool {
        self.inner.lock().unwrap().has_descriptor_overwrites
    }

    /// Drains staged index writes, clearing the overwrite flag.
    pub fn take_staged_writes(&self) -> Vec<u32> {
        let mut inner = self.inner.lock().unwrap();
        inner.has_descriptor_overwrites = false;
        std::mem::take(&mut inner.staged_writes)
    }
}

impl std::fmt::Debug for DescriptorArray {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DescriptorArray")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UniqueResourceId;

    #[test]
    fn back_ref_count_matches_appearances() {
        let array = DescriptorArray::new(
            UniqueResourceId::default_for_test(),
            DescriptorArrayKind::Image,
            8,
            PendingDrops::new(),
        );
        let r = UniqueResourceId::default_for_test();
        array.write(0, r);
        array.write(3, r);
        array.write(5, r);
        assert_eq!(array.slots_for(r).len(), 3);
    }

    #[test]
    fn overwrite_unlinks_old_resource_and_sets_flag() {
        let array = DescriptorArray::new(
            UniqueResourceId::default_for_test(),
            DescriptorArrayKind::Image,
            8,
            PendingDrops::new(),
        );
        let a = UniqueResourceId::default_for_test();
        let b = UniqueResourceId::default_for_test();
        array.write(2, a);
        assert!(!array.has_descriptor_overwrites());
        array.write(2, b);
        assert!(array.has_descriptor_overwrites());
        assert!(array.slots_for(a).is_empty());
        assert_eq!(array.slots_for(b), vec![2]);
    }

    #[test]
    fn unlink_fixes_up_the_slot_that_moved_into_the_freed_position() {
        let array = DescriptorArray::new(
            UniqueResourceId::default_for_test(),
            DescriptorArrayKind::Image,
            8,
            PendingDrops::new(),
        );
        let r = UniqueResourceId::default_for_test();
        array.write(0, r);
        array.write(1, r);
        array.write(2, r);
        // Unlink slot 0: slot 2 (the back_ref vec's last entry) swaps into
        // position 0 internally; it must still resolve correctly.
        let other = UniqueResourceId::default_for_test();
        array.write(0, other);
        let mut remaining = array.slots_for(r);
        remaining.sort();
        assert_eq!(remaining, vec![1, 2]);
        // Now unlinking slot 2 must not corrupt slot 1's bookkeeping.
        array.write(2, other);
        assert_eq!(array.slots_for(r), vec![1]);
    }

    #[test]
    fn populated_slots_is_union_written_minus_union_nulled() {
        let array = DescriptorArray::new(
            UniqueResourceId::default_for_test(),
            DescriptorArrayKind::Buffer,
            4,
            PendingDrops::new(),
        );
        let r = UniqueResourceId::default_for_test();
        array.write(0, r);
        array.write(1, r);
        array.clear_slot(0);
        assert_eq!(array.occupied_slots(), vec![1]);
    }
}
