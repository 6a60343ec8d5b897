use alloc::{collections::btree_map::BTreeMap, vec::Vec};

use crate::{finalizer::BoxedCloneFinalizer, key::TypeKey, slot::BindingSlot};

/// What happens to a key present in both registries during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverridePolicy {
    /// The base registry's slot wins.
    KeepBase,
    /// The incoming registry's slot wins (child-shadows-parent).
    PreferIncoming,
}

/// Ordered mapping from [`TypeKey`] to [`BindingSlot`].
///
/// Iteration is in key order, so serialization for debugging and the merge
/// are deterministic. No object creation happens here.
#[derive(Clone, Default)]
pub struct BindingRegistry {
    slots: BTreeMap<TypeKey, BindingSlot>,
    multi: BTreeMap<TypeKey, Vec<BindingSlot>>,
}

impl BindingRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a slot, rejecting duplicates.
    ///
    /// # Errors
    /// Returns the key when it is already bound; the caller reports all
    /// duplicates at once at build time.
    pub(crate) fn insert(&mut self, slot: BindingSlot) -> Result<(), TypeKey> {
        use alloc::collections::btree_map::Entry::{Occupied, Vacant};

        match self.slots.entry(slot.key) {
            Occupied(_) => Err(slot.key),
            Vacant(entry) => {
                entry.insert(slot);
                Ok(())
            }
        }
    }

    /// Inserts a slot, replacing any existing one for the same key.
    pub(crate) fn insert_override(&mut self, slot: BindingSlot) -> Option<BindingSlot> {
        self.slots.insert(slot.key, slot)
    }

    /// Appends a slot to the key's multibinding sequence.
    pub(crate) fn insert_multi(&mut self, slot: BindingSlot) {
        self.multi.entry(slot.key).or_default().push(slot);
    }

    #[inline]
    #[must_use]
    pub fn lookup(&self, key: &TypeKey) -> Option<&BindingSlot> {
        self.slots.get(key)
    }

    #[inline]
    #[must_use]
    pub fn lookup_multi(&self, key: &TypeKey) -> Option<&[BindingSlot]> {
        self.multi.get(key).map(Vec::as_slice)
    }

    /// Whether the key has a single- or multibinding slot.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.slots.contains_key(key) || self.multi.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() + self.multi.values().map(Vec::len).sum::<usize>()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.multi.is_empty()
    }

    /// Single-binding slots in key order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &BindingSlot> {
        self.slots.values()
    }

    /// Combines two registries. Multibinding sequences concatenate, base
    /// first; for single bindings present in both, `policy` decides.
    #[must_use]
    pub fn merge(mut self, other: BindingRegistry, policy: OverridePolicy) -> Self {
        for (key, slot) in other.slots {
            match policy {
                OverridePolicy::PreferIncoming => {
                    self.slots.insert(key, slot);
                }
                OverridePolicy::KeepBase => {
                    self.slots.entry(key).or_insert(slot);
                }
            }
        }
        for (key, slots) in other.multi {
            self.multi.entry(key).or_default().extend(slots);
        }
        self
    }

    /// Attaches a finalizer to the key's slot (and to every multibinding
    /// slot registered under the key).
    pub(crate) fn set_finalizer(&mut self, key: &TypeKey, finalizer: BoxedCloneFinalizer) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.finalizer = Some(finalizer.clone());
        }
        if let Some(slots) = self.multi.get_mut(key) {
            for slot in slots {
                slot.finalizer = Some(finalizer.clone());
            }
        }
    }

    pub(crate) fn multi_keys(&self) -> impl Iterator<Item = &TypeKey> {
        self.multi.keys()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::{sync::Arc, vec::Vec};

    use super::{BindingRegistry, OverridePolicy};
    use crate::{creator::boxed_creator, key::TypeKey, slot::BindingSlot};

    #[derive(Default)]
    struct Logger;

    #[derive(Default)]
    struct Database;

    fn uncreated_slot<T: Send + Sync + Default + 'static>() -> BindingSlot {
        BindingSlot::uncreated(TypeKey::of::<T>(), boxed_creator(|_| Ok(T::default())))
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut registry = BindingRegistry::new();
        registry.insert(uncreated_slot::<Logger>()).unwrap();
        assert_eq!(registry.insert(uncreated_slot::<Logger>()).unwrap_err(), TypeKey::of::<Logger>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_override_replaces() {
        let mut registry = BindingRegistry::new();
        registry.insert(uncreated_slot::<Logger>()).unwrap();

        let key = TypeKey::of::<Logger>();
        let replaced = registry.insert_override(BindingSlot::created(key, Arc::new(Logger)));
        assert!(replaced.is_some());
        assert!(registry.lookup(&key).unwrap().is_created());
    }

    #[test]
    fn test_iteration_in_key_order() {
        let mut registry = BindingRegistry::new();
        registry.insert(uncreated_slot::<Database>()).unwrap();
        registry.insert(uncreated_slot::<Logger>()).unwrap();

        let keys: Vec<_> = registry.iter().map(BindingSlot::key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_merge_prefer_incoming() {
        let mut base = BindingRegistry::new();
        base.insert(uncreated_slot::<Logger>()).unwrap();

        let mut incoming = BindingRegistry::new();
        let key = TypeKey::of::<Logger>();
        incoming.insert(BindingSlot::created(key, Arc::new(Logger))).unwrap();

        let merged = base.clone().merge(incoming.clone(), OverridePolicy::PreferIncoming);
        assert!(merged.lookup(&key).unwrap().is_created());

        let merged = base.merge(incoming, OverridePolicy::KeepBase);
        assert!(!merged.lookup(&key).unwrap().is_created());
    }

    #[test]
    fn test_merge_concatenates_multibindings() {
        let key = TypeKey::of::<Logger>();

        let mut base = BindingRegistry::new();
        base.insert_multi(BindingSlot::created(key, Arc::new(Logger)));

        let mut incoming = BindingRegistry::new();
        incoming.insert_multi(BindingSlot::created(key, Arc::new(Logger)));
        incoming.insert_multi(BindingSlot::created(key, Arc::new(Logger)));

        let merged = base.merge(incoming, OverridePolicy::PreferIncoming);
        assert_eq!(merged.lookup_multi(&key).unwrap().len(), 3);
    }
}
