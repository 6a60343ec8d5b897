use alloc::{collections::btree_set::BTreeSet, vec::Vec};
use tracing::debug;

use crate::{
    dependency::DependencyEntry,
    errors::{BuildErrorKind, MissingBindingError},
    graph::CanonicalGraph,
    key::TypeKey,
    registry::{BindingRegistry, OverridePolicy},
};

/// Immutable snapshot of a validated canonical graph and its frozen
/// registry.
///
/// Any number of injectors can be derived from one snapshot (behind an
/// `Arc`) without re-running normalization on the shared part; each derived
/// injector stamps its own slots, so materialized state is never shared.
pub struct NormalizedStorage {
    graph: CanonicalGraph,
    registry: BindingRegistry,
}

impl core::fmt::Debug for NormalizedStorage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NormalizedStorage").field("graph", &self.graph).finish_non_exhaustive()
    }
}

impl NormalizedStorage {
    /// Validates that every key the graph mentions has a slot, then freezes.
    ///
    /// # Errors
    /// Returns [`MissingBindingError`] listing all unbound keys at once.
    pub fn freeze(graph: CanonicalGraph, registry: BindingRegistry) -> Result<Self, MissingBindingError> {
        let mut missing = BTreeSet::new();
        for entry in graph.entries() {
            if !registry.contains(&entry.key) {
                missing.insert(entry.key);
            }
            for requirement in &entry.requirements {
                if !registry.contains(requirement) {
                    missing.insert(*requirement);
                }
            }
        }

        if missing.is_empty() {
            debug!(entries = graph.len(), bindings = registry.len(), "Storage frozen");
            Ok(Self { graph, registry })
        } else {
            Err(MissingBindingError {
                missing: missing.into_iter().collect::<Vec<TypeKey>>().into_boxed_slice(),
            })
        }
    }

    /// Derives a new snapshot from `base` plus extra entries and bindings,
    /// without recomputing the shared part. `base` is unmodified; incoming
    /// single bindings shadow the base's.
    ///
    /// # Errors
    /// Returns [`BuildErrorKind::Cycle`] when an extra entry closes a cycle
    /// and [`BuildErrorKind::MissingBindings`] when the extended graph
    /// requires unbound keys.
    pub fn extend(
        base: &NormalizedStorage,
        extra_entries: impl IntoIterator<Item = DependencyEntry>,
        extra_registry: BindingRegistry,
    ) -> Result<Self, BuildErrorKind> {
        let mut graph = base.graph.clone();
        graph.add_dependencies(extra_entries)?;

        let registry = base.registry.clone().merge(extra_registry, OverridePolicy::PreferIncoming);
        Ok(Self::freeze(graph, registry)?)
    }

    #[inline]
    #[must_use]
    pub fn graph(&self) -> &CanonicalGraph {
        &self.graph
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &BindingRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::{BindingRegistry, CanonicalGraph, DependencyEntry, NormalizedStorage, TypeKey};
    use crate::{creator::boxed_creator, slot::BindingSlot};

    struct Logger;
    struct Database;
    struct Service;

    fn bound_registry<const N: usize>(slots: [BindingSlot; N]) -> BindingRegistry {
        let mut registry = BindingRegistry::new();
        for slot in slots {
            registry.insert(slot).unwrap();
        }
        registry
    }

    fn slot<T: Send + Sync + 'static>(value: fn() -> T) -> BindingSlot {
        BindingSlot::uncreated(TypeKey::of::<T>(), boxed_creator(move |_| Ok(value())))
    }

    #[test]
    fn test_freeze_complete_graph() {
        let mut graph = CanonicalGraph::new();
        graph
            .add_dependency(DependencyEntry::new(TypeKey::of::<Database>(), [TypeKey::of::<Logger>()]))
            .unwrap();

        let registry = bound_registry([slot(|| Logger), slot(|| Database)]);
        NormalizedStorage::freeze(graph, registry).unwrap();
    }

    #[test]
    fn test_freeze_lists_all_missing() {
        let mut graph = CanonicalGraph::new();
        graph
            .add_dependency(DependencyEntry::new(
                TypeKey::of::<Service>(),
                [TypeKey::of::<Logger>(), TypeKey::of::<Database>()],
            ))
            .unwrap();

        let registry = bound_registry([slot(|| Service)]);
        let err = NormalizedStorage::freeze(graph, registry).unwrap_err();

        assert_eq!(err.missing.len(), 2);
        assert!(err.missing.contains(&TypeKey::of::<Logger>()));
        assert!(err.missing.contains(&TypeKey::of::<Database>()));
    }

    #[test]
    fn test_extend_leaves_base_untouched() {
        let mut graph = CanonicalGraph::new();
        graph
            .add_dependency(DependencyEntry::new(TypeKey::of::<Database>(), [TypeKey::of::<Logger>()]))
            .unwrap();
        let base = NormalizedStorage::freeze(graph, bound_registry([slot(|| Logger), slot(|| Database)])).unwrap();

        let extended = NormalizedStorage::extend(
            &base,
            [DependencyEntry::new(TypeKey::of::<Service>(), [TypeKey::of::<Database>()])],
            bound_registry([slot(|| Service)]),
        )
        .unwrap();

        assert_eq!(base.graph().len(), 1);
        assert_eq!(extended.graph().len(), 2);
        assert!(base.registry().lookup(&TypeKey::of::<Service>()).is_none());
        assert!(extended.registry().lookup(&TypeKey::of::<Service>()).is_some());
    }

    #[test]
    fn test_extend_shadows_base_bindings() {
        let base = NormalizedStorage::freeze(CanonicalGraph::new(), bound_registry([slot(|| Logger)])).unwrap();

        let mut shadow = BindingRegistry::new();
        shadow
            .insert(BindingSlot::created(TypeKey::of::<Logger>(), alloc::sync::Arc::new(Logger)))
            .unwrap();

        let extended = NormalizedStorage::extend(&base, [], shadow).unwrap();
        assert!(extended.registry().lookup(&TypeKey::of::<Logger>()).unwrap().is_created());
        assert!(!base.registry().lookup(&TypeKey::of::<Logger>()).unwrap().is_created());
    }
}
