use alloc::collections::btree_set::BTreeSet;

use crate::key::TypeKey;

/// One node of the dependency graph: a bound type together with the set of
/// types its creator needs.
///
/// Inside a [`crate::graph::CanonicalGraph`] the requirement set is already
/// the full transitive closure and never contains `key` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    pub key: TypeKey,
    pub requirements: BTreeSet<TypeKey>,
}

impl DependencyEntry {
    #[inline]
    #[must_use]
    pub fn new(key: TypeKey, requirements: impl IntoIterator<Item = TypeKey>) -> Self {
        Self {
            key,
            requirements: requirements.into_iter().collect(),
        }
    }
}
