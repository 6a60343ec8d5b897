use alloc::{
    collections::{btree_map::BTreeMap, btree_set::BTreeSet},
    vec,
    vec::Vec,
};
use tracing::debug;

use crate::{dependency::DependencyEntry, errors::CycleError, key::TypeKey};

/// Dependency graph in canonical form.
///
/// Invariant: no entry's requirement set contains a key that itself has an
/// entry in the graph. Every set is therefore the full transitive closure of
/// the direct requirements, restricted to keys with no entry of their own,
/// and the graph is acyclic by construction.
///
/// The raw direct edges are kept alongside the canonical entries; cycle
/// detection runs over them, since canonical sets never mention resolved
/// keys and so cannot witness a cycle that closes over one.
#[derive(Debug, Clone, Default)]
pub struct CanonicalGraph {
    entries: Vec<DependencyEntry>,
    index: BTreeMap<TypeKey, usize>,
    direct: BTreeMap<TypeKey, BTreeSet<TypeKey>>,
}

impl CanonicalGraph {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical requirement set of `key`, if it has an entry.
    #[inline]
    #[must_use]
    pub fn requirements_of(&self, key: &TypeKey) -> Option<&BTreeSet<TypeKey>> {
        self.index.get(key).map(|&pos| &self.entries[pos].requirements)
    }

    /// Entries in addition order.
    #[inline]
    pub fn entries(&self) -> impl Iterator<Item = &DependencyEntry> {
        self.entries.iter()
    }

    /// Folds a new entry into the graph, keeping every entry canonical.
    ///
    /// Steps:
    /// 1. record the raw direct edges and fail with [`CycleError`] if the key
    ///    now reaches itself over them;
    /// 2. canonicalize the new requirements against the existing entries
    ///    (one substitution pass suffices, the entries are mutually canonical);
    /// 3. back-substitute the canonical set into every entry that required
    ///    this key;
    /// 4. append the entry, or union into an existing entry for the same key.
    ///
    /// The cycle check must walk the raw edges: a canonical set cannot
    /// witness a cycle that closes over an already resolved key, since that
    /// key was substituted away by canonicalization.
    ///
    /// A failed addition leaves the graph unusable for that entry: the caller
    /// must not retry it.
    ///
    /// # Errors
    /// Returns [`CycleError`] naming all participating keys when the entry
    /// transitively requires itself.
    pub fn add_dependency(&mut self, entry: DependencyEntry) -> Result<(), CycleError> {
        let DependencyEntry { key, requirements } = entry;

        self.direct.entry(key).or_default().extend(requirements.iter().copied());

        if let Some(cycle) = self.find_cycle(key) {
            return Err(CycleError {
                cycle: cycle.into_boxed_slice(),
            });
        }

        let mut canonical = BTreeSet::new();
        for requirement in &requirements {
            match self.index.get(requirement) {
                Some(&pos) => canonical.extend(self.entries[pos].requirements.iter().copied()),
                None => {
                    canonical.insert(*requirement);
                }
            }
        }

        // The new key is now fully resolved: entries that required it must
        // see its transitive requirements instead.
        for existing in &mut self.entries {
            if existing.requirements.remove(&key) {
                existing.requirements.extend(canonical.iter().copied());
            }
        }

        match self.index.get(&key) {
            Some(&pos) => self.union_into_existing(pos, &canonical),
            None => {
                debug!(key = %key, requirements = canonical.len(), "Entry appended");
                self.index.insert(key, self.entries.len());
                self.entries.push(DependencyEntry { key, requirements: canonical });
            }
        }

        Ok(())
    }

    /// Folds every entry of `entries` into the graph, left to right.
    ///
    /// The merge is associative: any addition order yields the same canonical
    /// requirement sets.
    ///
    /// # Errors
    /// Returns [`CycleError`] on the first entry that closes a cycle.
    pub fn add_dependencies(&mut self, entries: impl IntoIterator<Item = DependencyEntry>) -> Result<(), CycleError> {
        for entry in entries {
            self.add_dependency(entry)?;
        }
        Ok(())
    }

    /// Re-adding a key unions the requirement sets. The delta has to be
    /// propagated to every entry that transitively required this key, since
    /// their sets absorbed the old closure by substitution.
    fn union_into_existing(&mut self, pos: usize, canonical: &BTreeSet<TypeKey>) {
        let key = self.entries[pos].key;
        let delta: Vec<TypeKey> = canonical.difference(&self.entries[pos].requirements).copied().collect();
        if delta.is_empty() {
            return;
        }
        debug!(key = %key, delta = delta.len(), "Entry requirements widened");

        self.entries[pos].requirements.extend(delta.iter().copied());

        let dependents = self.dependents_of(key);
        for existing in &mut self.entries {
            if existing.key != key && dependents.contains(&existing.key) {
                existing.requirements.extend(delta.iter().copied());
            }
        }
    }

    /// Keys that reach `key` over the raw direct edges.
    fn dependents_of(&self, key: TypeKey) -> BTreeSet<TypeKey> {
        let mut dependents = BTreeSet::new();
        let mut changed = true;
        while changed {
            changed = false;
            for (from, to) in &self.direct {
                if dependents.contains(from) {
                    continue;
                }
                if to.contains(&key) || to.iter().any(|next| dependents.contains(next)) {
                    dependents.insert(*from);
                    changed = true;
                }
            }
        }
        dependents
    }

    /// Cycle through `start` over the raw direct edges, in full, if any.
    fn find_cycle(&self, start: TypeKey) -> Option<Vec<TypeKey>> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![start];
        self.cycle_visit(start, start, &mut visited, &mut stack).then_some(stack)
    }

    fn cycle_visit(&self, current: TypeKey, start: TypeKey, visited: &mut BTreeSet<TypeKey>, stack: &mut Vec<TypeKey>) -> bool {
        let Some(nexts) = self.direct.get(&current) else {
            return false;
        };
        for next in nexts {
            if *next == start {
                return true;
            }
            if !visited.insert(*next) {
                continue;
            }
            stack.push(*next);
            if self.cycle_visit(*next, start, visited, stack) {
                return true;
            }
            stack.pop();
        }
        false
    }
}
