use alloc::{
    collections::btree_map::BTreeMap,
    sync::Arc,
    vec::Vec,
};
use core::{cell::RefCell, mem};
use parking_lot::ReentrantMutex;
use tracing::{debug, error, info_span};

use crate::{
    creator::{boxed_creator, ArcAny, BoxedCloneCreator},
    dependency::DependencyEntry,
    errors::{BuildErrorKind, CreateErrorKind, DuplicateBindingError, ResolveErrorKind},
    finalizer::{boxed_finalizer_factory, BoxedCloneFinalizer, Finalizer},
    graph::CanonicalGraph,
    key::TypeKey,
    registry::{BindingRegistry, OverridePolicy},
    slot::{BindingSlot, SlotState},
    storage::NormalizedStorage,
};

/// Collects bindings and dependency declarations, then finalizes them into
/// an [`Injector`] (or a shareable [`NormalizedStorage`]).
///
/// Every structural error — cycle, missing binding, duplicate binding — is
/// reported by [`Self::build`]/[`Self::freeze`], never at first use.
pub struct InjectorBuilder {
    registry: BindingRegistry,
    entries: Vec<DependencyEntry>,
    finalizers: BTreeMap<TypeKey, BoxedCloneFinalizer>,
    duplicates: Vec<TypeKey>,
    base: Option<Arc<NormalizedStorage>>,
}

impl Default for InjectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectorBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: BindingRegistry::new(),
            entries: Vec::new(),
            finalizers: BTreeMap::new(),
            duplicates: Vec::new(),
            base: None,
        }
    }

    /// Starts a builder on top of a frozen base: the result sees everything
    /// the base had, plus the bindings added here. The base's normalization
    /// work is reused, not recomputed.
    #[inline]
    #[must_use]
    pub fn extend(base: Arc<NormalizedStorage>) -> Self {
        Self {
            base: Some(base),
            ..Self::new()
        }
    }

    /// Binds `T` to a creation function with the given requirement keys.
    ///
    /// The creator must only resolve the declared requirements; they are
    /// materialized before it runs. Binding an already-bound key without
    /// [`Self::bind_override`] is collected and reported at build time.
    #[must_use]
    pub fn bind<T, F>(mut self, requires: impl IntoIterator<Item = TypeKey>, creator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnMut(&Injector) -> Result<T, CreateErrorKind> + Clone + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        match self.registry.insert(BindingSlot::uncreated(key, boxed_creator(creator))) {
            Ok(()) => self.entries.push(DependencyEntry::new(key, requires)),
            Err(key) => self.duplicates.push(key),
        }
        self
    }

    /// Binds `T`, explicitly replacing an existing binding for the same key.
    #[must_use]
    pub fn bind_override<T, F>(mut self, requires: impl IntoIterator<Item = TypeKey>, creator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnMut(&Injector) -> Result<T, CreateErrorKind> + Clone + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        self.registry.insert_override(BindingSlot::uncreated(key, boxed_creator(creator)));
        self.entries.push(DependencyEntry::new(key, requires));
        self
    }

    /// Binds `T` to a pre-built object. The slot starts out created, so the
    /// instance is shared by every injector derived from the same storage
    /// and never enters the construction-order log.
    #[must_use]
    pub fn bind_instance<T>(mut self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        match self.registry.insert(BindingSlot::created(key, Arc::new(value))) {
            Ok(()) => self.entries.push(DependencyEntry::new(key, [])),
            Err(key) => self.duplicates.push(key),
        }
        self
    }

    /// Appends a creator to `T`'s multibinding sequence. All registered
    /// creators are materialized together by [`Injector::get_all`], in
    /// registration order, each memoized independently.
    #[must_use]
    pub fn bind_multi<T, F>(mut self, requires: impl IntoIterator<Item = TypeKey>, creator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnMut(&Injector) -> Result<T, CreateErrorKind> + Clone + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        self.registry.insert_multi(BindingSlot::uncreated(key, boxed_creator(creator)));
        self.entries.push(DependencyEntry::new(key, requires));
        self
    }

    /// Adds a teardown hook for `Dep`, called in LIFO order of
    /// materialization when the injector is torn down.
    #[must_use]
    pub fn add_finalizer<Dep>(mut self, finalizer: impl Finalizer<Dep> + Send + Sync) -> Self
    where
        Dep: Send + Sync + 'static,
    {
        self.finalizers.insert(TypeKey::of::<Dep>(), boxed_finalizer_factory(finalizer));
        self
    }

    /// Normalizes and validates the collected bindings into a shareable
    /// snapshot.
    ///
    /// # Errors
    /// Returns [`BuildErrorKind::DuplicateBindings`] listing every key bound
    /// twice without an override, [`BuildErrorKind::Cycle`] when a type
    /// transitively requires itself and [`BuildErrorKind::MissingBindings`]
    /// listing every required key with no slot.
    pub fn freeze(self) -> Result<Arc<NormalizedStorage>, BuildErrorKind> {
        if !self.duplicates.is_empty() {
            let err = DuplicateBindingError {
                duplicates: self.duplicates.into_boxed_slice(),
            };
            error!("{}", err);
            return Err(err.into());
        }

        // Finalizers attach after the base merge, so they also reach types
        // bound in the shared base.
        let (graph, mut registry) = match self.base {
            Some(base) => {
                let mut graph = base.graph().clone();
                graph.add_dependencies(self.entries)?;
                let registry = base.registry().clone().merge(self.registry, OverridePolicy::PreferIncoming);
                (graph, registry)
            }
            None => {
                let mut graph = CanonicalGraph::new();
                graph.add_dependencies(self.entries)?;
                (graph, self.registry)
            }
        };
        for (key, finalizer) in self.finalizers {
            registry.set_finalizer(&key, finalizer);
        }

        Ok(Arc::new(NormalizedStorage::freeze(graph, registry)?))
    }

    /// Finalizes into a ready injector.
    ///
    /// # Errors
    /// Same as [`Self::freeze`].
    pub fn build(self) -> Result<Injector, BuildErrorKind> {
        Ok(Injector::from_storage(self.freeze()?))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ready,
    TornDown,
}

struct Constructed {
    key: TypeKey,
    object: ArcAny,
    finalizer: Option<BoxedCloneFinalizer>,
}

struct InjectorState {
    slots: BTreeMap<TypeKey, BindingSlot>,
    multi: BTreeMap<TypeKey, Vec<BindingSlot>>,
    constructed: Vec<Constructed>,
    phase: Phase,
}

/// Lazily materializes the object graph described by a
/// [`NormalizedStorage`].
///
/// Each injector stamps its own slots from the frozen registry, so two
/// injectors derived from the same storage never share materialized state.
/// The whole materialization path runs under a re-entrant lock: recursive
/// requirement resolution re-enters it on the creating thread, while a
/// concurrent first-request for the same key blocks until the creator
/// finished and then observes the memoized object.
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

struct InjectorInner {
    storage: Arc<NormalizedStorage>,
    state: ReentrantMutex<RefCell<InjectorState>>,
}

impl core::fmt::Debug for Injector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Injector").finish_non_exhaustive()
    }
}

impl Injector {
    /// Derives an injector from a frozen snapshot without extra bindings.
    #[must_use]
    pub fn from_storage(storage: Arc<NormalizedStorage>) -> Self {
        let slots = storage.registry().iter().map(|slot| (slot.key(), slot.clone())).collect();
        let multi = storage
            .registry()
            .multi_keys()
            .map(|key| (*key, storage.registry().lookup_multi(key).unwrap_or_default().to_vec()))
            .collect();

        Self {
            inner: Arc::new(InjectorInner {
                storage,
                state: ReentrantMutex::new(RefCell::new(InjectorState {
                    slots,
                    multi,
                    constructed: Vec::new(),
                    phase: Phase::Ready,
                })),
            }),
        }
    }

    /// Resolves `T`, materializing it (and, recursively, its unresolved
    /// requirements) on first request. The creator for `T` runs at most once
    /// per injector; later calls return the memoized object.
    #[allow(clippy::missing_errors_doc)]
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        let key = TypeKey::of::<T>();
        let span = info_span!("get", dependency = key.name);
        let _guard = span.enter();

        let object = self.get_by_key(key)?;
        object.downcast::<T>().map_err(|object| {
            let err = ResolveErrorKind::IncorrectType {
                expected: key,
                actual: (*object).type_id(),
            };
            error!("{}", err);
            err
        })
    }

    /// Untyped variant of [`Self::get`] for callers that only hold a
    /// [`TypeKey`].
    #[allow(clippy::missing_errors_doc)]
    pub fn get_by_key(&self, key: TypeKey) -> Result<ArcAny, ResolveErrorKind> {
        let lock = self.inner.state.lock();
        if lock.borrow().phase == Phase::TornDown {
            let err = ResolveErrorKind::UseAfterTeardown { key };
            error!("{}", err);
            return Err(err);
        }
        self.materialize_single(key)
    }

    /// Materializes and returns every object in `T`'s multibinding
    /// sequence, in registration order. Each creator is memoized
    /// independently.
    #[allow(clippy::missing_errors_doc)]
    pub fn get_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ResolveErrorKind> {
        let key = TypeKey::of::<T>();
        let span = info_span!("get_all", dependency = key.name);
        let _guard = span.enter();

        let lock = self.inner.state.lock();
        if lock.borrow().phase == Phase::TornDown {
            let err = ResolveErrorKind::UseAfterTeardown { key };
            error!("{}", err);
            return Err(err);
        }

        let objects = self.materialize_multi(key)?;
        let mut downcasted = Vec::with_capacity(objects.len());
        for object in objects {
            match object.downcast::<T>() {
                Ok(object) => downcasted.push(object),
                Err(object) => {
                    let err = ResolveErrorKind::IncorrectType {
                        expected: key,
                        actual: (*object).type_id(),
                    };
                    error!("{}", err);
                    return Err(err);
                }
            }
        }
        Ok(downcasted)
    }

    /// Tears the injector down: finalizers run in exact reverse order of
    /// materialization, every slot is dropped and later `get` calls fail
    /// with [`ResolveErrorKind::UseAfterTeardown`]. Dropping the last handle
    /// tears down implicitly.
    pub fn teardown(&self) {
        let span = info_span!("teardown");
        let _guard = span.enter();

        self.inner.teardown();
    }
}

impl Injector {
    fn materialize_single(&self, key: TypeKey) -> Result<ArcAny, ResolveErrorKind> {
        let lock = self.inner.state.lock();

        let creator = {
            let state = lock.borrow();
            let Some(slot) = state.slots.get(&key) else {
                let err = ResolveErrorKind::NotBound { key };
                error!("{}", err);
                return Err(err);
            };
            match &slot.state {
                SlotState::Created(object) => {
                    debug!(key = %key, "Found materialized");
                    return Ok(object.clone());
                }
                SlotState::Uncreated(creator) => creator.clone(),
            }
        };

        self.materialize_requirements(key)?;
        let object = self.run_creator(key, creator)?;

        {
            let mut state = lock.borrow_mut();
            let slot = state.slots.get_mut(&key).expect("slot present for materialized key");
            slot.mark_created(object.clone());
            let finalizer = slot.finalizer.clone();
            state.constructed.push(Constructed {
                key,
                object: object.clone(),
                finalizer,
            });
        }

        Ok(object)
    }

    fn materialize_multi(&self, key: TypeKey) -> Result<Vec<ArcAny>, ResolveErrorKind> {
        let lock = self.inner.state.lock();

        let count = match lock.borrow().multi.get(&key) {
            Some(slots) => slots.len(),
            None => {
                let err = ResolveErrorKind::NotBound { key };
                error!("{}", err);
                return Err(err);
            }
        };

        self.materialize_requirements(key)?;

        let mut objects = Vec::with_capacity(count);
        for index in 0..count {
            let pending = {
                let state = lock.borrow();
                match &state.multi[&key][index].state {
                    SlotState::Created(object) => {
                        objects.push(object.clone());
                        None
                    }
                    SlotState::Uncreated(creator) => Some(creator.clone()),
                }
            };

            if let Some(creator) = pending {
                let object = self.run_creator(key, creator)?;
                let mut state = lock.borrow_mut();
                let slot = &mut state.multi.get_mut(&key).expect("multibinding present for materialized key")[index];
                slot.mark_created(object.clone());
                let finalizer = slot.finalizer.clone();
                state.constructed.push(Constructed {
                    key,
                    object: object.clone(),
                    finalizer,
                });
                objects.push(object);
            }
        }

        Ok(objects)
    }

    /// Materializes the canonical requirement set of `key` before its own
    /// creator runs. Recursion terminates because the graph is acyclic and
    /// the slot set is finite.
    fn materialize_requirements(&self, key: TypeKey) -> Result<(), ResolveErrorKind> {
        let Some(requirements) = self.inner.storage.graph().requirements_of(&key) else {
            return Ok(());
        };
        for requirement in requirements {
            let is_single = self.inner.state.lock().borrow().slots.contains_key(requirement);
            if is_single {
                self.materialize_single(*requirement)?;
            } else {
                self.materialize_multi(*requirement)?;
            }
        }
        Ok(())
    }

    fn run_creator(&self, key: TypeKey, mut creator: BoxedCloneCreator) -> Result<ArcAny, ResolveErrorKind> {
        match creator.call(self) {
            Ok(boxed) => {
                let object: ArcAny = Arc::from(boxed);
                if (*object).type_id() == key.id {
                    debug!(key = %key, "Materialized");
                    Ok(object)
                } else {
                    let err = ResolveErrorKind::IncorrectType {
                        expected: key,
                        actual: (*object).type_id(),
                    };
                    error!("{}", err);
                    Err(err)
                }
            }
            Err(source) => {
                let err = ResolveErrorKind::Creator { key, source };
                error!("{}", err);
                Err(err)
            }
        }
    }
}

impl InjectorInner {
    fn teardown(&self) {
        let lock = self.state.lock();

        let (constructed, slots, multi) = {
            let mut state = lock.borrow_mut();
            if state.phase == Phase::TornDown {
                return;
            }
            state.phase = Phase::TornDown;
            (
                mem::take(&mut state.constructed),
                mem::take(&mut state.slots),
                mem::take(&mut state.multi),
            )
        };

        // Slots keep handles to created objects; release them first so the
        // construction log below holds the deciding reference.
        drop(slots);
        drop(multi);

        for Constructed { key, object, finalizer } in constructed.into_iter().rev() {
            if let Some(mut finalizer) = finalizer {
                finalizer.call(object);
                debug!(key = %key, "Finalizer called");
            }
        }
    }
}

impl Drop for InjectorInner {
    fn drop(&mut self) {
        self.teardown();
        debug!("Injector torn down on drop");
    }
}
