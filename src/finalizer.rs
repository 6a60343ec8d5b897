use alloc::{boxed::Box, sync::Arc};

use crate::creator::ArcAny;

/// Teardown hook for one bound type.
///
/// Finalizers run when the injector is torn down, in LIFO order of
/// materialization (not the order of registration). [`Drop`] is not an
/// equivalent: finalizers see the shared handle and a guaranteed order.
pub trait Finalizer<Dep>: Clone + 'static {
    fn finalize(&mut self, dependency: Arc<Dep>);
}

impl<F, Dep> Finalizer<Dep> for F
where
    F: FnMut(Arc<Dep>) + Clone + 'static,
{
    #[inline]
    fn finalize(&mut self, dependency: Arc<Dep>) {
        self(dependency);
    }
}

pub(crate) struct BoxedCloneFinalizer(Box<dyn CloneFinalize>);

pub(crate) trait CloneFinalize: Send + Sync {
    fn call(&mut self, dependency: ArcAny);

    #[must_use]
    fn clone_box(&self) -> Box<dyn CloneFinalize>;
}

impl Clone for BoxedCloneFinalizer {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl BoxedCloneFinalizer {
    #[inline]
    pub(crate) fn call(&mut self, dependency: ArcAny) {
        self.0.call(dependency);
    }
}

struct FinalizeFn<F>(F);

impl<F> CloneFinalize for FinalizeFn<F>
where
    F: FnMut(ArcAny) + Clone + Send + Sync + 'static,
{
    #[inline]
    fn call(&mut self, dependency: ArcAny) {
        (self.0)(dependency);
    }

    #[inline]
    fn clone_box(&self) -> Box<dyn CloneFinalize> {
        Box::new(Self(self.0.clone()))
    }
}

#[must_use]
pub(crate) fn boxed_finalizer_factory<Dep, Fin>(mut finalizer: Fin) -> BoxedCloneFinalizer
where
    Dep: Send + Sync + 'static,
    Fin: Finalizer<Dep> + Send + Sync,
{
    BoxedCloneFinalizer(Box::new(FinalizeFn(move |dependency: ArcAny| {
        let dependency = dependency.downcast::<Dep>().expect("Failed to downcast value in finalizer factory");
        finalizer.finalize(dependency);
    })))
}
