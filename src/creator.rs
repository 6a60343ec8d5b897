use alloc::{boxed::Box, sync::Arc};
use core::{any::Any, marker::PhantomData};

use crate::{errors::CreateErrorKind, injector::Injector};

pub(crate) type BoxedAny = Box<dyn Any + Send + Sync>;
pub(crate) type ArcAny = Arc<dyn Any + Send + Sync>;

/// A creation function for one bound type.
///
/// The injector passed in already has every declared requirement
/// materialized; the creator is expected to only touch those.
pub(crate) trait Creator: 'static {
    fn create(&mut self, injector: &Injector) -> Result<BoxedAny, CreateErrorKind>;
}

pub(crate) trait CloneCreator: Creator + Send + Sync {
    #[must_use]
    fn clone_box(&self) -> Box<dyn CloneCreator>;
}

impl<T> CloneCreator for T
where
    T: Creator + Clone + Send + Sync + 'static,
{
    #[inline]
    fn clone_box(&self) -> Box<dyn CloneCreator> {
        Box::new(self.clone())
    }
}

/// Clonable boxed creator, so a frozen registry can stamp fresh uncreated
/// slots for every injector derived from it.
pub(crate) struct BoxedCloneCreator(pub(crate) Box<dyn CloneCreator>);

impl Clone for BoxedCloneCreator {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl BoxedCloneCreator {
    #[inline]
    pub(crate) fn call(&mut self, injector: &Injector) -> Result<BoxedAny, CreateErrorKind> {
        self.0.create(injector)
    }
}

struct TypedCreator<T, F> {
    f: F,
    _provides: PhantomData<fn() -> T>,
}

impl<T, F: Clone> Clone for TypedCreator<T, F> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _provides: PhantomData,
        }
    }
}

impl<T, F> Creator for TypedCreator<T, F>
where
    T: Send + Sync + 'static,
    F: FnMut(&Injector) -> Result<T, CreateErrorKind> + 'static,
{
    #[inline]
    fn create(&mut self, injector: &Injector) -> Result<BoxedAny, CreateErrorKind> {
        (self.f)(injector).map(|value| Box::new(value) as BoxedAny)
    }
}

#[inline]
#[must_use]
pub(crate) fn boxed_creator<T, F>(f: F) -> BoxedCloneCreator
where
    T: Send + Sync + 'static,
    F: FnMut(&Injector) -> Result<T, CreateErrorKind> + Clone + Send + Sync + 'static,
{
    BoxedCloneCreator(Box::new(TypedCreator { f, _provides: PhantomData }))
}
