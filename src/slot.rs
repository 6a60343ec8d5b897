use crate::{
    creator::{ArcAny, BoxedCloneCreator},
    finalizer::BoxedCloneFinalizer,
    key::TypeKey,
};

/// Either a creation function or the materialized object. The transition is
/// one-way: once `Created`, a slot never reverts.
#[derive(Clone)]
pub(crate) enum SlotState {
    Uncreated(BoxedCloneCreator),
    Created(ArcAny),
}

/// Runtime cell for one bound type.
///
/// A pre-built instance binding starts out `Created`; cloning such a slot
/// shares the instance, while cloning an uncreated slot stamps a fresh
/// memoization cell for the new injector.
#[derive(Clone)]
pub struct BindingSlot {
    pub(crate) key: TypeKey,
    pub(crate) state: SlotState,
    pub(crate) finalizer: Option<BoxedCloneFinalizer>,
}

impl BindingSlot {
    #[inline]
    #[must_use]
    pub(crate) fn uncreated(key: TypeKey, creator: BoxedCloneCreator) -> Self {
        Self {
            key,
            state: SlotState::Uncreated(creator),
            finalizer: None,
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn created(key: TypeKey, object: ArcAny) -> Self {
        Self {
            key,
            state: SlotState::Created(object),
            finalizer: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self.state, SlotState::Created(_))
    }

    #[inline]
    pub(crate) fn mark_created(&mut self, object: ArcAny) {
        debug_assert!(!self.is_created(), "slot transition is one-way");
        self.state = SlotState::Created(object);
    }
}
