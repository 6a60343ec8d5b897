use alloc::boxed::Box;
use core::any::TypeId;

use crate::key::TypeKey;

/// Failure inside a creation function.
#[derive(thiserror::Error, Debug)]
pub enum CreateErrorKind {
    /// Resolving one of the declared requirements failed.
    #[error("{0}")]
    Requirement(Box<ResolveErrorKind>),
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl From<ResolveErrorKind> for CreateErrorKind {
    fn from(err: ResolveErrorKind) -> Self {
        Self::Requirement(Box::new(err))
    }
}

/// Failure while resolving a key at runtime.
#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("No binding for {key} in injector")]
    NotBound { key: TypeKey },
    #[error("Binding for {expected} produced the wrong type. Actual type id: {actual:?}")]
    IncorrectType { expected: TypeKey, actual: TypeId },
    #[error("Injector was torn down, {key} can no longer be resolved")]
    UseAfterTeardown { key: TypeKey },
    #[error("Creator for {key} failed: {source}")]
    Creator {
        key: TypeKey,
        #[source]
        source: CreateErrorKind,
    },
}
