#![no_std]

extern crate alloc;

pub(crate) mod creator;
pub(crate) mod dependency;
pub(crate) mod errors;
pub(crate) mod finalizer;
pub(crate) mod graph;
pub(crate) mod injector;
pub(crate) mod key;
pub(crate) mod registry;
pub(crate) mod slot;
pub(crate) mod storage;

pub use dependency::DependencyEntry;
pub use errors::{BuildErrorKind, CreateErrorKind, CycleError, DuplicateBindingError, MissingBindingError, ResolveErrorKind};
pub use finalizer::Finalizer;
pub use graph::CanonicalGraph;
pub use injector::{Injector, InjectorBuilder};
pub use key::TypeKey;
pub use registry::{BindingRegistry, OverridePolicy};
pub use slot::BindingSlot;
pub use storage::NormalizedStorage;
