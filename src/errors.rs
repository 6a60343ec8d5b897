mod build;
mod graph;
mod injector;

pub use build::{BuildErrorKind, DuplicateBindingError, MissingBindingError};
pub use graph::CycleError;
pub use injector::{CreateErrorKind, ResolveErrorKind};
