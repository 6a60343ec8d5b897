use alloc::boxed::Box;
use core::fmt::{self, Display, Formatter};

use super::graph::CycleError;
use crate::key::TypeKey;

fn write_keys(f: &mut Formatter<'_>, keys: &[TypeKey]) -> fmt::Result {
    let mut first = true;
    for key in keys {
        if !first {
            write!(f, ", ")?;
        }
        write!(f, "{key}")?;
        first = false;
    }
    Ok(())
}

/// A required type has no registered creator anywhere in the finalized
/// registry. All missing keys are reported at once.
#[derive(thiserror::Error, Debug)]
pub struct MissingBindingError {
    pub missing: Box<[TypeKey]>,
}

impl Display for MissingBindingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "No binding registered for required types: ")?;
        write_keys(f, &self.missing)
    }
}

/// Two creators were registered for the same non-multibinding key without an
/// explicit override. All duplicated keys are reported at once.
#[derive(thiserror::Error, Debug)]
pub struct DuplicateBindingError {
    pub duplicates: Box<[TypeKey]>,
}

impl Display for DuplicateBindingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Duplicate bindings without explicit override for types: ")?;
        write_keys(f, &self.duplicates)
    }
}

/// Failure while finalizing an injector. Every variant is detected at build
/// time, never at first use.
#[derive(thiserror::Error, Debug)]
pub enum BuildErrorKind {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    MissingBindings(#[from] MissingBindingError),
    #[error(transparent)]
    DuplicateBindings(#[from] DuplicateBindingError),
}
