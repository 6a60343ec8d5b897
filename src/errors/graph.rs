use alloc::boxed::Box;
use core::fmt::{self, Display, Formatter};

use crate::key::TypeKey;

/// A type transitively requires itself.
///
/// `cycle` names every participating key, starting from the one whose
/// addition closed the cycle.
#[derive(thiserror::Error, Debug)]
pub struct CycleError {
    pub cycle: Box<[TypeKey]>,
}

impl Display for CycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Cyclic dependency detected: ")?;
        for key in &self.cycle {
            write!(f, "{key} -> ")?;
        }
        match self.cycle.first() {
            Some(key) => write!(f, "{key}"),
            None => Ok(()),
        }
    }
}
