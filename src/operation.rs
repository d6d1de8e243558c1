//! Operation sets: tags that group deferred parameter changes.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Tag attached to every parameter change.
///
/// [`OperationId::IMMEDIATE`] applies a change as soon as it is made. Any
/// other id defers the change until [`crate::PetalMixEngine::commit_changes`]
/// is called with that same id, at which point every change tagged with it
/// is applied together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OperationId(u32);

impl OperationId {
    pub const IMMEDIATE: Self = Self(0);

    /// Batch id `n`; `0` is the immediate id.
    pub const fn batch(n: u32) -> Self {
        Self(n)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub const fn is_immediate(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_immediate() {
            write!(f, "OperationId(immediate)")
        } else {
            write!(f, "OperationId({})", self.0)
        }
    }
}

/// Hands out batch ids `1..=max` round-robin.
#[derive(Debug)]
pub(crate) struct OperationSetAllocator {
    next: AtomicU32,
    max: u32,
}

impl OperationSetAllocator {
    pub(crate) fn new(max: u32) -> Self {
        Self {
            next: AtomicU32::new(0),
            max: max.max(1),
        }
    }

    pub(crate) fn next(&self) -> OperationId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        OperationId::batch(n % self.max + 1)
    }
}
