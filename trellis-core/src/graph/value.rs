//! Value Cells
//!
//! A value cell is the storage behind an output port. It holds exactly one
//! value of a type chosen by the node author, behind a type-erased box.
//!
//! # Ownership
//!
//! The output port that creates a cell keeps the only strong handle to it.
//! Input ports linked to that output hold `Weak` observers and upgrade them on
//! every access, so dropping the output (or the whole node) invalidates every
//! observer at once without any notification pass.
//!
//! The type tag is informational. Reads at the wrong type are detected by the
//! downcast and reported as "absent", never as a panic.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Strong handle to a cell, held only by the owning output port.
pub(crate) type SharedCell = Arc<RwLock<ValueCell>>;

/// Non-owning view of a cell, held by input ports.
pub(crate) type CellObserver = Weak<RwLock<ValueCell>>;

/// Type-erased single value storage.
pub struct ValueCell {
    /// Name of the stored type, for diagnostics.
    type_tag: &'static str,

    /// The stored value.
    value: Box<dyn Any + Send + Sync>,
}

impl ValueCell {
    /// Create a cell holding `value`.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            type_tag: type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Wrap a new cell in the shared handle used by output ports.
    pub(crate) fn shared<T>(value: T) -> SharedCell
    where
        T: Any + Send + Sync,
    {
        Arc::new(RwLock::new(Self::new(value)))
    }

    /// Name of the stored type.
    pub fn type_tag(&self) -> &'static str {
        self.type_tag
    }

    /// Check whether the cell stores a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// View the value as a `T`, if that is what the cell stores.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Mutable view of the value as a `T`, if that is what the cell stores.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("type_tag", &self.type_tag)
            .finish_non_exhaustive()
    }
}
