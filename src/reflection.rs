//! Process-stable type identification for type-indexed storage.
//!
//! A [`TypeHandle`] names a property or event type at runtime. Two handles
//! compare equal iff they denote the same Rust type, and a handle is stable
//! for the lifetime of the process, so it can serve as a map key everywhere
//! the framework routes by type: allocator registries, entity indexes,
//! listener tables and factory lookup.

use std::any::{type_name, TypeId};
use std::collections::BTreeMap;
use std::fmt;

/// A totally ordered, process-stable identifier for a type.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeHandle {
    id: TypeId,
    name: &'static str,
}

impl TypeHandle {
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        TypeHandle {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The full Rust path of the type this handle denotes. Diagnostic only;
    /// identity comparisons go through the `TypeId`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TypeHandle({})", self.name)
    }
}

/// An ordered map keyed by type. Iteration order is deterministic, which
/// keeps pool creation and entity index scans reproducible.
pub type TypeMap<V> = BTreeMap<TypeHandle, V>;

#[cfg(test)]
mod tests {
    use super::{TypeHandle, TypeMap};

    struct Alpha;
    struct Beta;

    #[test]
    fn handles_are_stable_and_distinct() {
        assert_eq!(TypeHandle::of::<Alpha>(), TypeHandle::of::<Alpha>());
        assert_ne!(TypeHandle::of::<Alpha>(), TypeHandle::of::<Beta>());
    }

    #[test]
    fn usable_as_map_key() {
        let mut map: TypeMap<u32> = TypeMap::new();
        map.insert(TypeHandle::of::<Alpha>(), 1);
        map.insert(TypeHandle::of::<Beta>(), 2);
        assert_eq!(map.get(&TypeHandle::of::<Alpha>()), Some(&1));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn debug_prints_the_type_name() {
        let handle = TypeHandle::of::<Alpha>();
        assert!(format!("{handle:?}").contains("Alpha"));
    }
}
