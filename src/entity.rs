//! Entities: runtime containers that properties attach to and detach from.
//!
//! An [`Entity`] owns its attached properties (as `Pooled<dyn Property>`,
//! so teardown routes every destructor through the right pool) and keeps two
//! lookup indexes over them, one for single-cardinality types and one for
//! multiple-cardinality types. Attachment is a fixed protocol: dependency
//! predicate, cardinality routing, indexing, the `attached` hook, then a
//! [`PropertyAttachedEvent`] on the entity's local event service. Rejection
//! hands the property back untouched inside [`AttachError`].

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::define_event;
use crate::error::PropkitError;
use crate::event::{EventService, ListenerId};
use crate::log::warn;
use crate::memory::Pooled;
use crate::property::{Cardinality, Property, PropertyPtr};
use crate::reflection::{TypeHandle, TypeMap};

/// Process-unique entity identity. Stable for the entity's lifetime and
/// never reused within a process.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        EntityId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl From<EntityId> for ListenerId {
    fn from(id: EntityId) -> Self {
        ListenerId(id.raw())
    }
}

define_event!(
    /// Fired on an entity's local event service after a property has been
    /// attached (and its `attached` hook has run).
    pub struct PropertyAttachedEvent {
        pub entity: EntityId,
        pub property: PropertyPtr,
        pub type_handle: TypeHandle,
    }
);

define_event!(
    /// Counterpart of [`PropertyAttachedEvent`], fired after a successful
    /// detach. Never fired for removals that did not happen.
    pub struct PropertyDetachedEvent {
        pub entity: EntityId,
        pub property: PropertyPtr,
        pub type_handle: TypeHandle,
    }
);

/// A rejected attach. The property comes back with no state changed, so the
/// caller can retry, re-route or drop it.
#[derive(Debug)]
pub enum AttachError {
    /// The property's dependency predicate did not hold on the target.
    UnmetDependency(Pooled<dyn Property>),
    /// The entity already holds an instance of this single-cardinality type.
    DuplicateSingle(Pooled<dyn Property>),
}

impl AttachError {
    /// Recovers ownership of the rejected property.
    #[must_use]
    pub fn into_property(self) -> Pooled<dyn Property> {
        match self {
            AttachError::UnmetDependency(property) | AttachError::DuplicateSingle(property) => {
                property
            }
        }
    }

    #[must_use]
    pub fn type_handle(&self) -> TypeHandle {
        match self {
            AttachError::UnmetDependency(property) | AttachError::DuplicateSingle(property) => {
                property.type_handle()
            }
        }
    }
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AttachError::UnmetDependency(property) => write!(
                f,
                "dependencies of property {} are not met",
                property.type_handle().name()
            ),
            AttachError::DuplicateSingle(property) => write!(
                f,
                "an instance of single property {} is already attached",
                property.type_handle().name()
            ),
        }
    }
}

impl std::error::Error for AttachError {}

/// A runtime container of pooled properties.
pub struct Entity {
    id: EntityId,
    /// Flat ownership in attach order. Every pointer in the two indexes
    /// refers into an allocation owned by an element of this vec.
    properties: Vec<Pooled<dyn Property>>,
    single: TypeMap<PropertyPtr>,
    multiple: TypeMap<Vec<PropertyPtr>>,
    events: EventService,
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity {
    #[must_use]
    pub fn new() -> Self {
        Entity {
            id: EntityId::next(),
            properties: Vec::new(),
            single: TypeMap::new(),
            multiple: TypeMap::new(),
            events: EventService::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The entity-local event service. Attach/detach events fire here;
    /// parent it to a container-level service to escalate them.
    #[must_use]
    pub fn events(&self) -> &EventService {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventService {
        &mut self.events
    }

    /// Attaches `property`, running the full protocol: dependency predicate,
    /// cardinality routing, index insertion, owner bookkeeping, the
    /// `attached` hook, then [`PropertyAttachedEvent`] on the local event
    /// service. On rejection nothing changes and the property is handed
    /// back inside the error.
    pub fn add(&mut self, mut property: Pooled<dyn Property>) -> Result<PropertyPtr, AttachError> {
        if !property.dependencies_met(self) {
            return Err(AttachError::UnmetDependency(property));
        }

        let handle = property.type_handle();
        let ptr = property.ptr();
        match property.cardinality() {
            Cardinality::Single => {
                if self.single.contains_key(&handle) {
                    return Err(AttachError::DuplicateSingle(property));
                }
                self.single.insert(handle, ptr);
            }
            Cardinality::Multiple => {
                self.multiple.entry(handle).or_default().push(ptr);
            }
        }

        let owner = self.id;
        property.core_mut().set_attached(owner);
        // The hook runs before the property joins the flat vec, so it can
        // take the event service mutably without aliasing the entity.
        property.attached(owner, &mut self.events);
        self.properties.push(property);

        let mut event = PropertyAttachedEvent::new(owner, ptr, handle);
        self.events.fire(&mut event);
        Ok(ptr)
    }

    /// Detaches the property identified by `ptr` and returns ownership of
    /// it. A pointer that is not attached here is a no-op returning `None`;
    /// no hook runs and no event fires.
    pub fn remove(&mut self, ptr: PropertyPtr) -> Option<Pooled<dyn Property>> {
        let position = self
            .properties
            .iter()
            .position(|candidate| candidate.ptr() == ptr)?;

        let handle = self.properties[position].type_handle();
        match self.properties[position].cardinality() {
            Cardinality::Single => {
                self.single.remove(&handle);
            }
            Cardinality::Multiple => {
                if let Some(list) = self.multiple.get_mut(&handle) {
                    list.retain(|candidate| *candidate != ptr);
                    if list.is_empty() {
                        self.multiple.remove(&handle);
                    }
                }
            }
        }

        let mut property = self.properties.remove(position);
        let owner = self.id;
        property.core_mut().set_detached();
        property.detached(owner, &mut self.events);

        let mut event = PropertyDetachedEvent::new(owner, ptr, handle);
        self.events.fire(&mut event);
        Some(property)
    }

    /// Admits a batch through an iterative fixpoint: repeatedly attach any
    /// pending property whose dependencies currently hold, so intra-batch
    /// dependencies resolve in any input order. A full pass with no progress
    /// while properties remain pending is an [`UnmetDependencies`]
    /// (PropkitError::UnmetDependencies) error naming the stragglers.
    ///
    /// A cardinality rejection mid-batch is logged and the rejected instance
    /// discarded; admission continues with the rest.
    pub fn add_all(
        &mut self,
        mut pending: Vec<Pooled<dyn Property>>,
    ) -> Result<Vec<PropertyPtr>, PropkitError> {
        let mut added = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let Some(at) = pending
                .iter()
                .position(|property| property.dependencies_met(self))
            else {
                let stalled = pending
                    .iter()
                    .map(|property| property.type_handle().name().to_string())
                    .collect();
                return Err(PropkitError::UnmetDependencies(stalled));
            };

            match self.add(pending.remove(at)) {
                Ok(ptr) => added.push(ptr),
                Err(rejected) => {
                    warn!(
                        "entity {:?}: discarding property during batch admission: {}",
                        self.id, rejected
                    );
                }
            }
        }
        Ok(added)
    }

    /// Whether an instance of `P` is attached, regardless of cardinality.
    #[must_use]
    pub fn has<P: Property>(&self) -> bool {
        let handle = TypeHandle::of::<P>();
        self.single.contains_key(&handle) || self.multiple.contains_key(&handle)
    }

    /// Erased-form membership check against one of the two indexes.
    #[must_use]
    pub fn has_handle(&self, handle: TypeHandle, multiple: bool) -> bool {
        if multiple {
            self.multiple.contains_key(&handle)
        } else {
            self.single.contains_key(&handle)
        }
    }

    /// The attached instance of single-cardinality type `P`.
    #[must_use]
    pub fn get<P: Property>(&self) -> Option<&P> {
        let ptr = *self.single.get(&TypeHandle::of::<P>())?;
        let any: &dyn Any = self.resolve(ptr);
        any.downcast_ref()
    }

    pub fn get_mut<P: Property>(&mut self) -> Option<&mut P> {
        let ptr = *self.single.get(&TypeHandle::of::<P>())?;
        let any: &mut dyn Any = self.resolve_mut(ptr);
        any.downcast_mut()
    }

    /// Every attached instance of multiple-cardinality type `P`, in attach
    /// order. Empty when none are attached, never an absence sentinel.
    #[must_use]
    pub fn get_multiple<P: Property>(&self) -> Vec<&P> {
        let Some(list) = self.multiple.get(&TypeHandle::of::<P>()) else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|ptr| {
                let any: &dyn Any = self.resolve(*ptr);
                any.downcast_ref()
            })
            .collect()
    }

    /// Erased single lookup.
    #[must_use]
    pub fn single(&self, handle: TypeHandle) -> Option<&dyn Property> {
        self.single.get(&handle).map(|ptr| self.resolve(*ptr))
    }

    /// Erased multiple lookup, in attach order.
    #[must_use]
    pub fn multiple(&self, handle: TypeHandle) -> Vec<&dyn Property> {
        let Some(list) = self.multiple.get(&handle) else {
            return Vec::new();
        };
        list.iter().map(|ptr| self.resolve(*ptr)).collect()
    }

    /// Any attached instance of the type behind `handle`: the single
    /// instance, or the first-attached multiple instance.
    #[must_use]
    pub fn get_by_handle(&self, handle: TypeHandle) -> Option<&dyn Property> {
        if let Some(ptr) = self.single.get(&handle) {
            return Some(self.resolve(*ptr));
        }
        self.multiple
            .get(&handle)
            .and_then(|list| list.first())
            .map(|ptr| self.resolve(*ptr))
    }

    /// All attached properties in attach order.
    pub fn properties(&self) -> impl Iterator<Item = &dyn Property> {
        self.properties.iter().map(|property| &**property)
    }

    pub fn properties_mut(&mut self) -> impl Iterator<Item = &mut dyn Property> {
        self.properties.iter_mut().map(|property| &mut **property)
    }

    #[must_use]
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    fn resolve(&self, ptr: PropertyPtr) -> &dyn Property {
        // Index pointers always refer into allocations owned by
        // `self.properties`; the `&self` borrow keeps them alive and
        // unaliased for the returned lifetime.
        unsafe { ptr.as_ptr().as_ref() }
    }

    fn resolve_mut(&mut self, ptr: PropertyPtr) -> &mut dyn Property {
        let mut raw = ptr.as_ptr();
        unsafe { raw.as_mut() }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}
