//! The property side of the attachment model.
//!
//! A property is a pool-allocated unit of state and behavior that can be
//! attached to an [`Entity`](crate::entity::Entity) at runtime. The dynamic
//! surface ([`Property`]) is object-safe so entities can hold heterogeneous
//! properties behind `Pooled<dyn Property>`; the static surface
//! ([`PropertySpec`]) carries the per-type constants and constructor thunks
//! the factory registry monomorphizes over. [`define_property!`]
//! (crate::define_property) generates both impls.

use std::any::Any;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use crate::entity::{Entity, EntityId};
use crate::error::PropkitError;
use crate::event::EventService;
use crate::factory::PropertyContent;
use crate::memory::Pooled;
use crate::reflection::TypeHandle;

/// How many instances of a concrete property type one entity may hold.
/// Fixed per type, never per instance.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Cardinality {
    /// At most one instance; a second attach of the same type is rejected.
    Single,
    /// Any number of instances, kept in attach order.
    Multiple,
}

/// Per-instance bookkeeping embedded in every property: the non-owning
/// back-reference to the owning entity and the attached flag. Managed by
/// [`Entity`](crate::entity::Entity) during attach and detach.
#[derive(Default, Debug)]
pub struct PropertyCore {
    owner: Option<EntityId>,
    active: bool,
}

impl PropertyCore {
    #[must_use]
    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_attached(&mut self, owner: EntityId) {
        self.owner = Some(owner);
        self.active = true;
    }

    pub(crate) fn set_detached(&mut self) {
        self.owner = None;
        self.active = false;
    }
}

/// The object-safe property surface.
///
/// `type_handle`, `cardinality` and the two core accessors are mechanical
/// and generated by [`define_property!`](crate::define_property); the
/// lifecycle hooks and the dependency predicate default to no-ops and are
/// overridden per type as needed.
pub trait Property: Any {
    /// The concrete type behind this object, as used for allocator routing,
    /// entity indexing and factory lookup.
    fn type_handle(&self) -> TypeHandle;

    fn cardinality(&self) -> Cardinality;

    fn core(&self) -> &PropertyCore;

    fn core_mut(&mut self) -> &mut PropertyCore;

    /// Attachment predicate, evaluated against the target entity before any
    /// state changes. Returning false rejects the attach.
    fn dependencies_met(&self, _entity: &Entity) -> bool {
        true
    }

    /// Called once after construction, whether blank, cloned or built from
    /// content. Runs after declared fields have their final values.
    fn created(&mut self) {}

    /// Called after this property has been attached to `owner`, with the
    /// entity's local event service available for subscriptions.
    fn attached(&mut self, _owner: EntityId, _events: &mut EventService) {}

    /// Counterpart of [`attached`](Property::attached), called after removal
    /// from `owner`.
    fn detached(&mut self, _owner: EntityId, _events: &mut EventService) {}
}

/// The static side of a property type: the constants and thunks the
/// factory registry needs to construct, clone and reinitialize instances
/// without knowing the concrete type at its call sites.
pub trait PropertySpec: Property + Sized {
    /// Stable registry name, used by content prefabs to refer to the type.
    const NAME: &'static str;

    const CARDINALITY: Cardinality;

    /// Zero-argument constructor: every declared field at its default.
    fn blank() -> Self;

    /// Copies the declared (persistent) fields of `self` into `target`,
    /// leaving runtime state alone. This is what cloning an attached
    /// property transfers.
    fn copy_declared_fields(&self, target: &mut Self);

    /// Overwrites the declared fields named in `content`, leaving unnamed
    /// fields at their current values.
    fn apply_content(&mut self, content: &PropertyContent) -> Result<(), PropkitError>;

    /// Blank instance with `content` applied. [`Property::created`] is not
    /// called here; the factory layer runs it once the instance is pooled.
    fn from_content(content: &PropertyContent) -> Result<Self, PropkitError> {
        let mut property = Self::blank();
        property.apply_content(content)?;
        Ok(property)
    }
}

/// Copyable address identity of a pooled property. Two pointers are equal
/// exactly when they refer to the same allocation; the address doubles as a
/// process-stable listener identity.
#[derive(Copy, Clone, Debug)]
pub struct PropertyPtr {
    ptr: NonNull<dyn Property>,
}

impl PropertyPtr {
    pub(crate) fn new(ptr: NonNull<dyn Property>) -> Self {
        Self { ptr }
    }

    pub(crate) fn as_ptr(&self) -> NonNull<dyn Property> {
        self.ptr
    }

    /// The allocation address, usable as a listener identity token.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as *const u8 as usize
    }
}

// Compare thin addresses only; vtable pointers for the same type may differ
// across codegen units.
impl PartialEq for PropertyPtr {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for PropertyPtr {}

impl std::hash::Hash for PropertyPtr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: Property> Pooled<T> {
    /// Erases the concrete type, keeping ownership, allocation identity and
    /// the routing handle. The eventual drop still runs `T`'s destructor and
    /// frees through `T`'s pool.
    #[must_use]
    pub fn into_dyn(self) -> Pooled<dyn Property> {
        let this = ManuallyDrop::new(self);
        let ptr: NonNull<dyn Property> = this.ptr;
        Pooled {
            ptr,
            type_handle: this.type_handle,
            // The service Rc moves into the erased pointer; ManuallyDrop
            // keeps `this` from dropping it a second time.
            service: unsafe { std::ptr::read(&this.service) },
        }
    }
}

impl Pooled<dyn Property> {
    /// Address identity of this allocation.
    #[must_use]
    pub fn ptr(&self) -> PropertyPtr {
        PropertyPtr::new(self.ptr)
    }

    #[must_use]
    pub fn downcast_ref<P: Property>(&self) -> Option<&P> {
        let any: &dyn Any = &**self;
        any.downcast_ref()
    }

    pub fn downcast_mut<P: Property>(&mut self) -> Option<&mut P> {
        let any: &mut dyn Any = &mut **self;
        any.downcast_mut()
    }
}
