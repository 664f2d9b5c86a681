//! propkit is a runtime component-attachment framework: entities gain and
//! lose typed properties while the program runs, with pool-backed
//! allocation, dependency-checked attachment, and hierarchical typed
//! events.
//!
//! The pieces:
//!
//! * [`memory`] — fixed-capacity [`PoolAllocator`]s with deterministic
//!   lowest-index chunk reuse, the type-routing [`AllocationService`], and
//!   the owning [`Pooled`] pointer that frees through the right pool on
//!   drop.
//! * [`property`] / [`entity`] — the attachment model: [`Property`] types
//!   with fixed [`Cardinality`] and dependency predicates attach to
//!   [`Entity`] containers under a fixed protocol, including fixpoint batch
//!   admission for order-independent dependency resolution.
//! * [`event`] — the consumable, hierarchical [`EventService`]; entities
//!   fire [`PropertyAttachedEvent`]/[`PropertyDetachedEvent`] on their
//!   local service, which can escalate to a parent.
//! * [`factory`] / [`prefab`] — the [`PropertyRegistry`] of construction
//!   thunks, and prefabs that stamp property sets onto entities by
//!   prototype cloning or from content.
//!
//! Property types are defined with [`define_property!`]; event types with
//! [`define_event!`].
//!
//! # Threading
//!
//! Everything here is single-threaded by construction: the types are built
//! on `Rc`/`RefCell` and are `!Send`, so the original design's "one thread
//! only" precondition is enforced by the compiler rather than by
//! convention.
//!
//! # Example
//!
//! ```
//! use propkit::{define_property, AllocationService, Entity, Pooled, PropertySpec};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! define_property!(
//!     pub struct Position {
//!         pub x: f64,
//!         pub y: f64,
//!     },
//!     name = "Position",
//!     cardinality = Single,
//! );
//!
//! let service = Rc::new(RefCell::new(AllocationService::new()));
//! let mut entity = Entity::new();
//!
//! let mut position = Position::blank();
//! position.x = 3.0;
//! entity
//!     .add(Pooled::new(&service, position)?.into_dyn())
//!     .map_err(|e| e.to_string())?;
//!
//! assert_eq!(entity.get::<Position>().unwrap().x, 3.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod entity;
pub mod error;
pub mod event;
pub mod factory;
pub mod log;
mod macros;
pub mod memory;
pub mod prefab;
pub mod property;
pub mod reflection;

// Used by the expansion of `define_property!`.
#[doc(hidden)]
pub use serde_json;

pub use crate::log::{debug, error, info, trace, warn};
pub use entity::{AttachError, Entity, EntityId, PropertyAttachedEvent, PropertyDetachedEvent};
pub use error::PropkitError;
pub use event::{Event, EventService, ListenerId};
pub use factory::{PropertyContent, PropertyFactory, PropertyRegistry};
pub use memory::{AllocationService, PoolAllocator, Pooled, DEFAULT_POOL_CAPACITY};
pub use prefab::{ContentPrefab, Prefab, PrototypePrefab};
pub use property::{Cardinality, Property, PropertyCore, PropertyPtr, PropertySpec};
pub use reflection::{TypeHandle, TypeMap};
