//! Typed publish/subscribe with deterministic ordering, consumption
//! short-circuiting and hierarchical escalation.
//!
//! An [`EventService`] keeps, per event type, an ordered list of listener
//! bindings. Firing an event invokes the bindings in registration order,
//! stopping as soon as a listener consumes the event; unconsumed events are
//! forwarded to the parent service, recursively. Services form an explicit
//! non-owning tree (entity-local services rooted at a container-level
//! service), so container-level listeners can observe or override
//! property-level events.
//!
//! Listener bindings are identified by a `(callee, method)` pair: the
//! [`ListenerId`] of the subscribing party plus a method name. The pair is
//! what makes deduplication and removal possible; the handler itself is an
//! arbitrary `FnMut` closure and carries the listener's state in its
//! captures.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::log::warn;
use crate::reflection::{TypeHandle, TypeMap};

/// A value dispatched through an [`EventService`].
///
/// Events carry a consumed flag: once consumed, no further listener in the
/// current or any ancestor service receives the event for this fire. Use
/// [`define_event!`](crate::define_event) to generate the boilerplate.
pub trait Event: Any {
    fn is_consumed(&self) -> bool;
    fn consume(&mut self);
}

/// Identity of a subscribing party. Any process-stable token works: an
/// [`EntityId`](crate::entity::EntityId) raw value, a property address, or a
/// constant picked by the subscriber.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(pub u64);

/// One listener binding: callee identity, method identity, dispatch closure.
struct Delegate<E: Event> {
    callee: ListenerId,
    method: &'static str,
    handler: Box<dyn FnMut(&mut E)>,
}

/// A hierarchical, typed event dispatcher.
#[derive(Default)]
pub struct EventService {
    parent: Option<Weak<RefCell<EventService>>>,
    // Values are `Vec<Delegate<E>>` boxed behind the event type's handle.
    listeners: TypeMap<Box<dyn Any>>,
}

impl EventService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegates unconsumed events to `parent`. The link is non-owning; a
    /// dropped parent simply stops receiving.
    pub fn set_parent(&mut self, parent: &Rc<RefCell<EventService>>) {
        self.parent = Some(Rc::downgrade(parent));
    }

    pub fn clear_parent(&mut self) {
        self.parent = None;
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<RefCell<EventService>>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Registers a binding for events of type `E`, appended in registration
    /// order. A binding with the same `(callee, method)` pair as an existing
    /// one is not re-added; the call returns false and the original binding
    /// keeps its position.
    pub fn add<E: Event>(
        &mut self,
        callee: ListenerId,
        method: &'static str,
        handler: impl FnMut(&mut E) + 'static,
    ) -> bool {
        let list = self
            .listeners
            .entry(TypeHandle::of::<E>())
            .or_insert_with(|| Box::new(Vec::<Delegate<E>>::new()))
            .downcast_mut::<Vec<Delegate<E>>>()
            .expect("listener list stored under a different event type");

        if list
            .iter()
            .any(|delegate| delegate.callee == callee && delegate.method == method)
        {
            return false;
        }

        list.push(Delegate {
            callee,
            method,
            handler: Box::new(handler),
        });
        true
    }

    /// Removes the binding matching `(callee, method)` for events of type
    /// `E`. Returns whether a binding was removed.
    pub fn remove<E: Event>(&mut self, callee: ListenerId, method: &'static str) -> bool {
        let Some(list) = self.listeners.get_mut(&TypeHandle::of::<E>()) else {
            return false;
        };
        let list = list
            .downcast_mut::<Vec<Delegate<E>>>()
            .expect("listener list stored under a different event type");

        let position = list
            .iter()
            .position(|delegate| delegate.callee == callee && delegate.method == method);
        match position {
            Some(at) => {
                list.remove(at);
                true
            }
            None => false,
        }
    }

    /// Dispatches `event` to every binding registered for its exact type, in
    /// registration order, checking the consumed flag after each invocation
    /// and stopping immediately once set. An event that completes the local
    /// sequence unconsumed is forwarded to the parent service, recursively;
    /// a consumed event never reaches the parent chain.
    ///
    /// The event is passed by `&mut`: mutations made by one listener are
    /// visible to subsequent listeners and to ancestors.
    ///
    /// Escalation needs exclusive access to the parent. When the parent is
    /// already mid-dispatch (a handler running on the parent fired an event
    /// that escalates back into it), that escalation is logged and dropped
    /// rather than panicking; the local dispatch still completes.
    pub fn fire<E: Event>(&mut self, event: &mut E) {
        if event.is_consumed() {
            return;
        }

        if let Some(list) = self.listeners.get_mut(&TypeHandle::of::<E>()) {
            let list = list
                .downcast_mut::<Vec<Delegate<E>>>()
                .expect("listener list stored under a different event type");
            for delegate in list.iter_mut() {
                (delegate.handler)(event);
                if event.is_consumed() {
                    return;
                }
            }
        }

        if let Some(parent) = self.parent() {
            match parent.try_borrow_mut() {
                Ok(mut parent) => parent.fire(event),
                Err(_) => warn!(
                    "dropping escalation of {}: parent service is mid-dispatch",
                    std::any::type_name::<E>()
                ),
            }
        }
    }
}
