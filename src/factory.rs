//! Construction and cloning of properties by name or type.
//!
//! A [`PropertyRegistry`] maps registered property types to
//! [`PropertyFactory`] entries holding monomorphized construction thunks, so
//! prefabs and callers holding only a type name or a `&dyn Property` can
//! build new instances. Content-driven construction goes through
//! [`PropertyContent`], a field-name to JSON-value map applied via each
//! type's [`apply_content`](crate::property::PropertySpec::apply_content).

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::PropkitError;
use crate::log::warn;
use crate::memory::{AllocationService, Pooled};
use crate::property::{Cardinality, Property, PropertySpec};
use crate::reflection::{TypeHandle, TypeMap};

type Service = Rc<RefCell<AllocationService>>;

/// Declared-field values for content-driven construction, keyed by field
/// name. Fields absent from the content keep their blank defaults.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct PropertyContent {
    values: serde_json::Map<String, serde_json::Value>,
}

impl PropertyContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON object as content. Anything but an object is an error.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PropkitError> {
        match value {
            serde_json::Value::Object(values) => Ok(Self { values }),
            other => Err(PropkitError::from(format!(
                "property content must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn set(
        &mut self,
        field: impl Into<String>,
        value: impl Serialize,
    ) -> Result<(), PropkitError> {
        self.values.insert(field.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Builder form of [`set`](PropertyContent::set).
    pub fn with(mut self, field: impl Into<String>, value: impl Serialize) -> Result<Self, PropkitError> {
        self.set(field, value)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.values.get(field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// Monomorphized per property type; the factory stores these as plain fn
// pointers so the registry itself stays type-erased.
mod thunks {
    use super::*;

    pub(super) fn create_blank<P: PropertySpec>(
        service: &Service,
    ) -> Result<Pooled<dyn Property>, PropkitError> {
        let mut pooled = Pooled::new(service, P::blank())?;
        pooled.created();
        Ok(pooled.into_dyn())
    }

    pub(super) fn create_from_content<P: PropertySpec>(
        content: &PropertyContent,
        service: &Service,
    ) -> Result<Pooled<dyn Property>, PropkitError> {
        let mut pooled = Pooled::new(service, P::from_content(content)?)?;
        pooled.created();
        Ok(pooled.into_dyn())
    }

    pub(super) fn clone_from<P: PropertySpec>(
        source: &dyn Property,
        service: &Service,
    ) -> Result<Pooled<dyn Property>, PropkitError> {
        let source: &P = (source as &dyn Any).downcast_ref().ok_or_else(|| {
            PropkitError::from(format!("clone source is not an instance of {}", P::NAME))
        })?;
        let mut pooled = Pooled::new(service, P::blank())?;
        source.copy_declared_fields(&mut pooled);
        pooled.created();
        Ok(pooled.into_dyn())
    }

    pub(super) fn reinit<P: PropertySpec>(
        target: &mut dyn Property,
        content: &PropertyContent,
    ) -> Result<(), PropkitError> {
        let target: &mut P = (target as &mut dyn Any).downcast_mut().ok_or_else(|| {
            PropkitError::from(format!("reinit target is not an instance of {}", P::NAME))
        })?;
        target.apply_content(content)
    }
}

/// Everything the registry knows about one property type: identity,
/// cardinality and the construction thunks.
pub struct PropertyFactory {
    handle: TypeHandle,
    name: &'static str,
    cardinality: Cardinality,
    create_blank: fn(&Service) -> Result<Pooled<dyn Property>, PropkitError>,
    create_from_content: fn(&PropertyContent, &Service) -> Result<Pooled<dyn Property>, PropkitError>,
    clone_from: fn(&dyn Property, &Service) -> Result<Pooled<dyn Property>, PropkitError>,
    reinit: fn(&mut dyn Property, &PropertyContent) -> Result<(), PropkitError>,
}

impl PropertyFactory {
    fn of<P: PropertySpec>() -> Self {
        PropertyFactory {
            handle: TypeHandle::of::<P>(),
            name: P::NAME,
            cardinality: P::CARDINALITY,
            create_blank: thunks::create_blank::<P>,
            create_from_content: thunks::create_from_content::<P>,
            clone_from: thunks::clone_from::<P>,
            reinit: thunks::reinit::<P>,
        }
    }

    #[must_use]
    pub fn type_handle(&self) -> TypeHandle {
        self.handle
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Blank instance, pooled, with `created` already run.
    pub fn create_blank(&self, service: &Service) -> Result<Pooled<dyn Property>, PropkitError> {
        (self.create_blank)(service)
    }

    /// Blank instance with `content` applied, pooled, `created` run last.
    pub fn create_from_content(
        &self,
        content: &PropertyContent,
        service: &Service,
    ) -> Result<Pooled<dyn Property>, PropkitError> {
        (self.create_from_content)(content, service)
    }

    /// New instance carrying `source`'s declared fields. `created` runs on
    /// the clone after the fields are copied; runtime state starts fresh.
    pub fn clone_from(
        &self,
        source: &dyn Property,
        service: &Service,
    ) -> Result<Pooled<dyn Property>, PropkitError> {
        (self.clone_from)(source, service)
    }

    /// Reapplies `content` to an already-constructed instance, leaving
    /// fields the content does not name untouched. `created` does not run
    /// again.
    pub fn reinit(
        &self,
        target: &mut dyn Property,
        content: &PropertyContent,
    ) -> Result<(), PropkitError> {
        (self.reinit)(target, content)
    }
}

/// Registry of constructible property types, looked up by registry name or
/// by type handle. Lookups of unregistered types are hard errors.
#[derive(Default)]
pub struct PropertyRegistry {
    by_type: TypeMap<PropertyFactory>,
    by_name: FxHashMap<&'static str, TypeHandle>,
}

impl PropertyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: PropertySpec>(&mut self) {
        let factory = PropertyFactory::of::<P>();
        if let Some(previous) = self.by_name.insert(P::NAME, factory.handle) {
            if previous != factory.handle {
                warn!(
                    "property name {:?} re-registered for a different type",
                    P::NAME
                );
            }
        }
        self.by_type.insert(factory.handle, factory);
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn factory_for_type(&self, handle: TypeHandle) -> Result<&PropertyFactory, PropkitError> {
        self.by_type
            .get(&handle)
            .ok_or_else(|| PropkitError::UnregisteredProperty(handle.name().to_string()))
    }

    pub fn factory_for_name(&self, name: &str) -> Result<&PropertyFactory, PropkitError> {
        let handle = self
            .by_name
            .get(name)
            .ok_or_else(|| PropkitError::UnregisteredProperty(name.to_string()))?;
        self.factory_for_type(*handle)
    }

    /// Clones an erased property through its type's factory.
    pub fn clone_property(
        &self,
        source: &dyn Property,
        service: &Service,
    ) -> Result<Pooled<dyn Property>, PropkitError> {
        self.factory_for_type(source.type_handle())?
            .clone_from(source, service)
    }

    pub fn create(&self, name: &str, service: &Service) -> Result<Pooled<dyn Property>, PropkitError> {
        self.factory_for_name(name)?.create_blank(service)
    }

    pub fn create_from_content(
        &self,
        name: &str,
        content: &PropertyContent,
        service: &Service,
    ) -> Result<Pooled<dyn Property>, PropkitError> {
        self.factory_for_name(name)?
            .create_from_content(content, service)
    }
}
