//! Prefabs: reusable recipes that stock an entity with properties.
//!
//! Two flavors. A [`PrototypePrefab`] holds live property instances and
//! stamps clones of them onto targets. A [`ContentPrefab`] holds
//! `(type name, content)` entries plus parent prefabs and constructs through
//! the registry. Both admit their output through
//! [`Entity::add_all`](crate::entity::Entity::add_all), so prefab
//! application honors the same dependency and cardinality protocol as
//! direct attachment.

use std::cell::RefCell;
use std::rc::Rc;

use crate::entity::Entity;
use crate::error::PropkitError;
use crate::factory::{PropertyContent, PropertyRegistry};
use crate::memory::{AllocationService, Pooled};
use crate::property::{Cardinality, Property};

type Service = Rc<RefCell<AllocationService>>;

/// A recipe applicable to any entity, any number of times.
pub trait Prefab {
    fn apply_to(
        &self,
        entity: &mut Entity,
        registry: &PropertyRegistry,
        service: &Service,
    ) -> Result<(), PropkitError>;
}

/// A prefab backed by live prototype instances. Application clones every
/// prototype (declared fields only; runtime state starts fresh) and batch-
/// admits the clones.
pub struct PrototypePrefab {
    prototypes: Vec<Pooled<dyn Property>>,
}

impl PrototypePrefab {
    #[must_use]
    pub fn new(prototypes: Vec<Pooled<dyn Property>>) -> Self {
        Self { prototypes }
    }

    /// Snapshots `entity` by cloning every attached property, in attach
    /// order. Every attached type must be registered.
    pub fn from_entity(
        entity: &Entity,
        registry: &PropertyRegistry,
        service: &Service,
    ) -> Result<Self, PropkitError> {
        let mut prototypes = Vec::with_capacity(entity.property_count());
        for property in entity.properties() {
            prototypes.push(registry.clone_property(property, service)?);
        }
        Ok(Self { prototypes })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }
}

impl Prefab for PrototypePrefab {
    fn apply_to(
        &self,
        entity: &mut Entity,
        registry: &PropertyRegistry,
        service: &Service,
    ) -> Result<(), PropkitError> {
        let mut clones = Vec::with_capacity(self.prototypes.len());
        for prototype in &self.prototypes {
            clones.push(registry.clone_property(&**prototype, service)?);
        }
        entity.add_all(clones)?;
        Ok(())
    }
}

/// A prefab described as data: ordered `(type name, content)` entries plus
/// inherited parent prefabs.
///
/// Parents apply first, in the order they were added; the local entries
/// then override. An entry whose type the target already holds
/// reinitializes the existing instances in place instead of constructing
/// new ones; everything else is constructed from content and batch-admitted.
#[derive(Default)]
pub struct ContentPrefab {
    inherits: Vec<Rc<ContentPrefab>>,
    entries: Vec<(String, PropertyContent)>,
}

impl ContentPrefab {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inherit(&mut self, parent: &Rc<ContentPrefab>) {
        self.inherits.push(Rc::clone(parent));
    }

    pub fn add_entry(&mut self, name: impl Into<String>, content: PropertyContent) {
        self.entries.push((name.into(), content));
    }
}

impl Prefab for ContentPrefab {
    fn apply_to(
        &self,
        entity: &mut Entity,
        registry: &PropertyRegistry,
        service: &Service,
    ) -> Result<(), PropkitError> {
        for parent in &self.inherits {
            parent.apply_to(entity, registry, service)?;
        }

        let mut fresh = Vec::new();
        for (name, content) in &self.entries {
            let factory = registry.factory_for_name(name)?;
            let handle = factory.type_handle();
            let multiple = factory.cardinality() == Cardinality::Multiple;
            if entity.has_handle(handle, multiple) {
                for property in entity.properties_mut() {
                    if property.type_handle() == handle {
                        factory.reinit(property, content)?;
                    }
                }
            } else {
                fresh.push(factory.create_from_content(content, service)?);
            }
        }
        entity.add_all(fresh)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_property;
    use crate::property::PropertySpec;

    define_property!(
        struct Position {
            x: f64,
            y: f64,
        },
        name = "Position",
        cardinality = Single,
    );

    define_property!(
        struct Physics {
            gravity: f64,
        },
        name = "Physics",
        cardinality = Single,
        requires = [Position],
    );

    define_property!(
        struct Label {
            text: String,
        },
        name = "Label",
        cardinality = Multiple,
    );

    fn registry() -> PropertyRegistry {
        let mut registry = PropertyRegistry::new();
        registry.register::<Position>();
        registry.register::<Physics>();
        registry.register::<Label>();
        registry
    }

    fn service() -> Service {
        Rc::new(RefCell::new(AllocationService::new()))
    }

    fn pooled<P: PropertySpec>(service: &Service, property: P) -> Pooled<dyn Property> {
        Pooled::new(service, property).unwrap().into_dyn()
    }

    #[test]
    fn prototype_prefab_clones_an_entity() {
        let registry = registry();
        let service = service();

        let mut template = Entity::new();
        let mut position = Position::blank();
        position.x = 4.0;
        template.add(pooled(&service, position)).unwrap();
        let mut physics = Physics::blank();
        physics.gravity = 9.81;
        template.add(pooled(&service, physics)).unwrap();

        let prefab = PrototypePrefab::from_entity(&template, &registry, &service).unwrap();
        assert_eq!(prefab.len(), 2);

        let mut copy = Entity::new();
        prefab.apply_to(&mut copy, &registry, &service).unwrap();
        assert_eq!(copy.get::<Position>().unwrap().x, 4.0);
        assert_eq!(copy.get::<Physics>().unwrap().gravity, 9.81);
        assert_eq!(copy.get::<Physics>().unwrap().core().owner(), Some(copy.id()));

        // The template keeps its own instances.
        assert_eq!(template.property_count(), 2);
    }

    #[test]
    fn prototype_order_does_not_matter_for_dependencies() {
        let registry = registry();
        let service = service();

        // Physics first, its dependency second.
        let prefab = PrototypePrefab::new(vec![
            pooled(&service, Physics::blank()),
            pooled(&service, Position::blank()),
        ]);

        let mut entity = Entity::new();
        prefab.apply_to(&mut entity, &registry, &service).unwrap();
        assert!(entity.has::<Physics>());
        assert!(entity.has::<Position>());
    }

    #[test]
    fn prototype_prefab_with_unregistered_type_fails_to_snapshot() {
        let service = service();
        let mut template = Entity::new();
        template.add(pooled(&service, Position::blank())).unwrap();

        let empty = PropertyRegistry::new();
        assert!(PrototypePrefab::from_entity(&template, &empty, &service).is_err());
    }

    #[test]
    fn content_prefab_constructs_entries() {
        let registry = registry();
        let service = service();

        let mut prefab = ContentPrefab::new();
        prefab.add_entry(
            "Position",
            PropertyContent::new().with("x", 7.0).unwrap(),
        );
        prefab.add_entry(
            "Label",
            PropertyContent::new().with("text", "tagged").unwrap(),
        );

        let mut entity = Entity::new();
        prefab.apply_to(&mut entity, &registry, &service).unwrap();
        assert_eq!(entity.get::<Position>().unwrap().x, 7.0);
        assert_eq!(entity.get_multiple::<Label>()[0].text, "tagged");
    }

    #[test]
    fn content_prefab_reinitializes_existing_instances() {
        let registry = registry();
        let service = service();

        let mut entity = Entity::new();
        let mut position = Position::blank();
        position.x = 1.0;
        position.y = 2.0;
        entity.add(pooled(&service, position)).unwrap();

        let mut prefab = ContentPrefab::new();
        prefab.add_entry("Position", PropertyContent::new().with("x", 10.0).unwrap());
        prefab.apply_to(&mut entity, &registry, &service).unwrap();

        // Still one instance, patched in place.
        assert_eq!(entity.property_count(), 1);
        let position = entity.get::<Position>().unwrap();
        assert_eq!(position.x, 10.0);
        assert_eq!(position.y, 2.0);
    }

    #[test]
    fn inherited_prefabs_apply_first() {
        let registry = registry();
        let service = service();

        let mut base = ContentPrefab::new();
        base.add_entry("Position", PropertyContent::new().with("x", 1.0).unwrap());
        let base = Rc::new(base);

        // The child both overrides the parent's entry and adds its own.
        let mut child = ContentPrefab::new();
        child.inherit(&base);
        child.add_entry("Position", PropertyContent::new().with("x", 2.0).unwrap());
        child.add_entry("Physics", PropertyContent::new().with("gravity", 1.6).unwrap());

        let mut entity = Entity::new();
        child.apply_to(&mut entity, &registry, &service).unwrap();
        assert_eq!(entity.get::<Position>().unwrap().x, 2.0);
        assert_eq!(entity.get::<Physics>().unwrap().gravity, 1.6);
    }

    #[test]
    fn content_prefab_with_unknown_name_is_an_error() {
        let registry = registry();
        let service = service();

        let mut prefab = ContentPrefab::new();
        prefab.add_entry("Nonexistent", PropertyContent::new());

        let mut entity = Entity::new();
        assert!(matches!(
            prefab.apply_to(&mut entity, &registry, &service),
            Err(PropkitError::UnregisteredProperty(_))
        ));
    }
}
