//! End-to-end construction: content prefabs, prototype snapshots, batch
//! admission and event escalation working together over one shared arena.

use std::cell::RefCell;
use std::rc::Rc;

use propkit::{
    define_property, AllocationService, ContentPrefab, Entity, EventService, ListenerId, Pooled,
    Prefab, PropertyAttachedEvent, PropertyContent, PropertyRegistry, PropertySpec,
    PrototypePrefab,
};

define_property!(
    pub struct Position {
        pub x: f64,
        pub y: f64,
    },
    name = "Position",
    cardinality = Single,
);

define_property!(
    pub struct Label {
        pub text: String,
    },
    name = "Label",
    cardinality = Multiple,
);

define_property!(
    pub struct Physics {
        pub gravity: f64,
    },
    name = "Physics",
    cardinality = Single,
    requires = [Position],
);

fn registry() -> PropertyRegistry {
    let mut registry = PropertyRegistry::new();
    registry.register::<Position>();
    registry.register::<Label>();
    registry.register::<Physics>();
    registry
}

fn service() -> Rc<RefCell<AllocationService>> {
    Rc::new(RefCell::new(AllocationService::new()))
}

#[test]
fn content_prefab_builds_a_complete_entity() {
    let registry = registry();
    let service = service();

    let mut prefab = ContentPrefab::new();
    // Physics listed before its dependency; batch admission sorts it out.
    prefab.add_entry(
        "Physics",
        PropertyContent::new().with("gravity", 9.81).unwrap(),
    );
    prefab.add_entry(
        "Position",
        PropertyContent::new()
            .with("x", 1.0)
            .unwrap()
            .with("y", 2.0)
            .unwrap(),
    );
    prefab.add_entry("Label", PropertyContent::new().with("text", "probe").unwrap());

    let mut entity = Entity::new();
    prefab.apply_to(&mut entity, &registry, &service).unwrap();

    assert_eq!(entity.property_count(), 3);
    assert_eq!(entity.get::<Position>().unwrap().x, 1.0);
    assert_eq!(entity.get::<Physics>().unwrap().gravity, 9.81);
    assert_eq!(entity.get_multiple::<Label>()[0].text, "probe");
}

#[test]
fn prototype_snapshot_reproduces_an_entity_many_times() {
    let registry = registry();
    let service = service();

    let mut template = Entity::new();
    let mut position = Position::blank();
    position.x = 5.0;
    template
        .add(Pooled::new(&service, position).unwrap().into_dyn())
        .unwrap();
    let mut physics = Physics::blank();
    physics.gravity = 1.6;
    template
        .add(Pooled::new(&service, physics).unwrap().into_dyn())
        .unwrap();

    let prefab = PrototypePrefab::from_entity(&template, &registry, &service).unwrap();

    let mut copies = Vec::new();
    for _ in 0..8 {
        let mut copy = Entity::new();
        prefab.apply_to(&mut copy, &registry, &service).unwrap();
        copies.push(copy);
    }

    for copy in &copies {
        assert_eq!(copy.get::<Position>().unwrap().x, 5.0);
        assert_eq!(copy.get::<Physics>().unwrap().gravity, 1.6);
    }

    // Identities stay distinct even though the values match.
    let mut ids: Vec<_> = copies.iter().map(Entity::id).collect();
    ids.push(template.id());
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 9);
}

#[test]
fn container_level_listeners_observe_every_construction() {
    let registry = registry();
    let service = service();

    let container_events = Rc::new(RefCell::new(EventService::new()));
    let attached = Rc::new(RefCell::new(Vec::new()));
    let attached_clone = attached.clone();
    container_events.borrow_mut().add(
        ListenerId(1),
        "on_attached",
        move |event: &mut PropertyAttachedEvent| {
            attached_clone
                .borrow_mut()
                .push((event.entity, event.type_handle));
        },
    );

    let mut prefab = ContentPrefab::new();
    prefab.add_entry("Position", PropertyContent::new());
    prefab.add_entry("Physics", PropertyContent::new());

    let mut first = Entity::new();
    first.events_mut().set_parent(&container_events);
    let mut second = Entity::new();
    second.events_mut().set_parent(&container_events);

    prefab.apply_to(&mut first, &registry, &service).unwrap();
    prefab.apply_to(&mut second, &registry, &service).unwrap();

    let attached = attached.borrow();
    assert_eq!(attached.len(), 4);
    assert!(attached.iter().filter(|(id, _)| *id == first.id()).count() == 2);
    assert!(attached.iter().filter(|(id, _)| *id == second.id()).count() == 2);
}

#[test]
fn inheritance_layers_compose_into_one_entity() {
    let registry = registry();
    let service = service();

    let mut base = ContentPrefab::new();
    base.add_entry(
        "Position",
        PropertyContent::new().with("x", 0.0).unwrap(),
    );
    base.add_entry("Label", PropertyContent::new().with("text", "base").unwrap());
    let base = Rc::new(base);

    let mut variant = ContentPrefab::new();
    variant.inherit(&base);
    variant.add_entry(
        "Position",
        PropertyContent::new().with("x", 12.0).unwrap(),
    );
    variant.add_entry(
        "Physics",
        PropertyContent::new().with("gravity", 3.7).unwrap(),
    );

    let mut entity = Entity::new();
    variant.apply_to(&mut entity, &registry, &service).unwrap();

    // One Position (reinitialized by the variant), the base Label, the
    // variant's Physics.
    assert_eq!(entity.property_count(), 3);
    assert_eq!(entity.get::<Position>().unwrap().x, 12.0);
    assert_eq!(entity.get_multiple::<Label>()[0].text, "base");
    assert_eq!(entity.get::<Physics>().unwrap().gravity, 3.7);
}

#[test]
fn chunks_freed_by_dropped_entities_are_reused() {
    let registry = registry();
    let service = service();

    let mut prefab = ContentPrefab::new();
    prefab.add_entry("Position", PropertyContent::new());

    let first_address = {
        let mut entity = Entity::new();
        prefab.apply_to(&mut entity, &registry, &service).unwrap();
        entity
            .single(propkit::TypeHandle::of::<Position>())
            .map(std::ptr::from_ref)
            .unwrap()
            .cast::<u8>() as usize
    };

    // The entity above dropped, so its chunk is the lowest free index again.
    let mut entity = Entity::new();
    prefab.apply_to(&mut entity, &registry, &service).unwrap();
    let second_address = entity
        .single(propkit::TypeHandle::of::<Position>())
        .map(std::ptr::from_ref)
        .unwrap()
        .cast::<u8>() as usize;

    assert_eq!(first_address, second_address);
}
