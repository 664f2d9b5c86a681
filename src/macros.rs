//! Declarative macros generating the mechanical parts of events and
//! properties.

/// Defines an event type dispatchable through an
/// [`EventService`](crate::event::EventService).
///
/// Generates the struct with a hidden consumed flag, a `new` constructor
/// taking the declared fields in order, and the
/// [`Event`](crate::event::Event) impl.
///
/// ```
/// use propkit::define_event;
///
/// define_event!(
///     /// Fired when a sensor reading crosses its threshold.
///     pub struct ThresholdCrossed {
///         pub sensor: u32,
///         pub value: f64,
///     }
/// );
///
/// let event = ThresholdCrossed::new(3, 99.5);
/// assert_eq!(event.sensor, 3);
/// ```
#[macro_export]
macro_rules! define_event {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$field_meta:meta])* $field_vis:vis $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($(#[$field_meta])* $field_vis $field: $ty,)*
            consumed: bool,
        }

        impl $name {
            #[must_use]
            $vis fn new($($field: $ty),*) -> Self {
                Self {
                    $($field,)*
                    consumed: false,
                }
            }
        }

        impl $crate::event::Event for $name {
            fn is_consumed(&self) -> bool {
                self.consumed
            }

            fn consume(&mut self) {
                self.consumed = true;
            }
        }
    };
}

/// Defines a property type with both its dynamic
/// ([`Property`](crate::property::Property)) and static
/// ([`PropertySpec`](crate::property::PropertySpec)) impls.
///
/// The declared fields are the property's persistent state: they are what
/// [`copy_declared_fields`](crate::property::PropertySpec::copy_declared_fields)
/// transfers on clone and what
/// [`apply_content`](crate::property::PropertySpec::apply_content) overwrites
/// by name, so each field type must be `Clone + Default` and
/// deserializable with serde. A `requires = [..]` list turns into the
/// [`dependencies_met`](crate::property::Property::dependencies_met)
/// predicate: every listed type must already be attached to the target
/// entity.
///
/// The generated lifecycle hooks are no-ops; a type that needs custom
/// `created`/`attached`/`detached` behavior implements the two traits by
/// hand instead.
///
/// ```
/// use propkit::{define_property, Cardinality, PropertySpec};
///
/// define_property!(
///     pub struct Velocity {
///         pub dx: f64,
///         pub dy: f64,
///     },
///     name = "Velocity",
///     cardinality = Single,
/// );
///
/// let velocity = Velocity::blank();
/// assert_eq!(Velocity::NAME, "Velocity");
/// assert_eq!(velocity.dx, 0.0);
/// ```
#[macro_export]
macro_rules! define_property {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$field_meta:meta])* $field_vis:vis $field:ident : $ty:ty),* $(,)?
        },
        name = $registry_name:literal,
        cardinality = $cardinality:ident
        $(, requires = [$($dependency:ty),* $(,)?])?
        $(,)?
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($(#[$field_meta])* $field_vis $field: $ty,)*
            core: $crate::property::PropertyCore,
        }

        impl $crate::property::Property for $name {
            fn type_handle(&self) -> $crate::reflection::TypeHandle {
                $crate::reflection::TypeHandle::of::<Self>()
            }

            fn cardinality(&self) -> $crate::property::Cardinality {
                <Self as $crate::property::PropertySpec>::CARDINALITY
            }

            fn core(&self) -> &$crate::property::PropertyCore {
                &self.core
            }

            fn core_mut(&mut self) -> &mut $crate::property::PropertyCore {
                &mut self.core
            }

            fn dependencies_met(&self, entity: &$crate::entity::Entity) -> bool {
                let _ = entity;
                true $($(&& entity.has::<$dependency>())*)?
            }
        }

        impl $crate::property::PropertySpec for $name {
            const NAME: &'static str = $registry_name;
            const CARDINALITY: $crate::property::Cardinality =
                $crate::property::Cardinality::$cardinality;

            fn blank() -> Self {
                Self {
                    $($field: ::core::default::Default::default(),)*
                    core: ::core::default::Default::default(),
                }
            }

            fn copy_declared_fields(&self, target: &mut Self) {
                let _ = target;
                $(target.$field = ::core::clone::Clone::clone(&self.$field);)*
            }

            fn apply_content(
                &mut self,
                content: &$crate::factory::PropertyContent,
            ) -> ::core::result::Result<(), $crate::error::PropkitError> {
                let _ = content;
                $(
                    if let ::core::option::Option::Some(value) = content.get(stringify!($field)) {
                        self.$field = $crate::serde_json::from_value(value.clone())?;
                    }
                )*
                ::core::result::Result::Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::factory::PropertyContent;
    use crate::property::{Cardinality, Property, PropertySpec};
    use crate::reflection::TypeHandle;

    define_event!(
        struct Tick {
            count: u32,
        }
    );

    define_property!(
        struct Position {
            x: f64,
            y: f64,
        },
        name = "Position",
        cardinality = Single,
    );

    define_property!(
        struct Marker {},
        name = "Marker",
        cardinality = Multiple,
    );

    #[test]
    fn generated_event_starts_unconsumed() {
        use crate::event::Event;

        let mut tick = Tick::new(4);
        assert_eq!(tick.count, 4);
        assert!(!tick.is_consumed());
        tick.consume();
        assert!(tick.is_consumed());
    }

    #[test]
    fn generated_property_reports_its_constants() {
        let position = Position::blank();
        assert_eq!(Position::NAME, "Position");
        assert_eq!(Position::CARDINALITY, Cardinality::Single);
        assert_eq!(position.cardinality(), Cardinality::Single);
        assert_eq!(position.type_handle(), TypeHandle::of::<Position>());
        assert_eq!(Marker::CARDINALITY, Cardinality::Multiple);
    }

    #[test]
    fn blank_starts_at_defaults_and_unowned() {
        let position = Position::blank();
        assert_eq!(position.x, 0.0);
        assert_eq!(position.y, 0.0);
        assert!(position.core().owner().is_none());
        assert!(!position.core().is_active());
    }

    #[test]
    fn declared_fields_copy_between_instances() {
        let mut source = Position::blank();
        source.x = 1.5;
        source.y = -2.0;

        let mut target = Position::blank();
        source.copy_declared_fields(&mut target);
        assert_eq!(target.x, 1.5);
        assert_eq!(target.y, -2.0);
    }

    #[test]
    fn content_overwrites_named_fields_only() {
        let mut content = PropertyContent::new();
        content.set("x", 3.25).unwrap();

        let mut position = Position::blank();
        position.y = 9.0;
        position.apply_content(&content).unwrap();
        assert_eq!(position.x, 3.25);
        assert_eq!(position.y, 9.0);
    }

    #[test]
    fn content_with_a_mistyped_field_is_an_error() {
        let mut content = PropertyContent::new();
        content.set("x", "not a number").unwrap();

        let mut position = Position::blank();
        assert!(position.apply_content(&content).is_err());
    }
}
