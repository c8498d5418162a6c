//! Ids for everything the feeds hand out.
//!
//! Routes, stops and vehicles keep the ids their source assigned. Directions
//! have no id of their own in either source, so they are scoped by route.
//! Every payload refetch re-derives the same entities, so ids are backed by
//! a shared `Arc<str>` and compare by pointer before falling back to text.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

macro_rules! transit_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl AsRef<str>) -> Self {
                Self(id.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        // Padding is honoured so ids line up in tables
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self::new(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

transit_id!(
    /// Bustime `rt` or campus route id.
    RouteIdentifier
);
transit_id!(
    /// A route's direction, see [`DirectionIdentifier::scoped`].
    DirectionIdentifier
);
transit_id!(StopIdentifier);
transit_id!(VehicleIdentifier);
transit_id!(
    /// One scheduled stop time, shared by a timetable cell and its live
    /// estimate.
    TripPointIdentifier
);
transit_id!(AlertIdentifier);
transit_id!(
    /// A place suggestion: a stop id or the rider's own location.
    PlaceIdentifier
);

impl DirectionIdentifier {
    /// `<route>:<direction>`, since two routes may both run "Inbound".
    pub fn scoped(route: &RouteIdentifier, direction: &str) -> Self {
        Self::new(format!("{}:{}", route, direction))
    }
}
