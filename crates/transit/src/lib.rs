//! # ridealong-transit
//!
//! Pure transit domain logic: source adapters, schedule reconciliation and
//! route geometry. Nothing in here performs IO; payloads come in already
//! fetched and decoded, and every function is deterministic in its inputs.
//!
//! ## Example
//!
//! ```
//! use ridealong_transit::prelude::*;
//! use ridealong_transit::source::campus::{self, CampusRoute, CampusStop};
//!
//! let stops = vec![CampusStop {
//!     id: "s1".into(),
//!     name: "Central Campus".into(),
//!     lat: 42.2776,
//!     lon: -83.7382,
//! }];
//! let routes = vec![CampusRoute {
//!     id: "cn".into(),
//!     name: "Commuter North".into(),
//!     short_name: "CN".into(),
//!     color: "#00274c".into(),
//!     destination: "North Campus".into(),
//!     polyline: "_p~iF~ps|U_ulLnnqC".into(),
//!     stops: vec!["s1".into()],
//! }];
//!
//! let routes = campus::routes(&routes, &stops, &Theme::new()).unwrap();
//! assert_eq!(routes[0].directions.len(), 1);
//! assert!(routes[0].directions[0].stops[0].last_on_direction);
//! ```

pub mod identifiers;
pub mod models;
pub mod network;
pub mod schedule;
pub mod source;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::types::*;
    pub use crate::network::traits::*;
    pub use crate::schedule::{
        deviation_status, reconcile, CellTone, DeviationStatus, GridCell, GridPalette, GridRow,
        ScheduleGrid,
    };
    pub use crate::source::Theme;
}

pub use prelude::*;
