//! Display-ready schedules: merging timetables with live estimates and
//! summarising how far a route runs off schedule.

pub mod deviation;
pub mod reconcile;

pub use deviation::{deviation_status, DeviationStatus};
pub use reconcile::{reconcile, CellTone, GridCell, GridPalette, GridRow, ScheduleGrid, ROW_SIZE};
