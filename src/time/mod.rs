//! Calendars, time coordinates and calendar-derived weights
//!
//! - [`calendar`]: CF calendars and date arithmetic
//! - [`coordinate`]: decoding CF time offsets into calendar dates
//! - [`weights`]: the calendar weight provider (days per timestep)

pub mod calendar;
pub mod coordinate;
pub mod weights;

pub use calendar::{Calendar, CalendarDate};
pub use coordinate::{TimeCoordinate, TimeUnit, TimeUnits};
pub use weights::{calendar_weights, CellBounds, DaysInMonth, WeightProvider, WeightSeries};
