//! Calendar arithmetic for recurring Food & Friends schedules.
//!
//! Everything in this crate is pure: given the same recurrence and reference
//! instant it always produces the same answer. Wall-clock times are interpreted
//! in the schedule's IANA timezone and converted to UTC at the edges.

pub mod error;
pub mod occurrence;
pub mod post;
pub mod recurrence;
pub mod wall_time;
pub mod zone;

pub use error::{TimeError, TimeResult};
pub use occurrence::{next_occurrence, occurrences};
pub use post::post_time_for;
pub use recurrence::{Cadence, EventRecurrence, PostRule, parse_weekday};
pub use wall_time::WallTime;
pub use zone::{localize, resolve_timezone};
