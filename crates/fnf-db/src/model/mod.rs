pub mod event;
pub mod schedule;

pub use event::Event;
pub use schedule::{ActiveEventRef, Schedule};
