//! Scheduling engine: resolves which schedule posts next, keeps one timer armed
//! for it and turns a firing into a posted event.

pub mod clock;
pub mod error;
pub mod event;
pub mod resolver;
pub mod schedule;
pub mod task;
pub mod timer;
