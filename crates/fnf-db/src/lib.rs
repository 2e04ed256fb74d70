//! Schedule and event records plus the storage interfaces the scheduler reads through.

pub mod error;
pub mod model;
pub mod store;
