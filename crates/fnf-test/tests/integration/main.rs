//! End-to-end behaviour of the scheduling engine on a manual clock.

mod firing;
mod occurrence;
mod rearm;
mod resolver;
