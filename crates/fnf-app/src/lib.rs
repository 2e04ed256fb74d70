//! Food & Friends bot process: wiring, Discord transport and lifecycle.

pub mod bootstrap;
pub mod discord;
pub mod error;
pub mod shutdown;
