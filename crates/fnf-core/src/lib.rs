//! Shared configuration, error and identifier types for the Food & Friends bot.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
