//! Sidekick client library exports.

pub mod api;
pub mod config;
pub mod error;
pub mod lookup;
pub mod persistence;
pub mod session;
pub mod stores;
