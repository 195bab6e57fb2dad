//! Sidekick Core - Wire Types
//!
//! Data types exchanged with the assistance backend, plus the small
//! helpers every other crate leans on. No I/O, no async.

pub mod object;
pub mod time;

pub use object::{keys, AssistanceObject, AssistanceParameter, AssistanceResponseObject};
pub use time::{format_timestamp, INVALID_DATE};
