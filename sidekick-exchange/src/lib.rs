//! Sidekick Exchange - Message Reconciliation Engine
//!
//! Ingests the inbound assistance-object stream into deduplicated,
//! classified client state and projects feature-enablement flags from
//! the operation log. Purely synchronous: network lookups are requested
//! through returned [`exchange::LookupRequest`]s and completed through
//! explicit hooks, never performed here.

pub mod exchange;
pub mod features;

pub use exchange::{
    ExchangeOptions, ExchangeUpdate, IngestContext, LookupOutcome, LookupRequest, MessageExchange,
    StateChange,
};
pub use features::{last_operation_state, Feature, FeatureFlags};
