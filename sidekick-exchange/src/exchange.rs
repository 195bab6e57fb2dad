//! The message-exchange engine.
//!
//! One [`MessageExchange`] per session owns every derived collection:
//! the visible item history, group membership, the operation and
//! state-update logs, phase tracking, and the type-resolution caches.
//! Mutating calls return an [`ExchangeUpdate`] describing what changed
//! and which lookups the caller should drive; the engine performs no
//! I/O itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidekick_core::{keys, AssistanceObject};
use std::collections::{HashMap, HashSet};

use crate::features::{Feature, FeatureFlags};

/// Parameter keys that mark a message as not independently displayable.
/// Such messages skip the item history but still run all bookkeeping.
const SUPPRESSED_KEYS: [&str; 5] = [
    keys::OPERATION,
    keys::PEER_SOLUTION,
    keys::SOLUTION_RESPONSE,
    keys::SOLUTION_TEMPLATE,
    keys::STATE_UPDATE_RESPONSE,
];

// ============================================================================
// CONTEXT AND OPTIONS
// ============================================================================

/// Caller-supplied context for a single ingestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestContext {
    /// Whether the conversation view is currently visible. While hidden,
    /// displayable non-state-update messages bump the unseen counter.
    pub dialog_open: bool,
}

/// Tunables for the exchange engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOptions {
    /// Upper bound on lookup attempts per assistance id or type key.
    pub max_lookup_attempts: u32,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            max_lookup_attempts: 3,
        }
    }
}

// ============================================================================
// LOOKUP STATE
// ============================================================================

/// Internal life cycle of one metadata lookup. Volatile: never part of
/// snapshots, so a restored session can re-request unresolved ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupState {
    InFlight { attempts: u32 },
    Resolved,
    Failed { attempts: u32 },
}

/// Externally visible resolution state for an assistance id or type key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// No lookup has been issued yet.
    Unrequested,
    /// A lookup is in flight.
    Pending,
    /// The value is cached.
    Resolved,
    /// The last attempt failed; retries may still happen on later
    /// messages until the attempt bound is reached.
    Failed,
}

/// Lookup the engine wants a driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    /// Fetch the type key for an assistance instance.
    AssistanceType { a_id: String },
    /// Fetch the definition data for a type key.
    TypeData { type_key: String },
}

// ============================================================================
// UPDATE DIFFS
// ============================================================================

/// One observable mutation produced by an engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// A message was appended to the visible item history.
    ItemAppended,
    /// The unseen-items counter was incremented.
    NewItemCounted,
    /// A state update advanced the recorded phase for an instance.
    PhaseAdvanced { a_id: String, phase: i64 },
    /// A message joined the group list.
    GroupAdded,
    /// Entries left the group list after a completed state update.
    GroupsRemoved { removed: usize },
    /// An operation was appended to the operation log.
    OperationLogged,
    /// A state update was appended to the state-update log.
    StateUpdateLogged,
    /// An assistance id now has a known type key.
    TypeResolved { a_id: String, type_key: String },
    /// Definition data for a type key was cached.
    TypeDataCached { type_key: String },
    /// A type-key lookup failed for an assistance id.
    TypeLookupFailed { a_id: String },
    /// A definition-data lookup failed for a type key.
    TypeDataLookupFailed { type_key: String },
}

/// Diff returned by every mutating engine call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeUpdate {
    pub changes: Vec<StateChange>,
    pub lookups: Vec<LookupRequest>,
}

impl ExchangeUpdate {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.lookups.is_empty()
    }

    /// Append another update's changes and lookups to this one.
    pub fn merge(&mut self, other: ExchangeUpdate) {
        self.changes.extend(other.changes);
        self.lookups.extend(other.lookups);
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Client-side store for all assistance-message state of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageExchange {
    items: Vec<AssistanceObject>,
    seen_message_ids: HashSet<String>,
    new_items: u32,
    groups: Vec<AssistanceObject>,
    state_updates: Vec<AssistanceObject>,
    operation_items: Vec<AssistanceObject>,
    current_phase_by_assistance: HashMap<String, i64>,
    type_by_assistance: HashMap<String, String>,
    data_by_type: HashMap<String, Value>,
    message_to_send: String,
    options: ExchangeOptions,
    #[serde(skip)]
    assistance_requests: HashMap<String, LookupState>,
    #[serde(skip)]
    type_requests: HashMap<String, LookupState>,
}

impl Default for MessageExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageExchange {
    pub fn new() -> Self {
        Self::with_options(ExchangeOptions::default())
    }

    pub fn with_options(options: ExchangeOptions) -> Self {
        Self {
            items: Vec::new(),
            seen_message_ids: HashSet::new(),
            new_items: 0,
            groups: Vec::new(),
            state_updates: Vec::new(),
            operation_items: Vec::new(),
            current_phase_by_assistance: HashMap::new(),
            type_by_assistance: HashMap::new(),
            data_by_type: HashMap::new(),
            message_to_send: String::new(),
            options,
            assistance_requests: HashMap::new(),
            type_requests: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------------

    /// Visible item history, insertion-ordered.
    pub fn items(&self) -> &[AssistanceObject] {
        &self.items
    }

    /// Currently active group messages.
    pub fn groups(&self) -> &[AssistanceObject] {
        &self.groups
    }

    /// Append-only log of accepted messages carrying a `state_update` key.
    pub fn state_updates(&self) -> &[AssistanceObject] {
        &self.state_updates
    }

    /// Append-only log of accepted messages carrying an `operation` key.
    pub fn operation_items(&self) -> &[AssistanceObject] {
        &self.operation_items
    }

    /// Count of displayable messages ingested while the dialog was hidden.
    pub fn new_items(&self) -> u32 {
        self.new_items
    }

    /// Whether a message id was already accepted this session.
    pub fn has_seen(&self, message_id: &str) -> bool {
        self.seen_message_ids.contains(message_id)
    }

    /// Highest `state_update` phase recorded for an assistance instance.
    pub fn current_phase(&self, a_id: &str) -> Option<i64> {
        self.current_phase_by_assistance.get(a_id).copied()
    }

    /// Resolved type key for an assistance instance, if cached.
    pub fn type_of(&self, a_id: &str) -> Option<&str> {
        self.type_by_assistance.get(a_id).map(String::as_str)
    }

    /// Cached definition data for a type key.
    pub fn type_data(&self, type_key: &str) -> Option<&Value> {
        self.data_by_type.get(type_key)
    }

    /// Staged outbound user message.
    pub fn message_to_send(&self) -> &str {
        &self.message_to_send
    }

    pub fn set_message_to_send(&mut self, text: &str) {
        self.message_to_send = text.to_string();
    }

    /// Take the staged outbound message, leaving the buffer empty.
    pub fn take_message_to_send(&mut self) -> String {
        std::mem::take(&mut self.message_to_send)
    }

    /// Resolution state of the type lookup for an assistance id.
    pub fn lookup_outcome(&self, a_id: &str) -> LookupOutcome {
        if self.type_by_assistance.contains_key(a_id) {
            return LookupOutcome::Resolved;
        }
        outcome_of(self.assistance_requests.get(a_id))
    }

    /// Resolution state of the definition-data lookup for a type key.
    pub fn type_data_outcome(&self, type_key: &str) -> LookupOutcome {
        if self.data_by_type.contains_key(type_key) {
            return LookupOutcome::Resolved;
        }
        outcome_of(self.type_requests.get(type_key))
    }

    /// Whether a feature is enabled according to the operation log.
    pub fn feature_enabled(&self, feature: Feature) -> bool {
        feature.enabled_in(&self.operation_items)
    }

    /// Snapshot of every feature flag.
    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags::from_log(&self.operation_items)
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Ingest one inbound assistance object.
    ///
    /// Runs, in order: messageId dedup, classification, phase gating or
    /// item append, then the unconditional bookkeeping (logs, type
    /// resolution, groups). Duplicates are silent no-ops.
    pub fn ingest(&mut self, obj: AssistanceObject, ctx: &IngestContext) -> ExchangeUpdate {
        let mut update = ExchangeUpdate::default();
        let mut obj = obj;

        if let Some(message_id) = obj.message_id.as_deref() {
            if self.seen_message_ids.contains(message_id) {
                return update;
            }
            self.seen_message_ids.insert(message_id.to_string());
        }

        if classify(&mut obj) {
            match obj.object_type.as_deref() {
                Some(key) if key == keys::STATE_UPDATE => {
                    self.gate_state_update(&obj, &mut update);
                }
                // Group announcements live in `groups` only, the
                // bookkeeping below adds them there.
                Some(key) if key == keys::RELATED_USERS || key == keys::GROUP => {}
                _ => {
                    self.items.push(obj.clone());
                    update.changes.push(StateChange::ItemAppended);
                    if !ctx.dialog_open {
                        self.new_items += 1;
                        update.changes.push(StateChange::NewItemCounted);
                    }
                }
            }
        }

        self.log_by_key(&obj, &mut update);
        self.check_type_resolution(&obj, &mut update);
        self.add_or_remove_group(&obj, &mut update);
        update
    }

    /// Replace the entire state from a transcript.
    ///
    /// Clears first, then feeds every element through the normal
    /// single-item path, so input order determines dedup, group, and
    /// phase outcomes exactly as sequential ingestion would.
    pub fn set_items(
        &mut self,
        objs: Vec<AssistanceObject>,
        ctx: &IngestContext,
    ) -> ExchangeUpdate {
        self.clear();
        let mut update = ExchangeUpdate::default();
        for obj in objs {
            update.merge(self.ingest(obj, ctx));
        }
        update
    }

    /// Reset every collection and cache to the initial state.
    pub fn clear(&mut self) {
        *self = Self::with_options(self.options);
    }

    /// Zero the unseen-items counter (the dialog became visible).
    pub fn mark_items_seen(&mut self) {
        self.new_items = 0;
    }

    fn gate_state_update(&mut self, obj: &AssistanceObject, update: &mut ExchangeUpdate) {
        let a_id = match obj.a_id.clone() {
            Some(a_id) => a_id,
            // Phase tracking is keyed by instance; anonymous state
            // updates never reach the item history.
            None => return,
        };
        let phase = phase_of(obj);
        let accepted = match self.current_phase_by_assistance.get(&a_id) {
            None => true,
            Some(&current) => phase > current,
        };
        if accepted {
            self.current_phase_by_assistance.insert(a_id.clone(), phase);
            self.items.push(obj.clone());
            update.changes.push(StateChange::PhaseAdvanced { a_id, phase });
            update.changes.push(StateChange::ItemAppended);
        }
    }

    // ------------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------------

    fn log_by_key(&mut self, obj: &AssistanceObject, update: &mut ExchangeUpdate) {
        if obj.has_key(keys::OPERATION) {
            self.operation_items.push(obj.clone());
            update.changes.push(StateChange::OperationLogged);
        }
        if obj.has_key(keys::STATE_UPDATE) {
            self.state_updates.push(obj.clone());
            update.changes.push(StateChange::StateUpdateLogged);
        }
    }

    fn check_type_resolution(&mut self, obj: &AssistanceObject, update: &mut ExchangeUpdate) {
        let a_id = match obj.a_id.as_deref() {
            Some(a_id) => a_id,
            None => return,
        };
        if self.type_by_assistance.contains_key(a_id) {
            return;
        }
        if !may_request(
            self.assistance_requests.get(a_id),
            self.options.max_lookup_attempts,
        ) {
            return;
        }

        if let Some(type_key) = obj.assistance_type.clone() {
            self.assistance_requests
                .insert(a_id.to_string(), LookupState::Resolved);
            self.type_by_assistance
                .insert(a_id.to_string(), type_key.clone());
            update.changes.push(StateChange::TypeResolved {
                a_id: a_id.to_string(),
                type_key: type_key.clone(),
            });
            self.check_type_data(&type_key, update);
        } else {
            // Marking in-flight before the caller performs the request is
            // what keeps lookups single-flight per id.
            let attempts = next_attempt(self.assistance_requests.get(a_id));
            self.assistance_requests
                .insert(a_id.to_string(), LookupState::InFlight { attempts });
            update.lookups.push(LookupRequest::AssistanceType {
                a_id: a_id.to_string(),
            });
        }
    }

    fn check_type_data(&mut self, type_key: &str, update: &mut ExchangeUpdate) {
        if self.data_by_type.contains_key(type_key) {
            return;
        }
        if !may_request(
            self.type_requests.get(type_key),
            self.options.max_lookup_attempts,
        ) {
            return;
        }
        let attempts = next_attempt(self.type_requests.get(type_key));
        self.type_requests
            .insert(type_key.to_string(), LookupState::InFlight { attempts });
        update.lookups.push(LookupRequest::TypeData {
            type_key: type_key.to_string(),
        });
    }

    fn add_or_remove_group(&mut self, obj: &AssistanceObject, update: &mut ExchangeUpdate) {
        if obj.has_key(keys::RELATED_USERS) || obj.has_key(keys::GROUP) {
            self.groups.push(obj.clone());
            update.changes.push(StateChange::GroupAdded);
        } else if status_completed(obj.value_opt(keys::STATE_UPDATE))
            || status_completed(obj.value_opt(keys::STATE_UPDATE_RESPONSE))
        {
            // Pair-keyed removal: every entry matching both ids goes,
            // and absent ids match absent ids.
            let before = self.groups.len();
            self.groups
                .retain(|entry| entry.a_id != obj.a_id || entry.ao_id != obj.ao_id);
            let removed = before - self.groups.len();
            if removed > 0 {
                update.changes.push(StateChange::GroupsRemoved { removed });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lookup completion hooks
    // ------------------------------------------------------------------------

    /// Record a successful assistance-type lookup and cascade the
    /// definition-data check for the returned key.
    pub fn resolve_assistance_type(&mut self, a_id: &str, type_key: &str) -> ExchangeUpdate {
        let mut update = ExchangeUpdate::default();
        self.assistance_requests
            .insert(a_id.to_string(), LookupState::Resolved);
        let known = self.type_by_assistance.get(a_id).map(String::as_str) == Some(type_key);
        if !known {
            self.type_by_assistance
                .insert(a_id.to_string(), type_key.to_string());
            update.changes.push(StateChange::TypeResolved {
                a_id: a_id.to_string(),
                type_key: type_key.to_string(),
            });
        }
        self.check_type_data(type_key, &mut update);
        update
    }

    /// Record a failed assistance-type lookup. The id stays retryable on
    /// later messages until the attempt bound is exhausted.
    pub fn fail_assistance_type(&mut self, a_id: &str) -> ExchangeUpdate {
        let mut update = ExchangeUpdate::default();
        let attempts = match self.assistance_requests.get(a_id) {
            Some(LookupState::Resolved) => return update,
            Some(LookupState::InFlight { attempts }) | Some(LookupState::Failed { attempts }) => {
                *attempts
            }
            None => 1,
        };
        self.assistance_requests
            .insert(a_id.to_string(), LookupState::Failed { attempts });
        update.changes.push(StateChange::TypeLookupFailed {
            a_id: a_id.to_string(),
        });
        update
    }

    /// Cache definition data returned for a type key.
    pub fn resolve_type_data(&mut self, type_key: &str, data: Value) -> ExchangeUpdate {
        let mut update = ExchangeUpdate::default();
        self.type_requests
            .insert(type_key.to_string(), LookupState::Resolved);
        if !self.data_by_type.contains_key(type_key) {
            update.changes.push(StateChange::TypeDataCached {
                type_key: type_key.to_string(),
            });
        }
        self.data_by_type.insert(type_key.to_string(), data);
        update
    }

    /// Record a failed definition-data lookup.
    pub fn fail_type_data(&mut self, type_key: &str) -> ExchangeUpdate {
        let mut update = ExchangeUpdate::default();
        let attempts = match self.type_requests.get(type_key) {
            Some(LookupState::Resolved) => return update,
            Some(LookupState::InFlight { attempts }) | Some(LookupState::Failed { attempts }) => {
                *attempts
            }
            None => 1,
        };
        self.type_requests
            .insert(type_key.to_string(), LookupState::Failed { attempts });
        update.changes.push(StateChange::TypeDataLookupFailed {
            type_key: type_key.to_string(),
        });
        update
    }
}

// ============================================================================
// CLASSIFICATION HELPERS
// ============================================================================

/// Derive `object_type` from the parameter keys, in order.
///
/// Returns false when the message carries a suppressed key; such
/// messages keep `object_type` unset and never enter the item history.
fn classify(obj: &mut AssistanceObject) -> bool {
    let mut displayable = true;
    let mut ordered_keys: Vec<&str> = Vec::new();
    if let Some(params) = obj.parameters.as_deref() {
        for param in params {
            if SUPPRESSED_KEYS.contains(&param.key.as_str()) {
                displayable = false;
            } else {
                ordered_keys.push(param.key.as_str());
            }
        }
    }
    if displayable {
        let object_type = ordered_keys
            .iter()
            .rev()
            .find(|key| **key != keys::MESSAGE)
            .map(|key| key.to_string())
            .unwrap_or_else(|| keys::MESSAGE.to_string());
        obj.object_type = Some(object_type);
    }
    displayable
}

/// Numeric `phase` field of the `state_update` parameter value, default 0.
fn phase_of(obj: &AssistanceObject) -> i64 {
    obj.value_opt(keys::STATE_UPDATE)
        .and_then(|value| value.get("phase"))
        .and_then(|phase| {
            phase
                .as_i64()
                .or_else(|| phase.as_f64().map(|float| float as i64))
        })
        .unwrap_or(0)
}

fn status_completed(value: Option<&Value>) -> bool {
    value
        .and_then(|value| value.get("status"))
        .and_then(Value::as_str)
        .map(|status| status == "completed")
        .unwrap_or(false)
}

fn outcome_of(state: Option<&LookupState>) -> LookupOutcome {
    match state {
        None => LookupOutcome::Unrequested,
        Some(LookupState::InFlight { .. }) => LookupOutcome::Pending,
        Some(LookupState::Resolved) => LookupOutcome::Resolved,
        Some(LookupState::Failed { .. }) => LookupOutcome::Failed,
    }
}

fn may_request(state: Option<&LookupState>, max_attempts: u32) -> bool {
    match state {
        None => true,
        Some(LookupState::Failed { attempts }) => *attempts < max_attempts,
        Some(LookupState::InFlight { .. }) | Some(LookupState::Resolved) => false,
    }
}

fn next_attempt(state: Option<&LookupState>) -> u32 {
    match state {
        Some(LookupState::Failed { attempts }) => attempts + 1,
        _ => 1,
    }
}
