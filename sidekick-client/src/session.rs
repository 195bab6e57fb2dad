//! Session facade wiring the exchange engine to the auxiliary stores,
//! the lookup driver, and the async event loop.

use crate::api::AssistanceDirectory;
use crate::lookup::spawn_lookup;
use crate::persistence::SessionSnapshot;
use crate::stores::{DisplayState, MessageHistory, NotesBoard, SessionData};
use serde_json::Value;
use sidekick_core::{
    keys, AssistanceObject, AssistanceParameter, AssistanceResponseObject,
};
use sidekick_exchange::{
    ExchangeOptions, ExchangeUpdate, FeatureFlags, IngestContext, LookupRequest, MessageExchange,
    StateChange,
};
use std::sync::Arc;
use tokio::sync::mpsc;

// ============================================================================
// EVENTS AND NOTICES
// ============================================================================

/// Inbound events for the session loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// A message arrived from the backend.
    Inbound(AssistanceObject),
    /// Replace the whole message state from a transcript.
    Replace(Vec<AssistanceObject>),
    /// A spawned lookup finished.
    LookupCompleted(LookupCompletion),
    /// The conversation view was opened or closed.
    DialogOpened(bool),
    /// The notes panel was opened or closed.
    NotesPanelOpened(bool),
    /// The user logged out of the embedding platform.
    Logout,
    /// Stop the loop and hand the session back.
    Shutdown,
}

/// Result of one driver-performed lookup. Failures travel as rendered
/// strings; the error value itself stays at the HTTP boundary.
#[derive(Debug, Clone)]
pub enum LookupCompletion {
    AssistanceType {
        a_id: String,
        outcome: Result<String, String>,
    },
    TypeData {
        type_key: String,
        outcome: Result<Value, String>,
    },
}

/// Notifications the session emits for a UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// A state change inside the exchange engine.
    Exchange(StateChange),
    /// The notes were replaced by a restored solution.
    NotesReplaced,
    /// A scenario template was installed.
    TemplateInstalled,
    /// The peer solution text changed.
    PeerSolutionUpdated,
    /// A lookup failed; the engine may retry on a later message.
    LookupFailed { description: String },
    /// Initialization found a different user than last time.
    UserSwitched { previous: String },
    /// The local state was cleared.
    LoggedOut,
}

/// Changes produced by one session call: UI notices plus lookups the
/// caller must drive.
#[derive(Debug, Default)]
pub struct SessionUpdate {
    pub notices: Vec<SessionNotice>,
    pub lookups: Vec<LookupRequest>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty() && self.lookups.is_empty()
    }

    fn merge(&mut self, other: SessionUpdate) {
        self.notices.extend(other.notices);
        self.lookups.extend(other.lookups);
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Owner of all per-user client state. One per embedded widget.
#[derive(Debug, Clone)]
pub struct AssistanceSession {
    exchange: MessageExchange,
    display: DisplayState,
    notes: NotesBoard,
    history: MessageHistory,
    session_data: SessionData,
    last_logged_in_user: String,
}

impl Default for AssistanceSession {
    fn default() -> Self {
        Self::new(ExchangeOptions::default())
    }
}

impl AssistanceSession {
    pub fn new(options: ExchangeOptions) -> Self {
        Self {
            exchange: MessageExchange::with_options(options),
            display: DisplayState::default(),
            notes: NotesBoard::default(),
            history: MessageHistory::default(),
            session_data: SessionData::default(),
            last_logged_in_user: String::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------------

    pub fn exchange(&self) -> &MessageExchange {
        &self.exchange
    }

    pub fn display(&self) -> DisplayState {
        self.display
    }

    pub fn notes(&self) -> &NotesBoard {
        &self.notes
    }

    /// Mutable notes access for user edits from the UI layer.
    pub fn notes_mut(&mut self) -> &mut NotesBoard {
        &mut self.notes
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn session_data(&self) -> &SessionData {
        &self.session_data
    }

    /// User recorded by the previous initialization; survives logout.
    pub fn last_logged_in_user(&self) -> &str {
        &self.last_logged_in_user
    }

    pub fn feature_flags(&self) -> FeatureFlags {
        self.exchange.feature_flags()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Install the bootstrap data handed over by the embedding platform.
    /// A pseudo id different from the previously logged-in user discards
    /// that user's local state first.
    pub fn initialize(&mut self, data: SessionData) -> SessionUpdate {
        let mut update = SessionUpdate::default();
        if !self.last_logged_in_user.is_empty() && self.last_logged_in_user != data.pseudo_id {
            let previous = std::mem::take(&mut self.last_logged_in_user);
            self.reset_local_state();
            update.notices.push(SessionNotice::UserSwitched { previous });
        }
        tracing::info!(pseudo_id = %data.pseudo_id, "Session initialized");
        self.last_logged_in_user = data.pseudo_id.clone();
        self.session_data = data;
        update
    }

    /// Clear every store for the current user. The last-logged-in marker
    /// survives so the next initialization can detect a user switch.
    pub fn logout(&mut self) -> SessionUpdate {
        tracing::info!(user = %self.last_logged_in_user, "Session logged out");
        self.reset_local_state();
        SessionUpdate {
            notices: vec![SessionNotice::LoggedOut],
            lookups: Vec::new(),
        }
    }

    fn reset_local_state(&mut self) {
        self.exchange.clear();
        self.display.reset();
        self.notes = NotesBoard::default();
        self.history.clear();
        self.session_data = SessionData::default();
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Feed one inbound message through the engine and route its
    /// notes-related side effects.
    pub fn ingest(&mut self, obj: AssistanceObject) -> SessionUpdate {
        let mut update = SessionUpdate::default();
        let duplicate = obj
            .message_id
            .as_deref()
            .map(|id| self.exchange.has_seen(id))
            .unwrap_or(false);
        if !duplicate {
            self.route_notes_content(&obj, &mut update.notices);
        }

        let ctx = IngestContext {
            dialog_open: self.display.dialog_open,
        };
        let engine_update = self.exchange.ingest(obj, &ctx);
        tracing::debug!(
            changes = engine_update.changes.len(),
            lookups = engine_update.lookups.len(),
            items = self.exchange.items().len(),
            "Ingested assistance object"
        );
        update.merge(from_engine(engine_update));
        update
    }

    /// Replace the whole message state from a transcript, in order.
    pub fn replace_items(&mut self, objs: Vec<AssistanceObject>) -> SessionUpdate {
        self.exchange.clear();
        let mut merged = SessionUpdate::default();
        for obj in objs {
            merged.merge(self.ingest(obj));
        }
        merged
    }

    /// Content carried by keys the item history never shows still lands
    /// in the notes board.
    fn route_notes_content(&mut self, obj: &AssistanceObject, notices: &mut Vec<SessionNotice>) {
        if let Some(text) = string_value(obj, keys::SOLUTION_RESPONSE) {
            let before = self.notes.notes().to_string();
            self.notes.set_solution_response(text);
            if self.notes.notes() != before {
                notices.push(SessionNotice::NotesReplaced);
            }
        }
        if let Some(text) = string_value(obj, keys::SOLUTION_TEMPLATE) {
            self.notes.set_template(text);
            notices.push(SessionNotice::TemplateInstalled);
        }
        if let Some(text) = string_value(obj, keys::PEER_SOLUTION) {
            self.notes.set_peer_solution(text);
            notices.push(SessionNotice::PeerSolutionUpdated);
        }
    }

    // ------------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------------

    /// Opening the conversation view consumes the unseen counter.
    pub fn set_dialog_open(&mut self, open: bool) {
        self.display.dialog_open = open;
        if open {
            self.exchange.mark_items_seen();
        }
    }

    pub fn set_notes_panel_open(&mut self, open: bool) {
        self.display.notes_and_peer_solution_open = open;
    }

    // ------------------------------------------------------------------------
    // Outbound messages
    // ------------------------------------------------------------------------

    /// Stage the next outbound message text.
    pub fn stage_message(&mut self, text: &str) {
        self.exchange.set_message_to_send(text);
    }

    /// Turn the staged text into an outbound envelope, recording it in
    /// the sent-message history. Empty staging yields nothing.
    pub fn take_outbound(&mut self, ao_id: Option<&str>) -> Option<AssistanceResponseObject> {
        let text = self.exchange.take_message_to_send();
        if text.is_empty() {
            return None;
        }
        let response = AssistanceResponseObject::new(
            ao_id,
            vec![AssistanceParameter::text(keys::MESSAGE, &text)],
        );
        let mut record = AssistanceObject::new().with_parameters(response.parameters.clone());
        record.ao_id = response.ao_id.clone();
        self.history.push(record);
        Some(response)
    }

    // ------------------------------------------------------------------------
    // Lookup completions
    // ------------------------------------------------------------------------

    /// Apply one completed lookup to the engine.
    pub fn apply_lookup(&mut self, completion: LookupCompletion) -> SessionUpdate {
        let mut update = SessionUpdate::default();
        let engine_update = match completion {
            LookupCompletion::AssistanceType { a_id, outcome } => match outcome {
                Ok(type_key) => self.exchange.resolve_assistance_type(&a_id, &type_key),
                Err(description) => {
                    update
                        .notices
                        .push(SessionNotice::LookupFailed { description });
                    self.exchange.fail_assistance_type(&a_id)
                }
            },
            LookupCompletion::TypeData { type_key, outcome } => match outcome {
                Ok(data) => self.exchange.resolve_type_data(&type_key, data),
                Err(description) => {
                    update
                        .notices
                        .push(SessionNotice::LookupFailed { description });
                    self.exchange.fail_type_data(&type_key)
                }
            },
        };
        update.merge(from_engine(engine_update));
        update
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            exchange: self.exchange.clone(),
            display: self.display,
            notes: self.notes.clone(),
            history: self.history.clone(),
            session_data: self.session_data.clone(),
            last_logged_in_user: self.last_logged_in_user.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: SessionSnapshot) {
        self.exchange = snapshot.exchange;
        self.display = snapshot.display;
        self.notes = snapshot.notes;
        self.history = snapshot.history;
        self.session_data = snapshot.session_data;
        self.last_logged_in_user = snapshot.last_logged_in_user;
    }
}

fn from_engine(update: ExchangeUpdate) -> SessionUpdate {
    SessionUpdate {
        notices: update.changes.into_iter().map(SessionNotice::Exchange).collect(),
        lookups: update.lookups,
    }
}

fn string_value<'a>(obj: &'a AssistanceObject, key: &str) -> Option<&'a str> {
    obj.value_opt(key).and_then(Value::as_str)
}

// ============================================================================
// EVENT LOOP
// ============================================================================

/// Drive a session from an event channel until shutdown, spawning a
/// lookup task per request and forwarding notices to the UI channel.
/// Returns the session so the caller can snapshot it.
pub async fn run_session(
    mut session: AssistanceSession,
    directory: Arc<dyn AssistanceDirectory>,
    mut events: mpsc::Receiver<SessionEvent>,
    loopback: mpsc::Sender<SessionEvent>,
    notices: mpsc::Sender<SessionNotice>,
) -> AssistanceSession {
    while let Some(event) = events.recv().await {
        if handle_event(&mut session, &directory, &loopback, &notices, event).await {
            break;
        }
    }
    session
}

async fn handle_event(
    session: &mut AssistanceSession,
    directory: &Arc<dyn AssistanceDirectory>,
    loopback: &mpsc::Sender<SessionEvent>,
    notices: &mpsc::Sender<SessionNotice>,
    event: SessionEvent,
) -> bool {
    match event {
        SessionEvent::Inbound(obj) => {
            let update = session.ingest(obj);
            dispatch(update, directory, loopback, notices).await;
        }
        SessionEvent::Replace(objs) => {
            let update = session.replace_items(objs);
            dispatch(update, directory, loopback, notices).await;
        }
        SessionEvent::LookupCompleted(completion) => {
            let update = session.apply_lookup(completion);
            dispatch(update, directory, loopback, notices).await;
        }
        SessionEvent::DialogOpened(open) => session.set_dialog_open(open),
        SessionEvent::NotesPanelOpened(open) => session.set_notes_panel_open(open),
        SessionEvent::Logout => {
            let update = session.logout();
            dispatch(update, directory, loopback, notices).await;
        }
        SessionEvent::Shutdown => return true,
    }
    false
}

async fn dispatch(
    update: SessionUpdate,
    directory: &Arc<dyn AssistanceDirectory>,
    loopback: &mpsc::Sender<SessionEvent>,
    notices: &mpsc::Sender<SessionNotice>,
) {
    for notice in update.notices {
        let _ = notices.send(notice).await;
    }
    for request in update.lookups {
        spawn_lookup(Arc::clone(directory), request, loopback.clone());
    }
}
