//! Auxiliary session stores: display visibility, notes board, history of
//! sent messages, and host-provided session data.

use serde::{Deserialize, Serialize};
use sidekick_core::AssistanceObject;

// ============================================================================
// DISPLAY STATE
// ============================================================================

/// Visibility of the two panels. Feature enablement is not stored here;
/// it is derived from the operation log on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayState {
    pub dialog_open: bool,
    pub notes_and_peer_solution_open: bool,
}

impl DisplayState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// NOTES BOARD
// ============================================================================

/// Scaffold shown until the backend pushes a scenario template or the
/// user starts writing.
pub const DEFAULT_TEMPLATE: &str = "Anforderungen des Szenarios:\n*\n*\n*\n\nRanking der Cloud-Provider:\n*\n*\n*\n\nAuswahl des am besten geeigneten Providers:\n*\n*\n*\n\nBegründung der Auswahl:\n*\n*\n*\n";

/// Notes and peer-solution text with overwrite gating: backend pushes
/// only ever replace text the user has not touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesBoard {
    notes: String,
    peer_solution: String,
    template: String,
}

impl Default for NotesBoard {
    fn default() -> Self {
        Self {
            notes: DEFAULT_TEMPLATE.to_string(),
            peer_solution: DEFAULT_TEMPLATE.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl NotesBoard {
    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn peer_solution(&self) -> &str {
        &self.peer_solution
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Reset the notes to the latest template.
    pub fn reset_notes(&mut self) {
        self.notes = self.template.clone();
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.notes = notes.to_string();
    }

    pub fn set_peer_solution(&mut self, peer_solution: &str) {
        self.peer_solution = peer_solution.to_string();
    }

    /// Restore a previously submitted solution. User edits win: the notes
    /// are only replaced while they still equal the current or built-in
    /// template.
    pub fn set_solution_response(&mut self, solution: &str) {
        if self.notes == self.template || self.notes == DEFAULT_TEMPLATE {
            self.notes = solution.to_string();
        }
    }

    /// Install a scenario template. Notes still showing the built-in
    /// default pick it up; anything else is left alone, so a re-login
    /// does not wipe what the user wrote.
    pub fn set_template(&mut self, template: &str) {
        self.template = template.to_string();
        if self.notes == DEFAULT_TEMPLATE {
            self.reset_notes();
        }
    }
}

// ============================================================================
// MESSAGE HISTORY
// ============================================================================

/// Append-only record of messages the user sent this session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageHistory {
    items: Vec<AssistanceObject>,
}

impl MessageHistory {
    pub fn items(&self) -> &[AssistanceObject] {
        &self.items
    }

    pub fn push(&mut self, message: AssistanceObject) {
        self.items.push(message);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// ============================================================================
// SESSION DATA
// ============================================================================

/// Bootstrap data handed over by the embedding platform at init time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionData {
    pub plugin_path: String,
    pub backend_url: String,
    pub pseudo_id: String,
    pub token: String,
    pub has_just_logged_in: bool,
    pub is_run_locally: Option<bool>,
}
