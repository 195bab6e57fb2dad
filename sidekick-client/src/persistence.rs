//! Persistence for the session snapshot.

use crate::stores::{DisplayState, MessageHistory, NotesBoard, SessionData};
use serde::{Deserialize, Serialize};
use sidekick_exchange::MessageExchange;
use std::path::Path;

/// Everything a session keeps across page reloads. Volatile lookup state
/// is excluded by the engine's own serialization rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub exchange: MessageExchange,
    pub display: DisplayState,
    pub notes: NotesBoard,
    pub history: MessageHistory,
    pub session_data: SessionData,
    pub last_logged_in_user: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub fn load(path: &Path) -> Result<Option<SessionSnapshot>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let snapshot = serde_json::from_str::<SessionSnapshot>(&contents)?;
    Ok(Some(snapshot))
}

pub fn save(path: &Path, snapshot: &SessionSnapshot) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, contents)?;
    Ok(())
}
