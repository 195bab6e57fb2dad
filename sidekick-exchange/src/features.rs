//! Feature-enablement projection over the operation log.
//!
//! Flags are never stored: each query replays the append-only operation
//! log backwards until it hits the most recent toggle for the feature.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidekick_core::{keys, AssistanceObject};

// ============================================================================
// FEATURES
// ============================================================================

/// UI features toggled by backend `operation` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Chat,
    Notes,
    NotesInput,
    NotesCommand,
    Options,
    PeerSolution,
    PeerSolutionCommand,
    AbortExchangeCommand,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::Chat,
        Feature::Notes,
        Feature::NotesInput,
        Feature::NotesCommand,
        Feature::Options,
        Feature::PeerSolution,
        Feature::PeerSolutionCommand,
        Feature::AbortExchangeCommand,
    ];

    /// Operation value that switches the feature on.
    pub fn enable_value(self) -> &'static str {
        match self {
            Feature::Chat => "enable_chat",
            Feature::Notes => "enable_notes",
            Feature::NotesInput => "enable_notes_input",
            Feature::NotesCommand => "enable_notes_command",
            Feature::Options => "enable_options",
            Feature::PeerSolution => "enable_peer_solution",
            Feature::PeerSolutionCommand => "enable_peer_solution_command",
            Feature::AbortExchangeCommand => "enable_abort_exchange_command",
        }
    }

    /// Operation value that switches the feature off.
    pub fn disable_value(self) -> &'static str {
        match self {
            Feature::Chat => "disable_chat",
            Feature::Notes => "disable_notes",
            Feature::NotesInput => "disable_notes_input",
            Feature::NotesCommand => "disable_notes_command",
            Feature::Options => "disable_options",
            Feature::PeerSolution => "disable_peer_solution",
            Feature::PeerSolutionCommand => "disable_peer_solution_command",
            Feature::AbortExchangeCommand => "disable_abort_exchange_command",
        }
    }

    /// Whether this feature is enabled according to the given log.
    pub fn enabled_in(self, log: &[AssistanceObject]) -> bool {
        last_operation_state(log, self.enable_value(), self.disable_value())
    }
}

// ============================================================================
// LOG REPLAY
// ============================================================================

/// Scan `log` backwards for the most recent operation equal to either
/// given value; true iff it is `enable_value`. No matching entry means
/// disabled.
pub fn last_operation_state(
    log: &[AssistanceObject],
    enable_value: &str,
    disable_value: &str,
) -> bool {
    for entry in log.iter().rev() {
        if let Some(operation) = entry.value_opt(keys::OPERATION).and_then(Value::as_str) {
            if operation == enable_value {
                return true;
            }
            if operation == disable_value {
                return false;
            }
        }
    }
    false
}

// ============================================================================
// FLAG SNAPSHOT
// ============================================================================

/// Point-in-time snapshot of every feature flag, for UI layers that want
/// all toggles at once. `Default` is the all-false reset state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub chat: bool,
    pub notes: bool,
    pub notes_input: bool,
    pub notes_command: bool,
    pub options: bool,
    pub peer_solution: bool,
    pub peer_solution_command: bool,
    pub abort_exchange_command: bool,
}

impl FeatureFlags {
    /// Derive all flags from an operation log.
    pub fn from_log(log: &[AssistanceObject]) -> Self {
        Self {
            chat: Feature::Chat.enabled_in(log),
            notes: Feature::Notes.enabled_in(log),
            notes_input: Feature::NotesInput.enabled_in(log),
            notes_command: Feature::NotesCommand.enabled_in(log),
            options: Feature::Options.enabled_in(log),
            peer_solution: Feature::PeerSolution.enabled_in(log),
            peer_solution_command: Feature::PeerSolutionCommand.enabled_in(log),
            abort_exchange_command: Feature::AbortExchangeCommand.enabled_in(log),
        }
    }

    /// Read a single flag.
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::Chat => self.chat,
            Feature::Notes => self.notes,
            Feature::NotesInput => self.notes_input,
            Feature::NotesCommand => self.notes_command,
            Feature::Options => self.options,
            Feature::PeerSolution => self.peer_solution,
            Feature::PeerSolutionCommand => self.peer_solution_command,
            Feature::AbortExchangeCommand => self.abort_exchange_command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidekick_core::AssistanceParameter;

    fn operation(value: &str) -> AssistanceObject {
        AssistanceObject::new()
            .with_parameters(vec![AssistanceParameter::text(keys::OPERATION, value)])
    }

    #[test]
    fn test_empty_log_disables_everything() {
        let flags = FeatureFlags::from_log(&[]);
        assert_eq!(flags, FeatureFlags::default());
        for feature in Feature::ALL {
            assert!(!feature.enabled_in(&[]));
        }
    }

    #[test]
    fn test_latest_toggle_wins() {
        let log = vec![
            operation("enable_chat"),
            operation("disable_chat"),
            operation("enable_chat"),
        ];
        assert!(Feature::Chat.enabled_in(&log));

        let log = vec![operation("enable_chat"), operation("disable_chat")];
        assert!(!Feature::Chat.enabled_in(&log));
    }

    #[test]
    fn test_replay_scenario_chat_off_notes_on() {
        let log = vec![
            operation("enable_chat"),
            operation("enable_notes"),
            operation("disable_chat"),
        ];
        assert!(!Feature::Chat.enabled_in(&log));
        assert!(Feature::Notes.enabled_in(&log));
    }

    #[test]
    fn test_unrelated_operations_are_ignored() {
        let log = vec![
            operation("enable_chat"),
            operation("make_coffee"),
            operation("enable_options"),
        ];
        assert!(Feature::Chat.enabled_in(&log));
        assert!(Feature::Options.enabled_in(&log));
        assert!(!Feature::Notes.enabled_in(&log));
    }

    #[test]
    fn test_entries_without_operation_key_are_skipped() {
        let log = vec![
            operation("enable_notes_input"),
            AssistanceObject::new()
                .with_parameters(vec![AssistanceParameter::text(keys::MESSAGE, "hi")]),
            AssistanceObject::new(),
        ];
        assert!(Feature::NotesInput.enabled_in(&log));
    }

    #[test]
    fn test_non_string_operation_values_are_skipped() {
        let log = vec![
            operation("enable_peer_solution"),
            AssistanceObject::new().with_parameters(vec![AssistanceParameter::new(
                keys::OPERATION,
                serde_json::json!(42),
            )]),
        ];
        assert!(Feature::PeerSolution.enabled_in(&log));
    }

    #[test]
    fn test_snapshot_matches_per_feature_queries() {
        let log = vec![
            operation("enable_chat"),
            operation("enable_abort_exchange_command"),
            operation("disable_chat"),
            operation("enable_peer_solution_command"),
            operation("enable_notes_command"),
        ];
        let flags = FeatureFlags::from_log(&log);
        for feature in Feature::ALL {
            assert_eq!(flags.get(feature), feature.enabled_in(&log));
        }
    }
}
