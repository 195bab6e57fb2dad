//! Background driver for engine-requested metadata lookups.

use crate::api::AssistanceDirectory;
use crate::session::{LookupCompletion, SessionEvent};
use sidekick_exchange::LookupRequest;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Perform one lookup on a background task and feed the outcome back
/// into the session loop. Failures are reported as completions too; the
/// engine decides whether another attempt is allowed.
pub fn spawn_lookup(
    directory: Arc<dyn AssistanceDirectory>,
    request: LookupRequest,
    sender: mpsc::Sender<SessionEvent>,
) {
    tokio::spawn(async move {
        let completion = match request {
            LookupRequest::AssistanceType { a_id } => {
                let outcome = directory
                    .fetch_assistance_type(&a_id)
                    .await
                    .map_err(|err| err.to_string());
                if let Err(reason) = outcome.as_ref() {
                    tracing::warn!(a_id = %a_id, reason = %reason, "Assistance type lookup failed");
                }
                LookupCompletion::AssistanceType { a_id, outcome }
            }
            LookupRequest::TypeData { type_key } => {
                let outcome = directory
                    .fetch_type_data(&type_key)
                    .await
                    .map_err(|err| err.to_string());
                if let Err(reason) = outcome.as_ref() {
                    tracing::warn!(type_key = %type_key, reason = %reason, "Type data lookup failed");
                }
                LookupCompletion::TypeData { type_key, outcome }
            }
        };
        let _ = sender.send(SessionEvent::LookupCompleted(completion)).await;
    });
}
