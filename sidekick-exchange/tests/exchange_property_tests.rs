use proptest::prelude::*;
use serde_json::json;
use sidekick_core::{keys, AssistanceObject, AssistanceParameter};
use sidekick_exchange::{
    Feature, IngestContext, LookupRequest, MessageExchange, StateChange,
};

fn open_dialog() -> IngestContext {
    IngestContext { dialog_open: true }
}

fn hidden_dialog() -> IngestContext {
    IngestContext { dialog_open: false }
}

fn text_message(message_id: &str) -> AssistanceObject {
    AssistanceObject::new()
        .with_message_id(message_id)
        .with_parameters(vec![AssistanceParameter::text(keys::MESSAGE, "hello")])
}

fn phase_update(message_id: &str, a_id: &str, phase: i64, status: &str) -> AssistanceObject {
    AssistanceObject::new()
        .with_message_id(message_id)
        .with_a_id(a_id)
        .with_parameters(vec![AssistanceParameter::new(
            keys::STATE_UPDATE,
            json!({"phase": phase, "status": status}),
        )])
}

fn operation(message_id: &str, value: &str) -> AssistanceObject {
    AssistanceObject::new()
        .with_message_id(message_id)
        .with_parameters(vec![AssistanceParameter::text(keys::OPERATION, value)])
}

#[test]
fn completed_response_clears_group_and_keeps_single_update() {
    let mut exchange = MessageExchange::new();
    let ctx = open_dialog();

    // A session where one assistance instance reports progress, announces
    // a group, and then completes.
    let first = exchange.ingest(phase_update("1", "a", 1, "in_progress"), &ctx);
    assert!(first.changes.contains(&StateChange::ItemAppended));
    assert_eq!(
        first.lookups,
        vec![LookupRequest::AssistanceType {
            a_id: "a".to_string()
        }]
    );

    let membership = AssistanceObject::new()
        .with_message_id("2")
        .with_a_id("a")
        .with_ao_id("o")
        .with_parameters(vec![AssistanceParameter::new(
            keys::RELATED_USERS,
            json!(["u1"]),
        )]);
    let second = exchange.ingest(membership, &ctx);
    assert!(second.changes.contains(&StateChange::GroupAdded));
    // The type lookup for "a" is already in flight.
    assert!(second.lookups.is_empty());
    assert_eq!(exchange.groups().len(), 1);

    let completion = AssistanceObject::new()
        .with_message_id("3")
        .with_a_id("a")
        .with_ao_id("o")
        .with_parameters(vec![AssistanceParameter::new(
            keys::STATE_UPDATE_RESPONSE,
            json!({"status": "completed"}),
        )]);
    let third = exchange.ingest(completion, &ctx);
    assert!(third
        .changes
        .contains(&StateChange::GroupsRemoved { removed: 1 }));

    // Only the progress update is visible; the response and the group
    // announcement never reach the history.
    assert_eq!(exchange.items().len(), 1);
    assert_eq!(exchange.items()[0].message_id.as_deref(), Some("1"));
    assert_eq!(
        exchange.items()[0].object_type.as_deref(),
        Some(keys::STATE_UPDATE)
    );
    assert!(exchange.groups().is_empty());
    assert_eq!(exchange.state_updates().len(), 1);
    assert_eq!(exchange.state_updates()[0].message_id.as_deref(), Some("1"));
}

#[test]
fn suppressed_keys_never_reach_the_history() {
    let suppressed = [
        keys::OPERATION,
        keys::PEER_SOLUTION,
        keys::SOLUTION_RESPONSE,
        keys::SOLUTION_TEMPLATE,
        keys::STATE_UPDATE_RESPONSE,
    ];
    let mut exchange = MessageExchange::new();
    for (index, key) in suppressed.iter().enumerate() {
        let obj = AssistanceObject::new()
            .with_message_id(&format!("m{}", index))
            .with_parameters(vec![AssistanceParameter::text(key, "value")]);
        exchange.ingest(obj, &hidden_dialog());
    }

    assert!(exchange.items().is_empty());
    assert_eq!(exchange.new_items(), 0);
    assert_eq!(exchange.operation_items().len(), 1);
}

#[test]
fn feature_toggles_replay_from_operation_log() {
    let mut exchange = MessageExchange::new();
    let ctx = hidden_dialog();
    exchange.ingest(operation("1", "enable_chat"), &ctx);
    exchange.ingest(operation("2", "enable_notes"), &ctx);
    exchange.ingest(operation("3", "disable_chat"), &ctx);

    assert!(!exchange.feature_enabled(Feature::Chat));
    assert!(exchange.feature_enabled(Feature::Notes));
    assert!(!exchange.feature_enabled(Feature::Options));

    let flags = exchange.feature_flags();
    assert!(!flags.chat);
    assert!(flags.notes);
}

#[test]
fn group_removal_requires_both_ids_to_match() {
    let mut exchange = MessageExchange::new();
    let ctx = open_dialog();
    let membership = AssistanceObject::new()
        .with_message_id("1")
        .with_a_id("a")
        .with_ao_id("o")
        .with_parameters(vec![AssistanceParameter::new(
            keys::RELATED_USERS,
            json!(["u1"]),
        )]);
    exchange.ingest(membership, &ctx);

    let wrong_object = AssistanceObject::new()
        .with_message_id("2")
        .with_a_id("a")
        .with_ao_id("other")
        .with_parameters(vec![AssistanceParameter::new(
            keys::STATE_UPDATE_RESPONSE,
            json!({"status": "completed"}),
        )]);
    exchange.ingest(wrong_object, &ctx);
    assert_eq!(exchange.groups().len(), 1);

    let wrong_instance = AssistanceObject::new()
        .with_message_id("3")
        .with_a_id("b")
        .with_ao_id("o")
        .with_parameters(vec![AssistanceParameter::new(
            keys::STATE_UPDATE_RESPONSE,
            json!({"status": "completed"}),
        )]);
    exchange.ingest(wrong_instance, &ctx);
    assert_eq!(exchange.groups().len(), 1);
}

#[test]
fn type_resolution_cascades_into_definition_data() {
    let mut exchange = MessageExchange::new();
    let update = exchange.ingest(
        text_message("1").with_a_id("a"),
        &open_dialog(),
    );
    assert_eq!(
        update.lookups,
        vec![LookupRequest::AssistanceType {
            a_id: "a".to_string()
        }]
    );

    let update = exchange.resolve_assistance_type("a", "peer_exchange");
    assert_eq!(
        update.lookups,
        vec![LookupRequest::TypeData {
            type_key: "peer_exchange".to_string()
        }]
    );

    let definition = json!({"title": "Peer exchange", "phases": 3});
    exchange.resolve_type_data("peer_exchange", definition.clone());
    assert_eq!(exchange.type_of("a"), Some("peer_exchange"));
    assert_eq!(exchange.type_data("peer_exchange"), Some(&definition));
}

#[test]
fn unseen_counter_follows_dialog_visibility() {
    let mut exchange = MessageExchange::new();
    exchange.ingest(text_message("1"), &hidden_dialog());
    exchange.ingest(text_message("2"), &hidden_dialog());
    exchange.ingest(text_message("3"), &open_dialog());
    assert_eq!(exchange.new_items(), 2);

    exchange.mark_items_seen();
    assert_eq!(exchange.new_items(), 0);
}

#[test]
fn snapshot_restore_preserves_dedup_and_caches() {
    let mut exchange = MessageExchange::new();
    exchange.ingest(text_message("1").with_a_id("a"), &hidden_dialog());
    exchange.resolve_assistance_type("a", "quiz");
    exchange.resolve_type_data("quiz", json!({"title": "Quiz"}));

    let encoded = serde_json::to_string(&exchange).unwrap();
    let mut restored: MessageExchange = serde_json::from_str(&encoded).unwrap();

    assert_eq!(restored.items().len(), 1);
    assert_eq!(restored.type_of("a"), Some("quiz"));
    assert!(restored.ingest(text_message("1"), &open_dialog()).is_empty());
}

// ============================================================================
// Script generation for the properties below
// ============================================================================

#[derive(Debug, Clone)]
enum Script {
    Text { message_id: Option<String> },
    Phase { a_id: String, phase: i64 },
    Toggle { value: String },
    Membership { a_id: String, ao_id: String },
    Completion { a_id: String, ao_id: String },
}

fn materialize(script: &Script) -> AssistanceObject {
    match script {
        Script::Text { message_id } => {
            let obj = AssistanceObject::new()
                .with_parameters(vec![AssistanceParameter::text(keys::MESSAGE, "text")]);
            match message_id {
                Some(id) => obj.with_message_id(id),
                None => obj,
            }
        }
        Script::Phase { a_id, phase } => AssistanceObject::new()
            .with_a_id(a_id)
            .with_parameters(vec![AssistanceParameter::new(
                keys::STATE_UPDATE,
                json!({"phase": phase, "status": "in_progress"}),
            )]),
        Script::Toggle { value } => AssistanceObject::new().with_parameters(vec![
            AssistanceParameter::text(keys::OPERATION, value),
        ]),
        Script::Membership { a_id, ao_id } => AssistanceObject::new()
            .with_a_id(a_id)
            .with_ao_id(ao_id)
            .with_parameters(vec![AssistanceParameter::new(
                keys::RELATED_USERS,
                json!(["u1"]),
            )]),
        Script::Completion { a_id, ao_id } => AssistanceObject::new()
            .with_a_id(a_id)
            .with_ao_id(ao_id)
            .with_parameters(vec![AssistanceParameter::new(
                keys::STATE_UPDATE_RESPONSE,
                json!({"status": "completed"}),
            )]),
    }
}

fn arb_script() -> impl Strategy<Value = Script> {
    prop_oneof![
        proptest::option::of("[a-z0-9]{1,8}").prop_map(|message_id| Script::Text { message_id }),
        ("[ab]", 0i64..5).prop_map(|(a_id, phase)| Script::Phase { a_id, phase }),
        prop::sample::select(vec![
            "enable_chat",
            "disable_chat",
            "enable_notes",
            "disable_notes",
            "enable_options",
        ])
        .prop_map(|value| Script::Toggle {
            value: value.to_string()
        }),
        ("[ab]", "[xy]").prop_map(|(a_id, ao_id)| Script::Membership { a_id, ao_id }),
        ("[ab]", "[xy]").prop_map(|(a_id, ao_id)| Script::Completion { a_id, ao_id }),
    ]
}

proptest! {
    // ========================================================================
    // Property: replaying an accepted transcript changes nothing
    // ========================================================================

    #[test]
    fn reingesting_identified_messages_is_a_noop(ids in prop::collection::hash_set("[a-z0-9]{1,8}", 1..10)) {
        let mut exchange = MessageExchange::new();
        let ctx = IngestContext { dialog_open: false };
        for id in &ids {
            exchange.ingest(text_message(id), &ctx);
        }
        let items_before = exchange.items().to_vec();
        let unseen_before = exchange.new_items();

        for id in &ids {
            let update = exchange.ingest(text_message(id), &ctx);
            prop_assert!(update.is_empty());
        }

        prop_assert_eq!(exchange.items(), items_before.as_slice());
        prop_assert_eq!(exchange.new_items(), unseen_before);
    }

    // ========================================================================
    // Property: bulk replace equals sequential ingestion from empty
    // ========================================================================

    #[test]
    fn bulk_replace_matches_sequential_ingestion(scripts in prop::collection::vec(arb_script(), 0..25)) {
        let ctx = IngestContext { dialog_open: false };
        let objs: Vec<AssistanceObject> = scripts.iter().map(materialize).collect();

        let mut replaced = MessageExchange::new();
        // Pre-existing state must not leak through the replacement.
        replaced.ingest(text_message("stale"), &IngestContext { dialog_open: false });
        replaced.set_items(objs.clone(), &ctx);

        let mut sequential = MessageExchange::new();
        for obj in objs {
            sequential.ingest(obj, &ctx);
        }

        prop_assert_eq!(replaced.items(), sequential.items());
        prop_assert_eq!(replaced.groups(), sequential.groups());
        prop_assert_eq!(replaced.state_updates(), sequential.state_updates());
        prop_assert_eq!(replaced.operation_items(), sequential.operation_items());
        prop_assert_eq!(replaced.new_items(), sequential.new_items());
    }

    // ========================================================================
    // Property: per-instance phase never decreases
    // ========================================================================

    #[test]
    fn phase_tracking_is_monotone(phases in prop::collection::vec(0i64..8, 1..30)) {
        let mut exchange = MessageExchange::new();
        let ctx = IngestContext { dialog_open: true };
        let mut highest: Option<i64> = None;
        for (index, phase) in phases.iter().enumerate() {
            let obj = phase_update(&format!("p{}", index), "a", *phase, "in_progress");
            exchange.ingest(obj, &ctx);
            highest = Some(highest.map_or(*phase, |current| current.max(*phase)));
            prop_assert_eq!(exchange.current_phase("a"), highest);
        }
    }

    // ========================================================================
    // Property: the latest toggle decides each feature
    // ========================================================================

    #[test]
    fn latest_toggle_decides_each_feature(toggles in prop::collection::vec(prop::bool::ANY, 1..12)) {
        let mut exchange = MessageExchange::new();
        let ctx = IngestContext { dialog_open: false };
        for (index, enable) in toggles.iter().enumerate() {
            let value = if *enable { "enable_chat" } else { "disable_chat" };
            exchange.ingest(operation(&format!("t{}", index), value), &ctx);
        }

        prop_assert_eq!(exchange.feature_enabled(Feature::Chat), *toggles.last().unwrap());
    }

    // ========================================================================
    // Property: arbitrary scripts keep groups and items disjoint
    // ========================================================================

    #[test]
    fn group_messages_never_reach_the_history(scripts in prop::collection::vec(arb_script(), 0..30)) {
        let mut exchange = MessageExchange::new();
        let ctx = IngestContext { dialog_open: false };
        for script in &scripts {
            exchange.ingest(materialize(script), &ctx);
        }

        for item in exchange.items() {
            prop_assert!(!item.has_key(keys::RELATED_USERS));
            prop_assert!(!item.has_key(keys::OPERATION));
            prop_assert!(!item.has_key(keys::STATE_UPDATE_RESPONSE));
        }
        for entry in exchange.groups() {
            prop_assert!(entry.has_key(keys::RELATED_USERS));
        }
    }
}
