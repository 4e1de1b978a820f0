// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end action chain tests through `FormService::submit`.
//!
//! Run with:
//! ```bash
//! cargo test -p formflow-engine --test chain_test
//! ```

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;

use common::{FlakyStore, Harness, ScriptedInteraction, ShoutingAi, form, values};
use formflow_engine::{
    ActionError, ChainError, Collaborators, EngineConfig, FormError, MemoryDocumentStore,
    SubmitOptions, SubmitStatus,
};

fn create(id: &str, name: &str) -> serde_json::Value {
    json!({"type": "createFile", "id": id, "fileName": name, "content": id})
}

#[tokio::test]
async fn test_hidden_action_has_no_effect() {
    let h = Harness::new();
    let mut second = create("second", "two");
    second["condition"] = json!({
        "type": "filter", "property": "Mode", "operator": "Equals", "value": "full"
    });
    let form = form(json!({
        "fields": [{"id": "mode", "label": "Mode"}],
        "actions": [create("first", "one"), second, create("third", "three")]
    }));

    let status = h
        .service
        .submit(form, values(json!({"mode": "lite"})), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(status, SubmitStatus::Completed);
    assert_eq!(h.store.content("one.md").await.as_deref(), Some("first"));
    assert!(h.store.content("two.md").await.is_none());
    assert_eq!(h.store.content("three.md").await.as_deref(), Some("third"));
}

#[tokio::test]
async fn test_retry_until_success() {
    let memory = Arc::new(MemoryDocumentStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone(), 2));
    let h = Harness::build(memory, Collaborators::new(flaky.clone()), EngineConfig::default());

    let mut action = create("c", "note");
    action["errorHandling"] = json!({"strategy": "retry", "maxRetries": 3});
    let status = h
        .service
        .submit(form(json!({"actions": [action]})), values(json!({})), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(status, SubmitStatus::Completed);
    assert_eq!(flaky.create_calls.load(Ordering::SeqCst), 3);
    assert!(h.store.content("note.md").await.is_some());
}

#[tokio::test]
async fn test_retry_exhausted_aborts() {
    let memory = Arc::new(MemoryDocumentStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone(), 5));
    let h = Harness::build(memory, Collaborators::new(flaky.clone()), EngineConfig::default());

    let mut action = create("c", "note");
    action["errorHandling"] = json!({"strategy": "retry", "maxRetries": 1, "retryDelayMs": 0});
    let result = h
        .service
        .submit(
            form(json!({"actions": [action, create("after", "after")]})),
            values(json!({})),
            SubmitOptions::default(),
        )
        .await;

    match result {
        Err(FormError::Execution(ChainError::Action {
            action_id, source, ..
        })) => {
            assert_eq!(action_id, "c");
            assert!(matches!(source, ActionError::Store(_)));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(flaky.create_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.store.file_count().await, 0);
    assert_eq!(h.notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_skip_continues_with_next_action() {
    let h = Harness::new();
    let form = form(json!({
        "actions": [
            {
                "type": "insertText", "id": "missing", "filePath": "nowhere.md", "content": "x",
                "errorHandling": {"strategy": "skip"}
            },
            create("after", "after")
        ]
    }));

    let status = h.service.submit(form, values(json!({})), SubmitOptions::default()).await;
    assert!(matches!(status, Ok(SubmitStatus::Completed)));
    assert!(h.store.content("after.md").await.is_some());
}

#[tokio::test]
async fn test_named_group_strategy_applies_to_members() {
    let h = Harness::new();
    let form = form(json!({
        "actionGroups": [{
            "id": "cleanup",
            "errorHandling": {"strategy": "skip"},
            "actions": [
                {"type": "insertText", "id": "missing", "filePath": "nowhere.md", "content": "x"},
                create("inside", "inside")
            ]
        }],
        "actions": [
            {"type": "group", "id": "run-cleanup", "groupId": "cleanup"},
            create("after", "after")
        ]
    }));

    h.service
        .submit(form, values(json!({})), SubmitOptions::default())
        .await
        .unwrap();
    assert!(h.store.content("inside.md").await.is_some());
    assert!(h.store.content("after.md").await.is_some());
}

#[tokio::test]
async fn test_own_strategy_beats_group_strategy() {
    let h = Harness::new();
    let form = form(json!({
        "actions": [{
            "type": "group", "id": "g",
            "errorHandling": {"strategy": "skip"},
            "actions": [
                {
                    "type": "insertText", "id": "strict", "filePath": "nowhere.md", "content": "x",
                    "errorHandling": {"strategy": "abort"}
                },
                create("inside", "inside")
            ]
        }]
    }));

    let result = h.service.submit(form, values(json!({})), SubmitOptions::default()).await;
    assert!(matches!(
        result,
        Err(FormError::Execution(ChainError::Action { ref action_id, .. })) if action_id == "strict"
    ));
    assert!(h.store.content("inside.md").await.is_none());
}

#[tokio::test]
async fn test_dismissed_prompt_aborts_silently() {
    let memory = Arc::new(MemoryDocumentStore::new());
    let collaborators = Collaborators::new(memory.clone())
        .with_interaction(Arc::new(ScriptedInteraction { choice: None }));
    let h = Harness::build(memory, collaborators, EngineConfig::default());

    let form = form(json!({
        "actions": [
            {"type": "suggestModal", "id": "pick", "options": ["a", "b"], "outputVariable": "choice"},
            create("after", "after")
        ]
    }));
    let status = h
        .service
        .submit(form, values(json!({})), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(status, SubmitStatus::Aborted);
    assert_eq!(h.store.file_count().await, 0);
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_outputs_flow_into_later_actions() {
    let memory = Arc::new(MemoryDocumentStore::new());
    let collaborators = Collaborators::new(memory.clone())
        .with_ai(Arc::new(ShoutingAi))
        .with_interaction(Arc::new(ScriptedInteraction {
            choice: Some(json!("projects")),
        }));
    let h = Harness::build(memory, collaborators, EngineConfig::default());

    let form = form(json!({
        "fields": [{"id": "topic", "label": "Topic"}],
        "actions": [
            {"type": "suggestModal", "id": "folder", "options": ["inbox", "projects"], "outputVariable": "folder"},
            {"type": "ai", "id": "summarize", "prompt": "summary of {{@Topic}}", "outputVariable": "summary"},
            {
                "type": "createFile", "id": "note", "folder": "{{folder}}", "fileName": "{{@topic}}",
                "content": "{{summary}}", "outputVariable": "notePath"
            },
            {"type": "insertText", "id": "log", "filePath": "{{notePath}}", "content": "done"}
        ]
    }));
    h.service
        .submit(form, values(json!({"topic": "rust"})), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(
        h.store.content("projects/rust.md").await.as_deref(),
        Some("SUMMARY OF RUST\ndone")
    );
}
