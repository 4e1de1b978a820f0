// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Form DSL Type Definitions - Single Source of Truth
//!
//! This crate defines the form file format used throughout the codebase:
//! - Runtime deserialization of form JSON
//! - Interpreter type-safe access to the action tree
//! - JSON Schema generation via schemars
//! - Loop variable sets shared by runtime and editor autocomplete

mod schema_types;

pub use schema_types::*;

// Loop variable metadata (runtime + design time)
pub mod loop_variables;

// Static checks on form definitions
pub mod validation;

pub use loop_variables::{LoopVariableMeta, loop_variables_for};

// ============================================================================
// Parsing Functions
// ============================================================================

/// Parse a form definition from a JSON value
pub fn parse_form_config(json: &serde_json::Value) -> Result<FormConfig, String> {
    serde_json::from_value(json.clone()).map_err(|e| format!("Failed to parse form: {}", e))
}

/// Parse a form definition from JSON text
pub fn parse_form_config_str(text: &str) -> Result<FormConfig, String> {
    serde_json::from_str(text).map_err(|e| format!("Failed to parse form: {}", e))
}

/// Parse a single filter expression from a JSON value
pub fn parse_filter(json: &serde_json::Value) -> Result<Filter, String> {
    serde_json::from_value(json.clone()).map_err(|e| format!("Failed to parse filter: {}", e))
}

/// JSON Schema of the form file format
pub fn form_json_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(FormConfig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_form_with_nested_actions() {
        let form = parse_form_config(&json!({
            "id": "daily",
            "name": "Daily note",
            "fields": [
                {"id": "title", "label": "Title", "type": "text", "required": true},
                {"id": "tags", "label": "Tags", "type": "select", "options": ["a", "b"]}
            ],
            "actions": [
                {
                    "type": "createFile",
                    "id": "create",
                    "folder": "journal",
                    "fileName": "{{date}} {{@Title}}",
                    "content": "# {{@Title}}",
                    "errorHandling": {"strategy": "skip"}
                },
                {
                    "type": "loop",
                    "id": "each-tag",
                    "loopType": "list",
                    "listSource": "{{@tags}}",
                    "actions": [
                        {"type": "insertText", "id": "ins", "filePath": "tags.md", "content": "- {{item}}"},
                        {"type": "continue", "id": "next"}
                    ]
                }
            ]
        }))
        .unwrap();

        assert_eq!(form.fields.len(), 2);
        assert_eq!(form.fields[0].field_type, FieldType::Text);
        assert_eq!(form.actions.len(), 2);

        let create = &form.actions[0];
        assert_eq!(create.action_type(), "createFile");
        assert_eq!(create.common().error_handling, Some(ErrorHandling::Skip));

        let Action::Loop(loop_action) = &form.actions[1] else {
            panic!("expected loop action");
        };
        assert_eq!(loop_action.loop_type, LoopType::List);
        assert_eq!(form.actions[1].children().map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_retry_strategy_round_trip_shape() {
        let strategy: ErrorHandling =
            serde_json::from_value(json!({"strategy": "retry", "maxRetries": 3})).unwrap();
        assert_eq!(
            strategy,
            ErrorHandling::Retry {
                max_retries: 3,
                retry_delay_ms: None
            }
        );
    }

    #[test]
    fn test_unknown_operator_deserializes() {
        let filter = parse_filter(&json!({
            "type": "filter",
            "property": "x",
            "operator": "SomethingNew",
            "value": 1
        }))
        .unwrap();
        assert_eq!(filter.operator, Some(OperatorType::Unknown));
    }

    #[test]
    fn test_filter_group_defaults() {
        let filter = parse_filter(&json!({"type": "group", "conditions": []})).unwrap();
        assert!(filter.is_group());
        assert_eq!(filter.relation, Relation::And);
    }

    #[test]
    fn test_field_lookup_by_label() {
        let form = parse_form_config(&json!({
            "fields": [{"id": "f1", "label": "Title", "defaultValue": "x"}]
        }))
        .unwrap();
        assert_eq!(form.field("Title").map(|f| f.id.as_str()), Some("f1"));
        assert_eq!(form.default_values().get("f1"), Some(&json!("x")));
    }

    #[test]
    fn test_schema_mentions_action_types() {
        let schema = serde_json::to_string(&form_json_schema()).unwrap();
        assert!(schema.contains("createFile"));
        assert!(schema.contains("collectData"));
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let result = parse_form_config(&json!({
            "actions": [{"type": "teleport", "id": "x"}]
        }));
        assert!(result.is_err());
    }
}
