// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Static validation of form definitions.
//!
//! Runs before a form is submitted or saved and reports problems the
//! interpreter would otherwise only hit mid-chain:
//! - Duplicate action or field ids
//! - `group` actions referencing unknown action groups
//! - Output variable names that are not valid identifiers
//! - `collectData` actions placed outside any loop body
//! - Loops missing the data source their type requires

use std::collections::HashSet;

use crate::{Action, FormConfig, LoopType};

// ============================================================================
// Validation Result Types
// ============================================================================

/// Result of form validation containing errors and warnings.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Problems that make the chain fail at runtime.
    pub errors: Vec<ValidationError>,
    /// Suspicious but executable constructs.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are allowed).
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Errors found in a form definition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ValidationError {
    DuplicateActionId { action_id: String },
    DuplicateFieldId { field_id: String },
    UnknownActionGroup { action_id: String, group_id: String },
    InvalidVariableName { action_id: String, name: String },
    CollectOutsideLoop { action_id: String },
    MissingLoopSource { action_id: String, loop_type: LoopType },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::DuplicateActionId { action_id } => {
                write!(f, "[F001] Action id '{}' is used more than once", action_id)
            }
            ValidationError::DuplicateFieldId { field_id } => {
                write!(f, "[F002] Field id '{}' is used more than once", field_id)
            }
            ValidationError::UnknownActionGroup {
                action_id,
                group_id,
            } => write!(
                f,
                "[F003] Action '{}' references unknown action group '{}'",
                action_id, group_id
            ),
            ValidationError::InvalidVariableName { action_id, name } => write!(
                f,
                "[F004] Action '{}' uses invalid variable name '{}'",
                action_id, name
            ),
            ValidationError::CollectOutsideLoop { action_id } => write!(
                f,
                "[F005] Collect-data action '{}' must be placed inside a loop",
                action_id
            ),
            ValidationError::MissingLoopSource {
                action_id,
                loop_type,
            } => write!(
                f,
                "[F006] Loop '{}' of type '{}' has no data source",
                action_id, loop_type
            ),
        }
    }
}

/// Warnings found in a form definition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ValidationWarning {
    EmptyLoopBody { action_id: String },
    EmptyGroup { action_id: String },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::EmptyLoopBody { action_id } => {
                write!(f, "[W001] Loop '{}' has no actions", action_id)
            }
            ValidationWarning::EmptyGroup { action_id } => {
                write!(f, "[W002] Group '{}' has no actions", action_id)
            }
        }
    }
}

/// Whether `name` can be used as an output variable.
///
/// Names start with a letter or underscore and continue with letters,
/// digits, underscores or hyphens.
pub fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Validate a whole form definition.
pub fn validate_form(form: &FormConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    let mut field_ids = HashSet::new();
    for field in &form.fields {
        if !field_ids.insert(field.id.as_str()) {
            result.errors.push(ValidationError::DuplicateFieldId {
                field_id: field.id.clone(),
            });
        }
    }

    let mut action_ids = HashSet::new();
    validate_actions(form, &form.actions, 0, &mut action_ids, &mut result);

    // A named group runs wherever it is referenced; it counts as a loop body
    // when some reference sits inside a loop.
    let in_loops = groups_referenced_in_loops(form);
    for group in &form.action_groups {
        let depth = usize::from(in_loops.contains(group.id.as_str()));
        validate_actions(form, &group.actions, depth, &mut action_ids, &mut result);
    }

    result
}

/// Ids of named groups referenced, directly or through other named groups,
/// from inside a loop body.
fn groups_referenced_in_loops(form: &FormConfig) -> HashSet<&str> {
    let mut visited = HashSet::new();
    let mut found = HashSet::new();
    walk_group_references(form, &form.actions, false, &mut visited, &mut found);
    found
}

fn walk_group_references<'a>(
    form: &'a FormConfig,
    actions: &'a [Action],
    in_loop: bool,
    visited: &mut HashSet<(&'a str, bool)>,
    found: &mut HashSet<&'a str>,
) {
    for action in actions {
        match action {
            Action::Loop(l) => walk_group_references(form, &l.actions, true, visited, found),
            Action::Group(g) => {
                if let Some(group_id) = g.group_id.as_deref() {
                    if in_loop {
                        found.insert(group_id);
                    }
                    if visited.insert((group_id, in_loop))
                        && let Some(group) = form.action_group(group_id)
                    {
                        walk_group_references(form, &group.actions, in_loop, visited, found);
                    }
                }
                walk_group_references(form, &g.actions, in_loop, visited, found);
            }
            _ => {}
        }
    }
}

fn validate_actions<'a>(
    form: &FormConfig,
    actions: &'a [Action],
    loop_depth: usize,
    seen: &mut HashSet<&'a str>,
    result: &mut ValidationResult,
) {
    for action in actions {
        let id = action.id();
        if !seen.insert(id) {
            result.errors.push(ValidationError::DuplicateActionId {
                action_id: id.to_string(),
            });
        }

        for name in output_variables(action) {
            if !is_valid_variable_name(name) {
                result.errors.push(ValidationError::InvalidVariableName {
                    action_id: id.to_string(),
                    name: name.to_string(),
                });
            }
        }

        match action {
            Action::CollectData(_) if loop_depth == 0 => {
                result.errors.push(ValidationError::CollectOutsideLoop {
                    action_id: id.to_string(),
                });
            }
            Action::Loop(l) => {
                let missing = match l.loop_type {
                    LoopType::List | LoopType::Pagination => l.list_source.is_none(),
                    LoopType::Count => l.count.is_none(),
                    LoopType::Condition => l.condition.is_none(),
                };
                if missing {
                    result.errors.push(ValidationError::MissingLoopSource {
                        action_id: id.to_string(),
                        loop_type: l.loop_type,
                    });
                }
                if l.actions.is_empty() {
                    result.warnings.push(ValidationWarning::EmptyLoopBody {
                        action_id: id.to_string(),
                    });
                }
                validate_actions(form, &l.actions, loop_depth + 1, seen, result);
            }
            Action::Group(g) => {
                if let Some(group_id) = &g.group_id {
                    if form.action_group(group_id).is_none() {
                        result.errors.push(ValidationError::UnknownActionGroup {
                            action_id: id.to_string(),
                            group_id: group_id.clone(),
                        });
                    }
                } else if g.actions.is_empty() {
                    result.warnings.push(ValidationWarning::EmptyGroup {
                        action_id: id.to_string(),
                    });
                }
                validate_actions(form, &g.actions, loop_depth, seen, result);
            }
            _ => {}
        }
    }
}

fn output_variables(action: &Action) -> Vec<&str> {
    match action {
        Action::CreateFile(a) => a.output_variable.as_deref().into_iter().collect(),
        Action::TextTransform(a) => vec![a.output_variable.as_str()],
        Action::Ai(a) => a.output_variable.as_deref().into_iter().collect(),
        Action::CollectData(a) => vec![a.output_variable.as_str()],
        Action::SuggestModal(a) => vec![a.output_variable.as_str()],
        Action::Loop(a) => a
            .item_variable
            .as_deref()
            .into_iter()
            .chain(a.index_variable.as_deref())
            .collect(),
        _ => vec![],
    }
}
