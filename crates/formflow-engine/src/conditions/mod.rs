// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filter evaluation.
//!
//! A [`Filter`] tree is evaluated against two caller-supplied functions: a
//! value lookup for the `property` of each leaf, and a transform applied to
//! each leaf's comparison value. The evaluator has no idea where values live
//! (form state, loop scope, output variables), which keeps it usable for
//! both field visibility and action conditions.

pub mod coercion;
pub mod operators;
pub mod time;

use formflow_dsl::{Filter, Relation};
use serde_json::Value;
use tracing::trace;

pub use operators::{OperatorContext, OperatorHandler, handler_for};

/// Evaluate a filter tree.
///
/// Group nodes combine their children with AND/OR; a group with no children
/// is `true` for either relation. Leaves with a missing or unknown operator
/// are `false`. Evaluation never fails.
pub fn apply<L, T>(filter: &Filter, lookup: &L, transform: &T, ctx: &OperatorContext<'_>) -> bool
where
    L: Fn(&str) -> Option<Value>,
    T: Fn(&Value) -> Value,
{
    if filter.is_group() {
        if filter.conditions.is_empty() {
            return true;
        }
        return match filter.relation {
            Relation::And => filter
                .conditions
                .iter()
                .all(|c| apply(c, lookup, transform, ctx)),
            Relation::Or => filter
                .conditions
                .iter()
                .any(|c| apply(c, lookup, transform, ctx)),
        };
    }

    let Some(handler) = filter.operator.and_then(handler_for) else {
        trace!(operator = ?filter.operator, "Filter leaf without a known operator");
        return false;
    };

    let field = filter
        .property
        .as_deref()
        .and_then(lookup)
        .unwrap_or(Value::Null);
    let expected = filter
        .value
        .as_ref()
        .map(transform)
        .unwrap_or(Value::Null);

    handler.apply(&field, &expected, ctx)
}
