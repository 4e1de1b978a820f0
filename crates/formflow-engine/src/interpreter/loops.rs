// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Loop actions and loop-scoped data collection.

use formflow_dsl::loop_variables::{
    CURRENT_PAGE, INDEX, ITEM, ITERATION, PAGE_SIZE, TOTAL, TOTAL_PAGE,
};
use formflow_dsl::{
    CollectDataAction, CollectVariableType, ErrorHandling, LoopAction, LoopType, StorageMode,
    ValueBag,
};
use serde_json::Value;
use tracing::{debug, warn};

use super::effects::to_items;
use super::{ExecutionContext, Failure, Flow, run_list};
use crate::error::ActionError;
use crate::scope::ScopeFrame;
use crate::template::{self, render_value};

const DEFAULT_PAGE_SIZE: usize = 10;

/// Iteration plan of one loop run.
enum Plan {
    /// Fixed items, one iteration each
    Items(Vec<Value>),
    /// Pages of `page_size` items over `total` elements
    Pages {
        pages: Vec<Vec<Value>>,
        page_size: usize,
        total: usize,
    },
    /// Repeat while the loop condition holds
    Condition,
}

fn plan(action: &LoopAction, ctx: &ExecutionContext) -> Result<Plan, ActionError> {
    match action.loop_type {
        LoopType::List | LoopType::Pagination => {
            let source = action.list_source.as_ref().ok_or_else(|| {
                ActionError::validation(format!("{} loop needs a listSource", action.loop_type))
            })?;
            let items = to_items(template::expand_json(source, &ctx.template()));
            if action.loop_type == LoopType::List {
                return Ok(Plan::Items(items));
            }
            let page_size = action.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
            if page_size == 0 {
                return Err(ActionError::validation("pageSize must be positive"));
            }
            let total = items.len();
            let pages = items.chunks(page_size).map(<[Value]>::to_vec).collect();
            Ok(Plan::Pages {
                pages,
                page_size,
                total,
            })
        }
        LoopType::Count => {
            let range = action
                .count
                .ok_or_else(|| ActionError::validation("count loop needs a count range"))?;
            if range.step == 0 {
                return Err(ActionError::validation("count step must not be zero"));
            }
            let limit = iteration_cap(action, ctx) as usize;
            let mut items = Vec::new();
            let mut n = range.start;
            while (range.step > 0 && n <= range.end) || (range.step < 0 && n >= range.end) {
                if items.len() > limit {
                    break;
                }
                items.push(Value::from(n));
                n = match n.checked_add(range.step) {
                    Some(next) => next,
                    None => break,
                };
            }
            Ok(Plan::Items(items))
        }
        LoopType::Condition => {
            if action.condition.is_none() {
                return Err(ActionError::validation("condition loop needs a condition"));
            }
            Ok(Plan::Condition)
        }
    }
}

fn iteration_cap(action: &LoopAction, ctx: &ExecutionContext) -> u32 {
    action
        .max_iterations
        .unwrap_or(ctx.config.max_loop_iterations)
}

/// Bindings for one iteration, including alias names.
fn frame(action: &LoopAction, index: usize, item: Option<Value>, extra: ValueBag) -> ScopeFrame {
    let mut bindings = ValueBag::new();
    if let Some(item) = item {
        if let Some(alias) = action.item_variable.as_deref().filter(|a| !a.is_empty()) {
            bindings.insert(alias.to_string(), item.clone());
        }
        bindings.insert(ITEM.to_string(), item);
    }
    bindings.insert(INDEX.to_string(), Value::from(index));
    bindings.insert(ITERATION.to_string(), Value::from(index + 1));
    if let Some(alias) = action.index_variable.as_deref().filter(|a| !a.is_empty()) {
        bindings.insert(alias.to_string(), Value::from(index));
    }
    bindings.extend(extra);
    ScopeFrame::new(bindings).with_meta(action.variables())
}

/// Run the body once with `frame` pushed. The scope is restored to its
/// previous depth before returning, on every path.
async fn iterate(
    action: &LoopAction,
    ctx: &mut ExecutionContext,
    frame: ScopeFrame,
    strategy: ErrorHandling,
) -> Result<Flow, Failure> {
    let depth = ctx.scope.depth();
    ctx.scope.push(frame);
    let result = run_list(&action.actions, ctx, Some(strategy)).await;
    ctx.scope.truncate(depth);
    Ok(result?)
}

pub(super) async fn run_loop(
    action: &LoopAction,
    ctx: &mut ExecutionContext,
    strategy: ErrorHandling,
) -> Result<Flow, Failure> {
    let cap = iteration_cap(action, ctx) as usize;
    let plan = plan(action, ctx)?;

    let mut index = 0usize;
    match plan {
        Plan::Items(items) => {
            let total = items.len();
            for item in items {
                if index >= cap {
                    warn!(action_id = %action.common.id, cap, "Loop iteration cap reached");
                    break;
                }
                ctx.check_cancelled()?;
                let mut extra = ValueBag::new();
                extra.insert(TOTAL.to_string(), Value::from(total));
                let frame = frame(action, index, Some(item), extra);
                if iterate(action, ctx, frame, strategy).await? == Flow::Break {
                    break;
                }
                index += 1;
            }
        }
        Plan::Pages {
            pages,
            page_size,
            total,
        } => {
            let total_pages = pages.len();
            for page in pages {
                if index >= cap {
                    warn!(action_id = %action.common.id, cap, "Loop iteration cap reached");
                    break;
                }
                ctx.check_cancelled()?;
                let mut extra = ValueBag::new();
                extra.insert(TOTAL.to_string(), Value::from(total));
                extra.insert(CURRENT_PAGE.to_string(), Value::from(index + 1));
                extra.insert(PAGE_SIZE.to_string(), Value::from(page_size));
                extra.insert(TOTAL_PAGE.to_string(), Value::from(total_pages));
                let frame = frame(action, index, Some(Value::Array(page)), extra);
                if iterate(action, ctx, frame, strategy).await? == Flow::Break {
                    break;
                }
                index += 1;
            }
        }
        Plan::Condition => {
            let Some(condition) = action.condition.as_ref() else {
                return Ok(Flow::Next);
            };
            loop {
                if index >= cap {
                    warn!(action_id = %action.common.id, cap, "Loop iteration cap reached");
                    break;
                }
                ctx.check_cancelled()?;

                // The condition sees the upcoming iteration's index
                let depth = ctx.scope.depth();
                ctx.scope.push(frame(action, index, None, ValueBag::new()));
                let holds = ctx.evaluate(condition);
                if !holds {
                    ctx.scope.truncate(depth);
                    break;
                }
                let result = run_list(&action.actions, ctx, Some(strategy)).await;
                ctx.scope.truncate(depth);
                if result? == Flow::Break {
                    break;
                }
                index += 1;
            }
        }
    }

    debug!(action_id = %action.common.id, iterations = index, "Loop finished");
    Ok(Flow::Next)
}

pub(super) fn collect_data(
    action: &CollectDataAction,
    ctx: &mut ExecutionContext,
) -> Result<Flow, Failure> {
    if !ctx.scope.is_inside_loop() {
        return Err(ActionError::validation("collectData is only valid inside a loop").into());
    }

    let value = template::expand_value(&action.content, &ctx.template());
    let previous = match action.storage_mode {
        StorageMode::Append => ctx.variables.remove(&action.output_variable),
        StorageMode::Replace => None,
    };

    let collected = match action.variable_type {
        CollectVariableType::Array => {
            let mut items = match previous {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => vec![other],
            };
            items.push(value);
            Value::Array(items)
        }
        CollectVariableType::String => {
            let text = render_value(&value);
            match previous.map(|v| render_value(&v)).filter(|p| !p.is_empty()) {
                Some(mut accumulated) => {
                    accumulated.push_str(action.separator.as_deref().unwrap_or("\n"));
                    accumulated.push_str(&text);
                    Value::String(accumulated)
                }
                None => Value::String(text),
            }
        }
    };

    ctx.variables
        .insert(action.output_variable.clone(), collected);
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use super::super::{ChainOutcome, execute};
    use super::*;
    use std::sync::Arc;

    use formflow_dsl::parse_form_config;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::collaborators::Collaborators;
    use crate::config::EngineConfig;
    use crate::store::MemoryDocumentStore;

    async fn run(actions: Value, values: Value) -> (ChainOutcome, ExecutionContext) {
        let form = parse_form_config(&json!({"actions": actions})).unwrap();
        let values = match values {
            Value::Object(map) => map,
            _ => ValueBag::new(),
        };
        let form = Arc::new(form);
        let mut ctx = ExecutionContext::new(
            form.clone(),
            values,
            Collaborators::new(Arc::new(MemoryDocumentStore::new())),
            EngineConfig::default().with_max_loop_iterations(50),
            CancellationToken::new(),
        );
        let outcome = execute(&form.actions, &mut ctx).await;
        (outcome, ctx)
    }

    fn collect(var: &str, content: &str, variable_type: &str) -> Value {
        json!({
            "type": "collectData", "id": format!("collect-{}", var),
            "outputVariable": var, "content": content, "variableType": variable_type
        })
    }

    #[tokio::test]
    async fn test_list_loop_binds_item_and_index() {
        let (outcome, ctx) = run(
            json!([{
                "type": "loop", "id": "l", "loopType": "list", "listSource": ["a", "b", "c"],
                "itemVariable": "letter",
                "actions": [
                    collect("items", "{{item}}", "array"),
                    collect("indexes", "{{index}}", "array"),
                    collect("aliases", "{{letter}}{{iteration}}/{{total}}", "string")
                ]
            }]),
            json!({}),
        )
        .await;
        assert!(outcome.is_completed());
        assert_eq!(ctx.variables["items"], json!(["a", "b", "c"]));
        assert_eq!(ctx.variables["indexes"], json!([0, 1, 2]));
        assert_eq!(ctx.variables["aliases"], json!("a1/3\nb2/3\nc3/3"));
        assert!(!ctx.scope.is_inside_loop());
    }

    #[tokio::test]
    async fn test_list_source_from_form_value_lines() {
        let (_, ctx) = run(
            json!([{
                "type": "loop", "id": "l", "loopType": "list", "listSource": "{{@todo}}",
                "actions": [collect("seen", "{{item}}", "array")]
            }]),
            json!({"todo": "milk\n\neggs\n"}),
        )
        .await;
        assert_eq!(ctx.variables["seen"], json!(["milk", "eggs"]));
    }

    #[tokio::test]
    async fn test_count_loop_inclusive_with_step() {
        let (_, ctx) = run(
            json!([{
                "type": "loop", "id": "l", "loopType": "count", "count": {"start": 1, "end": 7, "step": 3},
                "actions": [collect("n", "{{item}}", "array")]
            }]),
            json!({}),
        )
        .await;
        assert_eq!(ctx.variables["n"], json!([1, 4, 7]));
    }

    #[tokio::test]
    async fn test_condition_loop_uses_index() {
        let (outcome, ctx) = run(
            json!([{
                "type": "loop", "id": "l", "loopType": "condition",
                "condition": {"type": "filter", "property": "index", "operator": "LessThan", "value": 3},
                "actions": [collect("i", "{{index}}", "array")]
            }]),
            json!({}),
        )
        .await;
        assert!(outcome.is_completed());
        assert_eq!(ctx.variables["i"], json!([0, 1, 2]));
        assert_eq!(ctx.scope.depth(), 0);
    }

    #[tokio::test]
    async fn test_condition_loop_is_capped() {
        let (outcome, ctx) = run(
            json!([{
                "type": "loop", "id": "l", "loopType": "condition", "maxIterations": 4,
                "condition": {"type": "group", "conditions": []},
                "actions": [collect("i", "{{index}}", "array")]
            }]),
            json!({}),
        )
        .await;
        assert!(outcome.is_completed());
        assert_eq!(ctx.variables["i"], json!([0, 1, 2, 3]));
    }

    #[tokio::test]
    async fn test_pagination_pages() {
        let (_, ctx) = run(
            json!([{
                "type": "loop", "id": "l", "loopType": "pagination", "pageSize": 2,
                "listSource": [1, 2, 3, 4, 5],
                "actions": [
                    collect("pages", "{{item}}", "array"),
                    collect("labels", "{{currentPage}}/{{totalPage}} of {{total}} by {{pageSize}}", "array")
                ]
            }]),
            json!({}),
        )
        .await;
        assert_eq!(ctx.variables["pages"], json!([[1, 2], [3, 4], [5]]));
        assert_eq!(ctx.variables["labels"][2], json!("3/3 of 5 by 2"));
    }

    #[tokio::test]
    async fn test_break_leaves_innermost_loop_only() {
        let (_, ctx) = run(
            json!([{
                "type": "loop", "id": "outer", "loopType": "list", "listSource": ["x", "y"],
                "actions": [{
                    "type": "loop", "id": "inner", "loopType": "list", "listSource": [1, 2, 3],
                    "actions": [
                        collect("pairs", "{{item}}", "array"),
                        {
                            "type": "break", "id": "stop",
                            "condition": {"type": "filter", "property": "index", "operator": "Equals", "value": 1}
                        }
                    ]
                }]
            }]),
            json!({}),
        )
        .await;
        assert_eq!(ctx.variables["pairs"], json!([1, 2, 1, 2]));
    }

    #[tokio::test]
    async fn test_nested_loops_shadow_and_restore() {
        let (_, ctx) = run(
            json!([{
                "type": "loop", "id": "outer", "loopType": "list", "listSource": ["x", "y"],
                "itemVariable": "outerItem",
                "actions": [
                    {
                        "type": "loop", "id": "inner", "loopType": "count", "count": {"end": 1},
                        "actions": [collect("inner", "{{outerItem}}{{item}}", "array")]
                    },
                    collect("outer", "{{item}}", "array")
                ]
            }]),
            json!({}),
        )
        .await;
        assert_eq!(ctx.variables["inner"], json!(["x0", "x1", "y0", "y1"]));
        assert_eq!(ctx.variables["outer"], json!(["x", "y"]));
    }

    #[tokio::test]
    async fn test_failure_inside_loop_unwinds_scope() {
        let (outcome, ctx) = run(
            json!([{
                "type": "loop", "id": "l", "loopType": "list", "listSource": [1, 2],
                "actions": [{"type": "insertText", "id": "bad", "filePath": "none.md", "content": "x"}]
            }]),
            json!({}),
        )
        .await;
        assert!(matches!(outcome, ChainOutcome::Failed(_)));
        assert_eq!(ctx.scope.depth(), 0);
    }

    #[tokio::test]
    async fn test_collect_outside_loop_fails() {
        let (outcome, _) = run(json!([collect("x", "y", "string")]), json!({})).await;
        assert!(matches!(
            outcome,
            ChainOutcome::Failed(crate::error::ChainError::Action {
                source: ActionError::Validation(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_collect_replace_and_separator() {
        let (_, ctx) = run(
            json!([{
                "type": "loop", "id": "l", "loopType": "list", "listSource": ["a", "b"],
                "actions": [
                    {"type": "collectData", "id": "r", "outputVariable": "last", "content": "{{item}}", "storageMode": "replace"},
                    {"type": "collectData", "id": "s", "outputVariable": "csv", "content": "{{item}}", "separator": ","}
                ]
            }]),
            json!({}),
        )
        .await;
        assert_eq!(ctx.variables["last"], json!("b"));
        assert_eq!(ctx.variables["csv"], json!("a,b"));
    }

    #[tokio::test]
    async fn test_missing_list_source_fails() {
        let (outcome, _) = run(
            json!([{"type": "loop", "id": "l", "loopType": "list", "actions": []}]),
            json!({}),
        )
        .await;
        assert!(matches!(outcome, ChainOutcome::Failed(_)));
    }
}
