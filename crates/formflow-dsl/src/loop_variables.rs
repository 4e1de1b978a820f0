// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Loop variable sets.
//!
//! The same function drives both the runtime (which bindings a loop injects
//! into its scope frame) and the editor (which names autocomplete offers
//! before anything runs), so the two can never drift apart.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{LoopAction, LoopType};

pub const ITEM: &str = "item";
pub const INDEX: &str = "index";
pub const TOTAL: &str = "total";
pub const ITERATION: &str = "iteration";
pub const CURRENT_PAGE: &str = "currentPage";
pub const PAGE_SIZE: &str = "pageSize";
pub const TOTAL_PAGE: &str = "totalPage";

/// Describes one binding visible inside a loop body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoopVariableMeta {
    pub name: String,
    pub description: String,
    /// `false` for user-chosen alias names
    pub is_standard: bool,
}

impl LoopVariableMeta {
    fn standard(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            is_standard: true,
        }
    }
}

/// Standard variables injected by a loop of the given type.
///
/// List and count loops expose `item`, `index`, `total` and `iteration`.
/// Condition loops have no meaningful item or total, so they expose only
/// `index` and `iteration`. Pagination loops add `currentPage`, `pageSize`
/// and `totalPage`. An unknown loop type yields `index` and `iteration`.
pub fn loop_variables_for(loop_type: Option<LoopType>) -> Vec<LoopVariableMeta> {
    let item = LoopVariableMeta::standard(ITEM, "Current element");
    let index = LoopVariableMeta::standard(INDEX, "Zero-based iteration index");
    let total = LoopVariableMeta::standard(TOTAL, "Total number of iterations");
    let iteration = LoopVariableMeta::standard(ITERATION, "One-based iteration number");

    match loop_type {
        Some(LoopType::List) | Some(LoopType::Count) => vec![item, index, total, iteration],
        Some(LoopType::Pagination) => vec![
            LoopVariableMeta::standard(ITEM, "Elements of the current page"),
            index,
            LoopVariableMeta::standard(TOTAL, "Total number of elements"),
            iteration,
            LoopVariableMeta::standard(CURRENT_PAGE, "One-based page number"),
            LoopVariableMeta::standard(PAGE_SIZE, "Elements per page"),
            LoopVariableMeta::standard(TOTAL_PAGE, "Number of pages"),
        ],
        Some(LoopType::Condition) | None => vec![index, iteration],
    }
}

impl LoopAction {
    /// Standard variables plus any alias names configured on this loop.
    pub fn variables(&self) -> Vec<LoopVariableMeta> {
        let mut vars = loop_variables_for(Some(self.loop_type));
        let has_item = vars.iter().any(|v| v.name == ITEM);

        if let Some(alias) = self.item_variable.as_deref().filter(|a| !a.is_empty())
            && has_item
        {
            vars.push(LoopVariableMeta {
                name: alias.to_string(),
                description: format!("Alias of `{}`", ITEM),
                is_standard: false,
            });
        }
        if let Some(alias) = self.index_variable.as_deref().filter(|a| !a.is_empty()) {
            vars.push(LoopVariableMeta {
                name: alias.to_string(),
                description: format!("Alias of `{}`", INDEX),
                is_standard: false,
            });
        }
        vars
    }
}
