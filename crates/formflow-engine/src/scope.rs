// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Loop variable scope.
//!
//! A stack of binding frames, one per loop body currently executing. Lookups
//! search from the innermost frame outward, so inner loops shadow outer ones.
//! Each execution owns its own scope; nothing is shared between submissions.

use std::collections::HashSet;

use formflow_dsl::{LoopVariableMeta, ValueBag};
use serde_json::Value;

/// One loop iteration's bindings.
#[derive(Debug, Clone, Default)]
pub struct ScopeFrame {
    pub bindings: ValueBag,
    /// Descriptions of the bindings, for enumeration
    pub meta: Vec<LoopVariableMeta>,
}

impl ScopeFrame {
    pub fn new(bindings: ValueBag) -> Self {
        Self {
            bindings,
            meta: Vec::new(),
        }
    }

    pub fn with_meta(mut self, meta: Vec<LoopVariableMeta>) -> Self {
        self.meta = meta;
        self
    }

    fn description(&self, name: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.description.as_str())
    }
}

/// A variable visible at the current nesting level.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeVariable {
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
}

/// Stack of loop scope frames.
#[derive(Debug, Clone, Default)]
pub struct LoopScope {
    frames: Vec<ScopeFrame>,
}

impl LoopScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ScopeFrame) {
        self.frames.push(frame);
    }

    /// Remove the innermost frame. No-op on an empty stack.
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Bindings of the innermost frame.
    pub fn current(&self) -> Option<&ValueBag> {
        self.frames.last().map(|f| &f.bindings)
    }

    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.bindings.get(name))
    }

    /// Resolve `name` or a dotted path such as `item.title` or `item.tags.0`.
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let root = self.get_value(segments.next()?)?;
        segments.try_fold(root, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    pub fn is_inside_loop(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Every distinct name across all frames, innermost first. Shadowed names
    /// appear once, with the innermost value and description.
    pub fn available_variables(&self) -> Vec<ScopeVariable> {
        let mut seen = HashSet::new();
        let mut variables = Vec::new();
        for frame in self.frames.iter().rev() {
            for (name, value) in &frame.bindings {
                if seen.insert(name.as_str()) {
                    variables.push(ScopeVariable {
                        name: name.clone(),
                        value: value.clone(),
                        description: frame.description(name).map(str::to_string),
                    });
                }
            }
        }
        variables
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Drop frames above `depth`.
    pub(crate) fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }
}
