// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operator handlers.
//!
//! Each [`OperatorType`] maps to exactly one stateless handler. Handlers never
//! fail: malformed input evaluates to `false`.

use formflow_dsl::OperatorType;
use regex::RegexBuilder;
use serde_json::Value;

use super::coercion::{
    has_value, loosely_equal, to_array, to_checked, to_integer, to_number, to_text,
};
use super::time::parse_time;
use crate::collaborators::FileDecoder;

/// Capabilities available to handlers beyond the two operands.
pub struct OperatorContext<'a> {
    pub file_decoder: &'a dyn FileDecoder,
}

/// Comparison semantics of one operator.
pub trait OperatorHandler: Sync {
    /// Compare the looked-up field value against the filter's value.
    fn apply(&self, field: &Value, expected: &Value, ctx: &OperatorContext<'_>) -> bool;
}

static EQUALS: EqualsHandler = EqualsHandler { negate: false };
static NOT_EQUALS: EqualsHandler = EqualsHandler { negate: true };
static GREATER_THAN: NumericCompare = NumericCompare(|a, b| a > b);
static GREATER_THAN_OR_EQUAL: NumericCompare = NumericCompare(|a, b| a >= b);
static LESS_THAN: NumericCompare = NumericCompare(|a, b| a < b);
static LESS_THAN_OR_EQUAL: NumericCompare = NumericCompare(|a, b| a <= b);
static CONTAINS: Membership = Membership(MembershipMode::All);
static NOT_CONTAINS: Membership = Membership(MembershipMode::None);
static CONTAINS_ANY: Membership = Membership(MembershipMode::Any);
static STARTS_WITH: Affix = Affix { suffix: false };
static ENDS_WITH: Affix = Affix { suffix: true };
static REGEX_MATCH: RegexHandler = RegexHandler;
static HAS_VALUE: Presence = Presence { expect: true };
static NO_VALUE: Presence = Presence { expect: false };
static FILE_CONTAINS: FileContainsHandler = FileContainsHandler;
static ARRAY_LENGTH_EQUALS: ArrayLength = ArrayLength(|len, n| len == n);
static ARRAY_LENGTH_GREATER: ArrayLength = ArrayLength(|len, n| len > n);
static ARRAY_LENGTH_LESS: ArrayLength = ArrayLength(|len, n| len < n);
static TIME_BEFORE: TimeCompare = TimeCompare(|a, b| a < b);
static TIME_AFTER: TimeCompare = TimeCompare(|a, b| a > b);
static TIME_BEFORE_OR_EQUAL: TimeCompare = TimeCompare(|a, b| a <= b);
static TIME_AFTER_OR_EQUAL: TimeCompare = TimeCompare(|a, b| a >= b);
static CHECKED: CheckedHandler = CheckedHandler { expect: true };
static UNCHECKED: CheckedHandler = CheckedHandler { expect: false };

/// Handler for an operator, `None` for [`OperatorType::Unknown`].
pub fn handler_for(operator: OperatorType) -> Option<&'static dyn OperatorHandler> {
    use OperatorType::*;
    let handler: &'static dyn OperatorHandler = match operator {
        Equals => &EQUALS,
        NotEquals => &NOT_EQUALS,
        GreaterThan => &GREATER_THAN,
        GreaterThanOrEqual => &GREATER_THAN_OR_EQUAL,
        LessThan => &LESS_THAN,
        LessThanOrEqual => &LESS_THAN_OR_EQUAL,
        Contains => &CONTAINS,
        NotContains => &NOT_CONTAINS,
        ContainsAny => &CONTAINS_ANY,
        StartsWith => &STARTS_WITH,
        EndsWith => &ENDS_WITH,
        RegexMatch => &REGEX_MATCH,
        HasValue => &HAS_VALUE,
        NoValue => &NO_VALUE,
        FileContains => &FILE_CONTAINS,
        ArrayLengthEquals => &ARRAY_LENGTH_EQUALS,
        ArrayLengthGreater => &ARRAY_LENGTH_GREATER,
        ArrayLengthLess => &ARRAY_LENGTH_LESS,
        TimeBefore => &TIME_BEFORE,
        TimeAfter => &TIME_AFTER,
        TimeBeforeOrEqual => &TIME_BEFORE_OR_EQUAL,
        TimeAfterOrEqual => &TIME_AFTER_OR_EQUAL,
        Checked => &CHECKED,
        Unchecked => &UNCHECKED,
        Unknown => return None,
    };
    Some(handler)
}

struct EqualsHandler {
    negate: bool,
}

impl OperatorHandler for EqualsHandler {
    fn apply(&self, field: &Value, expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        let equal = match (field, expected) {
            // Multi-select field equals a scalar it contains
            (Value::Array(items), other) if !other.is_array() => {
                items.iter().any(|item| loosely_equal(item, other))
            }
            _ => loosely_equal(field, expected),
        };
        equal != self.negate
    }
}

struct NumericCompare(fn(f64, f64) -> bool);

impl OperatorHandler for NumericCompare {
    fn apply(&self, field: &Value, expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        match (to_number(field), to_number(expected)) {
            (Some(a), Some(b)) => (self.0)(a, b),
            _ => false,
        }
    }
}

enum MembershipMode {
    All,
    Any,
    None,
}

struct Membership(MembershipMode);

impl OperatorHandler for Membership {
    fn apply(&self, field: &Value, expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        let haystack = to_array(field);
        let needles = to_array(expected);
        let present = |needle: &Value| haystack.iter().any(|item| loosely_equal(item, needle));
        match self.0 {
            MembershipMode::All => needles.iter().all(present),
            MembershipMode::Any => needles.iter().any(present),
            MembershipMode::None => !needles.iter().any(present),
        }
    }
}

struct Affix {
    suffix: bool,
}

impl OperatorHandler for Affix {
    fn apply(&self, field: &Value, expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        if field.is_null() {
            return false;
        }
        let text = to_text(field);
        let affix = to_text(expected);
        if self.suffix {
            text.ends_with(&affix)
        } else {
            text.starts_with(&affix)
        }
    }
}

struct RegexHandler;

impl OperatorHandler for RegexHandler {
    fn apply(&self, field: &Value, expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        let (pattern, flags) = match expected {
            Value::String(p) => (p.as_str(), ""),
            Value::Object(obj) => match obj.get("pattern").and_then(Value::as_str) {
                Some(p) => (p, obj.get("flags").and_then(Value::as_str).unwrap_or("")),
                None => return false,
            },
            _ => return false,
        };

        let mut builder = RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                // g, u and y have no effect on a single match test
                _ => {}
            }
        }
        let Ok(re) = builder.build() else {
            return false;
        };

        to_array(field)
            .iter()
            .any(|item| re.is_match(&to_text(item)))
    }
}

struct Presence {
    expect: bool,
}

impl OperatorHandler for Presence {
    fn apply(&self, field: &Value, _expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        has_value(field) == self.expect
    }
}

struct FileContainsHandler;

impl OperatorHandler for FileContainsHandler {
    fn apply(&self, field: &Value, expected: &Value, ctx: &OperatorContext<'_>) -> bool {
        let needle = to_text(expected);
        to_array(field).iter().any(|file| {
            ctx.file_decoder
                .decode(file)
                .is_some_and(|content| content.contains(&needle))
        })
    }
}

struct ArrayLength(fn(i64, i64) -> bool);

impl OperatorHandler for ArrayLength {
    fn apply(&self, field: &Value, expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        let Value::Array(items) = field else {
            return false;
        };
        match to_integer(expected) {
            Some(n) => (self.0)(items.len() as i64, n),
            None => false,
        }
    }
}

struct TimeCompare(fn(i64, i64) -> bool);

impl OperatorHandler for TimeCompare {
    fn apply(&self, field: &Value, expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        match (parse_time(field), parse_time(expected)) {
            (Some(a), Some(b)) => (self.0)(a, b),
            _ => false,
        }
    }
}

struct CheckedHandler {
    expect: bool,
}

impl OperatorHandler for CheckedHandler {
    fn apply(&self, field: &Value, _expected: &Value, _ctx: &OperatorContext<'_>) -> bool {
        to_checked(field) == self.expect
    }
}
