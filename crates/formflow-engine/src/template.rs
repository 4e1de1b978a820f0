// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `{{...}}` template expansion.
//!
//! Recognised references:
//! - `{{date}}`, `{{date:FORMAT}}`, `{{time}}`, `{{time:FORMAT}}` with
//!   moment-style format tokens
//! - `{{random:N}}`: N random alphanumeric characters, N at most 1024
//! - `{{@field}}`: form value by field id or label
//! - `{{output:name}}`: output variable
//! - `{{name}}` / `{{name.path}}`: loop variable, then output variable
//!
//! Anything else is left verbatim.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Local};
use formflow_dsl::ValueBag;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::conditions::coercion::to_text;
use crate::scope::LoopScope;

/// Longest `{{random:N}}` expansion; larger N stays verbatim.
const MAX_RANDOM_LEN: usize = 1024;

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("reference pattern is valid"));

/// Where template references are resolved.
pub struct TemplateContext<'a> {
    /// Form values keyed by field id
    pub values: &'a ValueBag,
    /// Field ids keyed by label
    pub field_ids: &'a HashMap<String, String>,
    /// Output variables written by earlier actions
    pub variables: &'a ValueBag,
    pub scope: &'a LoopScope,
}

impl TemplateContext<'_> {
    /// Form value by field id, falling back to the field label.
    pub fn form_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key).or_else(|| {
            self.field_ids
                .get(key)
                .and_then(|id| self.values.get(id))
        })
    }

    /// Loop variable or output variable, with dotted paths.
    pub fn variable(&self, path: &str) -> Option<&Value> {
        self.scope
            .resolve_path(path)
            .or_else(|| resolve_in(self.variables, path))
    }

    /// Resolve one reference body (the text between the braces) to a value.
    fn resolve(&self, reference: &str, now: DateTime<Local>) -> Option<Value> {
        if let Some(key) = reference.strip_prefix('@') {
            return self.form_value(key.trim()).cloned();
        }
        if let Some(name) = reference.strip_prefix("output:") {
            return resolve_in(self.variables, name.trim()).cloned();
        }

        let (head, arg) = match reference.split_once(':') {
            Some((head, arg)) => (head.trim(), Some(arg)),
            None => (reference, None),
        };
        match (head, arg) {
            ("date", None) => return Some(Value::String(now.format("%Y-%m-%d").to_string())),
            ("time", None) => return Some(Value::String(now.format("%H:%M").to_string())),
            ("date" | "time", Some(format)) => {
                return format_moment(now, format).map(Value::String);
            }
            ("random", Some(len)) => {
                let len: usize = len.trim().parse().ok()?;
                if len > MAX_RANDOM_LEN {
                    return None;
                }
                let text: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(len)
                    .map(char::from)
                    .collect();
                return Some(Value::String(text));
            }
            (_, Some(_)) => return None,
            _ => {}
        }

        self.variable(reference).cloned()
    }
}

fn resolve_in<'v>(bag: &'v ValueBag, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let root = bag.get(segments.next()?)?;
    segments.try_fold(root, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Text form of a resolved value. Lists of scalars are joined with `, `.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Array(items) if items.iter().all(|v| !v.is_array() && !v.is_object()) => items
            .iter()
            .map(to_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => to_text(other),
    }
}

/// Expand every reference in `template` into text.
pub fn expand(template: &str, ctx: &TemplateContext<'_>) -> String {
    expand_at(template, ctx, Local::now())
}

/// [`expand`] with a fixed clock.
pub fn expand_at(template: &str, ctx: &TemplateContext<'_>, now: DateTime<Local>) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    REFERENCE
        .replace_all(template, |caps: &Captures<'_>| {
            match ctx.resolve(&caps[1], now) {
                Some(value) => render_value(&value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Expand a template, keeping the raw value when the template is exactly one
/// reference (so `{{@tags}}` yields the list itself, not its text).
pub fn expand_value(template: &str, ctx: &TemplateContext<'_>) -> Value {
    let trimmed = template.trim();
    if let Some(caps) = REFERENCE.captures(trimmed)
        && caps.get(0).is_some_and(|m| m.as_str().len() == trimmed.len())
        && let Some(value) = ctx.resolve(&caps[1], Local::now())
    {
        return value;
    }
    Value::String(expand(template, ctx))
}

/// Expand templates inside every string of a JSON value.
pub fn expand_json(value: &Value, ctx: &TemplateContext<'_>) -> Value {
    match value {
        Value::String(s) => expand_value(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_json(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_json(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Format `now` with a moment-style format string. `None` if the result
/// cannot be rendered.
pub fn format_moment(now: DateTime<Local>, format: &str) -> Option<String> {
    let strftime = moment_to_chrono_format(format);
    let mut out = String::new();
    write!(out, "{}", now.format(&strftime)).ok()?;
    Some(out)
}

/// Convert moment-style tokens to a chrono strftime string.
/// Text inside `[...]` is copied literally.
fn moment_to_chrono_format(format: &str) -> String {
    let mut result = String::with_capacity(format.len() * 2);
    let mut rest = format;

    while let Some(c) = rest.chars().next() {
        if c == '['
            && let Some(close) = rest.find(']')
        {
            push_literal(&mut result, &rest[1..close]);
            rest = &rest[close + 1..];
            continue;
        }
        if let Some((token_len, chrono_token)) = match_token(rest) {
            result.push_str(chrono_token);
            rest = &rest[token_len..];
        } else {
            push_literal(&mut result, &rest[..c.len_utf8()]);
            rest = &rest[c.len_utf8()..];
        }
    }

    result
}

fn push_literal(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
    }
}

/// Longest moment token at the start of `s`.
fn match_token(s: &str) -> Option<(usize, &'static str)> {
    static TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("MMMM", "%B"),
        ("dddd", "%A"),
        ("MMM", "%b"),
        ("ddd", "%a"),
        ("SSS", "%3f"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("hh", "%I"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("ZZ", "%z"),
        ("M", "%-m"),
        ("D", "%-d"),
        ("H", "%-H"),
        ("h", "%-I"),
        ("m", "%-M"),
        ("s", "%-S"),
        ("d", "%w"),
        ("A", "%p"),
        ("a", "%P"),
        ("Z", "%:z"),
        ("X", "%s"),
    ];

    TOKENS
        .iter()
        .find(|(moment, _)| s.starts_with(moment))
        .map(|(moment, chrono)| (moment.len(), *chrono))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeFrame;
    use chrono::TimeZone;
    use serde_json::json;

    fn bag(value: Value) -> ValueBag {
        match value {
            Value::Object(map) => map,
            _ => ValueBag::new(),
        }
    }

    struct Fixture {
        values: ValueBag,
        field_ids: HashMap<String, String>,
        variables: ValueBag,
        scope: LoopScope,
    }

    impl Fixture {
        fn new() -> Self {
            let mut field_ids = HashMap::new();
            field_ids.insert("Title".to_string(), "title".to_string());
            Self {
                values: bag(json!({"title": "Weekly", "tags": ["a", "b"]})),
                field_ids,
                variables: bag(json!({"summary": "done", "meta": {"count": 3}})),
                scope: LoopScope::new(),
            }
        }

        fn ctx(&self) -> TemplateContext<'_> {
            TemplateContext {
                values: &self.values,
                field_ids: &self.field_ids,
                variables: &self.variables,
                scope: &self.scope,
            }
        }
    }

    #[test]
    fn test_form_references() {
        let f = Fixture::new();
        assert_eq!(expand("# {{@Title}}", &f.ctx()), "# Weekly");
        assert_eq!(expand("{{ @title }}", &f.ctx()), "Weekly");
        assert_eq!(expand("{{@tags}}", &f.ctx()), "a, b");
        assert_eq!(expand_value("{{@tags}}", &f.ctx()), json!(["a", "b"]));
    }

    #[test]
    fn test_scope_shadows_output_variables() {
        let mut f = Fixture::new();
        assert_eq!(expand("{{summary}}", &f.ctx()), "done");
        f.scope
            .push(ScopeFrame::new(bag(json!({"summary": "loop", "item": {"n": 1}}))));
        assert_eq!(expand("{{summary}} {{item.n}}", &f.ctx()), "loop 1");
        assert_eq!(expand("{{output:summary}}", &f.ctx()), "done");
        assert_eq!(expand("{{output:meta.count}}", &f.ctx()), "3");
    }

    #[test]
    fn test_unknown_references_stay_verbatim() {
        let f = Fixture::new();
        assert_eq!(expand("{{nope}} {{@Missing}}", &f.ctx()), "{{nope}} {{@Missing}}");
        assert_eq!(expand("{{random:x}}", &f.ctx()), "{{random:x}}");
        assert_eq!(expand("{{weird:thing}}", &f.ctx()), "{{weird:thing}}");
    }

    #[test]
    fn test_dates() {
        let f = Fixture::new();
        let now = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).single().unwrap();
        assert_eq!(expand_at("{{date}} {{time}}", &f.ctx(), now), "2024-03-07 09:05");
        assert_eq!(
            expand_at("{{date:DD/MM/YYYY}}", &f.ctx(), now),
            "07/03/2024"
        );
        assert_eq!(
            expand_at("{{date:dddd, MMMM D}}", &f.ctx(), now),
            "Thursday, March 7"
        );
        assert_eq!(expand_at("{{time:HH:mm:ss}}", &f.ctx(), now), "09:05:02");
        assert_eq!(
            expand_at("{{date:[Week of] YYYY 100%}}", &f.ctx(), now),
            "Week of 2024 100%"
        );
    }

    #[test]
    fn test_random() {
        let f = Fixture::new();
        let text = expand("{{random:12}}", &f.ctx());
        assert_eq!(text.len(), 12);
        assert!(text.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_random_length_is_capped() {
        let f = Fixture::new();
        assert_eq!(expand("{{random:1024}}", &f.ctx()).len(), 1024);
        assert_eq!(
            expand("{{random:99999999999}}", &f.ctx()),
            "{{random:99999999999}}"
        );
    }

    #[test]
    fn test_expand_json() {
        let f = Fixture::new();
        let expanded = expand_json(&json!({"a": ["{{@title}}", 1], "b": "x {{summary}}"}), &f.ctx());
        assert_eq!(expanded, json!({"a": ["Weekly", 1], "b": "x done"}));
    }
}
