// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Effects of the leaf actions.

use formflow_dsl::{
    AiAction, ButtonAction, ConflictStrategy, CreateFileAction, GenerateFormAction,
    InsertPosition, InsertTextAction, SuggestModalAction, TextTransform, TextTransformAction,
};
use serde_json::Value;
use tracing::{debug, info};

use super::{ExecutionContext, Failure, Flow};
use crate::collaborators::AiOptions;
use crate::error::ActionError;
use crate::template;

/// Highest numeric suffix tried when renaming around an existing file
const MAX_RENAME_SUFFIX: u32 = 999;

/// Append `.md` when the file name has no extension.
fn with_default_extension(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.contains('.') {
        path.to_string()
    } else {
        format!("{}.md", path)
    }
}

fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim().trim_matches('/');
    let name = name.trim().trim_start_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// `name 1.md`, `name 2.md`, ... for `name.md`.
fn numbered_path(path: &str, n: u32) -> String {
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, path),
    };
    let numbered = match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{} {}.{}", stem, n, ext),
        None => format!("{} {}", name, n),
    };
    match dir {
        Some(dir) => format!("{}/{}", dir, numbered),
        None => numbered,
    }
}

pub(super) async fn create_file(
    action: &CreateFileAction,
    ctx: &mut ExecutionContext,
) -> Result<Flow, Failure> {
    let name = ctx.expand(&action.file_name);
    if name.trim().is_empty() {
        return Err(ActionError::validation("file name is empty").into());
    }
    let path = with_default_extension(&join_path(&ctx.expand(&action.folder), &name));
    let content = ctx.expand(&action.content);
    let store = ctx.collaborators.store.clone();

    let created = match store.get_file_by_path(&path).await? {
        None => store.create_file(&path, &content).await?.path,
        Some(existing) => match action.conflict {
            ConflictStrategy::Skip => {
                info!(path = %existing.path, "File exists, leaving it untouched");
                existing.path
            }
            ConflictStrategy::Overwrite => {
                store
                    .write_file(&existing, Box::new(move |_| content))
                    .await?;
                existing.path
            }
            ConflictStrategy::Rename => {
                let mut created = None;
                for n in 1..=MAX_RENAME_SUFFIX {
                    let candidate = numbered_path(&path, n);
                    if store.get_file_by_path(&candidate).await?.is_none() {
                        created = Some(store.create_file(&candidate, &content).await?.path);
                        break;
                    }
                }
                created.ok_or_else(|| {
                    ActionError::validation(format!("no free file name near '{}'", path))
                })?
            }
        },
    };

    debug!(path = %created, "Note ready");
    if let Some(var) = &action.output_variable {
        ctx.variables.insert(var.clone(), Value::String(created));
    }
    Ok(Flow::Next)
}

/// Offset of the line after the heading named `heading`.
fn after_heading(text: &str, heading: &str) -> Option<usize> {
    let wanted = heading.trim().trim_start_matches('#').trim();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed.starts_with('#') && trimmed.trim_start_matches('#').trim() == wanted {
            return Some(offset + line.len());
        }
        offset += line.len();
    }
    None
}

/// Insert `content` at `offset`, on its own line.
fn insert_at(text: &str, offset: usize, content: &str) -> String {
    let (head, tail) = text.split_at(offset);
    let mut out = String::with_capacity(text.len() + content.len() + 2);
    out.push_str(head);
    if !head.is_empty() && !head.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(content);
    if !tail.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(tail);
    out
}

pub(super) async fn insert_text(
    action: &InsertTextAction,
    ctx: &mut ExecutionContext,
) -> Result<Flow, Failure> {
    let path = with_default_extension(&ctx.expand(&action.file_path));
    let content = ctx.expand(&action.content);
    let store = ctx.collaborators.store.clone();

    let Some(file) = store.get_file_by_path(&path).await? else {
        if action.create_if_missing {
            store.create_file(&path, &content).await?;
            return Ok(Flow::Next);
        }
        return Err(crate::error::StoreError::NotFound(path).into());
    };

    let offset_hint = match action.position {
        InsertPosition::Top => store
            .get_metadata(&path)
            .await?
            .and_then(|m| m.frontmatter_range)
            .map(|r| r.end)
            .unwrap_or(0),
        InsertPosition::Bottom => 0,
        InsertPosition::AfterHeading => {
            let heading = action
                .heading
                .as_deref()
                .map(|h| ctx.expand(h))
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| ActionError::validation("afterHeading needs a heading"))?;
            let text = store.read_file(&file).await?;
            if after_heading(&text, &heading).is_none() {
                return Err(ActionError::validation(format!(
                    "heading '{}' not found in {}",
                    heading, path
                ))
                .into());
            }
            let position = action.position;
            store
                .write_file(
                    &file,
                    Box::new(move |text| {
                        let offset = after_heading(&text, &heading).unwrap_or(text.len());
                        debug!(?position, offset, "Inserting text");
                        insert_at(&text, offset, &content)
                    }),
                )
                .await?;
            return Ok(Flow::Next);
        }
    };

    let position = action.position;
    store
        .write_file(
            &file,
            Box::new(move |text| match position {
                InsertPosition::Bottom => insert_at(&text, text.len(), &content),
                _ => insert_at(&text, offset_hint.min(text.len()), &content),
            }),
        )
        .await?;
    Ok(Flow::Next)
}

/// Lowercase, ASCII alphanumerics kept, everything else collapsed to `-`.
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

pub(crate) fn transform_text(text: &str, transform: TextTransform) -> String {
    match transform {
        TextTransform::Upper => text.to_uppercase(),
        TextTransform::Lower => text.to_lowercase(),
        TextTransform::Trim => text.trim().to_string(),
        TextTransform::Capitalize => {
            let mut chars = text.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        TextTransform::Slug => slugify(text),
    }
}

pub(super) fn text_transform(
    action: &TextTransformAction,
    ctx: &mut ExecutionContext,
) -> Result<Flow, Failure> {
    let source = ctx.expand(&action.source);
    let result = transform_text(&source, action.transform);
    ctx.variables
        .insert(action.output_variable.clone(), Value::String(result));
    Ok(Flow::Next)
}

pub(super) async fn ai(action: &AiAction, ctx: &mut ExecutionContext) -> Result<Flow, Failure> {
    let prompt = ctx.expand(&action.prompt);
    let options = AiOptions {
        system_prompt: action.system_prompt.as_deref().map(|s| ctx.expand(s)),
        model: action.model.clone(),
    };
    let response = ctx.collaborators.ai.clone().invoke(&prompt, &options).await?;
    if let Some(var) = &action.output_variable {
        ctx.variables.insert(var.clone(), Value::String(response));
    }
    Ok(Flow::Next)
}

/// Turn a resolved list source into items: arrays as-is, JSON array text
/// parsed, other text split into non-empty lines, other scalars as one item.
pub(crate) fn to_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.starts_with('[')
                && let Ok(Value::Array(items)) = serde_json::from_str(trimmed)
            {
                return items;
            }
            trimmed
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| Value::String(line.to_string()))
                .collect()
        }
        other => vec![other],
    }
}

pub(super) async fn suggest_modal(
    action: &SuggestModalAction,
    ctx: &mut ExecutionContext,
) -> Result<Flow, Failure> {
    let options = to_items(template::expand_json(&action.options, &ctx.template()));
    let placeholder = action.placeholder.as_deref().map(|p| ctx.expand(p));
    let choice = ctx
        .collaborators
        .interaction
        .clone()
        .suggest(placeholder.as_deref(), &options)
        .await?
        .ok_or(ActionError::Dismissed)?;
    ctx.variables.insert(action.output_variable.clone(), choice);
    Ok(Flow::Next)
}

pub(super) async fn generate_form(
    action: &GenerateFormAction,
    ctx: &mut ExecutionContext,
) -> Result<Flow, Failure> {
    let answers = ctx
        .collaborators
        .interaction
        .clone()
        .collect(&action.fields)
        .await?
        .ok_or(ActionError::Dismissed)?;
    for field in &action.fields {
        ctx.field_ids.insert(field.label.clone(), field.id.clone());
    }
    ctx.values.extend(answers);
    Ok(Flow::Next)
}

pub(super) async fn button(action: &ButtonAction, ctx: &mut ExecutionContext) -> Result<Flow, Failure> {
    let launcher = ctx
        .launcher
        .clone()
        .ok_or_else(|| ActionError::validation("no form launcher available"))?;
    let form_path = ctx.expand(&action.form_path);
    launcher
        .launch(&form_path, action.mode, &ctx.parent_execution())
        .await?;
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use formflow_dsl::{ActionCommon, FormConfig, ValueBag};
    use tokio_util::sync::CancellationToken;

    use crate::collaborators::{Collaborators, DocumentStore};
    use crate::config::EngineConfig;
    use crate::store::MemoryDocumentStore;

    fn context(store: Arc<MemoryDocumentStore>) -> ExecutionContext {
        ExecutionContext::new(
            Arc::new(FormConfig::default()),
            ValueBag::new(),
            Collaborators::new(store),
            EngineConfig::default(),
            CancellationToken::new(),
        )
    }

    fn create(file_name: &str, conflict: ConflictStrategy) -> CreateFileAction {
        CreateFileAction {
            common: ActionCommon::new("create"),
            folder: "inbox".to_string(),
            file_name: file_name.to_string(),
            content: "body".to_string(),
            conflict,
            output_variable: Some("path".to_string()),
        }
    }

    fn insert(position: InsertPosition, heading: Option<&str>) -> InsertTextAction {
        InsertTextAction {
            common: ActionCommon::new("insert"),
            file_path: "note".to_string(),
            content: "NEW".to_string(),
            position,
            heading: heading.map(str::to_string),
            create_if_missing: false,
        }
    }

    #[tokio::test]
    async fn test_create_file_conflicts() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut ctx = context(store.clone());

        create_file(&create("idea", ConflictStrategy::Rename), &mut ctx).await.unwrap();
        assert_eq!(ctx.variables["path"], "inbox/idea.md");

        create_file(&create("idea", ConflictStrategy::Rename), &mut ctx).await.unwrap();
        assert_eq!(ctx.variables["path"], "inbox/idea 1.md");

        create_file(&create("idea", ConflictStrategy::Skip), &mut ctx).await.unwrap();
        assert_eq!(ctx.variables["path"], "inbox/idea.md");
        assert_eq!(store.file_count().await, 2);

        let mut overwrite = create("idea", ConflictStrategy::Overwrite);
        overwrite.content = "replaced".to_string();
        create_file(&overwrite, &mut ctx).await.unwrap();
        assert_eq!(store.content("inbox/idea.md").await.unwrap(), "replaced");
    }

    #[tokio::test]
    async fn test_create_file_rejects_empty_name() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut ctx = context(store);
        let result = create_file(&create("  ", ConflictStrategy::Rename), &mut ctx).await;
        assert!(matches!(result, Err(Failure::Action(ActionError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_insert_positions() {
        let store = Arc::new(
            MemoryDocumentStore::with_files([(
                "note.md",
                "---\ntags: [x]\n---\n# Log\nold\n# Other\n",
            )])
            .unwrap(),
        );
        let mut ctx = context(store.clone());

        insert_text(&insert(InsertPosition::Top, None), &mut ctx).await.unwrap();
        assert_eq!(
            store.content("note.md").await.unwrap(),
            "---\ntags: [x]\n---\nNEW\n# Log\nold\n# Other\n"
        );

        insert_text(&insert(InsertPosition::AfterHeading, Some("## Log")), &mut ctx)
            .await
            .unwrap();
        assert_eq!(
            store.content("note.md").await.unwrap(),
            "---\ntags: [x]\n---\nNEW\n# Log\nNEW\nold\n# Other\n"
        );

        insert_text(&insert(InsertPosition::Bottom, None), &mut ctx).await.unwrap();
        assert!(store.content("note.md").await.unwrap().ends_with("# Other\nNEW"));

        let missing = insert_text(&insert(InsertPosition::AfterHeading, Some("Nope")), &mut ctx).await;
        assert!(matches!(missing, Err(Failure::Action(ActionError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_insert_creates_missing_file_when_asked() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut ctx = context(store.clone());

        let mut action = insert(InsertPosition::Bottom, None);
        assert!(insert_text(&action, &mut ctx).await.is_err());

        action.create_if_missing = true;
        insert_text(&action, &mut ctx).await.unwrap();
        assert!(store.get_file_by_path("note.md").await.unwrap().is_some());
    }

    #[test]
    fn test_transforms() {
        assert_eq!(transform_text("hello", TextTransform::Capitalize), "Hello");
        assert_eq!(transform_text("  x ", TextTransform::Trim), "x");
        assert_eq!(transform_text("Été -- Notes!", TextTransform::Slug), "été-notes");
        assert_eq!(transform_text("", TextTransform::Capitalize), "");
    }

    #[test]
    fn test_to_items() {
        assert_eq!(to_items(Value::String("a\n\n b \n".into())), vec!["a", "b"]);
        assert_eq!(to_items(Value::String("[1, 2]".into())), vec![1, 2]);
        assert_eq!(to_items(Value::from(5)), vec![5]);
        assert!(to_items(Value::Null).is_empty());
    }

    #[test]
    fn test_paths() {
        assert_eq!(with_default_extension("a/b"), "a/b.md");
        assert_eq!(with_default_extension("a.b/c.txt"), "a.b/c.txt");
        assert_eq!(numbered_path("x/idea.md", 2), "x/idea 2.md");
        assert_eq!(join_path("/inbox/", "idea"), "inbox/idea");
    }
}
