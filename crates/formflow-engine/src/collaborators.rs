// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Interfaces the engine consumes from its host.
//!
//! The engine never touches files, models or the screen directly. Every side
//! effect goes through one of these traits so that the host application (or
//! a test) decides where notes live, which model answers prompts and how the
//! user is asked for input.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use formflow_dsl::{FormConfig, FormField, ValueBag};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ActionError, StoreError};

/// Handle to a file in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHandle {
    /// Store-relative path using `/` separators
    pub path: String,
}

impl FileHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// File name without its folder.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Byte range of the `---` fenced frontmatter block at the start of a note.
/// `end` points just past the closing fence line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontmatterRange {
    pub start: usize,
    pub end: usize,
}

/// Cached metadata of a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub frontmatter_range: Option<FrontmatterRange>,
}

/// Rewrites a file's text in one step.
pub type TextMutator = Box<dyn FnOnce(String) -> String + Send>;

/// Note storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Look up a file; `Ok(None)` when nothing exists at `path`.
    async fn get_file_by_path(&self, path: &str) -> Result<Option<FileHandle>, StoreError>;

    async fn read_file(&self, file: &FileHandle) -> Result<String, StoreError>;

    /// Replace the file's text with `mutator(current_text)`.
    async fn write_file(&self, file: &FileHandle, mutator: TextMutator) -> Result<(), StoreError>;

    /// Create a new file, creating missing parent folders.
    /// Fails with [`StoreError::AlreadyExists`] when the path is taken.
    async fn create_file(&self, path: &str, content: &str) -> Result<FileHandle, StoreError>;

    async fn list_files(&self) -> Result<Vec<FileHandle>, StoreError>;

    async fn list_folders(&self) -> Result<Vec<String>, StoreError>;

    async fn get_metadata(&self, path: &str) -> Result<Option<FileMetadata>, StoreError>;
}

/// Options passed through to the AI collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiOptions {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
}

/// AI invocation contract.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn invoke(&self, prompt: &str, options: &AiOptions) -> Result<String, ActionError>;
}

/// AI client used when the host configures none.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredAi;

#[async_trait]
impl AiClient for UnconfiguredAi {
    async fn invoke(&self, _prompt: &str, _options: &AiOptions) -> Result<String, ActionError> {
        Err(ActionError::Ai("no AI provider configured".to_string()))
    }
}

/// Prompts shown to the user while a chain runs.
///
/// Every method returns `Ok(None)` when the user dismisses the prompt.
#[async_trait]
pub trait UserInteraction: Send + Sync {
    /// Let the user pick one option.
    async fn suggest(
        &self,
        placeholder: Option<&str>,
        options: &[Value],
    ) -> Result<Option<Value>, ActionError>;

    /// Ask for values of additional fields.
    async fn collect(&self, fields: &[FormField]) -> Result<Option<ValueBag>, ActionError>;

    /// Show a form prefilled with `defaults` and return what the user submitted.
    async fn open_form(
        &self,
        form: &FormConfig,
        defaults: &ValueBag,
    ) -> Result<Option<ValueBag>, ActionError>;
}

/// Non-interactive answers: first option, field defaults, form defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessInteraction;

#[async_trait]
impl UserInteraction for HeadlessInteraction {
    async fn suggest(
        &self,
        _placeholder: Option<&str>,
        options: &[Value],
    ) -> Result<Option<Value>, ActionError> {
        Ok(options.first().cloned())
    }

    async fn collect(&self, fields: &[FormField]) -> Result<Option<ValueBag>, ActionError> {
        Ok(Some(
            fields
                .iter()
                .filter_map(|f| f.default_value.clone().map(|v| (f.id.clone(), v)))
                .collect(),
        ))
    }

    async fn open_form(
        &self,
        _form: &FormConfig,
        defaults: &ValueBag,
    ) -> Result<Option<ValueBag>, ActionError> {
        Ok(Some(defaults.clone()))
    }
}

/// User-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(message, "Notification");
    }
}

/// Extracts text from encoded file references held in field values.
pub trait FileDecoder: Send + Sync {
    fn decode(&self, value: &Value) -> Option<String>;
}

/// Decodes `{content, filename?, mimeType?}` objects with base64 content.
/// Plain strings are taken as already-decoded text.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64FileDecoder;

impl FileDecoder for Base64FileDecoder {
    fn decode(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => {
                let content = obj.get("content")?.as_str()?;
                // Data URLs carry a `data:<mime>;base64,` prefix
                let payload = content
                    .split_once(";base64,")
                    .map(|(_, data)| data)
                    .unwrap_or(content);
                match BASE64.decode(payload.trim()) {
                    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) => {
                        let filename = obj.get("filename").and_then(Value::as_str);
                        warn!(filename, error = %e, "File reference is not valid base64");
                        None
                    }
                }
            }
            _ => None,
        }
    }
}

/// Everything the engine needs from its host.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DocumentStore>,
    pub ai: Arc<dyn AiClient>,
    pub interaction: Arc<dyn UserInteraction>,
    pub notifier: Arc<dyn Notifier>,
    pub file_decoder: Arc<dyn FileDecoder>,
}

impl Collaborators {
    /// Collaborators around `store` with headless defaults for the rest.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            ai: Arc::new(UnconfiguredAi),
            interaction: Arc::new(HeadlessInteraction),
            notifier: Arc::new(LogNotifier),
            file_decoder: Arc::new(Base64FileDecoder),
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiClient>) -> Self {
        self.ai = ai;
        self
    }

    pub fn with_interaction(mut self, interaction: Arc<dyn UserInteraction>) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_file_decoder(mut self, decoder: Arc<dyn FileDecoder>) -> Self {
        self.file_decoder = decoder;
        self
    }
}
