// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared collaborators for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use formflow_engine::formflow_dsl::{FormConfig, FormField, ValueBag, parse_form_config};
use formflow_engine::{
    ActionError, AiClient, AiOptions, Collaborators, DocumentStore, EngineConfig, FileHandle,
    FileMetadata, FormService, MemoryDocumentStore, Notifier, StoreError, TextMutator,
    UserInteraction,
};

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Answers suggestions with a fixed choice; `None` dismisses.
pub struct ScriptedInteraction {
    pub choice: Option<Value>,
}

#[async_trait]
impl UserInteraction for ScriptedInteraction {
    async fn suggest(
        &self,
        _placeholder: Option<&str>,
        _options: &[Value],
    ) -> Result<Option<Value>, ActionError> {
        Ok(self.choice.clone())
    }

    async fn collect(&self, _fields: &[FormField]) -> Result<Option<ValueBag>, ActionError> {
        Ok(self.choice.as_ref().map(|_| ValueBag::new()))
    }

    async fn open_form(
        &self,
        form: &FormConfig,
        defaults: &ValueBag,
    ) -> Result<Option<ValueBag>, ActionError> {
        let _ = form;
        Ok(self.choice.as_ref().map(|_| defaults.clone()))
    }
}

/// AI client that echoes the prompt in upper case.
pub struct ShoutingAi;

#[async_trait]
impl AiClient for ShoutingAi {
    async fn invoke(&self, prompt: &str, _options: &AiOptions) -> Result<String, ActionError> {
        Ok(prompt.to_uppercase())
    }
}

/// Store whose first `failures` file creations fail with an I/O error.
pub struct FlakyStore {
    pub inner: Arc<MemoryDocumentStore>,
    failures: AtomicU32,
    pub create_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryDocumentStore>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
            create_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get_file_by_path(&self, path: &str) -> Result<Option<FileHandle>, StoreError> {
        self.inner.get_file_by_path(path).await
    }

    async fn read_file(&self, file: &FileHandle) -> Result<String, StoreError> {
        self.inner.read_file(file).await
    }

    async fn write_file(&self, file: &FileHandle, mutator: TextMutator) -> Result<(), StoreError> {
        self.inner.write_file(file, mutator).await
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<FileHandle, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Io(std::io::Error::other("disk hiccup")));
        }
        self.inner.create_file(path, content).await
    }

    async fn list_files(&self) -> Result<Vec<FileHandle>, StoreError> {
        self.inner.list_files().await
    }

    async fn list_folders(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_folders().await
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<FileMetadata>, StoreError> {
        self.inner.get_metadata(path).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryDocumentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: FormService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryDocumentStore::new()))
    }

    pub fn with_store(store: Arc<MemoryDocumentStore>) -> Self {
        Self::build(store.clone(), Collaborators::new(store), EngineConfig::default())
    }

    pub fn build(
        store: Arc<MemoryDocumentStore>,
        collaborators: Collaborators,
        config: EngineConfig,
    ) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let collaborators = collaborators.with_notifier(notifier.clone());
        Self {
            store,
            notifier,
            service: FormService::new(collaborators, config.with_default_retry_delay_ms(0)),
        }
    }
}

pub fn form(json: Value) -> FormConfig {
    parse_form_config(&json).expect("test form parses")
}

pub fn values(json: Value) -> ValueBag {
    match json {
        Value::Object(map) => map,
        _ => ValueBag::new(),
    }
}
