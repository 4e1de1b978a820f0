// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory document store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{frontmatter_range, normalize_path, parent_folders};
use crate::collaborators::{DocumentStore, FileHandle, FileMetadata, TextMutator};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, String>,
    folders: BTreeSet<String>,
}

/// Document store backed by a map. Used by tests and embedders that keep
/// notes elsewhere.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(path, content)` pairs.
    pub fn with_files<I, P, C>(files: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut inner = Inner::default();
        for (path, content) in files {
            let path = normalize_path(path.as_ref())?;
            inner.folders.extend(parent_folders(&path));
            inner.files.insert(path, content.into());
        }
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Current content of a file, if present.
    pub async fn content(&self, path: &str) -> Option<String> {
        let path = normalize_path(path).ok()?;
        self.inner.read().await.files.get(&path).cloned()
    }

    pub async fn file_count(&self) -> usize {
        self.inner.read().await.files.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_file_by_path(&self, path: &str) -> Result<Option<FileHandle>, StoreError> {
        let path = normalize_path(path)?;
        let inner = self.inner.read().await;
        Ok(inner.files.contains_key(&path).then(|| FileHandle::new(path)))
    }

    async fn read_file(&self, file: &FileHandle) -> Result<String, StoreError> {
        self.inner
            .read()
            .await
            .files
            .get(&file.path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(file.path.clone()))
    }

    async fn write_file(&self, file: &FileHandle, mutator: TextMutator) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let current = inner
            .files
            .get_mut(&file.path)
            .ok_or_else(|| StoreError::NotFound(file.path.clone()))?;
        let updated = mutator(std::mem::take(current));
        *current = updated;
        Ok(())
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<FileHandle, StoreError> {
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().await;
        if inner.files.contains_key(&path) {
            return Err(StoreError::AlreadyExists(path));
        }
        let folders = parent_folders(&path);
        inner.folders.extend(folders);
        inner.files.insert(path.clone(), content.to_string());
        Ok(FileHandle::new(path))
    }

    async fn list_files(&self) -> Result<Vec<FileHandle>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .files
            .keys()
            .map(|p| FileHandle::new(p.clone()))
            .collect())
    }

    async fn list_folders(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.read().await.folders.iter().cloned().collect())
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<FileMetadata>, StoreError> {
        let path = normalize_path(path)?;
        let inner = self.inner.read().await;
        Ok(inner.files.get(&path).map(|text| FileMetadata {
            frontmatter_range: frontmatter_range(text),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_read_write() {
        let store = MemoryDocumentStore::new();
        let handle = store.create_file("notes/a.md", "one").await.unwrap();
        assert_eq!(handle.path, "notes/a.md");

        assert!(matches!(
            store.create_file("notes/a.md", "two").await,
            Err(StoreError::AlreadyExists(_))
        ));

        store
            .write_file(&handle, Box::new(|text| format!("{text}\ntwo")))
            .await
            .unwrap();
        assert_eq!(store.read_file(&handle).await.unwrap(), "one\ntwo");
        assert_eq!(store.list_folders().await.unwrap(), vec!["notes"]);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let store = MemoryDocumentStore::new();
        assert!(store.get_file_by_path("x.md").await.unwrap().is_none());
        assert!(matches!(
            store.read_file(&FileHandle::new("x.md")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.get_metadata("x.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metadata_reports_frontmatter() {
        let store = MemoryDocumentStore::with_files([("a.md", "---\nx: 1\n---\nbody")]).unwrap();
        let meta = store.get_metadata("a.md").await.unwrap().unwrap();
        assert_eq!(meta.frontmatter_range.map(|r| r.end), Some(13));
    }
}
