// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filesystem document store rooted at a vault directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{frontmatter_range, normalize_path};
use crate::collaborators::{DocumentStore, FileHandle, FileMetadata, TextMutator};
use crate::error::StoreError;

/// Stores notes as files below a root directory. Hidden entries (names
/// starting with `.`) are not listed.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf), StoreError> {
        let normalized = normalize_path(path)?;
        let full = normalized
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment));
        Ok((normalized, full))
    }

    /// Walk the vault, returning (files, folders) as store-relative paths.
    async fn walk(&self) -> Result<(Vec<String>, Vec<String>), StoreError> {
        let mut files = Vec::new();
        let mut folders = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let relative = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    folders.push(relative.clone());
                    pending.push((entry.path(), relative));
                } else if file_type.is_file() {
                    files.push(relative);
                }
            }
        }

        files.sort();
        folders.sort();
        Ok((files, folders))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn get_file_by_path(&self, path: &str) -> Result<Option<FileHandle>, StoreError> {
        let (normalized, full) = self.resolve(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => Ok(Some(FileHandle::new(normalized))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_file(&self, file: &FileHandle) -> Result<String, StoreError> {
        let (_, full) = self.resolve(&file.path)?;
        tokio::fs::read_to_string(&full).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(file.path.clone()),
            _ => StoreError::Io(e),
        })
    }

    async fn write_file(&self, file: &FileHandle, mutator: TextMutator) -> Result<(), StoreError> {
        let current = self.read_file(file).await?;
        let (_, full) = self.resolve(&file.path)?;
        tokio::fs::write(&full, mutator(current)).await?;
        debug!(path = %file.path, "File written");
        Ok(())
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<FileHandle, StoreError> {
        let (normalized, full) = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StoreError::AlreadyExists(normalized.clone()),
                _ => StoreError::Io(e),
            })?;
        tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes()).await?;
        debug!(path = %normalized, "File created");
        Ok(FileHandle::new(normalized))
    }

    async fn list_files(&self) -> Result<Vec<FileHandle>, StoreError> {
        let (files, _) = self.walk().await?;
        Ok(files.into_iter().map(FileHandle::new).collect())
    }

    async fn list_folders(&self) -> Result<Vec<String>, StoreError> {
        let (_, folders) = self.walk().await?;
        Ok(folders)
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<FileMetadata>, StoreError> {
        let Some(handle) = self.get_file_by_path(path).await? else {
            return Ok(None);
        };
        let text = self.read_file(&handle).await?;
        Ok(Some(FileMetadata {
            frontmatter_range: frontmatter_range(&text),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());

        store.create_file("daily/2024-01-01.md", "hello").await.unwrap();
        store.create_file("top.md", "").await.unwrap();
        tokio::fs::write(dir.path().join(".hidden"), "x").await.unwrap();

        let files: Vec<String> = store
            .list_files()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(files, vec!["daily/2024-01-01.md", "top.md"]);
        assert_eq!(store.list_folders().await.unwrap(), vec!["daily"]);

        assert!(matches!(
            store.create_file("top.md", "again").await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_write_applies_mutator() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let handle = store.create_file("a.md", "---\nk: v\n---\nbody").await.unwrap();

        store
            .write_file(&handle, Box::new(|t| t.to_uppercase()))
            .await
            .unwrap();
        assert_eq!(store.read_file(&handle).await.unwrap(), "---\nK: V\n---\nBODY");

        let meta = store.get_metadata("a.md").await.unwrap().unwrap();
        assert!(meta.frontmatter_range.is_some());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        assert!(matches!(
            store.get_file_by_path("../outside.md").await,
            Err(StoreError::InvalidPath(_))
        ));
        assert!(store.get_file_by_path("missing.md").await.unwrap().is_none());
    }
}
