// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document store implementations.

mod fs;
mod memory;

pub use fs::FsDocumentStore;
pub use memory::MemoryDocumentStore;

use crate::collaborators::FrontmatterRange;
use crate::error::StoreError;

/// Normalize a store-relative path: `/` separators, no leading slash,
/// no empty, `.` or `..` segments.
pub fn normalize_path(path: &str) -> Result<String, StoreError> {
    let mut segments = Vec::new();
    for segment in path.replace('\\', "/").split('/') {
        match segment.trim() {
            "" | "." => continue,
            ".." => return Err(StoreError::InvalidPath(path.to_string())),
            s => segments.push(s.to_string()),
        }
    }
    if segments.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments.join("/"))
}

/// Locate the `---` fenced frontmatter block at the very start of `text`.
pub fn frontmatter_range(text: &str) -> Option<FrontmatterRange> {
    let first_line_end = text.find('\n')?;
    if text[..first_line_end].trim_end() != "---" {
        return None;
    }

    let mut offset = first_line_end + 1;
    while offset <= text.len() {
        let rest = &text[offset..];
        let (line, consumed) = match rest.find('\n') {
            Some(i) => (&rest[..i], i + 1),
            None => (rest, rest.len()),
        };
        if line.trim_end() == "---" {
            return Some(FrontmatterRange {
                start: 0,
                end: offset + consumed,
            });
        }
        if consumed == 0 {
            break;
        }
        offset += consumed;
    }
    None
}

/// Every ancestor folder of a file path, shallowest first.
pub(crate) fn parent_folders(path: &str) -> Vec<String> {
    let mut folders = Vec::new();
    let mut current = String::new();
    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        folders.push(current.clone());
    }
    folders
}
