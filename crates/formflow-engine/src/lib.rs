// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formflow engine - runs the action chains of submitted forms.
//!
//! A form (see `formflow-dsl`) declares fields and an ordered tree of
//! actions. On submission the engine evaluates each action's visibility
//! filter, executes its effect against the host's collaborators (document
//! store, AI client, user interaction, notifier) and applies the configured
//! error strategy when an effect fails.
//!
//! # Features
//!
//! - **Filters**: operator-per-handler evaluation of nested AND/OR trees
//! - **Loops**: list, count, condition and pagination loops with scoped
//!   variables that shadow outer loops and unwind on every exit path
//! - **Templates**: `{{@field}}`, `{{date:FORMAT}}`, `{{random:N}}` and loop
//!   variable references in action text
//! - **Sessions**: cancellation and timeout domains, shared by nested
//!   submissions and kept alive by background work
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use formflow_engine::{Collaborators, EngineConfig, FormService, MemoryDocumentStore, SubmitOptions};
//!
//! #[tokio::main]
//! async fn main() -> formflow_engine::Result<()> {
//!     let store = Arc::new(MemoryDocumentStore::new());
//!     let service = FormService::new(Collaborators::new(store), EngineConfig::default());
//!
//!     let form = formflow_dsl::parse_form_config_str(include_str!("daily.json"))
//!         .map_err(formflow_engine::FormError::Invalid)?;
//!     let status = service.submit(form, Default::default(), SubmitOptions::default()).await?;
//!     println!("{:?}", status);
//!     Ok(())
//! }
//! ```

pub mod collaborators;
pub mod conditions;
pub mod config;
mod error;
pub mod interpreter;
pub mod scope;
pub mod service;
pub mod session;
pub mod store;
pub mod template;

pub use collaborators::{
    AiClient, AiOptions, Base64FileDecoder, Collaborators, DocumentStore, FileDecoder, FileHandle,
    FileMetadata, FrontmatterRange, HeadlessInteraction, LogNotifier, Notifier, TextMutator,
    UnconfiguredAi, UserInteraction,
};
pub use config::{ConfigError, EngineConfig};
pub use error::{ActionError, ChainError, FormError, Result, StoreError};
pub use interpreter::{ChainOutcome, ExecutionContext, FormLauncher, ParentExecution, execute};
pub use scope::{LoopScope, ScopeFrame, ScopeVariable};
pub use service::{FormService, SubmitOptions, SubmitStatus};
pub use session::{
    BackgroundLease, ExecutionSessionManager, SessionId, SessionInfo, SessionLease, StartOptions,
};
pub use store::{FsDocumentStore, MemoryDocumentStore};

// Re-export the form model so hosts need a single dependency
pub use formflow_dsl;
