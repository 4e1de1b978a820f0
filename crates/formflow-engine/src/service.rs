// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Form submission entry points.
//!
//! [`FormService`] turns a form definition plus submitted values into an
//! executed action chain: it fills defaults, checks required fields, opens
//! an execution session, runs the chain and reports the result through the
//! notifier. It is also the [`FormLauncher`] used by button actions, so
//! nested forms join the session of the form that launched them.

use std::sync::Arc;

use async_trait::async_trait;
use formflow_dsl::validation::validate_form;
use formflow_dsl::{ButtonMode, FormConfig, ValueBag, parse_form_config_str};
use serde_json::Value;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::collaborators::Collaborators;
use crate::conditions::{self, OperatorContext, coercion};
use crate::config::EngineConfig;
use crate::error::{ActionError, FormError, Result};
use crate::interpreter::{ChainOutcome, ExecutionContext, FormLauncher, ParentExecution, execute};
use crate::session::{ExecutionSessionManager, StartOptions};

/// Per-submission overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    /// Overrides the form's and the engine's timeout switch
    pub timeout_enabled: Option<bool>,
    /// Overrides the form's and the engine's timeout threshold
    pub timeout_threshold_seconds: Option<u64>,
    /// Join the active execution session instead of opening a new one
    pub nested_execution: bool,
}

/// How a submission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Completed,
    /// Cancelled by the user, a dismissed prompt or the timeout
    Aborted,
    /// The chain was handed to a background task
    Backgrounded,
}

/// Where a submission runs; decides which outcomes are announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Foreground,
    /// Detached chain; success is not announced
    Background,
    /// Launched by a button action; the outer submission reports
    Nested,
}

/// Submits forms against a set of collaborators.
#[derive(Clone)]
pub struct FormService {
    collaborators: Collaborators,
    config: EngineConfig,
    sessions: ExecutionSessionManager,
}

impl std::fmt::Debug for FormService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormService")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl FormService {
    /// Service with its own session manager.
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            collaborators,
            config,
            sessions: ExecutionSessionManager::new(),
        }
    }

    /// Share a session manager, e.g. [`ExecutionSessionManager::global`].
    pub fn with_session_manager(mut self, sessions: ExecutionSessionManager) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn sessions(&self) -> &ExecutionSessionManager {
        &self.sessions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit `values` for `form` and run its action chain.
    ///
    /// Resolves with [`SubmitStatus::Aborted`] (not an error) when the user
    /// or the timeout cancels the chain.
    pub async fn submit(
        &self,
        form: FormConfig,
        values: ValueBag,
        options: SubmitOptions,
    ) -> Result<SubmitStatus> {
        self.submit_in(Arc::new(form), values, options, None).await
    }

    /// Load the form at `path`, let the user fill it in and submit it.
    pub async fn open_form_by_path(&self, path: &str) -> Result<SubmitStatus> {
        let form = self.load_form(path).await?;
        let defaults = form.default_values();
        let values = self
            .collaborators
            .interaction
            .open_form(&form, &defaults)
            .await
            .map_err(FormError::Interaction)?;
        match values {
            Some(values) => self.submit(form, values, SubmitOptions::default()).await,
            None => {
                info!(path, "Form dismissed");
                Ok(SubmitStatus::Aborted)
            }
        }
    }

    /// Load the form at `path` and submit its default values, with
    /// `overrides` taking precedence.
    pub async fn submit_form_by_path(
        &self,
        path: &str,
        overrides: ValueBag,
        options: SubmitOptions,
    ) -> Result<SubmitStatus> {
        let form = self.load_form(path).await?;
        self.submit(form, overrides, options).await
    }

    /// Read and parse a form file from the document store.
    pub async fn load_form(&self, path: &str) -> Result<FormConfig> {
        let load_error = |reason: String| FormError::Load {
            path: path.to_string(),
            reason,
        };
        let store = &self.collaborators.store;
        let handle = store
            .get_file_by_path(path)
            .await
            .map_err(|e| load_error(e.to_string()))?
            .ok_or_else(|| load_error("file not found".to_string()))?;
        let text = store
            .read_file(&handle)
            .await
            .map_err(|e| load_error(e.to_string()))?;
        let form = parse_form_config_str(&text).map_err(load_error)?;

        let report = validate_form(&form);
        for warning in &report.warnings {
            warn!(path, %warning, "Form validation warning");
        }
        if let Some(first) = report.errors.first() {
            return Err(FormError::Invalid(first.to_string()));
        }
        Ok(form)
    }

    async fn submit_in(
        &self,
        form: Arc<FormConfig>,
        values: ValueBag,
        options: SubmitOptions,
        parent: Option<ParentExecution>,
    ) -> Result<SubmitStatus> {
        let execution_id = Uuid::new_v4();
        let span = info_span!(
            "form_submission",
            %execution_id,
            form = form.name.as_deref().or(form.id.as_deref()).unwrap_or("untitled"),
            nested = options.nested_execution,
        );

        async move {
            let values = with_defaults(&form, values);
            if let Err(err) = self.check_required(&form, &values) {
                self.collaborators.notifier.notify(&err.to_string());
                return Err(err);
            }

            let joined = parent
                .as_ref()
                .and_then(|p| p.session)
                .and_then(|id| self.sessions.join_execution(id));
            let lease = match joined {
                Some(lease) => lease,
                None => {
                    let (timeout_enabled, timeout_secs) = self.timeout_for(&form, &options);
                    self.sessions.start_execution(
                        timeout_enabled,
                        timeout_secs,
                        StartOptions {
                            // A known caller without a live session must not
                            // borrow an unrelated one
                            allow_nested_reuse: options.nested_execution && parent.is_none(),
                        },
                    )
                }
            };
            let cancel = match parent {
                Some(parent) => parent.cancel,
                None => lease.token().clone(),
            };
            let mut ctx = ExecutionContext::new(
                form.clone(),
                values,
                self.collaborators.clone(),
                self.config.clone(),
                cancel,
            )
            .with_session(lease.session_id())
            .with_launcher(Arc::new(self.clone()));

            if form.run_in_background && !options.nested_execution {
                let background = self.sessions.on_background_execution_start(&lease);
                drop(lease);
                let service = self.clone();
                tokio::spawn(
                    async move {
                        let outcome = execute(&form.actions, &mut ctx).await;
                        let timed_out = service.sessions.timed_out(background.session_id());
                        // Failures were already reported through the notifier
                        if let Err(err) = service.report(&form, outcome, timed_out, Origin::Background) {
                            debug!(error = %err, "Background action chain failed");
                        }
                        service.sessions.on_background_execution_finish(background);
                    }
                    .in_current_span(),
                );
                info!("Action chain moved to background");
                return Ok(SubmitStatus::Backgrounded);
            }

            let outcome = execute(&form.actions, &mut ctx).await;
            let timed_out = lease.timed_out();
            lease.finish();
            let origin = if options.nested_execution {
                Origin::Nested
            } else {
                Origin::Foreground
            };
            self.report(&form, outcome, timed_out, origin)
        }
        .instrument(span)
        .await
    }

    /// Turn a chain outcome into a status and the matching notification.
    fn report(
        &self,
        form: &FormConfig,
        outcome: ChainOutcome,
        timed_out: bool,
        origin: Origin,
    ) -> Result<SubmitStatus> {
        let notifier = &self.collaborators.notifier;
        let announce = origin != Origin::Nested;
        match outcome {
            ChainOutcome::Completed => {
                if origin == Origin::Foreground && !form.suppress_success_notice {
                    let name = form.name.as_deref().unwrap_or("Form");
                    notifier.notify(&format!("{} submitted", name));
                }
                Ok(SubmitStatus::Completed)
            }
            ChainOutcome::Aborted => {
                if announce && self.config.notify_on_abort {
                    notifier.notify(if timed_out {
                        "Form submission timed out"
                    } else {
                        "Form submission aborted"
                    });
                }
                Ok(SubmitStatus::Aborted)
            }
            ChainOutcome::Failed(err) => {
                if announce {
                    notifier.notify(&err.to_string());
                }
                Err(FormError::Execution(err))
            }
        }
    }

    fn timeout_for(&self, form: &FormConfig, options: &SubmitOptions) -> (bool, u64) {
        let enabled = options
            .timeout_enabled
            .or(form.timeout.map(|t| t.enabled))
            .unwrap_or(self.config.timeout_enabled);
        let secs = options
            .timeout_threshold_seconds
            .or(form.timeout.map(|t| t.threshold_seconds))
            .unwrap_or(self.config.timeout_secs);
        (enabled, secs)
    }

    /// Every required field that is visible under the submitted values must
    /// have a value.
    fn check_required(&self, form: &FormConfig, values: &ValueBag) -> Result<()> {
        let op_ctx = OperatorContext {
            file_decoder: self.collaborators.file_decoder.as_ref(),
        };
        let lookup = |key: &str| {
            form.field(key)
                .and_then(|f| values.get(&f.id))
                .or_else(|| values.get(key))
                .cloned()
        };

        for field in form.fields.iter().filter(|f| f.required) {
            let visible = field
                .condition
                .as_ref()
                .is_none_or(|c| conditions::apply(c, &lookup, &|v: &Value| v.clone(), &op_ctx));
            if !visible {
                debug!(field = %field.id, "Required field hidden, not checked");
                continue;
            }
            if !values.get(&field.id).is_some_and(coercion::has_value) {
                return Err(FormError::MissingRequiredField(field.label.clone()));
            }
        }
        Ok(())
    }
}

/// Submitted values with field defaults filled in for missing or null
/// entries.
fn with_defaults(form: &FormConfig, mut values: ValueBag) -> ValueBag {
    for (id, default) in form.default_values() {
        let missing = values.get(&id).is_none_or(Value::is_null);
        if missing {
            values.insert(id, default);
        }
    }
    values
}

#[async_trait]
impl FormLauncher for FormService {
    async fn launch(
        &self,
        form_path: &str,
        mode: ButtonMode,
        parent: &ParentExecution,
    ) -> std::result::Result<(), ActionError> {
        let nested = |err: FormError| ActionError::NestedForm(Box::new(err));
        let form = self.load_form(form_path).await.map_err(nested)?;

        let values = match mode {
            ButtonMode::Submit => ValueBag::new(),
            ButtonMode::Open => {
                let defaults = form.default_values();
                match self.collaborators.interaction.open_form(&form, &defaults).await? {
                    Some(values) => values,
                    None => {
                        info!(form_path, "Nested form dismissed");
                        return Ok(());
                    }
                }
            }
        };

        let options = SubmitOptions {
            nested_execution: true,
            ..SubmitOptions::default()
        };
        debug!(form_path, ?mode, "Launching nested form");
        self.submit_in(Arc::new(form), values, options, Some(parent.clone()))
            .await
            .map(|_| ())
            .map_err(nested)
    }
}
