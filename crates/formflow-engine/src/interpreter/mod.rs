// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action chain interpreter.
//!
//! Walks an action tree in document order, one action at a time. Each action
//! is checked against its visibility condition, executed, and its failure (if
//! any) handled by its effective error strategy: the action's own, else the
//! one inherited from the enclosing group or loop, else abort.
//!
//! Cancellation is polled before every action and after every effect. Loop
//! scope frames pushed by a loop are always removed before the loop returns,
//! whatever the exit path.

mod effects;
mod loops;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use formflow_dsl::{Action, ButtonMode, ErrorHandling, Filter, FormConfig, ValueBag};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collaborators::Collaborators;
use crate::conditions::{self, OperatorContext};
use crate::config::EngineConfig;
use crate::error::{ActionError, ChainError};
use crate::scope::LoopScope;
use crate::session::SessionId;
use crate::template::{self, TemplateContext};

/// The execution a nested form is launched from.
#[derive(Debug, Clone)]
pub struct ParentExecution {
    pub cancel: CancellationToken,
    /// Session the caller runs in, if it was started through a session manager
    pub session: Option<SessionId>,
}

/// Launches another form from inside a chain (button actions).
#[async_trait]
pub trait FormLauncher: Send + Sync {
    /// Run the form at `form_path` inside the caller's session and
    /// cancellation domain.
    async fn launch(
        &self,
        form_path: &str,
        mode: ButtonMode,
        parent: &ParentExecution,
    ) -> Result<(), ActionError>;
}

/// Terminal status of an action chain.
#[derive(Debug)]
pub enum ChainOutcome {
    Completed,
    Failed(ChainError),
    /// Cancelled by the user, a dismissed prompt or a timeout
    Aborted,
}

impl ChainOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ChainOutcome::Completed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ChainOutcome::Aborted)
    }
}

/// Control flow signal returned by each action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Next,
    /// Leave the innermost loop
    Break,
}

/// Failure of one action: its own effect failed, or a nested chain already
/// decided to stop.
#[derive(Debug)]
pub(crate) enum Failure {
    Action(ActionError),
    Chain(ChainError),
}

impl From<ActionError> for Failure {
    fn from(err: ActionError) -> Self {
        Failure::Action(err)
    }
}

impl From<ChainError> for Failure {
    fn from(err: ChainError) -> Self {
        Failure::Chain(err)
    }
}

impl From<crate::error::StoreError> for Failure {
    fn from(err: crate::error::StoreError) -> Self {
        Failure::Action(err.into())
    }
}

/// State of one running chain.
pub struct ExecutionContext {
    pub form: Arc<FormConfig>,
    /// Form values keyed by field id
    pub values: ValueBag,
    /// Field ids keyed by label
    pub field_ids: HashMap<String, String>,
    /// Output variables written by actions
    pub variables: ValueBag,
    pub scope: LoopScope,
    pub cancel: CancellationToken,
    /// Execution session the chain belongs to
    pub session: Option<SessionId>,
    pub collaborators: Collaborators,
    pub config: EngineConfig,
    pub launcher: Option<Arc<dyn FormLauncher>>,
}

impl ExecutionContext {
    pub fn new(
        form: Arc<FormConfig>,
        values: ValueBag,
        collaborators: Collaborators,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let field_ids = form
            .fields
            .iter()
            .map(|f| (f.label.clone(), f.id.clone()))
            .collect();
        Self {
            form,
            values,
            field_ids,
            variables: ValueBag::new(),
            scope: LoopScope::new(),
            cancel,
            session: None,
            collaborators,
            config,
            launcher: None,
        }
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    /// The caller side of a nested form launch.
    pub fn parent_execution(&self) -> ParentExecution {
        ParentExecution {
            cancel: self.cancel.clone(),
            session: self.session,
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn FormLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn template(&self) -> TemplateContext<'_> {
        TemplateContext {
            values: &self.values,
            field_ids: &self.field_ids,
            variables: &self.variables,
            scope: &self.scope,
        }
    }

    pub fn expand(&self, text: &str) -> String {
        template::expand(text, &self.template())
    }

    /// Lookup order for filter properties: loop scope, output variables,
    /// then form values by id or label.
    pub fn lookup(&self, property: &str) -> Option<Value> {
        let tpl = self.template();
        tpl.variable(property)
            .or_else(|| tpl.form_value(property))
            .cloned()
    }

    /// Evaluate a filter against the current state. Comparison values may
    /// contain template references.
    pub fn evaluate(&self, filter: &Filter) -> bool {
        let tpl = self.template();
        let op_ctx = OperatorContext {
            file_decoder: self.collaborators.file_decoder.as_ref(),
        };
        conditions::apply(
            filter,
            &|property: &str| self.lookup(property),
            &|value: &Value| template::expand_json(value, &tpl),
            &op_ctx,
        )
    }

    fn check_cancelled(&self) -> Result<(), ChainError> {
        if self.cancel.is_cancelled() {
            Err(ChainError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep unless cancelled first.
    pub(crate) async fn sleep(&self, duration: Duration) -> Result<(), ChainError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ChainError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Execute an action list to completion.
pub async fn execute(actions: &[Action], ctx: &mut ExecutionContext) -> ChainOutcome {
    let outcome = match run_list(actions, ctx, None).await {
        // A break outside any loop ends the chain normally
        Ok(_) => ChainOutcome::Completed,
        Err(ChainError::Cancelled) => ChainOutcome::Aborted,
        Err(err) => ChainOutcome::Failed(err),
    };
    // Nothing may survive the chain
    ctx.scope.clear();

    match &outcome {
        ChainOutcome::Completed => info!(actions = actions.len(), "Action chain completed"),
        ChainOutcome::Aborted => info!("Action chain aborted"),
        ChainOutcome::Failed(err) => error!(error = %err, "Action chain failed"),
    }
    outcome
}

/// Run a list of sibling actions in order.
pub(crate) fn run_list<'a>(
    actions: &'a [Action],
    ctx: &'a mut ExecutionContext,
    inherited: Option<ErrorHandling>,
) -> BoxFuture<'a, Result<Flow, ChainError>> {
    Box::pin(async move {
        for action in actions {
            ctx.check_cancelled()?;

            if let Some(condition) = &action.common().condition
                && !ctx.evaluate(condition)
            {
                debug!(
                    action_id = action.id(),
                    action_type = action.action_type(),
                    "Action skipped by condition"
                );
                continue;
            }

            if run_with_strategy(action, ctx, inherited).await? == Flow::Break {
                return Ok(Flow::Break);
            }
        }
        Ok(Flow::Next)
    })
}

/// Run one action, applying its effective error strategy to its own failures.
async fn run_with_strategy(
    action: &Action,
    ctx: &mut ExecutionContext,
    inherited: Option<ErrorHandling>,
) -> Result<Flow, ChainError> {
    let strategy = action
        .common()
        .error_handling
        .or(inherited)
        .unwrap_or_default();
    let mut attempt: u32 = 0;

    loop {
        debug!(
            action_id = action.id(),
            action_type = action.action_type(),
            attempt,
            "Action started"
        );
        let result = run_action(action, ctx, strategy).await;
        ctx.check_cancelled()?;

        let err = match result {
            Ok(flow) => {
                debug!(action_id = action.id(), "Action finished");
                return Ok(flow);
            }
            Err(Failure::Chain(err)) => return Err(err),
            Err(Failure::Action(ActionError::Dismissed)) => {
                info!(action_id = action.id(), "Prompt dismissed");
                return Err(ChainError::Cancelled);
            }
            Err(Failure::Action(err)) => err,
        };

        match strategy {
            ErrorHandling::Skip => {
                warn!(
                    action_id = action.id(),
                    action_type = action.action_type(),
                    error = %err,
                    "Action failed, skipping"
                );
                return Ok(Flow::Next);
            }
            ErrorHandling::Retry {
                max_retries,
                retry_delay_ms,
            } if attempt < max_retries => {
                attempt += 1;
                let delay = retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| ctx.config.default_retry_delay());
                warn!(
                    action_id = action.id(),
                    error = %err,
                    attempt,
                    max_retries,
                    "Action failed, retrying"
                );
                ctx.sleep(delay).await?;
            }
            _ => {
                error!(
                    action_id = action.id(),
                    action_type = action.action_type(),
                    error = %err,
                    "Action failed, aborting chain"
                );
                return Err(ChainError::Action {
                    action_id: action.id().to_string(),
                    action_type: action.action_type(),
                    source: err,
                });
            }
        }
    }
}

/// Dispatch one action to its effect. `strategy` is the action's effective
/// strategy; containers hand it down to their children.
async fn run_action(
    action: &Action,
    ctx: &mut ExecutionContext,
    strategy: ErrorHandling,
) -> Result<Flow, Failure> {
    match action {
        Action::CreateFile(a) => effects::create_file(a, ctx).await,
        Action::InsertText(a) => effects::insert_text(a, ctx).await,
        Action::TextTransform(a) => effects::text_transform(a, ctx),
        Action::Ai(a) => effects::ai(a, ctx).await,
        Action::CollectData(a) => loops::collect_data(a, ctx),
        Action::Loop(a) => loops::run_loop(a, ctx, strategy).await,
        Action::Continue(_) => Ok(Flow::Next),
        Action::Break(_) => Ok(Flow::Break),
        Action::SuggestModal(a) => effects::suggest_modal(a, ctx).await,
        Action::GenerateForm(a) => effects::generate_form(a, ctx).await,
        Action::Button(a) => effects::button(a, ctx).await,
        Action::Wait(a) => {
            ctx.sleep(Duration::from_millis(a.duration_ms)).await?;
            Ok(Flow::Next)
        }
        Action::Group(group) => {
            let form = ctx.form.clone();
            let (members, group_strategy) = match group.group_id.as_deref() {
                Some(id) => {
                    let named = form.action_group(id).ok_or_else(|| {
                        ActionError::validation(format!("unknown action group '{}'", id))
                    })?;
                    (named.actions.as_slice(), named.error_handling)
                }
                None => (group.actions.as_slice(), None),
            };
            let member_strategy = group
                .common
                .error_handling
                .or(group_strategy)
                .unwrap_or(strategy);
            Ok(run_list(members, ctx, Some(member_strategy)).await?)
        }
    }
}
