// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine error types.
//!
//! Errors are layered the way failures travel: a document store failure
//! becomes an [`ActionError`] inside one action's effect, the interpreter
//! wraps it into a [`ChainError`] naming the action, and the form service
//! reports a [`FormError`] to its caller. Cancellation is a distinct
//! [`ChainError::Cancelled`] outcome and never reaches users as a failure.

use thiserror::Error;

/// Errors raised by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested file does not exist
    #[error("file not found: {0}")]
    NotFound(String),

    /// A file already exists at the target path
    #[error("file already exists: {0}")]
    AlreadyExists(String),

    /// The path escapes the store root or is otherwise unusable
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Underlying filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single action's effect.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Malformed configuration detected while executing the action
    #[error("validation error: {0}")]
    Validation(String),

    /// Document store operation failed
    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    /// AI collaborator failed or is not configured
    #[error("AI invocation failed: {0}")]
    Ai(String),

    /// User interaction collaborator failed
    #[error("interaction failed: {0}")]
    Interaction(String),

    /// The user dismissed a prompt; ends the chain as aborted
    #[error("dismissed by user")]
    Dismissed,

    /// A form triggered by a button action failed
    #[error("nested form failed: {0}")]
    NestedForm(#[source] Box<FormError>),
}

impl ActionError {
    pub fn validation(message: impl Into<String>) -> Self {
        ActionError::Validation(message.into())
    }
}

/// Terminal error of an action chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The cancellation signal fired (user abort or timeout)
    #[error("execution cancelled")]
    Cancelled,

    /// An action failed and its error-handling strategy did not absorb it
    #[error("action '{action_id}' ({action_type}) failed: {source}")]
    Action {
        /// Id of the failing action
        action_id: String,
        /// Type tag of the failing action
        action_type: &'static str,
        /// The underlying failure
        #[source]
        source: ActionError,
    },
}

impl ChainError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChainError::Cancelled)
    }
}

/// Errors surfaced by the form service.
#[derive(Debug, Error)]
pub enum FormError {
    /// A required, visible field has no value
    #[error("required field '{0}' is empty")]
    MissingRequiredField(String),

    /// The form definition is invalid
    #[error("invalid form: {0}")]
    Invalid(String),

    /// The form file could not be read or parsed
    #[error("failed to load form '{path}': {reason}")]
    Load {
        /// Path of the form file
        path: String,
        /// Why loading failed
        reason: String,
    },

    /// Collecting values from the user failed
    #[error("form interaction failed: {0}")]
    Interaction(#[source] ActionError),

    /// The action chain failed
    #[error(transparent)]
    Execution(#[from] ChainError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, FormError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_error_names_action() {
        let err = ChainError::Action {
            action_id: "write".to_string(),
            action_type: "insertText",
            source: ActionError::Store(StoreError::NotFound("a.md".to_string())),
        };
        let message = err.to_string();
        assert!(message.contains("'write'"));
        assert!(message.contains("insertText"));
        assert!(message.contains("a.md"));
    }

    #[test]
    fn test_form_error_is_transparent_over_chain_error() {
        let err: FormError = ChainError::Cancelled.into();
        assert_eq!(err.to_string(), "execution cancelled");
    }
}
