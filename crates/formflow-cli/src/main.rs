// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formflow command line runner
//!
//! Submits form files against a vault directory and prints reference
//! material for form authors.
//!
//! ```text
//! formflow submit forms/daily.json --vault ~/notes --value title="Standup" --timeout 30
//! formflow variables --loop-type pagination
//! formflow schema > form.schema.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info, warn};

use formflow_dsl::{LoopType, ValueBag, form_json_schema, loop_variables_for};
use formflow_engine::{
    Collaborators, EngineConfig, ExecutionSessionManager, FormService, FsDocumentStore,
    HeadlessInteraction, Notifier, SubmitOptions, SubmitStatus,
};

#[derive(Parser)]
#[command(name = "formflow", version, about = "Run formflow forms from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a form file and run its action chain
    Submit {
        /// Form file, relative to the vault
        form: String,

        /// Vault directory holding notes and form files
        #[arg(long, env = "FORMFLOW_VAULT", default_value = ".")]
        vault: PathBuf,

        /// Field value as id=value; JSON values are parsed, anything else is text
        #[arg(long = "value", value_parser = parse_field_value)]
        values: Vec<(String, Value)>,

        /// Cancel the chain after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List the variables a loop body can reference
    Variables {
        /// Loop type (list, condition, count, pagination); all when omitted
        #[arg(long)]
        loop_type: Option<LoopType>,
    },

    /// Print the JSON Schema of the form file format
    Schema,
}

fn parse_field_value(raw: &str) -> Result<(String, Value), String> {
    let (id, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected id=value, got '{}'", raw))?;
    if id.is_empty() {
        return Err("field id must not be empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((id.to_string(), value))
}

/// Prints notifications for the person at the terminal.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        println!("{}", message);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("formflow_engine=info,formflow_cli=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Submit {
            form,
            vault,
            values,
            timeout,
        } => submit(&form, vault, values, timeout).await,
        Command::Variables { loop_type } => {
            for var in loop_variables_for(loop_type) {
                println!("{:<12} {}", var.name, var.description);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema => {
            let schema = serde_json::to_string_pretty(&form_json_schema())?;
            println!("{}", schema);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn submit(
    form_path: &str,
    vault: PathBuf,
    values: Vec<(String, Value)>,
    timeout: Option<u64>,
) -> Result<ExitCode> {
    if !vault.is_dir() {
        return Err(anyhow!("vault '{}' is not a directory", vault.display()));
    }
    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    info!(vault = %vault.display(), form = form_path, "Submitting form");

    let collaborators = Collaborators::new(Arc::new(FsDocumentStore::new(vault)))
        .with_interaction(Arc::new(HeadlessInteraction))
        .with_notifier(Arc::new(ConsoleNotifier));
    let sessions = ExecutionSessionManager::global();
    let service = FormService::new(collaborators, config).with_session_manager(sessions.clone());

    // Ctrl-C cancels whatever is running; the chain then ends as aborted
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling execution");
            sessions.cancel_active();
        }
    });

    let options = SubmitOptions {
        timeout_enabled: timeout.map(|_| true),
        timeout_threshold_seconds: timeout,
        nested_execution: false,
    };
    let overrides: ValueBag = values.into_iter().collect();
    let status = service
        .submit_form_by_path(form_path, overrides, options)
        .await?;

    match status {
        SubmitStatus::Completed => Ok(ExitCode::SUCCESS),
        SubmitStatus::Aborted => {
            info!("Form submission aborted");
            Ok(ExitCode::from(2))
        }
        SubmitStatus::Backgrounded => {
            wait_for_background(service.sessions()).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The process is the only host of background work, so stay alive until it
/// has finished.
async fn wait_for_background(sessions: &ExecutionSessionManager) {
    while sessions.session_count() > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_field_value() {
        assert_eq!(parse_field_value("n=3").unwrap(), ("n".to_string(), json!(3)));
        assert_eq!(
            parse_field_value("tags=[\"a\"]").unwrap(),
            ("tags".to_string(), json!(["a"]))
        );
        assert_eq!(
            parse_field_value("title=a=b").unwrap(),
            ("title".to_string(), json!("a=b"))
        );
        assert!(parse_field_value("novalue").is_err());
        assert!(parse_field_value("=x").is_err());
    }

    #[test]
    fn test_parse_submit_args() {
        let cli = Cli::try_parse_from([
            "formflow", "submit", "forms/a.json", "--vault", "/tmp", "--value", "a=1", "--value",
            "b=x", "--timeout", "5",
        ])
        .unwrap();
        match cli.command {
            Command::Submit {
                form,
                values,
                timeout,
                ..
            } => {
                assert_eq!(form, "forms/a.json");
                assert_eq!(values.len(), 2);
                assert_eq!(timeout, Some(5));
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_parse_loop_type() {
        let cli = Cli::try_parse_from(["formflow", "variables", "--loop-type", "pagination"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Variables {
                loop_type: Some(LoopType::Pagination)
            }
        ));
    }
}
