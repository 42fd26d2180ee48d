//! Variant runner: rewrite, execute, and snapshot the output directory.

use super::context::{ExecutionContext, JsonMap};
use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::interp::{Interpreter, UnitOutput};
use super::rewrite::rewrite_source;
use super::value::Value;
use crate::tools::ProxyTable;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Result of one variant attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantOutcome {
    pub status: OutcomeStatus,
    /// Explicit return value, or the unit's top-level bindings. `{}` on failure.
    pub result: serde_json::Value,
    pub created_files: Vec<String>,
    /// Seconds.
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub suspensions: usize,
}

impl VariantOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Everything a variant attempt sees besides its own source.
#[derive(Debug, Clone, Copy)]
pub struct RunEnv<'a> {
    pub proxies: &'a ProxyTable,
    pub session_id: &'a str,
    pub output_dir: &'a Path,
    pub prior_bindings: &'a JsonMap,
    pub inputs: &'a JsonMap,
    pub variant_globals: &'a JsonMap,
    pub echo_prints: bool,
}

/// Run one variant to completion. Never fails: errors and panics become a
/// `Failed` outcome.
pub async fn run_variant(name: &str, source: &str, env: &RunEnv<'_>) -> VariantOutcome {
    let start = Instant::now();
    let context = ExecutionContext::builder(env.proxies)
        .session(env.session_id, env.output_dir)
        .prior_bindings(env.prior_bindings)
        .inputs(env.inputs)
        .variant_globals(env.variant_globals)
        .build();

    let executed = AssertUnwindSafe(execute(source, &context, env))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(ScriptError::new(
                ErrorKind::RuntimeError,
                format!("internal error: {}", panic_message(payload.as_ref())),
            ))
        });

    match executed {
        Ok(output) => {
            let result = match output.returned {
                Some(value) if !matches!(value, Value::None) => value.to_json(),
                _ => bindings_json(&output.bindings),
            };
            let created_files = snapshot_files(env.output_dir);
            tracing::info!(
                variant = name,
                files = created_files.len(),
                suspensions = output.suspensions,
                "variant succeeded"
            );
            VariantOutcome {
                status: OutcomeStatus::Success,
                result,
                created_files,
                execution_time: start.elapsed().as_secs_f64(),
                error: None,
                stdout: output.stdout,
                suspensions: output.suspensions,
            }
        }
        Err(err) => {
            tracing::warn!(variant = name, error = %err, "variant failed");
            VariantOutcome {
                status: OutcomeStatus::Failed,
                result: serde_json::json!({}),
                created_files: Vec::new(),
                execution_time: start.elapsed().as_secs_f64(),
                error: Some(err.to_string()),
                stdout: String::new(),
                suspensions: 0,
            }
        }
    }
}

async fn execute(
    source: &str,
    context: &ExecutionContext,
    env: &RunEnv<'_>,
) -> ScriptResult<UnitOutput> {
    let unit = rewrite_source(source, &context.visible_proxy_names())?;
    Interpreter::new(context, env.proxies)
        .echo_prints(env.echo_prints)
        .run_unit(&unit)
        .await
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "panic"
    }
}

fn bindings_json(bindings: &[(String, Value)]) -> serde_json::Value {
    let map = bindings
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    serde_json::Value::Object(map)
}

/// Files directly inside `dir`, sorted. A snapshot: earlier files are included too.
pub fn snapshot_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().display().to_string())
        .collect();
    files.sort();
    files
}
