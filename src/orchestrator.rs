//! Orchestration entry point
//!
//! Runs the file phase, then the code phase, and folds both into one
//! [`ExecutionReport`]. The caller always gets a complete report; only an
//! error outside both phases (such as an unusable session directory) yields
//! `failed`.

use crate::config::ExecutorConfig;
use crate::engine::{run_variants, CodePhaseResult, JsonMap, RunEnv};
use crate::files::{materialize, FilePhaseResult};
use crate::session::Session;
use crate::tools::{ProxyTable, ToolProvider};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Name of the single variant built by [`Executor::run_code`].
pub const LEGACY_VARIANT: &str = "CODE_1A";

/// What the upstream producer emitted for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOutput {
    pub files: BTreeMap<String, String>,
    pub code_variants: BTreeMap<String, String>,
    pub globals_schema: JsonMap,
    pub inputs: JsonMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failed,
    NoOperation,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failed => "failed",
            RunStatus::NoOperation => "no_operation",
        }
    }

    /// Whether a CLI run with this status should exit cleanly.
    pub fn is_ok(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::NoOperation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    DirectFiles,
    /// Reported as `python_code`, the name existing report consumers match on.
    #[serde(rename = "python_code")]
    CodeExecution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub session_id: String,
    pub operations: Vec<Operation>,
    pub created_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_results: Option<FilePhaseResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_results: Option<CodePhaseResult>,
    pub total_time: f64,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Map phase outcomes to an overall status.
///
/// `None` means the phase did not run. Every combination maps to exactly one
/// status.
pub fn classify(escaped: bool, files_ok: Option<bool>, code_ok: Option<bool>) -> RunStatus {
    if escaped {
        return RunStatus::Failed;
    }
    match (files_ok, code_ok) {
        (None, None) => RunStatus::NoOperation,
        (Some(false), _) | (_, Some(false)) => RunStatus::PartialFailure,
        _ => RunStatus::Success,
    }
}

pub struct Executor {
    config: ExecutorConfig,
    provider: Arc<dyn ToolProvider>,
}

impl Executor {
    pub fn new(config: ExecutorConfig, provider: Arc<dyn ToolProvider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Materialize files and run code variants from `task`.
    ///
    /// `variant_globals` are bound into every variant's context above prior
    /// bindings.
    pub async fn run_user_code(&self, task: &TaskOutput, variant_globals: &JsonMap) -> ExecutionReport {
        let start = Instant::now();
        let session_id = task
            .session_id
            .clone()
            .unwrap_or_else(|| self.config.default_session_id.clone());
        let mut report = ExecutionReport {
            run_id: Uuid::new_v4(),
            status: RunStatus::Success,
            session_id,
            operations: Vec::new(),
            created_files: Vec::new(),
            file_results: None,
            code_results: None,
            total_time: 0.0,
            error: None,
            started_at: Utc::now(),
        };
        tracing::info!(session = %report.session_id, run = %report.run_id, "executor starting");

        let escaped = match self.run_phases(task, variant_globals, &mut report).await {
            Ok(()) => false,
            Err(err) => {
                tracing::error!("Executor failed: {:#}", err);
                report.error = Some(format!("{:#}", err));
                true
            }
        };

        report.status = classify(
            escaped,
            report.file_results.as_ref().map(FilePhaseResult::is_success),
            report.code_results.as_ref().map(CodePhaseResult::is_success),
        );
        if report.status == RunStatus::NoOperation {
            report.error = Some("No files or code_variants found in output".to_string());
            tracing::warn!("Nothing to execute");
        }
        report.total_time = start.elapsed().as_secs_f64();

        let winner = report
            .code_results
            .as_ref()
            .and_then(|c| c.successful_variant.as_deref())
            .unwrap_or("-");
        tracing::info!(
            status = report.status.as_str(),
            files = report.created_files.len(),
            variant = winner,
            "completed in {:.2}s",
            report.total_time
        );
        report
    }

    /// Run a single source text as variant `CODE_1A`.
    pub async fn run_code(
        &self,
        code: &str,
        session_id: Option<&str>,
        globals_schema: &JsonMap,
    ) -> ExecutionReport {
        let task = TaskOutput {
            code_variants: BTreeMap::from([(LEGACY_VARIANT.to_string(), code.to_string())]),
            globals_schema: globals_schema.clone(),
            session_id: session_id.map(str::to_string),
            ..TaskOutput::default()
        };
        self.run_user_code(&task, &JsonMap::new()).await
    }

    async fn run_phases(
        &self,
        task: &TaskOutput,
        variant_globals: &JsonMap,
        report: &mut ExecutionReport,
    ) -> Result<()> {
        if task.files.is_empty() && task.code_variants.is_empty() {
            return Ok(());
        }
        let session = Session::open(&self.config.output_root, &report.session_id)?;
        report.session_id = session.id().to_string();
        let mut problems = Vec::new();

        if !task.files.is_empty() {
            tracing::info!("Phase 1: direct file creation");
            let files = materialize(&task.files, session.dir());
            report.operations.push(Operation::DirectFiles);
            merge_files(&mut report.created_files, &files.created_files);
            if !files.is_success() {
                problems.push(format!("File creation issues: {:?}", files.errors));
            }
            report.file_results = Some(files);
        }

        if !task.code_variants.is_empty() {
            tracing::info!(variants = task.code_variants.len(), "Phase 2: code execution");
            let proxies = ProxyTable::from_provider(Arc::clone(&self.provider));
            let env = RunEnv {
                proxies: &proxies,
                session_id: session.id(),
                output_dir: session.dir(),
                prior_bindings: &task.globals_schema,
                inputs: &task.inputs,
                variant_globals,
                echo_prints: self.config.echo_prints,
            };
            let code = run_variants(&task.code_variants, &env).await;
            report.operations.push(Operation::CodeExecution);
            merge_files(&mut report.created_files, &code.outcome.created_files);
            if !code.is_success() {
                let reason = code.outcome.error.as_deref().unwrap_or("unknown error");
                problems.push(format!("Code execution failed: {}", reason));
            }
            report.code_results = Some(code);
        }

        if !problems.is_empty() {
            report.error = Some(problems.join("; "));
        }
        Ok(())
    }
}

/// Append paths not already listed, keeping first-seen order.
fn merge_files(into: &mut Vec<String>, paths: &[String]) {
    for path in paths {
        if !into.contains(path) {
            into.push(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolSet;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor(root: &TempDir, tools: ToolSet) -> Executor {
        let config = ExecutorConfig {
            output_root: root.path().to_path_buf(),
            echo_prints: false,
            ..ExecutorConfig::default()
        };
        Executor::new(config, Arc::new(tools))
    }

    fn task(value: serde_json::Value) -> TaskOutput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_classification_is_exhaustive() {
        let phases = [None, Some(true), Some(false)];
        for files in phases {
            for code in phases {
                assert_eq!(classify(true, files, code), RunStatus::Failed);
                let status = classify(false, files, code);
                let expected = match (files, code) {
                    (None, None) => RunStatus::NoOperation,
                    (Some(false), _) | (_, Some(false)) => RunStatus::PartialFailure,
                    _ => RunStatus::Success,
                };
                assert_eq!(status, expected);
            }
        }
    }

    #[tokio::test]
    async fn test_empty_task_is_no_operation() {
        let root = TempDir::new().unwrap();
        let report = executor(&root, ToolSet::new())
            .run_user_code(&task(json!({"files": {}, "code_variants": {}})), &JsonMap::new())
            .await;

        assert_eq!(report.status, RunStatus::NoOperation);
        assert!(report.operations.is_empty());
        assert_eq!(
            report.error.as_deref(),
            Some("No files or code_variants found in output")
        );
        assert_eq!(report.session_id, "default_session");
    }

    #[tokio::test]
    async fn test_files_and_code_merge_into_one_report() {
        let root = TempDir::new().unwrap();
        let tools = ToolSet::new().with_tool("summarize", |_| Ok(json!("short")));
        let report = executor(&root, tools)
            .run_user_code(
                &task(json!({
                    "session_id": "s1",
                    "files": {"page.html": "<h1>hi</h1>"},
                    "code_variants": {
                        "CODE_1A": "text = summarize('long')\nwith open(output_dir + '/summary.txt', 'w') as f:\n    f.write(text)\n"
                    }
                })),
                &JsonMap::new(),
            )
            .await;

        assert_eq!(report.status, RunStatus::Success, "{:?}", report.error);
        assert_eq!(report.operations, vec![Operation::DirectFiles, Operation::CodeExecution]);
        assert_eq!(report.created_files.len(), 2);
        assert!(report.error.is_none());
        let session_dir = root.path().join("s1");
        assert_eq!(
            std::fs::read_to_string(session_dir.join("summary.txt")).unwrap(),
            "short"
        );
        let code = report.code_results.as_ref().unwrap();
        assert_eq!(code.successful_variant.as_deref(), Some("CODE_1A"));

        let rendered = serde_json::to_value(&report).unwrap();
        assert_eq!(rendered["operations"], json!(["direct_files", "python_code"]));
        assert_eq!(rendered["status"], json!("success"));
    }

    #[tokio::test]
    async fn test_failed_code_phase_is_partial_failure() {
        let root = TempDir::new().unwrap();
        let report = executor(&root, ToolSet::new())
            .run_user_code(
                &task(json!({"code_variants": {"A": "raise ValueError('no')"}})),
                &JsonMap::new(),
            )
            .await;

        assert_eq!(report.status, RunStatus::PartialFailure);
        assert_eq!(
            report.error.as_deref(),
            Some("Code execution failed: All code variants failed. Errors: A: ValueError: no")
        );
    }

    #[tokio::test]
    async fn test_unusable_session_fails_the_run() {
        let root = TempDir::new().unwrap();
        let report = executor(&root, ToolSet::new())
            .run_user_code(
                &task(json!({"session_id": "..", "files": {"a.txt": "x"}})),
                &JsonMap::new(),
            )
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.error.unwrap().contains("Invalid session id"));
    }

    #[tokio::test]
    async fn test_legacy_run_code_uses_single_variant() {
        let root = TempDir::new().unwrap();
        let report = executor(&root, ToolSet::new())
            .run_code("answer = upstream * 2", Some("legacy"), &{
                let mut prior = JsonMap::new();
                prior.insert("upstream".to_string(), json!(21));
                prior
            })
            .await;

        assert_eq!(report.status, RunStatus::Success);
        let code = report.code_results.unwrap();
        assert_eq!(code.successful_variant.as_deref(), Some(LEGACY_VARIANT));
        assert_eq!(code.outcome.result, json!({"answer": 42}));
    }
}
