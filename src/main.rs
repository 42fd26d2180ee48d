use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cosmos_executor::config::ExecutorConfig;
use cosmos_executor::engine::JsonMap;
use cosmos_executor::orchestrator::{Executor, TaskOutput};
use cosmos_executor::tools::ToolSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

/// Log filter, e.g. `COSMOS_LOG=debug` or `COSMOS_LOG=cosmos_executor=trace`.
const LOG_ENV: &str = "COSMOS_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "cosmos-exec",
    about = "Materialize task files and run tool-calling code variants until one succeeds",
    version
)]
struct Args {
    /// Task output JSON file (`-` reads stdin)
    #[arg(default_value = "-")]
    task: String,

    /// Session identifier (overrides the task's `session_id`)
    #[arg(long)]
    session: Option<String>,

    /// Parent directory for session output (overrides config and COSMOS_OUTPUT_ROOT)
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Canned tool replies: inline JSON object or a path to one
    #[arg(long)]
    tools: Option<String>,

    /// Prior-stage bindings merged into `globals_schema` (inline JSON or path)
    #[arg(long)]
    globals: Option<String>,

    /// Input bindings merged into `inputs` (inline JSON or path)
    #[arg(long)]
    inputs: Option<String>,

    /// Extra variant global, value parsed as JSON (falls back to a string)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Pretty-print the report
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = ExecutorConfig::load();
    if let Some(root) = &args.output_root {
        config.output_root = root.clone();
    }

    let mut task: TaskOutput = serde_json::from_str(&read_task(&args.task).await?)
        .context("Task output is not valid JSON")?;
    if let Some(session) = &args.session {
        task.session_id = Some(session.clone());
    }
    if let Some(globals) = &args.globals {
        task.globals_schema.extend(json_object_arg(globals, "--globals")?);
    }
    if let Some(inputs) = &args.inputs {
        task.inputs.extend(json_object_arg(inputs, "--inputs")?);
    }
    let variant_globals = parse_assignments(&args.set)?;

    let tools = match &args.tools {
        Some(spec) => ToolSet::from_canned(json_object_arg(spec, "--tools")?),
        None => ToolSet::new(),
    };

    let executor = Executor::new(config, Arc::new(tools));
    let report = executor.run_user_code(&task, &variant_globals).await;

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", rendered);

    if !report.status.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

async fn read_task(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Failed to read task output from stdin")?;
        return Ok(text);
    }
    tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("Failed to read task output {}", source))
}

/// Inline JSON object, or a path to a file holding one.
fn json_object_arg(value: &str, flag: &str) -> Result<JsonMap> {
    let text = if value.trim_start().starts_with('{') {
        value.to_string()
    } else {
        std::fs::read_to_string(value).with_context(|| format!("Failed to read {} {}", flag, value))?
    };
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", flag))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(anyhow!("{} must be a JSON object, got {}", flag, other)),
    }
}

fn parse_assignments(pairs: &[String]) -> Result<JsonMap> {
    let mut globals = JsonMap::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--set expects KEY=VALUE, got {:?}", pair))?;
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        globals.insert(key.trim().to_string(), value);
    }
    Ok(globals)
}
