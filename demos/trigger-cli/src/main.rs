//! Command-line front end for the trigger runtime.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use trigger_runtime::TriggerRuntime;
use trigger_runtime::config::RuntimeConfig;
use trigger_runtime::executor::{Attempt, ExecutionMode, ExecutionPolicy};
use trigger_runtime::primitives::{Metadata, Priority, TriggerType};
use trigger_runtime::telemetry::{self, TelemetryConfig};
use trigger_runtime::tools::{ToolError, ToolMetadata, ToolResult};

#[derive(Parser)]
#[command(name = "trigger-cli", about = "Dispatch triggers and invoke tools")]
struct Cli {
    /// JSON runtime configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dispatch a trigger to the built-in handlers.
    Process {
        /// COMMAND, EVENT, SCHEDULED, or CONDITIONAL.
        trigger_type: TriggerType,
        /// LOW, MEDIUM, HIGH, or CRITICAL.
        #[arg(long, default_value = "MEDIUM")]
        priority: Priority,
        /// Payload as JSON; anything that is not JSON is sent as a string.
        #[arg(long, default_value = "null")]
        payload: String,
        /// Metadata entries as `key=value`.
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },
    /// Invoke one of the demo tools.
    Tool {
        /// Tool name.
        name: String,
        /// Tool input as JSON.
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// List demo tools by priority.
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_path(path)?,
        None => RuntimeConfig::default(),
    };
    telemetry::init(&TelemetryConfig::new(config.log_filter.clone()))?;

    let runtime = TriggerRuntime::from_config(config)?;
    register_demo_tools(&runtime)?;

    match cli.command {
        Command::Process {
            trigger_type,
            priority,
            payload,
            metadata,
        } => {
            let response = runtime
                .process(
                    trigger_type,
                    priority,
                    parse_payload(&payload),
                    Some(parse_metadata(&metadata)?),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Tool { name, input } => {
            let input: Value =
                serde_json::from_str(&input).context("tool input must be valid JSON")?;
            let output = runtime.invoke_tool(&name, input).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Tools => {
            for metadata in runtime.tools().list() {
                let priority = runtime.tools().priorities().priority_of(metadata.name());
                println!(
                    "{:>3}  {:<22} {}",
                    priority,
                    metadata.name(),
                    metadata.description().unwrap_or_default()
                );
            }
        }
    }

    runtime.shutdown();
    Ok(())
}

fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

fn parse_metadata(entries: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("metadata entry `{entry}` must look like key=value");
        };
        metadata.insert(key.to_owned(), parse_payload(value));
    }
    Ok(metadata)
}

fn code_of(input: &Value) -> ToolResult<&str> {
    input["code"]
        .as_str()
        .ok_or_else(|| ToolError::execution("input requires a string `code` field"))
}

fn register_demo_tools(runtime: &TriggerRuntime) -> Result<()> {
    let tools = runtime.tools();

    tools.register_blocking_tool(
        ToolMetadata::new("security_scan", "1.0.0")?
            .with_description("High-priority security scanning"),
        ExecutionPolicy::new()
            .with_priority(10)
            .with_mode(ExecutionMode::Offloaded)
            .with_timeout(Duration::from_secs(5))
            .with_retry_count(1),
        |input: Value, attempt: &Attempt| {
            if attempt.is_cancelled() {
                return Err(ToolError::execution("scan cancelled"));
            }
            let code = code_of(&input)?;
            Ok::<_, ToolError>(Value::from(format!(
                "Running priority security scan on: {code}"
            )))
        },
    )?;

    tools.register_tool(
        ToolMetadata::new("performance_analysis", "1.0.0")?
            .with_description("Medium-priority performance analysis"),
        ExecutionPolicy::new()
            .with_priority(5)
            .with_timeout(Duration::from_secs(2)),
        |input: Value| async move {
            let code = code_of(&input)?;
            Ok::<_, ToolError>(Value::from(format!(
                "Running performance analysis on: {code}"
            )))
        },
    )?;

    tools.register_tool(
        ToolMetadata::new("code_format", "1.0.0")?.with_description("Standard code formatting"),
        ExecutionPolicy::new(),
        |input: Value| async move {
            let code = code_of(&input)?;
            Ok::<_, ToolError>(Value::from(format!("Formatting code: {code}")))
        },
    )?;

    info!(tools = tools.list().len(), "demo tools registered");
    Ok(())
}
