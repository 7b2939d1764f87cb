//! Zentinel Params Agent CLI entry point.
//!
//! Validates a params configuration or replays a request snapshot through it.

use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zentinel_agent_params::context::status_text;
use zentinel_agent_params::{HttpContext, ParamsAgent};

#[derive(Parser, Debug)]
#[command(name = "zentinel-agent-params")]
#[command(
    author,
    version,
    about = "Request parameter remapping agent for Zentinel"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, env = "PARAMS_CONFIG")]
    config: Option<PathBuf>,

    /// Request snapshot to replay (JSON). Reads stdin when omitted.
    #[arg(short, long)]
    request: Option<PathBuf>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,
}

/// A request as fed to `--request`.
#[derive(Debug, Deserialize)]
struct RequestSnapshot {
    #[serde(default = "default_method")]
    method: String,
    uri: String,
    #[serde(default)]
    headers: IndexMap<String, String>,
    #[serde(default)]
    body: String,
}

fn default_method() -> String {
    "GET".to_string()
}

fn print_example_config() {
    let example = r#"# Params Agent Configuration Example
params:
  # Move the user id out of a JSON body into a header
  - paramName: user_id
    paramPosition: body
    proxyParamName: X-User-Id
    proxyParamPosition: header
    required: true

  # Copy an API key header into the query string
  - paramName: x-api-key
    paramPosition: header
    proxyParamName: api_key
    proxyParamPosition: query
    required: false
    # merge (default), convert, origin or error
    paramConflictSolution: convert

# Delete source parameters after they are read
removeAfterTransformed: true
"#;
    println!("{}", example);
}

fn load_agent(path: &Path) -> Result<ParamsAgent> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let agent = if path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml")
    {
        ParamsAgent::from_yaml(&content)?
    } else {
        ParamsAgent::from_json(&content)?
    };
    Ok(agent)
}

fn read_snapshot(path: Option<&Path>) -> Result<RequestSnapshot> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    serde_json::from_str(&content).context("Invalid request snapshot")
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if args.example_config {
        print_example_config();
        return Ok(());
    }

    let agent = match &args.config {
        Some(path) => load_agent(path)?,
        None => ParamsAgent::passthrough(),
    };

    if args.validate {
        info!(config = ?args.config, "Configuration is valid");
        return Ok(());
    }

    let snapshot = read_snapshot(args.request.as_deref())?;
    let mut ctx = HttpContext::new(
        &snapshot.method,
        &snapshot.uri,
        snapshot.headers,
        snapshot.body.into_bytes(),
    );

    let output = match agent.access(&mut ctx) {
        Ok(()) => {
            let (content_type, body) = ctx.outgoing_body();
            json!({
                "proceed": true,
                "method": ctx.request.method,
                "uri": ctx.outgoing_uri(),
                "headers": ctx.outgoing().headers,
                "contentType": content_type,
                "body": String::from_utf8_lossy(&body),
                "files": ctx.outgoing().files,
            })
        }
        Err(e) => {
            let status = ctx.response().status.unwrap_or_default();
            json!({
                "proceed": false,
                "status": status,
                "statusText": status_text(status),
                "error": e.to_string(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
