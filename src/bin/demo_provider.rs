//! Reference stdio tool provider.
//!
//! Speaks line-delimited JSON-RPC 2.0 on stdin/stdout and logs to stderr.
//! Tools:
//! - `echo`: returns its arguments
//! - `sleep`: waits `ms` milliseconds, then answers
//! - `env`: returns the value of environment variable `name`
//! - `crash`: exits the process without answering
//!
//! Flags:
//! - `--page-size N`: split `tools/list` into pages of N tools
//! - `--plain`: answer `initialize` with "method not found"
//! - `--banner`: print a non-JSON line on stdout before serving
//! - `--exit-on-start`: write to stderr and exit with status 2

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const PARSE_ERROR: i64 = -32700;

#[derive(Debug, Default)]
struct Options {
    page_size: Option<usize>,
    plain: bool,
    banner: bool,
    exit_on_start: bool,
}

fn parse_args() -> Result<Options> {
    let mut opts = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--page-size" => {
                let raw = args.next().context("--page-size needs a value")?;
                let size: usize = raw.parse().context("--page-size must be a number")?;
                if size == 0 {
                    bail!("--page-size must be at least 1");
                }
                opts.page_size = Some(size);
            }
            "--plain" => opts.plain = true,
            "--banner" => opts.banner = true,
            "--exit-on-start" => opts.exit_on_start = true,
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(opts)
}

fn tool_catalog() -> Vec<Value> {
    vec![
        json!({
            "name": "echo",
            "description": "Return the arguments unchanged",
            "inputSchema": {"type": "object"}
        }),
        json!({
            "name": "sleep",
            "description": "Wait for the given number of milliseconds",
            "inputSchema": {
                "type": "object",
                "properties": {"ms": {"type": "integer"}},
                "required": ["ms"]
            }
        }),
        json!({
            "name": "env",
            "description": "Read an environment variable",
            "inputSchema": {
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }
        }),
        json!({
            "name": "crash",
            "description": "Exit the provider process immediately",
            "inputSchema": {"type": "object"}
        }),
    ]
}

/// Shared, line-atomic stdout.
#[derive(Clone)]
struct Output(Arc<Mutex<std::io::Stdout>>);

impl Output {
    fn send(&self, message: &Value) {
        let line = message.to_string();
        let mut out = match self.0.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

fn success(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn failure(id: &Value, code: i64, message: impl Into<String>) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message.into()}})
}

fn text_result(text: String) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": false})
}

fn list_tools(opts: &Options, params: Option<&Value>) -> Value {
    let tools = tool_catalog();
    let Some(size) = opts.page_size else {
        return json!({"tools": tools});
    };
    let start: usize = params
        .and_then(|p| p.get("cursor"))
        .and_then(Value::as_str)
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let end = (start + size).min(tools.len());
    let page: Vec<Value> = tools.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();
    if end < tools.len() {
        json!({"tools": page, "nextCursor": end.to_string()})
    } else {
        json!({"tools": page})
    }
}

/// Run one `tools/call`. `crash` never returns.
fn call_tool(id: &Value, params: Option<&Value>) -> Value {
    let name = params.and_then(|p| p.get("name")).and_then(Value::as_str);
    let args = params
        .and_then(|p| p.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    match name {
        Some("echo") => success(id, json!({"content": [{"type": "text", "text": args.to_string()}], "echo": args})),
        Some("sleep") => {
            let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
            std::thread::sleep(Duration::from_millis(ms));
            success(id, text_result(format!("slept {ms}ms")))
        }
        Some("env") => match args.get("name").and_then(Value::as_str) {
            Some(var) => success(id, text_result(std::env::var(var).unwrap_or_default())),
            None => failure(id, INVALID_PARAMS, "missing argument 'name'"),
        },
        Some("crash") => {
            tracing::warn!("crash requested, exiting");
            std::process::exit(3);
        }
        Some(other) => failure(id, INVALID_PARAMS, format!("Unknown tool: {other}")),
        None => failure(id, INVALID_PARAMS, "missing tool name"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let opts = parse_args()?;
    if opts.exit_on_start {
        eprintln!("demo provider: refusing to start");
        std::process::exit(2);
    }

    let output = Output(Arc::new(Mutex::new(std::io::stdout())));
    if opts.banner {
        let mut out = std::io::stdout().lock();
        writeln!(out, "demo provider ready")?;
        out.flush()?;
    }
    tracing::info!(pid = std::process::id(), "demo provider serving on stdio");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                output.send(&failure(&Value::Null, PARSE_ERROR, format!("parse error: {e}")));
                continue;
            }
        };
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let params = message.get("params");

        let Some(id) = message.get("id").cloned() else {
            // Notification.
            if method == "shutdown" {
                tracing::info!("shutdown requested");
                break;
            }
            tracing::debug!(method, "notification ignored");
            continue;
        };

        match method {
            "initialize" if opts.plain => {
                output.send(&failure(&id, METHOD_NOT_FOUND, "Method not found: initialize"));
            }
            "initialize" => output.send(&success(
                &id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "toolbridge-demo-provider", "version": env!("CARGO_PKG_VERSION")}
                }),
            )),
            "tools/list" => output.send(&success(&id, list_tools(&opts, params))),
            "tools/call" => {
                // Calls run on their own thread so slow tools answer out of order.
                let output = output.clone();
                let params = params.cloned();
                std::thread::spawn(move || output.send(&call_tool(&id, params.as_ref())));
            }
            other => output.send(&failure(&id, METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        }
    }

    tracing::info!("stdin closed, exiting");
    Ok(())
}
