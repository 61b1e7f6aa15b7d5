//! Hermetic stand-in for a real MCP server, used only by the integration
//! tests in `tests/`. Speaks newline-delimited JSON-RPC over stdio and
//! understands just enough of the protocol to drive the scenarios under
//! test: `initialize`, `tools/list`, `tools/call` (`echo`, `store`,
//! `crash`, `raise`), and `ping`. Never spawned outside test code.
//!
//! If `MOCK_CRASH_AFTER_MS` is set, exits the whole process after that many
//! milliseconds on a background timer, independent of any request — this
//! simulates a crash without requiring a caller to block on a reply that
//! will never come.

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

fn main() {
    if let Ok(ms) = std::env::var("MOCK_CRASH_AFTER_MS") {
        if let Ok(ms) = ms.parse::<u64>() {
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(ms));
                std::process::exit(1);
            });
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            continue;
        };

        let Some(id) = request.get("id").cloned() else {
            // Notification: no reply expected.
            continue;
        };
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        let response = handle(method, &params, id);
        let _ = writeln!(stdout, "{}", serde_json::to_string(&response).unwrap());
        let _ = stdout.flush();
    }
}

fn handle(method: &str, params: &Value, id: Value) -> Value {
    match method {
        "initialize" => ok(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "serverInfo": {"name": "mock-mcp-server", "version": "0.1.0"},
            }),
        ),
        "tools/list" => ok(
            id,
            json!({
                "tools": [
                    {"name": "echo"},
                    {"name": "store"},
                    {"name": "crash"},
                    {"name": "raise"},
                ]
            }),
        ),
        "tools/call" => handle_tool_call(params, id),
        "ping" => ok(id, json!({})),
        other => error(id, -32601, format!("method not found: {other}")),
    }
}

fn handle_tool_call(params: &Value, id: Value) -> Value {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    match name {
        "echo" => {
            let message = arguments.get("message").and_then(Value::as_str).unwrap_or_default();
            ok(id, json!({"content": [{"type": "text", "text": message}]}))
        }
        "store" => ok(id, json!({"content": [{"type": "text", "text": "stored"}]})),
        "crash" => {
            // Simulates an abnormal exit: no response is sent, the process
            // just disappears, same as a real server crashing mid-call.
            std::process::exit(1);
        }
        "raise" => error(id, -32000, "boom".to_string()),
        other => error(id, -32602, format!("unknown tool: {other}")),
    }
}

fn ok(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error(id: Value, code: i64, message: String) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}
