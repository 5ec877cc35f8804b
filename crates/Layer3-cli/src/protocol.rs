//! JSON-lines wire protocol
//!
//! One request object per line, tagged by `op`; one response object per
//! line. Protocol-level faults come back as `{"error": "..."}`; a failed
//! submit also carries the error `kind`.

use relay_foundation::Error;
use relay_task::{TaskFilter, TaskManager};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Incoming request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    Submit {
        command: String,
        #[serde(default, rename = "workingDirectory")]
        working_directory: Option<String>,
    },
    Status {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    List {
        #[serde(default)]
        filter: Option<String>,
    },
    Cancel {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    Stats,
}

fn error_reply(message: impl std::fmt::Display) -> Value {
    json!({ "error": message.to_string() })
}

fn submit_error(e: Error) -> Value {
    if !e.is_user_facing() {
        warn!("Submit failed: {}", e);
    }
    json!({ "error": e.to_string(), "kind": e.kind() })
}

fn reply<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| error_reply(format!("encode failed: {}", e)))
}

/// Execute one request against the manager
pub fn dispatch(manager: &TaskManager, request: Request) -> Value {
    match request {
        Request::Submit {
            command,
            working_directory,
        } => match manager.submit(&command, working_directory.as_deref()) {
            Ok(receipt) => reply(&receipt),
            Err(e) => submit_error(e),
        },
        Request::Status { task_id } => reply(&manager.status(&task_id)),
        Request::List { filter } => {
            let raw = filter.unwrap_or_default();
            match TaskFilter::parse(&raw) {
                Some(filter) => reply(&manager.list(filter)),
                None => error_reply(format!("unknown filter: {}", raw)),
            }
        }
        Request::Cancel { task_id } => reply(&manager.cancel(&task_id)),
        Request::Stats => reply(&manager.stats()),
    }
}

/// Parse and execute one line of input
pub fn handle_line(manager: &TaskManager, line: &str) -> Value {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            debug!("Request: {:?}", request);
            dispatch(manager, request)
        }
        Err(e) => error_reply(format!("invalid request: {}", e)),
    }
}

/// Decode and execute one raw line of input
pub fn handle_bytes(manager: &TaskManager, line: &[u8]) -> Value {
    match std::str::from_utf8(line) {
        Ok(line) => handle_line(manager, line),
        Err(e) => error_reply(format!("invalid request: input is not valid UTF-8 ({})", e)),
    }
}
