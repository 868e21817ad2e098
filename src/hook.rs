//! `PreToolUse` hook protocol handling.
//!
//! The host pipes one JSON object (`{"tool_name": ..., "tool_input": {...}}`)
//! to stdin before running a tool. Exiting with [`BLOCK_EXIT_CODE`] blocks the
//! tool and shows stderr to the agent; any other exit lets the tool run.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::{self, IsTerminal, Read, Write};

/// Exit status that tells the host not to run the tool.
pub const BLOCK_EXIT_CODE: i32 = 2;

/// Default cap on stdin size; larger payloads are allowed unchecked.
pub const DEFAULT_MAX_HOOK_INPUT_BYTES: usize = 256 * 1024;

/// One requested tool invocation, as sent by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool being invoked ("Bash", "Read", "Write", ...).
    #[serde(default)]
    pub tool_name: String,

    /// Tool-specific parameters. Only `command` and `file_path` are inspected.
    #[serde(default)]
    pub tool_input: Map<String, Value>,
}

impl ToolInvocation {
    /// Build an invocation from a tool name and a JSON `tool_input` object.
    /// Non-object input is treated as empty.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, tool_input: Value) -> Self {
        let tool_input = match tool_input {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool_name: tool_name.into(),
            tool_input,
        }
    }

    /// Interpret a raw hook payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the payload is not an object with a
    /// string `tool_name` and an object `tool_input`.
    pub fn from_value(raw: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(raw)
    }

    /// `tool_input.command`, when it is a string.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.string_field("command")
    }

    /// `tool_input.file_path`, when it is a string.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        self.string_field("file_path")
    }

    fn string_field(&self, key: &str) -> Option<&str> {
        self.tool_input.get(key).and_then(Value::as_str)
    }
}

/// Error type for reading and parsing hook input.
#[derive(Debug)]
pub enum HookReadError {
    /// Failed to read from stdin.
    Io(io::Error),
    /// Input exceeded the configured size limit.
    InputTooLarge(usize),
    /// Input was not valid JSON.
    Json(serde_json::Error),
}

impl fmt::Display for HookReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read hook input: {e}"),
            Self::InputTooLarge(len) => write!(f, "hook input too large ({len} bytes)"),
            Self::Json(e) => write!(f, "hook input is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for HookReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::InputTooLarge(_) => None,
        }
    }
}

/// Read and parse the raw hook payload from stdin.
///
/// The payload is kept as a [`Value`] so the audit log can store it exactly
/// as received.
///
/// # Errors
///
/// See [`read_hook_input_from`].
pub fn read_hook_input(max_bytes: usize) -> Result<Value, HookReadError> {
    let stdin = io::stdin();
    read_hook_input_from(stdin.lock(), max_bytes)
}

/// Read and parse a hook payload from any reader.
///
/// # Errors
///
/// Returns [`HookReadError::Io`] if the reader fails,
/// [`HookReadError::InputTooLarge`] if more than `max_bytes` are available,
/// or [`HookReadError::Json`] if the input is not JSON.
pub fn read_hook_input_from<R: Read>(reader: R, max_bytes: usize) -> Result<Value, HookReadError> {
    let mut input = String::with_capacity(256);
    // Read up to limit + 1 to detect overflow
    let mut handle = reader.take(max_bytes as u64 + 1);
    handle
        .read_to_string(&mut input)
        .map_err(HookReadError::Io)?;

    if input.len() > max_bytes {
        return Err(HookReadError::InputTooLarge(input.len()));
    }

    serde_json::from_str(&input).map_err(HookReadError::Json)
}

/// Apply the configured color mode ("auto", "always", "never").
pub fn configure_colors(mode: &str) {
    match mode {
        "always" => colored::control::set_override(true),
        "never" => colored::control::set_override(false),
        _ => {
            if !io::stderr().is_terminal() {
                colored::control::set_override(false);
            }
        }
    }
}

/// Write a block reason to stderr for the host to relay to the agent.
pub fn print_block_message(reason: &str) {
    let stderr = io::stderr();
    let mut handle = stderr.lock();
    write_block_message(&mut handle, reason);
}

fn write_block_message<W: Write>(out: &mut W, reason: &str) {
    let mut lines = reason.lines();
    if let Some(first) = lines.next() {
        let _ = writeln!(out, "{}", first.red().bold());
    }
    for line in lines {
        let _ = writeln!(out, "{line}");
    }
}
