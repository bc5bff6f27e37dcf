//! Channel message envelope and the command vocabulary.
//!
//! One envelope shape travels in both directions:
//!
//! ```json
//! { "kind": "command", "command": "load", "argument": "add $t0 1 2" }
//! { "kind": "result", "command": "load", "payload": null }
//! { "kind": "result", "command": "step", "error": { "code": "not_loaded" } }
//! { "kind": "print", "payload": "hello" }
//! ```
//!
//! Commands carry no identifiers. The dispatcher answers strictly in arrival
//! order, so the controller pairs results with calls by position alone.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ControlError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Command,
    Result,
    Print,
}

/// Message envelope (both directions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ControlError>,
}

impl Envelope {
    pub fn command(name: impl Into<String>, argument: Option<Value>) -> Self {
        Self {
            kind: EnvelopeKind::Command,
            command: Some(name.into()),
            argument,
            payload: None,
            error: None,
        }
    }

    /// Successful result of the command `name`.
    pub fn success(name: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Result,
            command: Some(name.into()),
            argument: None,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed result of the command `name`.
    pub fn failure(name: Option<String>, error: ControlError) -> Self {
        Self {
            kind: EnvelopeKind::Result,
            command: name,
            argument: None,
            payload: None,
            error: Some(error),
        }
    }

    pub fn print(text: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Print,
            command: None,
            argument: None,
            payload: Some(Value::String(text.into())),
            error: None,
        }
    }

    /// Resolve a result envelope into the payload or the failure it carries.
    pub fn into_outcome(self) -> Result<Value> {
        if self.kind != EnvelopeKind::Result {
            return Err(ControlError::Malformed(format!(
                "expected a result envelope, got {:?}",
                self.kind
            )));
        }
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.payload.unwrap_or(Value::Null)),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Console output fragment forwarded from the execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintEvent {
    pub payload: String,
}

/// The closed command vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Load { source: String },
    Step,
    Stop,
    Reset,
    IsCompleted,
    GetExitStatus,
    GetRegisterValue { name: String },
    GetRegisterNames,
    GetRegisterValues,
    GetMemoryBounds,
    GetMemorySlice { address: u64, length: u64 },
    GetWordSize,
    ReceiveInput { text: String },
}

/// Wire names of every command, in vocabulary order.
pub const COMMAND_NAMES: [&str; 14] = [
    "ping",
    "load",
    "step",
    "stop",
    "reset",
    "is_completed",
    "get_exit_status",
    "get_register_value",
    "get_register_names",
    "get_register_values",
    "get_memory_bounds",
    "get_memory_slice",
    "get_word_size",
    "receive_input",
];

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Load { .. } => "load",
            Command::Step => "step",
            Command::Stop => "stop",
            Command::Reset => "reset",
            Command::IsCompleted => "is_completed",
            Command::GetExitStatus => "get_exit_status",
            Command::GetRegisterValue { .. } => "get_register_value",
            Command::GetRegisterNames => "get_register_names",
            Command::GetRegisterValues => "get_register_values",
            Command::GetMemoryBounds => "get_memory_bounds",
            Command::GetMemorySlice { .. } => "get_memory_slice",
            Command::GetWordSize => "get_word_size",
            Command::ReceiveInput { .. } => "receive_input",
        }
    }

    /// Wire form of the argument, if the command takes one.
    pub fn argument(&self) -> Option<Value> {
        match self {
            Command::Load { source } => Some(Value::String(source.clone())),
            Command::GetRegisterValue { name } => Some(Value::String(name.clone())),
            Command::GetMemorySlice { address, length } => {
                Some(json!({ "address": address, "length": length }))
            }
            Command::ReceiveInput { text } => Some(Value::String(text.clone())),
            _ => None,
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::command(self.name(), self.argument())
    }

    /// Parse the wire form of a command.
    ///
    /// A JSON `null` argument counts as absent.
    pub fn from_wire(name: &str, argument: Option<Value>) -> Result<Self> {
        let argument = argument.filter(|value| !value.is_null());
        let command = match name {
            "ping" => Command::Ping,
            "load" => Command::Load {
                source: string_argument(name, argument)?,
            },
            "step" => Command::Step,
            "stop" => Command::Stop,
            "reset" => Command::Reset,
            "is_completed" => Command::IsCompleted,
            "get_exit_status" => Command::GetExitStatus,
            "get_register_value" => Command::GetRegisterValue {
                name: string_argument(name, argument)?,
            },
            "get_register_names" => Command::GetRegisterNames,
            "get_register_values" => Command::GetRegisterValues,
            "get_memory_bounds" => Command::GetMemoryBounds,
            "get_memory_slice" => {
                let argument =
                    argument.ok_or_else(|| ControlError::MissingArgument(name.to_string()))?;
                Command::GetMemorySlice {
                    address: u64_field(name, &argument, "address")?,
                    length: u64_field(name, &argument, "length")?,
                }
            }
            "get_word_size" => Command::GetWordSize,
            "receive_input" => {
                // `{ "data": "..." }` is accepted alongside a bare string.
                let argument = match argument {
                    Some(Value::Object(mut fields)) => fields.remove("data"),
                    other => other,
                };
                Command::ReceiveInput {
                    text: string_argument(name, argument)?,
                }
            }
            other => return Err(ControlError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

fn string_argument(command: &str, argument: Option<Value>) -> Result<String> {
    match argument {
        None | Some(Value::Null) => Err(ControlError::MissingArgument(command.to_string())),
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(ControlError::InvalidArgument {
            command: command.to_string(),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn u64_field(command: &str, argument: &Value, field: &str) -> Result<u64> {
    match argument.get(field) {
        None | Some(Value::Null) => Err(ControlError::MissingArgument(command.to_string())),
        Some(value) => value.as_u64().ok_or_else(|| ControlError::InvalidArgument {
            command: command.to_string(),
            reason: format!("`{field}` must be a non-negative integer, got {value}"),
        }),
    }
}
