//! Wire protocol between the dashboard and the process manager.
//!
//! Every message in either direction is a JSON array `[name, payload]`.
//! Inbound names are `add`, `update` and `log`; outbound frames are always
//! `[commandName, nodeId]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;

pub const EVENT_ADD: &str = "add";
pub const EVENT_UPDATE: &str = "update";
pub const EVENT_LOG: &str = "log";

/// Lifecycle state announced by the server for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Unknown,
    Stopped,
    Running,
}

impl NodeState {
    pub const ALL: [NodeState; 3] = [NodeState::Unknown, NodeState::Stopped, NodeState::Running];

    /// Visual class carried by a node's neighbourhood while in this state.
    pub fn class_name(self) -> &'static str {
        match self {
            NodeState::Unknown => "unknown",
            NodeState::Stopped => "stopped",
            NodeState::Running => "running",
        }
    }
}

/// One entry of an `add` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub depends: Vec<String>,
    /// Servers may announce a node together with its current state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NodeState>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, depends: &[&str]) -> Self {
        Self {
            id: id.into(),
            depends: depends.iter().map(|d| d.to_string()).collect(),
            state: None,
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = Some(state);
        self
    }
}

/// One entry of an `update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: String,
    pub state: NodeState,
}

impl NodeStatus {
    pub fn new(id: impl Into<String>, state: NodeState) -> Self {
        Self {
            id: id.into(),
            state,
        }
    }
}

/// Payload of a `log` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub node_id: String,
    pub line: String,
}

/// A shape-checked inbound frame. The payload is still untyped; the dispatch
/// registry converts it into the registered handler's payload type.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: String,
    pub payload: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(items) = value else {
            return Err(FrameError::NotAnArray);
        };

        let mut items = items.into_iter();
        let event = match items.next() {
            Some(Value::String(name)) => name,
            Some(_) => return Err(FrameError::EventNameNotString),
            None => return Err(FrameError::MissingEventName),
        };
        let payload = items.next().unwrap_or(Value::Null);

        Ok(Self { event, payload })
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FrameError::NotText)?;
        Self::decode(text)
    }

    pub fn encode(&self) -> String {
        Value::Array(vec![Value::String(self.event.clone()), self.payload.clone()]).to_string()
    }
}

/// Outbound node command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    StartNode(String),
    StopNode(String),
    SubscribeNode(String),
    UnsubscribeNode(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartNode(_) => "startNode",
            Command::StopNode(_) => "stopNode",
            Command::SubscribeNode(_) => "subscribeNode",
            Command::UnsubscribeNode(_) => "unsubscribeNode",
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            Command::StartNode(id)
            | Command::StopNode(id)
            | Command::SubscribeNode(id)
            | Command::UnsubscribeNode(id) => id,
        }
    }

    /// Serialized `[commandName, nodeId]` text frame.
    pub fn encode(&self) -> String {
        Value::Array(vec![
            Value::String(self.name().to_string()),
            Value::String(self.node_id().to_string()),
        ])
        .to_string()
    }

    pub fn decode(text: &str) -> Option<Self> {
        let (name, id): (String, String) = serde_json::from_str(text).ok()?;
        match name.as_str() {
            "startNode" => Some(Command::StartNode(id)),
            "stopNode" => Some(Command::StopNode(id)),
            "subscribeNode" => Some(Command::SubscribeNode(id)),
            "unsubscribeNode" => Some(Command::UnsubscribeNode(id)),
            _ => None,
        }
    }
}
