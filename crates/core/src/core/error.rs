//! Error taxonomy for the sync layer.
//!
//! None of these are fatal to a session: the controller logs them and drops
//! the offending frame or call. Only [`ConfigError`] is allowed to abort
//! startup.

use std::path::PathBuf;

use thiserror::Error;

/// An inbound frame that could not be turned into `(eventName, payload)`.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed frame: not an array")]
    NotAnArray,
    #[error("malformed frame: empty array, no event name")]
    MissingEventName,
    #[error("malformed frame: event name is not a string")]
    EventNameNotString,
    #[error("malformed frame: binary message is not UTF-8")]
    NotText,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler registered for event `{0}`")]
    UnknownEvent(String),
    #[error("payload for event `{event}` does not match its handler: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown node `{0}`")]
    UnknownNode(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid endpoint `{0}`: expected ws://, wss://, http:// or https://")]
    InvalidEndpoint(String),
}
