//! Wire protocol
//!
//! Every link carries comma separated text commands: the first token names
//! the command, the rest are positional arguments. Structured payloads are
//! JSON and may contain commas, so they always take the rest of the line.

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::host::{NativeTab, Size, TabId};
use crate::utils::rejoin_args;

/// Malformed command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("{command}: missing argument {index}")]
    MissingArgument { command: String, index: usize },
    #[error("{command}: bad integer {value:?}")]
    BadInteger { command: String, value: String },
    #[error("{command}: bad JSON: {reason}")]
    BadJson { command: String, reason: String },
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq)]
pub struct Command<'a> {
    parts: Vec<&'a str>,
}

impl<'a> Command<'a> {
    pub fn parse(message: &'a str) -> Result<Self, ProtocolError> {
        let message = message.trim_end_matches(['\r', '\n']);
        if message.is_empty() {
            return Err(ProtocolError::Empty);
        }
        Ok(Self {
            parts: message.split(',').collect(),
        })
    }

    pub fn name(&self) -> &'a str {
        self.parts[0]
    }

    /// Positional argument, 1-based like the wire format
    pub fn arg(&self, index: usize) -> Result<&'a str, ProtocolError> {
        self.parts
            .get(index)
            .copied()
            .ok_or_else(|| ProtocolError::MissingArgument {
                command: self.name().to_string(),
                index,
            })
    }

    pub fn int_arg(&self, index: usize) -> Result<i64, ProtocolError> {
        let value = self.arg(index)?;
        value
            .trim()
            .parse()
            .map_err(|_| ProtocolError::BadInteger {
                command: self.name().to_string(),
                value: value.to_string(),
            })
    }

    pub fn id_arg(&self, index: usize) -> Result<TabId, ProtocolError> {
        let value = self.arg(index)?;
        value
            .trim()
            .parse()
            .map_err(|_| ProtocolError::BadInteger {
                command: self.name().to_string(),
                value: value.to_string(),
            })
    }

    /// Everything after the command name, commas included
    pub fn rest(&self) -> String {
        rejoin_args(&self.parts)
    }

    /// Everything from argument `index` on, commas included
    pub fn rest_from(&self, index: usize) -> Result<String, ProtocolError> {
        self.arg(index)?;
        Ok(self.parts[index..].join(","))
    }

    /// The rest of the line as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_str(&self.rest()).map_err(|e| ProtocolError::BadJson {
            command: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Outgoing half of a link
pub trait MessageSender {
    fn send_message(&mut self, message: String);
}

impl MessageSender for Vec<String> {
    fn send_message(&mut self, message: String) {
        self.push(message);
    }
}

impl MessageSender for UnboundedSender<String> {
    fn send_message(&mut self, message: String) {
        if self.send(message).is_err() {
            warn!("Dropping message for a closed link");
        }
    }
}

/// `command,<json>`, logging instead of failing on serialisation errors
pub fn json_command<T: Serialize>(command: &str, payload: &T) -> Option<String> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(format!("{},{}", command, json)),
        Err(e) => {
            warn!("Failed to serialise {} payload: {}", command, e);
            None
        }
    }
}

/// `/tab_state` payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TabState {
    pub id: TabId,
    pub active: bool,
    pub removed: bool,
    pub title: String,
    pub uri: String,
    pub page_state: String,
    pub status_message: String,
}

/// `/tab_info` payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TabInfo {
    pub url: String,
    pub title: String,
}

/// `/dimensions` payload
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionsReport {
    pub char: Size,
    pub dom: Size,
}

/// `/raw_text` as forwarded to the terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextResponse {
    pub request_id: String,
    /// The renderer's payload, still encoded
    pub json: String,
}

/// Browser actions sent to a driver as `/browser,<json>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserCommand {
    Reload { id: TabId },
    Remove { id: TabId },
    /// The driver reports the new tab under the given id
    Create { id: TabId, url: String },
    Duplicate { id: TabId },
    Activate { id: TabId },
    Resize { width: i64, height: i64 },
    UserAgent { user_agent: Option<String> },
}

/// `/native_tabs` payload
pub type NativeTabs = Vec<NativeTab>;
