// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Wire-level types shared by all `ChatService` implementations

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a remote chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    /// The service is still working on the chat
    Operating,
    /// The service has stopped and is waiting for the caller
    Completed,
    /// The chat hit a terminal service-side error
    Error,
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operating => write!(f, "operating"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Service-side error classification reported with `ChatStatus::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatErrorKind {
    /// The chat was flagged as a security threat
    SecurityThreat,
    /// The chat ran out of memory on the service side
    OutOfMemory,
}

impl std::fmt::Display for ChatErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecurityThreat => write!(f, "security_threat"),
            Self::OutOfMemory => write!(f, "out_of_memory"),
        }
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The local caller (this SDK's user)
    Caller,
    /// The remote service
    Service,
    /// Service-injected system notices
    System,
}

/// One message in a chat's ordered history.
///
/// The index is the message's position in the history and is stable for
/// the lifetime of the chat; the seen-index bookkeeping is built on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub index: u64,
    pub role: Role,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Snapshot of a chat returned by one poll
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatState {
    pub status: ChatStatus,
    /// Present when `status == Error`
    pub error: Option<ChatErrorKind>,
    /// Full ordered history, index == position
    pub messages: Vec<Message>,
    /// Signed download URLs keyed by remote blob name
    pub file_urls: HashMap<String, String>,
}

impl Default for ChatStatus {
    fn default() -> Self {
        ChatStatus::Operating
    }
}

/// Reasoning mode for a new chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// Deep multi-agent reasoning ("agent team")
    AgentTeam,
    /// Single agent, faster
    Agent,
}

impl ChatMode {
    /// The wire value the API expects
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::AgentTeam => "agent_in_the_loop",
            Self::Agent => "human_in_the_loop",
        }
    }

    /// Parse the public mode names used in prompts and on the CLI
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "agent team" | "agent-team" | "team" => Some(Self::AgentTeam),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AgentTeam => write!(f, "agent team"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Result of creating a chat
#[derive(Debug, Clone)]
pub struct NewChat {
    pub chat_id: String,
    pub status: ChatStatus,
}

/// Handle to a file stored on the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRef {
    /// Opaque blob name assigned by the service
    pub blob_name: String,
    /// Signed download URL, when one is known
    pub url: Option<String>,
}

/// One entry from the chat listing
#[derive(Debug, Clone)]
pub struct ChatSummary {
    pub chat_id: String,
    pub name: String,
    pub status: ChatStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Local configuration status
#[derive(Debug, Clone)]
pub struct AccountStatus {
    pub configured: bool,
    pub email: Option<String>,
    pub api_key_prefix: Option<String>,
}
