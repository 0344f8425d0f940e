// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The `ChatService` trait
//!
//! Everything above this seam (waiter, transfer executor, client facade)
//! is written against the trait, so the HTTP client and the test mock are
//! interchangeable.

use std::path::Path;

use async_trait::async_trait;

use crate::api::types::{ChatMode, ChatState, ChatSummary, NewChat, RemoteFileRef};
use crate::error::Result;

/// Remote chat service operations used by the SDK core.
///
/// Uploads are not chat-scoped: the outgoing pipeline uploads referenced
/// files before the chat exists, and the service hands back a blob name
/// that the message text then carries.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Create a new chat from an already-transformed prompt.
    async fn create_chat(&self, prompt: &str, mode: ChatMode) -> Result<NewChat>;

    /// Queue a message on a chat. Valid for completed chats too; sending
    /// to a completed chat revives it.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;

    /// The poll primitive: current status plus full ordered history.
    async fn get_state(&self, chat_id: &str) -> Result<ChatState>;

    /// Upload one local file. Exactly one attempt; retry is the caller's
    /// decision.
    async fn upload_file(&self, local_path: &Path) -> Result<RemoteFileRef>;

    /// Fetch the bytes of a remote file.
    async fn download_file(&self, remote: &RemoteFileRef) -> Result<Vec<u8>>;

    /// List recent chats.
    async fn list_chats(&self, limit: usize) -> Result<Vec<ChatSummary>>;
}
