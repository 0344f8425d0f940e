// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock chat service for testing
//!
//! Provides a scriptable implementation of the `ChatService` trait so the
//! waiter, revival and client logic can be tested without a network.
//! Polls are served from a queue; once the queue runs dry the last state
//! repeats, which mirrors a quiescent remote chat.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::api::service::ChatService;
use crate::api::types::{
    ChatMode, ChatState, ChatStatus, ChatSummary, Message, NewChat, RemoteFileRef, Role,
};
use crate::error::{ApiError, CellCogError, Result};

/// One scripted poll result
#[derive(Debug, Clone)]
enum PollScript {
    State(ChatState),
    TransientError,
    Fatal(FatalKind),
}

#[derive(Debug, Clone, Copy)]
enum FatalKind {
    AuthenticationFailed,
    PaymentRequired,
}

/// A scriptable mock chat service
#[derive(Clone, Default)]
pub struct MockChatService {
    polls: Arc<Mutex<VecDeque<PollScript>>>,
    on_send: Arc<Mutex<VecDeque<PollScript>>>,
    last_state: Arc<Mutex<Option<ChatState>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    created: Arc<Mutex<Vec<String>>>,
    uploaded: Arc<Mutex<Vec<PathBuf>>>,
    upload_failures_remaining: Arc<AtomicUsize>,
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failing_blobs: Arc<Mutex<HashSet<String>>>,
    state_calls: Arc<AtomicUsize>,
    download_calls: Arc<Mutex<Vec<String>>>,
}

impl MockChatService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a state to serve on the next poll
    pub fn push_state(&self, state: ChatState) {
        self.polls.lock().unwrap().push_back(PollScript::State(state));
    }

    /// Queue a state that becomes visible only after the next
    /// `send_message`, modeling a remote that wakes up when nudged
    pub fn push_state_on_send(&self, state: ChatState) {
        self.on_send
            .lock()
            .unwrap()
            .push_back(PollScript::State(state));
    }

    /// Queue a transient (retryable) poll failure
    pub fn push_transient_error(&self) {
        self.polls.lock().unwrap().push_back(PollScript::TransientError);
    }

    /// Queue a fatal authentication failure
    pub fn push_auth_failure(&self) {
        self.polls
            .lock()
            .unwrap()
            .push_back(PollScript::Fatal(FatalKind::AuthenticationFailed));
    }

    /// Queue a fatal payment-required failure
    pub fn push_payment_required(&self) {
        self.polls
            .lock()
            .unwrap()
            .push_back(PollScript::Fatal(FatalKind::PaymentRequired));
    }

    /// Register downloadable bytes for a blob name
    pub fn register_blob(&self, blob: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(blob.into(), bytes);
    }

    /// Make downloads for a blob name fail
    pub fn fail_blob(&self, blob: impl Into<String>) {
        self.failing_blobs.lock().unwrap().insert(blob.into());
    }

    /// Make the next `n` uploads fail with a transient error
    pub fn fail_next_uploads(&self, n: usize) {
        self.upload_failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Messages recorded by `send_message`
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Prompts recorded by `create_chat`
    pub fn created_prompts(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    /// Paths recorded by `upload_file` (including failed attempts)
    pub fn uploaded_paths(&self) -> Vec<PathBuf> {
        self.uploaded.lock().unwrap().clone()
    }

    /// Number of `get_state` calls so far
    pub fn poll_count(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    /// Blob names requested through `download_file`
    pub fn downloaded_blobs(&self) -> Vec<String> {
        self.download_calls.lock().unwrap().clone()
    }

    /// Convenience constructor for a message at a given index
    pub fn message(index: u64, role: Role, content: impl Into<String>) -> Message {
        Message {
            index,
            role,
            content: content.into(),
            created_at: Some(Utc::now()),
        }
    }

    /// Convenience constructor for a state snapshot
    pub fn state(status: ChatStatus, messages: Vec<Message>) -> ChatState {
        ChatState {
            status,
            error: None,
            messages,
            file_urls: HashMap::new(),
        }
    }
}

#[async_trait]
impl ChatService for MockChatService {
    async fn create_chat(&self, prompt: &str, _mode: ChatMode) -> Result<NewChat> {
        self.created.lock().unwrap().push(prompt.to_string());
        Ok(NewChat {
            chat_id: "chat-mock".to_string(),
            status: ChatStatus::Operating,
        })
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));

        // Release any states gated on a send.
        let mut pending = self.on_send.lock().unwrap();
        let mut polls = self.polls.lock().unwrap();
        while let Some(script) = pending.pop_front() {
            polls.push_back(script);
        }
        Ok(())
    }

    async fn get_state(&self, _chat_id: &str) -> Result<ChatState> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);

        let script = self.polls.lock().unwrap().pop_front();
        match script {
            Some(PollScript::State(state)) => {
                *self.last_state.lock().unwrap() = Some(state.clone());
                Ok(state)
            }
            Some(PollScript::TransientError) => {
                Err(ApiError::Network("scripted network failure".to_string()).into())
            }
            Some(PollScript::Fatal(FatalKind::AuthenticationFailed)) => {
                Err(ApiError::AuthenticationFailed.into())
            }
            Some(PollScript::Fatal(FatalKind::PaymentRequired)) => Err(ApiError::PaymentRequired {
                billing_url: "https://cellcog.ai/profile?tab=billing".to_string(),
                min_credits_required: None,
                current_balance: None,
            }
            .into()),
            None => Ok(self
                .last_state
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_default()),
        }
    }

    async fn upload_file(&self, local_path: &Path) -> Result<RemoteFileRef> {
        self.uploaded.lock().unwrap().push(local_path.to_path_buf());

        let remaining = self.upload_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.upload_failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(ApiError::Network("scripted upload failure".to_string()).into());
        }

        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        Ok(RemoteFileRef {
            blob_name: format!("chat-mock/{}", filename),
            url: None,
        })
    }

    async fn download_file(&self, remote: &RemoteFileRef) -> Result<Vec<u8>> {
        self.download_calls
            .lock()
            .unwrap()
            .push(remote.blob_name.clone());

        if self.failing_blobs.lock().unwrap().contains(&remote.blob_name) {
            return Err(CellCogError::Download(format!(
                "scripted download failure for {}",
                remote.blob_name
            )));
        }

        let registered = self.blobs.lock().unwrap().get(&remote.blob_name).cloned();
        Ok(registered.unwrap_or_else(|| b"mock file content".to_vec()))
    }

    async fn list_chats(&self, _limit: usize) -> Result<Vec<ChatSummary>> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_states_served_in_order() {
        let mock = MockChatService::new();
        mock.push_state(MockChatService::state(ChatStatus::Operating, vec![]));
        mock.push_state(MockChatService::state(ChatStatus::Completed, vec![]));

        assert_eq!(mock.get_state("c").await.unwrap().status, ChatStatus::Operating);
        assert_eq!(mock.get_state("c").await.unwrap().status, ChatStatus::Completed);
        // Queue dry: last state repeats.
        assert_eq!(mock.get_state("c").await.unwrap().status, ChatStatus::Completed);
        assert_eq!(mock.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_transient_error_then_recovery() {
        let mock = MockChatService::new();
        mock.push_transient_error();
        mock.push_state(MockChatService::state(ChatStatus::Operating, vec![]));

        assert!(mock.get_state("c").await.is_err());
        assert!(mock.get_state("c").await.is_ok());
    }

    #[tokio::test]
    async fn test_upload_failure_budget() {
        let mock = MockChatService::new();
        mock.fail_next_uploads(1);

        assert!(mock.upload_file(Path::new("/tmp/a.txt")).await.is_err());
        let blob = mock.upload_file(Path::new("/tmp/a.txt")).await.unwrap();
        assert_eq!(blob.blob_name, "chat-mock/a.txt");
        assert_eq!(mock.uploaded_paths().len(), 2);
    }

    #[tokio::test]
    async fn test_download_registered_and_failing_blobs() {
        let mock = MockChatService::new();
        mock.register_blob("b1", b"hello".to_vec());
        mock.fail_blob("b2");

        let r1 = RemoteFileRef { blob_name: "b1".to_string(), url: None };
        assert_eq!(mock.download_file(&r1).await.unwrap(), b"hello");

        let r2 = RemoteFileRef { blob_name: "b2".to_string(), url: None };
        assert!(mock.download_file(&r2).await.is_err());
    }
}
