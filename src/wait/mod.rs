// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Completion waiting
//!
//! Drives one wait invocation against a remote chat: poll the chat state,
//! deliver every not-yet-seen message in ascending index order (running
//! downloads for service messages as it goes), advance the seen index
//! after each fully processed message, and stop on a terminal condition.
//!
//! The seen index is advanced only after a message is fully delivered, so
//! a crash mid-cycle re-processes at most one message on restart and never
//! skips one. Downloads overwrite in place, which makes that re-processing
//! harmless.

pub mod revival;

pub use revival::RevivalPolicy;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatErrorKind, ChatService, ChatStatus, Message, RemoteFileRef, Role};
use crate::config::Settings;
use crate::directive::{self, MarkerTag, Replacement};
use crate::error::{CellCogError, Result};
use crate::store::SeenIndexStore;
use crate::transfer::{
    TransferExecutor, TransferKind, TransferManifest, TransferOutcome, TransferRecord,
};

/// Options for one wait invocation
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Maximum wall-clock time before the wait returns `TimedOut`
    pub timeout: Duration,
    /// Interval between polls
    pub poll_interval: Duration,
    /// Whether a failed download still advances the seen index for its
    /// message (flagged in the manifest) or halts before advancement so
    /// the message is retried next cycle
    pub advance_on_failed_download: bool,
}

impl WaitOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.wait.timeout_secs),
            poll_interval: Duration::from_secs(settings.wait.poll_interval_secs),
            advance_on_failed_download: settings.transfer.advance_on_failed_download,
        }
    }
}

/// Terminal status of a wait invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Completed,
    TimedOut,
    Errored,
}

impl std::fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Everything one wait invocation produced
#[derive(Debug)]
pub struct WaitReport {
    pub status: WaitStatus,
    /// Completed, but the last service message was a plain progress update
    /// rather than a deliverable or a question; the chat likely stopped
    /// early and is a candidate for revival
    pub stalled: bool,
    /// Newly delivered messages, content rewritten to local paths
    pub messages: Vec<Message>,
    /// Transfers performed during this invocation
    pub manifest: TransferManifest,
    /// Remote status at the last successful poll
    pub last_remote_status: Option<ChatStatus>,
    /// Service-side error classification, when the chat errored
    pub error_kind: Option<ChatErrorKind>,
    pub elapsed: Duration,
}

impl WaitReport {
    /// Whether the revival helper should try to nudge the chat back to work
    pub fn needs_revival(&self) -> bool {
        self.status == WaitStatus::TimedOut
            || (self.status == WaitStatus::Completed && self.stalled)
    }
}

/// Suspension between polls, abstracted so a push-based transport can
/// substitute for sleeping without touching the state machine.
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// Block until the next poll should happen, at most `interval`.
    async fn wait_for_change(&self, interval: Duration);
}

/// Default strategy: sleep the full interval
pub struct IntervalPoll;

#[async_trait]
impl WaitStrategy for IntervalPoll {
    async fn wait_for_change(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

/// Push-driven strategy: wake as soon as the transport signals a change,
/// falling back to the interval as an upper bound.
pub struct PushSignal {
    notify: Arc<Notify>,
}

impl PushSignal {
    pub fn new(notify: Arc<Notify>) -> Self {
        Self { notify }
    }
}

#[async_trait]
impl WaitStrategy for PushSignal {
    async fn wait_for_change(&self, interval: Duration) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Outcome of delivering one message
enum Delivery {
    /// Message fully processed; content rewritten to local paths
    Done(Message),
    /// A download failed under strict advancement: stop before advancing
    Halted,
}

/// Drives wait invocations for chats
pub struct CompletionWaiter {
    service: Arc<dyn ChatService>,
    store: Arc<SeenIndexStore>,
    transfers: Arc<TransferExecutor>,
    strategy: Arc<dyn WaitStrategy>,
}

impl CompletionWaiter {
    pub fn new(
        service: Arc<dyn ChatService>,
        store: Arc<SeenIndexStore>,
        transfers: Arc<TransferExecutor>,
    ) -> Self {
        Self {
            service,
            store,
            transfers,
            strategy: Arc::new(IntervalPoll),
        }
    }

    /// Replace the between-polls suspension strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn WaitStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub(crate) fn service(&self) -> &Arc<dyn ChatService> {
        &self.service
    }

    /// Wait until the chat reaches a terminal condition or the timeout
    /// elapses, delivering unseen messages as they appear.
    ///
    /// Cancellation is honored at loop-iteration boundaries only, so a
    /// message is never abandoned between its transfers and its seen-index
    /// advancement.
    pub async fn wait(
        &self,
        chat_id: &str,
        caller_id: &str,
        opts: &WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<WaitReport> {
        let started = Instant::now();
        let mut low_water = self.store.get(chat_id, caller_id)?;
        let mut delivered: Vec<Message> = Vec::new();
        let mut manifest = TransferManifest::default();
        let mut last_remote_status = None;
        let mut error_kind = None;

        tracing::info!(
            chat_id = %chat_id,
            caller_id = %caller_id,
            low_water = ?low_water,
            timeout_secs = opts.timeout.as_secs(),
            "wait started"
        );

        loop {
            if cancel.is_cancelled() {
                return Err(CellCogError::Cancelled);
            }

            match self.service.get_state(chat_id).await {
                Ok(state) => {
                    last_remote_status = Some(state.status);
                    error_kind = state.error;

                    let mut halted = false;
                    for msg in &state.messages {
                        if low_water.is_some_and(|seen| msg.index <= seen) {
                            continue;
                        }

                        match self
                            .deliver_message(chat_id, msg, &state.file_urls, opts, &mut manifest)
                            .await
                        {
                            Delivery::Done(rewritten) => {
                                delivered.push(rewritten);
                                self.store.advance(chat_id, caller_id, msg.index)?;
                                low_water = Some(msg.index);
                            }
                            Delivery::Halted => {
                                halted = true;
                                break;
                            }
                        }
                    }

                    match state.status {
                        ChatStatus::Error => {
                            tracing::warn!(
                                chat_id = %chat_id,
                                error_kind = ?error_kind,
                                "chat errored"
                            );
                            return Ok(Self::finish(
                                WaitStatus::Errored,
                                false,
                                delivered,
                                manifest,
                                last_remote_status,
                                error_kind,
                                started,
                            ));
                        }
                        ChatStatus::Completed if !halted => {
                            let stalled = !completion_is_final(&state.messages);
                            tracing::info!(
                                chat_id = %chat_id,
                                delivered = delivered.len(),
                                stalled,
                                "chat completed"
                            );
                            return Ok(Self::finish(
                                WaitStatus::Completed,
                                stalled,
                                delivered,
                                manifest,
                                last_remote_status,
                                error_kind,
                                started,
                            ));
                        }
                        _ => {}
                    }
                }
                Err(CellCogError::Api(api)) if api.is_fatal() => {
                    return Err(CellCogError::Api(api));
                }
                Err(CellCogError::Storage(e)) => return Err(e.into()),
                Err(e) => {
                    // Transient: no new information this cycle.
                    tracing::warn!(chat_id = %chat_id, error = %e, "poll failed");
                }
            }

            if started.elapsed() >= opts.timeout {
                tracing::warn!(
                    chat_id = %chat_id,
                    elapsed_secs = started.elapsed().as_secs(),
                    "wait timed out"
                );
                return Ok(Self::finish(
                    WaitStatus::TimedOut,
                    false,
                    delivered,
                    manifest,
                    last_remote_status,
                    error_kind,
                    started,
                ));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(CellCogError::Cancelled),
                _ = self.strategy.wait_for_change(opts.poll_interval) => {}
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        status: WaitStatus,
        stalled: bool,
        messages: Vec<Message>,
        manifest: TransferManifest,
        last_remote_status: Option<ChatStatus>,
        error_kind: Option<ChatErrorKind>,
        started: Instant,
    ) -> WaitReport {
        WaitReport {
            status,
            stalled,
            messages,
            manifest,
            last_remote_status,
            error_kind,
            elapsed: started.elapsed(),
        }
    }

    /// Process one unseen message: download files referenced by service
    /// messages and rewrite every file marker to its local path.
    async fn deliver_message(
        &self,
        chat_id: &str,
        msg: &Message,
        file_urls: &HashMap<String, String>,
        opts: &WaitOptions,
        manifest: &mut TransferManifest,
    ) -> Delivery {
        let markers = directive::scan_markers(&msg.content);
        let mut replacements = Vec::new();

        for marker in markers.iter().filter(|m| m.tag == MarkerTag::ShowFile) {
            let remote_name = marker.body.trim();
            if remote_name.is_empty() {
                continue;
            }

            let target = marker.external_local_path().map(PathBuf::from);
            let local_path = target.clone().unwrap_or_else(|| {
                self.transfers.default_download_path(chat_id, remote_name)
            });

            // Downloads only happen for service messages with a known URL;
            // everything else is a pure path rewrite.
            let url = file_urls.get(remote_name);
            if msg.role == Role::Service {
                if let Some(url) = url {
                    let remote = RemoteFileRef {
                        blob_name: remote_name.to_string(),
                        url: Some(url.clone()),
                    };
                    match self
                        .transfers
                        .download(chat_id, &remote, target.as_deref())
                        .await
                    {
                        Ok(path) => {
                            manifest.record(TransferRecord {
                                kind: TransferKind::Download,
                                local_path: path,
                                remote: Some(remote.blob_name),
                                message_index: Some(msg.index),
                                outcome: TransferOutcome::Success,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(
                                chat_id = %chat_id,
                                blob = %remote_name,
                                message_index = msg.index,
                                error = %e,
                                "download failed"
                            );
                            manifest.record(TransferRecord {
                                kind: TransferKind::Download,
                                local_path: local_path.clone(),
                                remote: Some(remote.blob_name),
                                message_index: Some(msg.index),
                                outcome: TransferOutcome::Failed(e.to_string()),
                            });
                            if !opts.advance_on_failed_download {
                                return Delivery::Halted;
                            }
                        }
                    }
                }
            }

            replacements.push(Replacement {
                start: marker.start,
                end: marker.end,
                text: format!("<SHOW_FILE>{}</SHOW_FILE>", local_path.display()),
            });
        }

        let content = directive::apply_replacements(&msg.content, &replacements);
        Delivery::Done(Message {
            index: msg.index,
            role: msg.role,
            content,
            created_at: msg.created_at,
        })
    }
}

/// A completed chat is properly finished when its last service message is
/// a deliverable (carries a file marker) or a clarifying question; a plain
/// progress update means the service stopped early.
fn completion_is_final(messages: &[Message]) -> bool {
    let Some(last_service) = messages.iter().rev().find(|m| m.role == Role::Service) else {
        return false;
    };

    let has_deliverable = !directive::extract_incoming(&last_service.content).is_empty();
    let is_question = last_service.content.trim().ends_with('?');
    has_deliverable || is_question
}
