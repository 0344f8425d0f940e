// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Client facade for the CellCog service
//!
//! Ties the pieces together: outgoing messages get their file markers
//! uploaded and rewritten, then the completion waiter streams the chat's
//! responses (downloading referenced files) until a terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{
    AccountStatus, ChatMode, ChatService, ChatState, ChatStatus, ChatSummary, HttpChatService,
};
use crate::config::Settings;
use crate::directive::{self, MarkerTag, Replacement};
use crate::error::Result;
use crate::retry::{with_retry, RetryConfig};
use crate::store::SeenIndexStore;
use crate::transfer::{
    TransferExecutor, TransferKind, TransferManifest, TransferOutcome, TransferRecord,
};
use crate::wait::{CompletionWaiter, RevivalPolicy, WaitOptions, WaitReport, WaitStrategy};

/// Result of creating a chat
#[derive(Debug)]
pub struct CreatedChat {
    pub chat_id: String,
    pub status: ChatStatus,
    /// Uploads performed while preparing the prompt
    pub uploads: TransferManifest,
}

/// Main client for the CellCog service
pub struct CellCogClient {
    settings: Settings,
    service: Arc<dyn ChatService>,
    store: Arc<SeenIndexStore>,
    transfers: Arc<TransferExecutor>,
    waiter: CompletionWaiter,
    working_dir: PathBuf,
}

impl CellCogClient {
    /// Build a client against the production API from settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let service: Arc<dyn ChatService> = Arc::new(HttpChatService::from_settings(&settings)?);
        Ok(Self::with_parts(settings, service, Settings::cellcog_home()))
    }

    /// Build a client from explicit parts. `home` roots the seen-index
    /// store; the download directory comes from settings.
    pub fn with_parts(
        settings: Settings,
        service: Arc<dyn ChatService>,
        home: impl Into<PathBuf>,
    ) -> Self {
        let store = Arc::new(SeenIndexStore::open(home.into()));
        let transfers = Arc::new(TransferExecutor::new(
            Arc::clone(&service),
            settings.transfer.download_dir.clone(),
        ));
        let waiter = CompletionWaiter::new(
            Arc::clone(&service),
            Arc::clone(&store),
            Arc::clone(&transfers),
        );

        Self {
            settings,
            service,
            store,
            transfers,
            waiter,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Base directory for resolving relative paths in upload markers
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Substitute the between-polls wait strategy (e.g. a push signal)
    pub fn with_wait_strategy(mut self, strategy: Arc<dyn WaitStrategy>) -> Self {
        self.waiter = self.waiter.with_strategy(strategy);
        self
    }

    /// The seen-index store, exposed for explicit resets
    pub fn store(&self) -> &Arc<SeenIndexStore> {
        &self.store
    }

    /// Local configuration status
    pub fn account_status(&self) -> AccountStatus {
        AccountStatus {
            configured: self.settings.resolved_api_key().is_some(),
            email: self.settings.api.email.clone(),
            api_key_prefix: self.settings.api_key_prefix(),
        }
    }

    /// Create a new chat. Upload markers in the prompt are processed first
    /// and the prompt is rewritten to reference the uploaded blobs.
    pub async fn create_chat(&self, prompt: &str, mode: ChatMode) -> Result<CreatedChat> {
        let (transformed, uploads) = self.prepare_outgoing(prompt).await?;
        let new_chat = self.service.create_chat(&transformed, mode).await?;
        Ok(CreatedChat {
            chat_id: new_chat.chat_id,
            status: new_chat.status,
            uploads,
        })
    }

    /// Send a message to an existing chat, processing upload markers.
    /// Sending to a completed chat revives it.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<TransferManifest> {
        let (transformed, uploads) = self.prepare_outgoing(text).await?;
        self.service.send_message(chat_id, &transformed).await?;
        Ok(uploads)
    }

    /// One wait invocation with settings-derived options.
    pub async fn wait(&self, chat_id: &str, caller_id: &str) -> Result<WaitReport> {
        self.wait_with(
            chat_id,
            caller_id,
            &WaitOptions::from_settings(&self.settings),
            &CancellationToken::new(),
        )
        .await
    }

    /// One wait invocation with explicit options and cancellation.
    pub async fn wait_with(
        &self,
        chat_id: &str,
        caller_id: &str,
        opts: &WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<WaitReport> {
        self.waiter.wait(chat_id, caller_id, opts, cancel).await
    }

    /// Wait with revival: stalls and timeouts are retried per policy
    /// before the result is declared terminal.
    pub async fn wait_until_complete(
        &self,
        chat_id: &str,
        caller_id: &str,
        opts: &WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<WaitReport> {
        let policy = RevivalPolicy::from_settings(&self.settings);
        self.waiter
            .wait_with_revival(chat_id, caller_id, opts, &policy, cancel)
            .await
    }

    /// Create a chat and wait for it to finish.
    pub async fn create_chat_and_wait(
        &self,
        prompt: &str,
        mode: ChatMode,
        caller_id: &str,
    ) -> Result<(CreatedChat, WaitReport)> {
        let created = self.create_chat(prompt, mode).await?;
        let report = self
            .wait_until_complete(
                &created.chat_id,
                caller_id,
                &WaitOptions::from_settings(&self.settings),
                &CancellationToken::new(),
            )
            .await?;
        Ok((created, report))
    }

    /// Send a message and wait for the response cycle to finish.
    pub async fn send_message_and_wait(
        &self,
        chat_id: &str,
        text: &str,
        caller_id: &str,
    ) -> Result<(TransferManifest, WaitReport)> {
        let uploads = self.send_message(chat_id, text).await?;
        let report = self
            .wait_until_complete(
                chat_id,
                caller_id,
                &WaitOptions::from_settings(&self.settings),
                &CancellationToken::new(),
            )
            .await?;
        Ok((uploads, report))
    }

    /// Current remote state of a chat (status plus history).
    pub async fn get_state(&self, chat_id: &str) -> Result<ChatState> {
        self.service.get_state(chat_id).await
    }

    /// List recent chats.
    pub async fn list_chats(&self, limit: usize) -> Result<Vec<ChatSummary>> {
        self.service.list_chats(limit).await
    }

    /// Process outgoing text: upload files referenced by `SHOW_FILE`
    /// markers (bounded retries on transient failures) and stamp
    /// `GENERATE_FILE` markers with their declared target paths. Markers
    /// whose upload fails are left untouched and flagged in the manifest.
    async fn prepare_outgoing(&self, text: &str) -> Result<(String, TransferManifest)> {
        let markers = directive::scan_markers(text);
        let mut manifest = TransferManifest::default();
        let mut replacements = Vec::new();
        let retry_config = RetryConfig::from(&self.settings.resilience);

        for marker in markers {
            match marker.tag {
                MarkerTag::GenerateFile => {
                    let target = marker.body.trim();
                    if target.is_empty() {
                        continue;
                    }
                    replacements.push(Replacement {
                        start: marker.start,
                        end: marker.end,
                        text: format!(
                            "<GENERATE_FILE external_local_path=\"{}\"></GENERATE_FILE>",
                            target
                        ),
                    });
                }
                MarkerTag::ShowFile => {
                    // Already-transformed tags are history echoes.
                    if marker.external_local_path().is_some() {
                        continue;
                    }
                    let raw = marker.body.trim();
                    if raw.is_empty() {
                        continue;
                    }
                    let source = directive::resolve_path(raw, &self.working_dir);
                    if !source.exists() {
                        // Not a local file (likely a blob reference); leave
                        // the tag for the service to interpret.
                        continue;
                    }

                    let transfers = Arc::clone(&self.transfers);
                    let upload_source = source.clone();
                    let result = with_retry(
                        move || {
                            let transfers = Arc::clone(&transfers);
                            let source = upload_source.clone();
                            async move { transfers.upload(&source).await }
                        },
                        Some(retry_config.clone()),
                        "upload_file",
                    )
                    .await;

                    match result {
                        Ok(remote) => {
                            replacements.push(Replacement {
                                start: marker.start,
                                end: marker.end,
                                text: format!(
                                    "<SHOW_FILE external_local_path=\"{}\">{}</SHOW_FILE>",
                                    source.display(),
                                    remote.blob_name
                                ),
                            });
                            manifest.record(TransferRecord {
                                kind: TransferKind::Upload,
                                local_path: source,
                                remote: Some(remote.blob_name),
                                message_index: None,
                                outcome: TransferOutcome::Success,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(
                                file = %source.display(),
                                error = %e,
                                "upload failed; leaving marker untouched"
                            );
                            manifest.record(TransferRecord {
                                kind: TransferKind::Upload,
                                local_path: source,
                                remote: None,
                                message_index: None,
                                outcome: TransferOutcome::Failed(e.to_string()),
                            });
                        }
                    }
                }
            }
        }

        Ok((directive::apply_replacements(text, &replacements), manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockChatService;

    fn client(dir: &tempfile::TempDir) -> (MockChatService, CellCogClient) {
        let mock = MockChatService::new();
        let mut settings = Settings::default();
        settings.transfer.download_dir = dir.path().join("downloads");
        settings.resilience.base_delay_ms = 1;
        settings.resilience.max_delay_ms = 5;
        let client = CellCogClient::with_parts(settings, Arc::new(mock.clone()), dir.path())
            .with_working_dir(dir.path());
        (mock, client)
    }

    #[tokio::test]
    async fn test_prepare_outgoing_uploads_and_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, client) = client(&dir);

        let source = dir.path().join("data.csv");
        std::fs::write(&source, "a,b\n1,2\n").unwrap();

        let text = format!("Analyze <SHOW_FILE>{}</SHOW_FILE> now", source.display());
        let (transformed, manifest) = client.prepare_outgoing(&text).await.unwrap();

        assert!(transformed.contains(&format!(
            "<SHOW_FILE external_local_path=\"{}\">chat-mock/data.csv</SHOW_FILE>",
            source.display()
        )));
        assert_eq!(manifest.uploaded_blobs(), vec!["chat-mock/data.csv"]);
        assert_eq!(mock.uploaded_paths(), vec![source]);
    }

    #[tokio::test]
    async fn test_prepare_outgoing_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let (_mock, client) = client(&dir);

        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let (transformed, manifest) = client
            .prepare_outgoing("<SHOW_FILE>notes.txt</SHOW_FILE>")
            .await
            .unwrap();

        assert!(transformed.contains("chat-mock/notes.txt"));
        assert_eq!(manifest.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_prepare_outgoing_rewrites_generate_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_mock, client) = client(&dir);

        let (transformed, manifest) = client
            .prepare_outgoing("Make a report: <GENERATE_FILE>/out/report.pdf</GENERATE_FILE>")
            .await
            .unwrap();

        assert_eq!(
            transformed,
            "Make a report: <GENERATE_FILE external_local_path=\"/out/report.pdf\"></GENERATE_FILE>"
        );
        assert!(manifest.is_empty());
    }

    #[tokio::test]
    async fn test_prepare_outgoing_missing_file_leaves_tag() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, client) = client(&dir);

        let text = "<SHOW_FILE>/no/such/file.bin</SHOW_FILE>";
        let (transformed, manifest) = client.prepare_outgoing(text).await.unwrap();

        assert_eq!(transformed, text);
        assert!(manifest.is_empty());
        assert!(mock.uploaded_paths().is_empty());
    }

    #[tokio::test]
    async fn test_upload_retries_on_transient_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, client) = client(&dir);
        mock.fail_next_uploads(1);

        let source = dir.path().join("data.csv");
        std::fs::write(&source, "x").unwrap();

        let text = format!("<SHOW_FILE>{}</SHOW_FILE>", source.display());
        let (transformed, manifest) = client.prepare_outgoing(&text).await.unwrap();

        assert!(transformed.contains("chat-mock/data.csv"));
        assert!(!manifest.has_failures());
        assert_eq!(mock.uploaded_paths().len(), 2);
    }

    #[tokio::test]
    async fn test_create_chat_sends_transformed_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, client) = client(&dir);

        let created = client
            .create_chat("plain prompt", ChatMode::AgentTeam)
            .await
            .unwrap();
        assert_eq!(created.chat_id, "chat-mock");
        assert_eq!(mock.created_prompts(), vec!["plain prompt".to_string()]);
    }

    #[test]
    fn test_account_status_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockChatService::new();
        let mut settings = Settings::default();
        settings.api.api_key_env = "CELLCOG_TEST_UNSET_KEY_3".to_string();
        let client = CellCogClient::with_parts(settings, Arc::new(mock), dir.path());

        let status = client.account_status();
        assert!(!status.configured);
        assert!(status.api_key_prefix.is_none());
    }
}
