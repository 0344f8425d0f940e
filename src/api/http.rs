// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! HTTP implementation of `ChatService` against the CellCog API
//!
//! Maps HTTP status codes onto the `ApiError` taxonomy and implements the
//! three-step upload flow (request slot, PUT to signed URL, confirm).

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::api::service::ChatService;
use crate::api::types::{
    ChatErrorKind, ChatMode, ChatState, ChatStatus, ChatSummary, Message, NewChat, RemoteFileRef,
    Role,
};
use crate::config::Settings;
use crate::error::{ApiError, CellCogError, Result};

const DEFAULT_API_URL: &str = "https://cellcog.ai/api";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// CellCog API client
pub struct HttpChatService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpChatService {
    /// Create a client against the production endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_URL)
    }

    /// Create a client with a custom base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build a client from settings, requiring a configured API key
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_api_key()?;
        Ok(Self::with_base_url(api_key, settings.resolved_base_url()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("X-API-Key", &self.api_key)
            .header("X-CellCog-SDK-Version", SDK_VERSION)
    }

    /// Map a transport-level failure. Timeouts and connection problems are
    /// transient from the poll loop's point of view.
    fn transport_error(err: reqwest::Error) -> CellCogError {
        if err.is_timeout() {
            ApiError::Timeout.into()
        } else {
            ApiError::Network(err.to_string()).into()
        }
    }

    /// Map an error status code onto the `ApiError` taxonomy.
    async fn check(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = resp.status().as_u16();
        if resp.status().is_success() {
            return Ok(resp);
        }

        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);

        let err = match status {
            401 => ApiError::AuthenticationFailed,
            402 => parse_payment_required(&body),
            403 => match parse_account_disabled(&body) {
                Some(err) => err,
                None => ApiError::Server {
                    status,
                    message: detail_text(&body),
                },
            },
            404 => ApiError::ChatNotFound(context.to_string()),
            426 => ApiError::UpgradeRequired {
                current: body
                    .get("current_version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                minimum: body
                    .get("minimum_version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            },
            _ => ApiError::Server {
                status,
                message: detail_text(&body),
            },
        };
        Err(err.into())
    }
}

/// Extract a human-readable detail string from an error body
fn detail_text(body: &serde_json::Value) -> String {
    match body.get("detail") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => "unexpected error".to_string(),
    }
}

/// Parse the structured 402 body, tolerating malformed payloads
fn parse_payment_required(body: &serde_json::Value) -> ApiError {
    let detail = body.get("detail");
    let payment = detail.and_then(|d| d.get("payment_options"));
    let credit = detail.and_then(|d| d.get("credit_context"));

    ApiError::PaymentRequired {
        billing_url: payment
            .and_then(|p| p.get("billing_url"))
            .and_then(|v| v.as_str())
            .unwrap_or("https://cellcog.ai/profile?tab=billing")
            .to_string(),
        min_credits_required: credit
            .and_then(|c| c.get("min_credits_required"))
            .and_then(|v| v.as_u64()),
        current_balance: credit
            .and_then(|c| c.get("current_balance"))
            .and_then(|v| v.as_u64()),
    }
}

/// Parse a 403 body into `AccountDisabled` when it carries an account
/// error type; other 403s fall through to the generic handler.
fn parse_account_disabled(body: &serde_json::Value) -> Option<ApiError> {
    let error_type = body.get("error_type")?.as_str()?;
    if !matches!(
        error_type,
        "email_not_verified" | "account_security_flagged" | "account_disabled"
    ) {
        return None;
    }
    Some(ApiError::AccountDisabled {
        reason: error_type.to_string(),
        action_url: body
            .get("action_url")
            .and_then(|v| v.as_str())
            .unwrap_or("https://cellcog.ai")
            .to_string(),
    })
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// Wire payloads

#[derive(Serialize)]
struct NewChatRequest<'a> {
    message: &'a str,
    chat_mode: &'a str,
}

#[derive(Deserialize)]
struct NewChatResponse {
    id: String,
    operating: bool,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[allow(dead_code)]
    #[serde(default)]
    name: String,
    operating: bool,
    #[serde(default)]
    is_security_threat: bool,
    #[serde(default)]
    is_out_of_memory: bool,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
    #[serde(rename = "messageFrom", default)]
    message_from: String,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct BlobUrl {
    url: String,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
    #[serde(default)]
    blob_name_to_url: HashMap<String, BlobUrl>,
}

#[derive(Serialize)]
struct RequestUploadRequest<'a> {
    filename: &'a str,
    file_size: u64,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct UploadTicket {
    upload_url: String,
    file_id: String,
    blob_name: String,
}

#[derive(Deserialize)]
struct ChatListEntry {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    operating: bool,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Deserialize)]
struct ChatListResponse {
    #[serde(default)]
    chats: Vec<ChatListEntry>,
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn create_chat(&self, prompt: &str, mode: ChatMode) -> Result<NewChat> {
        let resp = self
            .auth(self.client.post(self.url("/cellcog/chat/new")))
            .json(&NewChatRequest {
                message: prompt,
                chat_mode: mode.wire_name(),
            })
            .send()
            .await
            .map_err(Self::transport_error)?;
        let resp = Self::check(resp, "/cellcog/chat/new").await?;
        let body: NewChatResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        tracing::info!(chat_id = %body.id, operating = body.operating, "chat created");

        Ok(NewChat {
            chat_id: body.id,
            status: if body.operating {
                ChatStatus::Operating
            } else {
                ChatStatus::Completed
            },
        })
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let path = format!("/cellcog/chat/{}/messages", chat_id);
        let resp = self
            .auth(self.client.post(self.url(&path)))
            .json(&SendMessageRequest { message: text })
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(resp, chat_id).await?;
        tracing::debug!(chat_id = %chat_id, "message sent");
        Ok(())
    }

    async fn get_state(&self, chat_id: &str) -> Result<ChatState> {
        let status_resp = self
            .auth(self.client.get(self.url(&format!("/cellcog/chat/{}", chat_id))))
            .send()
            .await
            .map_err(Self::transport_error)?;
        let status_resp = Self::check(status_resp, chat_id).await?;
        let status: StatusResponse = status_resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let history_resp = self
            .auth(
                self.client
                    .get(self.url(&format!("/cellcog/chat/{}/history", chat_id))),
            )
            .send()
            .await
            .map_err(Self::transport_error)?;
        let history_resp = Self::check(history_resp, chat_id).await?;
        let history: HistoryResponse = history_resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let error = if status.is_security_threat {
            Some(ChatErrorKind::SecurityThreat)
        } else if status.is_out_of_memory {
            Some(ChatErrorKind::OutOfMemory)
        } else {
            None
        };

        let messages = history
            .messages
            .into_iter()
            .enumerate()
            .map(|(index, wire)| Message {
                index: index as u64,
                role: match wire.message_from.as_str() {
                    "CellCog" => Role::Service,
                    "system" => Role::System,
                    _ => Role::Caller,
                },
                content: wire.content,
                created_at: parse_timestamp(wire.created_at.as_deref()),
            })
            .collect();

        Ok(ChatState {
            status: if error.is_some() {
                ChatStatus::Error
            } else if status.operating {
                ChatStatus::Operating
            } else {
                ChatStatus::Completed
            },
            error,
            messages,
            file_urls: history
                .blob_name_to_url
                .into_iter()
                .map(|(blob, v)| (blob, v.url))
                .collect(),
        })
    }

    async fn upload_file(&self, local_path: &Path) -> Result<RemoteFileRef> {
        let metadata = tokio::fs::metadata(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CellCogError::FileNotFound(local_path.to_path_buf())
            } else {
                e.into()
            }
        })?;

        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CellCogError::InvalidInput(format!("not a file: {}", local_path.display())))?;
        let mime = mime_guess::from_path(local_path).first_or_octet_stream();

        // Step 1: request an upload slot
        let resp = self
            .auth(self.client.post(self.url("/files/request-upload")))
            .json(&RequestUploadRequest {
                filename: &filename,
                file_size: metadata.len(),
                mime_type: mime.essence_str(),
            })
            .send()
            .await
            .map_err(Self::transport_error)?;
        let resp = Self::check(resp, "/files/request-upload").await?;
        let ticket: UploadTicket = resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        // Step 2: PUT the bytes to the signed URL
        let bytes = tokio::fs::read(local_path).await?;
        let put_resp = self
            .client
            .put(&ticket.upload_url)
            .header("Content-Type", mime.essence_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| CellCogError::Upload(format!("upload PUT failed: {}", e)))?;
        if !put_resp.status().is_success() {
            return Err(CellCogError::Upload(format!(
                "upload PUT failed with status {}",
                put_resp.status()
            )));
        }

        // Step 3: confirm
        let confirm = self
            .auth(
                self.client
                    .post(self.url(&format!("/files/confirm-upload/{}", ticket.file_id))),
            )
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(confirm, "/files/confirm-upload").await?;

        tracing::info!(
            file = %local_path.display(),
            blob = %ticket.blob_name,
            "file uploaded"
        );

        Ok(RemoteFileRef {
            blob_name: ticket.blob_name,
            url: None,
        })
    }

    async fn download_file(&self, remote: &RemoteFileRef) -> Result<Vec<u8>> {
        let url = remote.url.as_deref().ok_or_else(|| {
            CellCogError::Download(format!("no download URL for blob {}", remote.blob_name))
        })?;

        // Signed URL: no auth headers.
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CellCogError::Download(format!("download failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(CellCogError::Download(format!(
                "download failed with status {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CellCogError::Download(format!("download read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn list_chats(&self, limit: usize) -> Result<Vec<ChatSummary>> {
        let path = format!("/cellcog/chats?page=1&page_size={}", limit.min(100));
        let resp = self
            .auth(self.client.get(self.url(&path)))
            .send()
            .await
            .map_err(Self::transport_error)?;
        let resp = Self::check(resp, "/cellcog/chats").await?;
        let body: ChatListResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        Ok(body
            .chats
            .into_iter()
            .map(|c| ChatSummary {
                chat_id: c.id,
                name: c.name,
                status: if c.operating {
                    ChatStatus::Operating
                } else {
                    ChatStatus::Completed
                },
                created_at: parse_timestamp(c.created_at.as_deref()),
                updated_at: parse_timestamp(c.updated_at.as_deref()),
            })
            .collect())
    }
}
