// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File transfer execution
//!
//! Performs the upload and download side effects that directives describe.
//! Each call is exactly one attempt; retry policy belongs to callers.
//! Downloads are overwrite-in-place so re-processing a message after a
//! crash is harmless.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{ChatService, RemoteFileRef};
use crate::error::{CellCogError, Result};

/// Executes uploads and downloads against a chat service
pub struct TransferExecutor {
    service: Arc<dyn ChatService>,
    download_root: PathBuf,
}

impl TransferExecutor {
    pub fn new(service: Arc<dyn ChatService>, download_root: impl Into<PathBuf>) -> Self {
        Self {
            service,
            download_root: download_root.into(),
        }
    }

    /// Upload one local file. One attempt; missing sources fail fast.
    pub async fn upload(&self, source: &Path) -> Result<RemoteFileRef> {
        if !source.exists() {
            return Err(CellCogError::FileNotFound(source.to_path_buf()));
        }
        self.service.upload_file(source).await
    }

    /// Download one remote file, to the explicit target when the directive
    /// names one, otherwise to the deterministic default location for
    /// (chat, blob). Parent directories are created as needed and an
    /// existing file is overwritten in place.
    pub async fn download(
        &self,
        chat_id: &str,
        remote: &RemoteFileRef,
        target: Option<&Path>,
    ) -> Result<PathBuf> {
        let path = match target {
            Some(t) => t.to_path_buf(),
            None => self.default_download_path(chat_id, &remote.blob_name),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = self.service.download_file(remote).await?;
        tokio::fs::write(&path, &bytes).await?;

        tracing::info!(
            blob = %remote.blob_name,
            path = %path.display(),
            bytes = bytes.len(),
            "file downloaded"
        );
        Ok(path)
    }

    /// Default download location for a blob without an explicit target:
    /// `{root}/{chat_id}/{path}` where `path` is the blob name with its
    /// chat prefix stripped. Blob names come in two shapes:
    /// `{chat}//home/app/rel/path` (absolute on the service side) and
    /// `{chat}/rel/path`; both collapse to the relative path.
    pub fn default_download_path(&self, chat_id: &str, blob_name: &str) -> PathBuf {
        let Some((_, path_part)) = blob_name.split_once('/') else {
            // Malformed blob name: use it as a bare filename.
            return self.download_root.join(chat_id).join(blob_name);
        };

        let relative = path_part
            .strip_prefix("/home/app/")
            .or_else(|| path_part.strip_prefix('/'))
            .unwrap_or(path_part);

        self.download_root.join(chat_id).join(relative)
    }
}

/// Kind of transfer a manifest entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
}

/// What happened to one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failed(String),
}

/// One transfer performed (or attempted) during a wait cycle
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub kind: TransferKind,
    pub local_path: PathBuf,
    /// Remote blob name, when one was involved
    pub remote: Option<String>,
    /// Index of the message the transfer belongs to (downloads)
    pub message_index: Option<u64>,
    pub outcome: TransferOutcome,
}

impl TransferRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == TransferOutcome::Success
    }
}

/// All transfers from one wait/send cycle, consumed by the caller
#[derive(Debug, Clone, Default)]
pub struct TransferManifest {
    pub entries: Vec<TransferRecord>,
}

impl TransferManifest {
    pub fn record(&mut self, record: TransferRecord) {
        self.entries.push(record);
    }

    pub fn merge(&mut self, other: TransferManifest) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| !e.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TransferRecord> {
        self.entries.iter().filter(|e| !e.succeeded())
    }

    /// Local paths of successful downloads
    pub fn downloaded_paths(&self) -> Vec<&Path> {
        self.entries
            .iter()
            .filter(|e| e.kind == TransferKind::Download && e.succeeded())
            .map(|e| e.local_path.as_path())
            .collect()
    }

    /// Blob names of successful uploads
    pub fn uploaded_blobs(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.kind == TransferKind::Upload && e.succeeded())
            .filter_map(|e| e.remote.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockChatService;

    fn executor() -> (tempfile::TempDir, MockChatService, TransferExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockChatService::new();
        let executor = TransferExecutor::new(Arc::new(mock.clone()), dir.path());
        (dir, mock, executor)
    }

    #[test]
    fn test_default_path_double_slash_blob() {
        let (dir, _mock, executor) = executor();
        let path = executor.default_download_path("chat1", "chat1//home/app/out/report.pdf");
        assert_eq!(path, dir.path().join("chat1").join("out/report.pdf"));
    }

    #[test]
    fn test_default_path_absolute_non_app_blob() {
        let (dir, _mock, executor) = executor();
        let path = executor.default_download_path("chat1", "chat1//var/data/x.csv");
        assert_eq!(path, dir.path().join("chat1").join("var/data/x.csv"));
    }

    #[test]
    fn test_default_path_relative_blob() {
        let (dir, _mock, executor) = executor();
        let path = executor.default_download_path("chat1", "chat1/notes/summary.md");
        assert_eq!(path, dir.path().join("chat1").join("notes/summary.md"));
    }

    #[test]
    fn test_default_path_malformed_blob() {
        let (dir, _mock, executor) = executor();
        let path = executor.default_download_path("chat1", "loneblob.bin");
        assert_eq!(path, dir.path().join("chat1").join("loneblob.bin"));
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails_fast() {
        let (_dir, mock, executor) = executor();
        let err = executor
            .upload(Path::new("/definitely/not/here.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, CellCogError::FileNotFound(_)));
        // The service was never called.
        assert!(mock.uploaded_paths().is_empty());
    }

    #[tokio::test]
    async fn test_upload_existing_file() {
        let (dir, mock, executor) = executor();
        let source = dir.path().join("input.txt");
        std::fs::write(&source, "data").unwrap();

        let remote = executor.upload(&source).await.unwrap();
        assert_eq!(remote.blob_name, "chat-mock/input.txt");
        assert_eq!(mock.uploaded_paths(), vec![source]);
    }

    #[tokio::test]
    async fn test_download_creates_parents_and_writes() {
        let (dir, mock, executor) = executor();
        mock.register_blob("chat1/out/report.pdf", b"pdf bytes".to_vec());

        let remote = RemoteFileRef {
            blob_name: "chat1/out/report.pdf".to_string(),
            url: None,
        };
        let path = executor.download("chat1", &remote, None).await.unwrap();

        assert_eq!(path, dir.path().join("chat1").join("out/report.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"pdf bytes");
    }

    #[tokio::test]
    async fn test_download_to_explicit_target() {
        let (dir, mock, executor) = executor();
        mock.register_blob("chat1/a.txt", b"v1".to_vec());

        let remote = RemoteFileRef { blob_name: "chat1/a.txt".to_string(), url: None };
        let target = dir.path().join("explicit").join("a.txt");
        let path = executor
            .download("chat1", &remote, Some(&target))
            .await
            .unwrap();
        assert_eq!(path, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"v1");
    }

    #[tokio::test]
    async fn test_repeated_download_overwrites_in_place() {
        let (dir, mock, executor) = executor();
        mock.register_blob("chat1/a.txt", b"v1".to_vec());
        let remote = RemoteFileRef { blob_name: "chat1/a.txt".to_string(), url: None };

        executor.download("chat1", &remote, None).await.unwrap();
        mock.register_blob("chat1/a.txt", b"v2-longer".to_vec());
        let path = executor.download("chat1", &remote, None).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"v2-longer");
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("chat1")).unwrap().collect();
        assert_eq!(entries.len(), 1, "no rename-on-conflict copies");
    }

    #[tokio::test]
    async fn test_failed_download_propagates() {
        let (_dir, mock, executor) = executor();
        mock.fail_blob("chat1/broken.bin");
        let remote = RemoteFileRef { blob_name: "chat1/broken.bin".to_string(), url: None };
        assert!(executor.download("chat1", &remote, None).await.is_err());
    }

    #[test]
    fn test_manifest_accounting() {
        let mut manifest = TransferManifest::default();
        manifest.record(TransferRecord {
            kind: TransferKind::Download,
            local_path: PathBuf::from("/out/a.pdf"),
            remote: Some("chat1/a.pdf".to_string()),
            message_index: Some(3),
            outcome: TransferOutcome::Success,
        });
        manifest.record(TransferRecord {
            kind: TransferKind::Download,
            local_path: PathBuf::from("/out/b.pdf"),
            remote: Some("chat1/b.pdf".to_string()),
            message_index: Some(3),
            outcome: TransferOutcome::Failed("404".to_string()),
        });
        manifest.record(TransferRecord {
            kind: TransferKind::Upload,
            local_path: PathBuf::from("/in/c.csv"),
            remote: Some("chat1/c.csv".to_string()),
            message_index: None,
            outcome: TransferOutcome::Success,
        });

        assert!(manifest.has_failures());
        assert_eq!(manifest.failed().count(), 1);
        assert_eq!(manifest.downloaded_paths(), vec![Path::new("/out/a.pdf")]);
        assert_eq!(manifest.uploaded_blobs(), vec!["chat1/c.csv"]);
    }
}
