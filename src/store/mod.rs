// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Seen-index store
//!
//! Persists, per (chat, caller) pair, the highest message index already
//! delivered to that caller. This is the mechanism that prevents duplicate
//! delivery and duplicate downloads across process restarts.
//!
//! One plain-text integer per record, at
//! `{root}/chats/{chat_id}/.seen_indices/{caller_file}`. Advancement is
//! monotonic and uses write-temp-then-rename so a crash never leaves a
//! half-written record behind.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, StorageError};

/// Durable per-(chat, caller) seen-index records
pub struct SeenIndexStore {
    root: PathBuf,
    /// Serializes read-compare-write cycles within this process. Each key
    /// is logically owned by one (chat, caller) pair, so a single store
    /// lock is enough.
    write_lock: Mutex<()>,
}

impl SeenIndexStore {
    /// Open a store rooted at the given directory (usually `~/.cellcog`).
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the record for one (chat, caller) pair.
    pub fn record_path(&self, chat_id: &str, caller_id: &str) -> PathBuf {
        self.root
            .join("chats")
            .join(chat_id)
            .join(".seen_indices")
            .join(caller_key_to_filename(caller_id))
    }

    /// Highest index already processed for this caller, or `None` when the
    /// caller has never seen this chat. A present-but-unparsable record is
    /// an error, never silently treated as "nothing seen".
    pub fn get(&self, chat_id: &str, caller_id: &str) -> Result<Option<u64>> {
        let path = self.record_path(chat_id, caller_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io { path, source: e }.into()),
        };

        content
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| StorageError::Corrupt { path, detail: e.to_string() }.into())
    }

    /// Advance the stored index to `new_index` if it is strictly greater
    /// than the current value; no-op otherwise. Monotonicity is enforced
    /// here, not by callers.
    pub fn advance(&self, chat_id: &str, caller_id: &str, new_index: u64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(current) = self.get(chat_id, caller_id)? {
            if new_index <= current {
                tracing::debug!(
                    chat_id = %chat_id,
                    caller_id = %caller_id,
                    current,
                    new_index,
                    "seen index not advanced"
                );
                return Ok(());
            }
        }

        let path = self.record_path(chat_id, caller_id);
        write_atomically(&path, &new_index.to_string())
            .map_err(|e| StorageError::Io { path: path.clone(), source: e })?;

        tracing::debug!(
            chat_id = %chat_id,
            caller_id = %caller_id,
            new_index,
            "seen index advanced"
        );
        Ok(())
    }

    /// Remove the record for one (chat, caller) pair. The explicit way out
    /// of a corrupt record.
    pub fn reset(&self, chat_id: &str, caller_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.record_path(chat_id, caller_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io { path, source: e }.into()),
        }
    }
}

fn write_atomically(path: &Path, content: &str) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent dir"))?;
    std::fs::create_dir_all(parent)?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

/// Convert a caller key to a file-safe name.
///
/// Colons become underscores and a trailing UUID-sized segment is
/// truncated to its first 8 characters:
/// `agent:main:subagent:8c980d81-cec5-...` -> `agent_main_subagent_8c980d81`.
fn caller_key_to_filename(caller_id: &str) -> String {
    let safe = caller_id.replace(':', "_");
    let mut parts: Vec<&str> = safe.split('_').collect();
    if parts.len() > 4 {
        if let Some(last) = parts.last_mut() {
            if let Some(truncated) = last.get(..8) {
                *last = truncated;
            }
        }
    }
    parts.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::CellCogError;

    fn store() -> (tempfile::TempDir, SeenIndexStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenIndexStore::open(dir.path());
        (dir, store)
    }

    #[test]
    fn test_absent_record_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.get("chat1", "main").unwrap(), None);
    }

    #[test]
    fn test_advance_then_get() {
        let (_dir, store) = store();
        store.advance("chat1", "main", 3).unwrap();
        assert_eq!(store.get("chat1", "main").unwrap(), Some(3));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let (_dir, store) = store();
        store.advance("chat1", "main", 5).unwrap();
        store.advance("chat1", "main", 2).unwrap();
        assert_eq!(store.get("chat1", "main").unwrap(), Some(5));
        store.advance("chat1", "main", 5).unwrap();
        assert_eq!(store.get("chat1", "main").unwrap(), Some(5));
        store.advance("chat1", "main", 9).unwrap();
        assert_eq!(store.get("chat1", "main").unwrap(), Some(9));
    }

    #[test]
    fn test_stored_value_is_max_regardless_of_order() {
        let (_dir, store) = store();
        for index in [4u64, 1, 7, 0, 7, 3] {
            store.advance("chat1", "main", index).unwrap();
        }
        assert_eq!(store.get("chat1", "main").unwrap(), Some(7));
    }

    #[test]
    fn test_keys_are_disjoint() {
        let (_dir, store) = store();
        store.advance("chat1", "main", 2).unwrap();
        store.advance("chat1", "sub", 5).unwrap();
        store.advance("chat2", "main", 9).unwrap();

        assert_eq!(store.get("chat1", "main").unwrap(), Some(2));
        assert_eq!(store.get("chat1", "sub").unwrap(), Some(5));
        assert_eq!(store.get("chat2", "main").unwrap(), Some(9));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SeenIndexStore::open(dir.path());
            store.advance("chat1", "main", 12).unwrap();
        }
        let store = SeenIndexStore::open(dir.path());
        assert_eq!(store.get("chat1", "main").unwrap(), Some(12));
    }

    #[test]
    fn test_corrupt_record_is_an_error_not_none() {
        let (_dir, store) = store();
        let path = store.record_path("chat1", "main");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "definitely not a number").unwrap();

        let err = store.get("chat1", "main").unwrap_err();
        assert!(matches!(
            err,
            CellCogError::Storage(StorageError::Corrupt { .. })
        ));
        // advance goes through get, so it must refuse too
        assert!(store.advance("chat1", "main", 1).is_err());
    }

    #[test]
    fn test_reset_clears_corrupt_record() {
        let (_dir, store) = store();
        let path = store.record_path("chat1", "main");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "junk").unwrap();

        store.reset("chat1", "main").unwrap();
        assert_eq!(store.get("chat1", "main").unwrap(), None);
        store.reset("chat1", "main").unwrap(); // idempotent
    }

    #[test]
    fn test_caller_key_munging() {
        assert_eq!(caller_key_to_filename("agent:main:main"), "agent_main_main");
        assert_eq!(
            caller_key_to_filename("agent:main:subagent:8c980d81-cec5-48a3-926f-2b04053dfde1"),
            "agent_main_subagent_8c980d81"
        );
        assert_eq!(caller_key_to_filename("main"), "main");
    }

    #[tokio::test]
    async fn test_concurrent_advances_keep_max() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SeenIndexStore::open(dir.path()));

        let mut handles = Vec::new();
        for index in 0..20u64 {
            let store = Arc::clone(&store);
            handles.push(tokio::task::spawn_blocking(move || {
                store.advance("chat1", "main", index).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("chat1", "main").unwrap(), Some(19));
    }
}
