// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Revival of stalled or timed-out chats
//!
//! A chat that timed out, or completed without a deliverable, gets nudged
//! with a recovery message and waited on again, a bounded number of
//! times. After the attempts are spent the result is coerced to `Errored`
//! so callers know to start a fresh chat instead of retrying forever.

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::Result;
use crate::wait::{CompletionWaiter, WaitOptions, WaitReport, WaitStatus};

/// Caller policy for reviving a stalled chat
#[derive(Debug, Clone)]
pub struct RevivalPolicy {
    /// Maximum recovery messages to send before giving up
    pub max_attempts: u32,
    /// Content of the recovery message
    pub recovery_message: String,
}

impl Default for RevivalPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            recovery_message: "Status check: the previous update did not include a final \
                               deliverable. Please continue and post the finished result."
                .to_string(),
        }
    }
}

impl RevivalPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.wait.revival_attempts,
            ..Self::default()
        }
    }
}

impl CompletionWaiter {
    /// Wait, reviving the chat on timeout or accidental early stop.
    ///
    /// Each attempt sends one recovery message and re-enters the wait loop
    /// with a fresh timeout. Messages and transfers from every attempt are
    /// accumulated into the returned report.
    pub async fn wait_with_revival(
        &self,
        chat_id: &str,
        caller_id: &str,
        opts: &WaitOptions,
        policy: &RevivalPolicy,
        cancel: &CancellationToken,
    ) -> Result<WaitReport> {
        let mut report = self.wait(chat_id, caller_id, opts, cancel).await?;
        let mut attempts = 0u32;

        while attempts < policy.max_attempts && report.needs_revival() {
            attempts += 1;
            tracing::info!(
                chat_id = %chat_id,
                attempt = attempts,
                max = policy.max_attempts,
                status = %report.status,
                stalled = report.stalled,
                "sending recovery message"
            );

            self.service()
                .send_message(chat_id, &policy.recovery_message)
                .await?;

            let next = self.wait(chat_id, caller_id, opts, cancel).await?;
            report = merge_reports(report, next);
        }

        if report.needs_revival() {
            tracing::warn!(
                chat_id = %chat_id,
                attempts,
                "revival attempts exhausted; declaring the chat errored"
            );
            report.status = WaitStatus::Errored;
        }

        Ok(report)
    }
}

/// Fold a follow-up wait into the running report: accumulate messages and
/// transfers, take terminal facts from the latest attempt.
fn merge_reports(acc: WaitReport, next: WaitReport) -> WaitReport {
    let mut messages = acc.messages;
    messages.extend(next.messages);

    let mut manifest = acc.manifest;
    manifest.merge(next.manifest);

    WaitReport {
        status: next.status,
        stalled: next.stalled,
        messages,
        manifest,
        last_remote_status: next.last_remote_status.or(acc.last_remote_status),
        error_kind: next.error_kind.or(acc.error_kind),
        elapsed: acc.elapsed + next.elapsed,
    }
}
