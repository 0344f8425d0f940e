// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Human-readable rendering of wait reports for the CLI

use chrono::{DateTime, Utc};

use crate::api::{Message, Role};
use crate::transfer::TransferManifest;
use crate::wait::WaitReport;

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Caller => "caller",
        Role::Service => "cellcog",
        Role::System => "system",
    }
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => "unknown time".to_string(),
    }
}

/// Render one delivered message in the block format agents consume.
pub fn render_message(chat_id: &str, msg: &Message) -> String {
    format!(
        "<MESSAGE FROM {} on Chat {} at {}>\n{}\n<MESSAGE END>",
        role_name(msg.role),
        chat_id,
        format_timestamp(msg.created_at),
        msg.content
    )
}

/// Render the transfer manifest as an indented file list.
pub fn render_manifest(manifest: &TransferManifest) -> String {
    let mut lines = Vec::new();
    for entry in &manifest.entries {
        let verb = match entry.kind {
            crate::transfer::TransferKind::Upload => "uploaded",
            crate::transfer::TransferKind::Download => "downloaded",
        };
        match &entry.outcome {
            crate::transfer::TransferOutcome::Success => {
                lines.push(format!("  - {} {}", verb, entry.local_path.display()));
            }
            crate::transfer::TransferOutcome::Failed(detail) => {
                lines.push(format!(
                    "  - FAILED {} {}: {}",
                    verb,
                    entry.local_path.display(),
                    detail
                ));
            }
        }
    }
    lines.join("\n")
}

/// Render a full wait report.
pub fn render_report(chat_id: &str, report: &WaitReport) -> String {
    let mut out = String::new();

    for msg in &report.messages {
        out.push_str(&render_message(chat_id, msg));
        out.push_str("\n\n");
    }

    out.push_str(&format!(
        "Status: {} after {:.0}s ({} message{} delivered)",
        report.status,
        report.elapsed.as_secs_f64(),
        report.messages.len(),
        if report.messages.len() == 1 { "" } else { "s" },
    ));

    if report.stalled {
        out.push_str("\nNote: the chat stopped without a deliverable; it may need a follow-up.");
    }
    if let Some(kind) = report.error_kind {
        out.push_str(&format!("\nService error: {}", kind));
    }

    if !report.manifest.is_empty() {
        out.push_str("\nFiles:\n");
        out.push_str(&render_manifest(&report.manifest));
    }

    out
}
