// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Command-line argument definitions

use clap::{Parser, Subcommand};

/// CellCog - client for the CellCog hosted AI chat service
#[derive(Parser, Debug)]
#[command(name = "cellcog", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new chat and wait for it to finish
    New {
        /// The prompt (may embed SHOW_FILE / GENERATE_FILE markers)
        #[arg(long)]
        prompt: String,

        /// Chat mode: "agent team" (deep reasoning) or "agent" (faster)
        #[arg(long, default_value = "agent team")]
        mode: String,

        /// Create the chat and return immediately without waiting
        #[arg(long)]
        no_wait: bool,

        /// Caller identifier for seen-index tracking
        #[arg(long)]
        caller: Option<String>,

        /// Wait timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds between polls
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Send a message to an existing chat and wait for the response
    Send {
        /// The chat to send to
        chat_id: String,

        /// Message content (may embed SHOW_FILE / GENERATE_FILE markers)
        #[arg(short, long)]
        message: String,

        /// Send and return immediately without waiting
        #[arg(long)]
        no_wait: bool,

        /// Caller identifier for seen-index tracking
        #[arg(long)]
        caller: Option<String>,

        /// Wait timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds between polls
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Watch a chat: deliver unseen messages and wait for completion
    Watch {
        /// The chat to watch
        chat_id: String,

        /// Caller identifier for seen-index tracking
        #[arg(long)]
        caller: Option<String>,

        /// Wait timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds between polls
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Show account configuration, or a chat's current status
    Status {
        /// Chat to inspect; omit for account status
        chat_id: Option<String>,
    },

    /// List recent chats
    Chats {
        /// Maximum number of chats to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
