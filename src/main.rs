// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CellCog CLI
//!
//! Entry point for the `cellcog` command-line client.

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cellcog::api::ChatMode;
use cellcog::cli::{render_manifest, render_report, Cli, Commands};
use cellcog::config::Settings;
use cellcog::wait::WaitOptions;
use cellcog::CellCogClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;

    // Ctrl-C cancels waits at the next loop boundary.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::New {
            prompt,
            mode,
            no_wait,
            caller,
            timeout,
            poll_interval,
        } => {
            let mode = ChatMode::parse(&mode)
                .with_context(|| format!("unknown chat mode: {}", mode))?;
            let client = CellCogClient::new(settings.clone())?;
            let created = client.create_chat(&prompt, mode).await?;

            println!("Chat created: {}", created.chat_id);
            if !created.uploads.is_empty() {
                println!("{}", render_manifest(&created.uploads));
            }

            if !no_wait {
                let opts = wait_options(&settings, timeout, poll_interval);
                let caller = caller_id(caller)?;
                let report = client
                    .wait_until_complete(&created.chat_id, &caller, &opts, &cancel)
                    .await?;
                println!("{}", render_report(&created.chat_id, &report));
            }
        }

        Commands::Send {
            chat_id,
            message,
            no_wait,
            caller,
            timeout,
            poll_interval,
        } => {
            let client = CellCogClient::new(settings.clone())?;
            let uploads = client.send_message(&chat_id, &message).await?;

            println!("Message sent to {}", chat_id);
            if !uploads.is_empty() {
                println!("{}", render_manifest(&uploads));
            }

            if !no_wait {
                let opts = wait_options(&settings, timeout, poll_interval);
                let caller = caller_id(caller)?;
                let report = client
                    .wait_until_complete(&chat_id, &caller, &opts, &cancel)
                    .await?;
                println!("{}", render_report(&chat_id, &report));
            }
        }

        Commands::Watch {
            chat_id,
            caller,
            timeout,
            poll_interval,
        } => {
            let client = CellCogClient::new(settings.clone())?;
            let opts = wait_options(&settings, timeout, poll_interval);
            let caller = caller_id(caller)?;
            let report = client
                .wait_until_complete(&chat_id, &caller, &opts, &cancel)
                .await?;
            println!("{}", render_report(&chat_id, &report));
        }

        Commands::Status { chat_id } => match chat_id {
            Some(chat_id) => {
                let client = CellCogClient::new(settings)?;
                let state = client.get_state(&chat_id).await?;
                println!("Chat {}: {}", chat_id, state.status);
                if let Some(kind) = state.error {
                    println!("Service error: {}", kind);
                }
                println!("Messages: {}", state.messages.len());
            }
            None => {
                // Account status works without a configured key.
                let client_settings = settings.clone();
                let configured = client_settings.resolved_api_key().is_some();
                println!("Configured: {}", configured);
                if let Some(prefix) = client_settings.api_key_prefix() {
                    println!("API key: {}", prefix);
                }
                if let Some(email) = &client_settings.api.email {
                    println!("Account: {}", email);
                }
                if !configured {
                    println!(
                        "Set {} to configure (https://cellcog.ai/profile?tab=api-keys)",
                        client_settings.api.api_key_env
                    );
                }
            }
        },

        Commands::Chats { limit } => {
            let client = CellCogClient::new(settings)?;
            let chats = client.list_chats(limit).await?;
            if chats.is_empty() {
                println!("No chats found.");
            }
            for chat in chats {
                println!("{}  {}  {}", chat.chat_id, chat.status, chat.name);
            }
        }
    }

    Ok(())
}

fn wait_options(settings: &Settings, timeout: Option<u64>, poll_interval: Option<u64>) -> WaitOptions {
    let mut opts = WaitOptions::from_settings(settings);
    if let Some(secs) = timeout {
        opts.timeout = std::time::Duration::from_secs(secs);
    }
    if let Some(secs) = poll_interval {
        opts.poll_interval = std::time::Duration::from_secs(secs);
    }
    opts
}

/// Resolve the caller identifier: explicit flag, or a stable per-install
/// id generated once and kept under ~/.cellcog.
fn caller_id(explicit: Option<String>) -> anyhow::Result<String> {
    if let Some(id) = explicit {
        return Ok(id);
    }

    let path = Settings::cellcog_home().join("caller_id");
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let id = format!("cli:{}", uuid::Uuid::new_v4());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &id)?;
    Ok(id)
}
