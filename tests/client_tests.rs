// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! End-to-end client tests against the mock service

use std::sync::Arc;
use std::time::Duration;

use cellcog::api::{ChatMode, ChatStatus, MockChatService, Role};
use cellcog::config::Settings;
use cellcog::wait::WaitStatus;
use cellcog::CellCogClient;

fn fast_settings(dir: &tempfile::TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.transfer.download_dir = dir.path().join("downloads");
    settings.wait.timeout_secs = 5;
    settings.wait.poll_interval_secs = 0; // poll back-to-back in tests
    settings.resilience.base_delay_ms = 1;
    settings.resilience.max_delay_ms = 5;
    settings
}

fn client_with(dir: &tempfile::TempDir, mock: &MockChatService) -> CellCogClient {
    CellCogClient::with_parts(fast_settings(dir), Arc::new(mock.clone()), dir.path())
        .with_working_dir(dir.path())
}

#[tokio::test]
async fn test_create_chat_and_wait_full_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockChatService::new();
    let client = client_with(&dir, &mock);

    // Input file referenced by the prompt.
    let input = dir.path().join("sales.csv");
    std::fs::write(&input, "q1,q2\n10,20\n").unwrap();

    // Script the remote: one operating poll, then completion with a
    // generated file.
    mock.push_state(MockChatService::state(ChatStatus::Operating, vec![]));
    let mut done = MockChatService::state(
        ChatStatus::Completed,
        vec![
            MockChatService::message(0, Role::Caller, "analyze the attached sales data"),
            MockChatService::message(
                1,
                Role::Service,
                "Summary attached: <SHOW_FILE>chat-mock/out/summary.pdf</SHOW_FILE>",
            ),
        ],
    );
    done.file_urls.insert(
        "chat-mock/out/summary.pdf".to_string(),
        "https://signed/summary.pdf".to_string(),
    );
    mock.register_blob("chat-mock/out/summary.pdf", b"%PDF summary".to_vec());
    mock.push_state(done);

    let prompt = format!(
        "Analyze <SHOW_FILE>{}</SHOW_FILE> and produce a summary",
        input.display()
    );
    let (created, report) = client
        .create_chat_and_wait(&prompt, ChatMode::AgentTeam, "agent:main:main")
        .await
        .unwrap();

    // The prompt the service saw references the uploaded blob.
    assert_eq!(created.chat_id, "chat-mock");
    let sent_prompt = &mock.created_prompts()[0];
    assert!(sent_prompt.contains("chat-mock/sales.csv"));
    assert!(sent_prompt.contains(&format!("external_local_path=\"{}\"", input.display())));

    // The wait completed and the generated file landed on disk.
    assert_eq!(report.status, WaitStatus::Completed);
    let downloads = report.manifest.downloaded_paths();
    assert_eq!(downloads.len(), 1);
    assert_eq!(std::fs::read(downloads[0]).unwrap(), b"%PDF summary");

    // Uploads are reported separately from the wait-cycle manifest.
    assert_eq!(created.uploads.uploaded_blobs(), vec!["chat-mock/sales.csv"]);
}

#[tokio::test]
async fn test_send_message_and_wait_continues_a_chat() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockChatService::new();
    let client = client_with(&dir, &mock);

    mock.push_state_on_send(MockChatService::state(
        ChatStatus::Completed,
        vec![
            MockChatService::message(0, Role::Caller, "first ask"),
            MockChatService::message(1, Role::Service, "Anything else?"),
        ],
    ));

    let (uploads, report) = client
        .send_message_and_wait("chat-mock", "focus on hardware", "agent:main:main")
        .await
        .unwrap();

    assert!(uploads.is_empty());
    assert_eq!(report.status, WaitStatus::Completed);
    assert_eq!(report.messages.len(), 2);
    assert_eq!(mock.sent_messages()[0].1, "focus on hardware");
}

#[tokio::test]
async fn test_watch_picks_up_where_caller_left_off() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockChatService::new();
    let client = client_with(&dir, &mock);

    mock.push_state(MockChatService::state(
        ChatStatus::Completed,
        vec![
            MockChatService::message(0, Role::Caller, "go"),
            MockChatService::message(1, Role::Service, "Need anything else?"),
        ],
    ));

    let report = client.wait("chat-mock", "agent:main:main").await.unwrap();
    assert_eq!(report.messages.len(), 2);

    // A second watch from the same caller delivers nothing new.
    let report = client.wait("chat-mock", "agent:main:main").await.unwrap();
    assert!(report.messages.is_empty());

    // A different caller replays from the start.
    let report = client.wait("chat-mock", "agent:sub:1").await.unwrap();
    assert_eq!(report.messages.len(), 2);
}

#[tokio::test]
async fn test_revival_is_wired_through_the_client() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockChatService::new();

    let mut settings = fast_settings(&dir);
    settings.wait.timeout_secs = 1;
    let client = CellCogClient::with_parts(settings, Arc::new(mock.clone()), dir.path());

    // Stalled completion, then a real completion after the nudge.
    mock.push_state(MockChatService::state(
        ChatStatus::Completed,
        vec![MockChatService::message(0, Role::Service, "still working")],
    ));
    mock.push_state_on_send(MockChatService::state(
        ChatStatus::Completed,
        vec![
            MockChatService::message(0, Role::Service, "still working"),
            MockChatService::message(1, Role::Service, "All done. Questions?"),
        ],
    ));

    let report = client
        .wait_until_complete(
            "chat-mock",
            "agent:main:main",
            &cellcog::wait::WaitOptions {
                timeout: Duration::from_secs(1),
                poll_interval: Duration::from_millis(10),
                advance_on_failed_download: true,
            },
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, WaitStatus::Completed);
    assert!(!report.stalled);
    assert_eq!(mock.sent_messages().len(), 1);
}
