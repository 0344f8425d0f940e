// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Remote chat service abstraction
//!
//! Defines the `ChatService` trait the rest of the SDK is written against,
//! the wire types shared by implementations, the production HTTP client,
//! and a scriptable mock for tests.

pub mod http;
pub mod mock;
pub mod service;
pub mod types;

pub use http::HttpChatService;
pub use mock::MockChatService;
pub use service::ChatService;
pub use types::{
    AccountStatus, ChatErrorKind, ChatMode, ChatState, ChatStatus, ChatSummary, Message, NewChat,
    RemoteFileRef, Role,
};
