// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The channel plugin interface: a named dispatch target with persisted,
//! per-instance JSON configuration.

use async_trait::async_trait;

use crate::error::ChannelError;

/// One outbound reply, addressed to whatever identity the channel's config
/// resolves (a chat id for Telegram, a user id for Discord, a URL for a
/// webhook, stdout for console).
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub recipient: String,
    pub text: String,
}

#[async_trait]
pub trait Channel: Send + Sync {
    /// Lowercased, stable identifier (`"console"`, `"webhook"`, `"telegram"`,
    /// `"discord"`).
    fn name(&self) -> &str;

    /// Deliver `message` using `config` (the channel's persisted
    /// `State.channels[name]` entry). Dispatch failure never rolls back
    /// already-persisted chat history — the caller logs and returns the
    /// error to the HTTP layer as `channel_dispatch_failed`.
    async fn dispatch(
        &self,
        config: &serde_json::Value,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError>;
}
