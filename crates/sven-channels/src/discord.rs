// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sends a message via the Discord REST API (no gateway connection needed
//! for outbound dispatch). Config: `{"bot_token": "..."}`;
//! `message.recipient` is the numeric channel id as a string.

#![cfg(feature = "discord")]

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;

use crate::channel::{Channel, OutboundMessage};
use crate::error::ChannelError;

pub struct DiscordChannel;

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn dispatch(
        &self,
        config: &serde_json::Value,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError> {
        let token = config
            .get("bot_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::DispatchFailed {
                channel: self.name().to_string(),
                source: anyhow::anyhow!("discord config missing \"bot_token\""),
            })?;

        let channel_id: u64 =
            message
                .recipient
                .parse()
                .map_err(|e| ChannelError::DispatchFailed {
                    channel: self.name().to_string(),
                    source: anyhow::anyhow!("invalid discord channel id: {e}"),
                })?;

        let http = Http::new(token);
        ChannelId::new(channel_id)
            .say(&http, &message.text)
            .await
            .map_err(|e| ChannelError::DispatchFailed {
                channel: self.name().to_string(),
                source: e.into(),
            })?;
        Ok(())
    }
}
