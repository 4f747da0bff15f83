// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sends a message via the Telegram Bot API. Config: `{"bot_token": "..."}`;
//! `message.recipient` is the numeric chat id as a string.

#![cfg(feature = "telegram")]

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;

use crate::channel::{Channel, OutboundMessage};
use crate::error::ChannelError;

pub struct TelegramChannel;

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
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
                source: anyhow::anyhow!("telegram config missing \"bot_token\""),
            })?;

        let chat_id: i64 =
            message
                .recipient
                .parse()
                .map_err(|e| ChannelError::DispatchFailed {
                    channel: self.name().to_string(),
                    source: anyhow::anyhow!("invalid telegram chat id: {e}"),
                })?;

        let bot = Bot::new(token);
        bot.send_message(ChatId(chat_id), &message.text)
            .await
            .map_err(|e| ChannelError::DispatchFailed {
                channel: self.name().to_string(),
                source: e.into(),
            })?;
        Ok(())
    }
}
