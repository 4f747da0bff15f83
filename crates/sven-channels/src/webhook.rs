// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Posts a JSON payload `{recipient, text}` to a configured URL. The target
//! URL and an optional bearer token come from the channel's persisted
//! config: `{"url": "...", "token": "..."}`.

use async_trait::async_trait;
use serde_json::json;

use crate::channel::{Channel, OutboundMessage};
use crate::error::ChannelError;

pub struct WebhookChannel;

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn dispatch(
        &self,
        config: &serde_json::Value,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError> {
        let url = config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::DispatchFailed {
                channel: self.name().to_string(),
                source: anyhow::anyhow!("webhook config missing \"url\""),
            })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ChannelError::DispatchFailed {
                channel: self.name().to_string(),
                source: e.into(),
            })?;

        let mut req = client.post(url).json(&json!({
            "recipient": message.recipient,
            "text": message.text,
        }));
        if let Some(token) = config.get("token").and_then(|v| v.as_str()) {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| ChannelError::DispatchFailed {
            channel: self.name().to_string(),
            source: e.into(),
        })?;

        if !response.status().is_success() {
            return Err(ChannelError::DispatchFailed {
                channel: self.name().to_string(),
                source: anyhow::anyhow!("webhook returned status {}", response.status()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_url_is_rejected() {
        let ch = WebhookChannel;
        let msg = OutboundMessage {
            recipient: "r".into(),
            text: "t".into(),
        };
        let err = ch.dispatch(&serde_json::json!({}), &msg).await.unwrap_err();
        assert!(matches!(err, ChannelError::DispatchFailed { .. }));
    }
}
