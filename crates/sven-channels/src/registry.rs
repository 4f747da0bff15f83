// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::{Channel, OutboundMessage};
use crate::error::ChannelError;

/// Central registry of channel plugins, keyed by lowercase name. Built at
/// startup; lookup is lock-free after that (mirrors `sven_tools::ToolRegistry`).
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Registry with the always-available built-ins (`console`, `webhook`)
    /// plus whichever optional backends this build was compiled with.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(crate::console::ConsoleChannel);
        reg.register(crate::webhook::WebhookChannel);
        #[cfg(feature = "telegram")]
        reg.register(crate::telegram::TelegramChannel);
        #[cfg(feature = "discord")]
        reg.register(crate::discord::DiscordChannel);
        reg
    }

    pub fn register(&mut self, channel: impl Channel + 'static) {
        self.channels
            .insert(channel.name().to_string(), Arc::new(channel));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch `message` through `name`, looking up `config` and the
    /// `enabled` flag from the persisted channel settings map. Returns
    /// `InvalidChannel` for an unregistered name and `ChannelDisabled` when
    /// the settings mark it disabled; both are distinguished from dispatch
    /// failures because the HTTP layer maps them to different status codes.
    pub async fn dispatch(
        &self,
        name: &str,
        enabled: bool,
        config: &serde_json::Value,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError> {
        let channel = self
            .get(name)
            .ok_or_else(|| ChannelError::InvalidChannel(name.to_string()))?;
        if !enabled {
            return Err(ChannelError::ChannelDisabled(name.to_string()));
        }
        channel.dispatch(config, message).await
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_include_console_and_webhook() {
        let reg = ChannelRegistry::with_builtins();
        let names = reg.names();
        assert!(names.contains(&"console".to_string()));
        assert!(names.contains(&"webhook".to_string()));
    }

    #[tokio::test]
    async fn dispatch_unknown_channel_is_invalid() {
        let reg = ChannelRegistry::with_builtins();
        let msg = OutboundMessage {
            recipient: "x".into(),
            text: "y".into(),
        };
        let err = reg
            .dispatch("nope", true, &serde_json::json!({}), &msg)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidChannel(_)));
    }

    #[tokio::test]
    async fn dispatch_disabled_channel_is_rejected() {
        let reg = ChannelRegistry::with_builtins();
        let msg = OutboundMessage {
            recipient: "x".into(),
            text: "y".into(),
        };
        let err = reg
            .dispatch("console", false, &serde_json::json!({}), &msg)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ChannelDisabled(_)));
    }

    #[tokio::test]
    async fn dispatch_known_enabled_channel_succeeds() {
        let reg = ChannelRegistry::with_builtins();
        let msg = OutboundMessage {
            recipient: "x".into(),
            text: "y".into(),
        };
        let result = reg
            .dispatch("console", true, &serde_json::json!({}), &msg)
            .await;
        assert!(result.is_ok());
    }
}
