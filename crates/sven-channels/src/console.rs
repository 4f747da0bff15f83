// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Prints replies to stdout via `tracing`. The default dispatch target for
//! local/dev use and the default chat's `channel` field.

use async_trait::async_trait;
use tracing::info;

use crate::channel::{Channel, OutboundMessage};
use crate::error::ChannelError;

pub struct ConsoleChannel;

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn dispatch(
        &self,
        _config: &serde_json::Value,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError> {
        info!(recipient = %message.recipient, "{}", message.text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_always_succeeds() {
        let ch = ConsoleChannel;
        let msg = OutboundMessage {
            recipient: "local".into(),
            text: "hello".into(),
        };
        assert!(ch.dispatch(&serde_json::json!({}), &msg).await.is_ok());
    }
}
