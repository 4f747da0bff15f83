// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("unknown channel: {0}")]
    InvalidChannel(String),
    #[error("channel type not supported: {0}")]
    ChannelNotSupported(String),
    #[error("channel {0} is disabled")]
    ChannelDisabled(String),
    #[error("dispatch to channel {channel} failed: {source}")]
    DispatchFailed {
        channel: String,
        #[source]
        source: anyhow::Error,
    },
}
