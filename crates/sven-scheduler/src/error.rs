// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron task type")]
    InvalidTaskType,
    #[error("cron job {0} not found")]
    NotFound(String),
    #[error("the default cron job cannot be paused, resumed, or deleted")]
    DefaultProtected,
    #[error("job {job} already has {running}/{max} runs in flight")]
    MaxConcurrencyReached {
        job: String,
        running: u32,
        max: u32,
    },
    #[error("workflow must have exactly one start node, found {0}")]
    NotExactlyOneStart(usize),
    #[error("workflow edge references unknown node {0}")]
    DanglingEdge(String),
    #[error("workflow contains a cycle reachable from its start node")]
    Cycle,
    #[error("unknown workflow node type: {0}")]
    UnknownNodeType(String),
    #[error("job run timed out after {0}s")]
    Timeout(u64),
    #[error(transparent)]
    Store(#[from] sven_store::StoreError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
