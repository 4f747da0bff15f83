// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Gateway startup — assembles all subsystems and starts them.
//!
//! # Startup sequence
//!
//! [`run`] performs these steps in order, then blocks on the HTTP server:
//!
//! 1. Load the agent/tools config, overriding `agent.max_tool_rounds` with
//!    the gateway's own `agent_max_tool_rounds`.
//! 2. Load the turn-state [`sven_store::Store`] and the [`sven_channels::ChannelRegistry`].
//! 3. Build the [`crate::control::Orchestrator`] that owns both and drives
//!    every `/agent/process` call.
//! 4. Start the cron [`sven_scheduler::Ticker`] in a background task,
//!    dispatching due jobs through the orchestrator.
//! 5. Start the Axum HTTPS server (blocks until shutdown).
//!
//! # API-key management
//!
//! ```text
//! First start:  key generated -> SHA-256 hash stored in api_key.yaml
//!               raw key printed once (save it!)
//! Caller:       X-API-Key: <key>
//! Rotate:       sven gateway regenerate-token
//!               old key immediately invalid
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use sven_channels::ChannelRegistry;
use sven_scheduler::{Ticker, TurnRunner};
use sven_store::Store;

use crate::config::GatewayConfig;
use crate::control::service::Orchestrator;
use crate::crypto::token::StoredTokenFile;

/// Adapts [`Orchestrator`] to the scheduler's [`TurnRunner`] so
/// `sven-scheduler` never has to know about HTTP, SSE, or wire protocols.
struct SchedulerTurnRunner {
    orchestrator: Arc<Orchestrator>,
}

#[async_trait::async_trait]
impl TurnRunner for SchedulerTurnRunner {
    async fn run_turn(&self, _job_id: &str, dispatch: &str, text: &str) -> anyhow::Result<String> {
        Ok(self.orchestrator.run_cron_turn(dispatch, text).await?)
    }
}

/// Start the gateway. Runs until Ctrl+C or SIGTERM.
pub async fn run(gw_config: GatewayConfig) -> anyhow::Result<()> {
    let mut config = sven_config::load(gw_config.agent_config.as_deref())?;
    config.agent.max_tool_rounds = gw_config.agent_max_tool_rounds;
    let config = Arc::new(config);

    let store = Arc::new(Store::load(gw_config.store_path()).await?);
    let channels = Arc::new(ChannelRegistry::with_builtins());
    let orchestrator = Orchestrator::new(store.clone(), channels, config);

    let ticker = Arc::new(Ticker::new(
        store,
        Arc::new(SchedulerTurnRunner {
            orchestrator: orchestrator.clone(),
        }),
    ));
    tokio::spawn(ticker.run());

    info!(
        bind = %gw_config.http.bind,
        tls = !gw_config.http.insecure_dev_mode,
        "starting agent gateway",
    );

    crate::http::serve(&gw_config, orchestrator).await
}

/// Regenerate the gateway API key, printing the new raw key once.
pub fn regenerate_token(config: &GatewayConfig) -> anyhow::Result<()> {
    let raw = StoredTokenFile::generate_and_save(&config.token_path())?;
    println!("New gateway API key (save it now — it won't be shown again):");
    println!("  {}", raw.as_str());
    println!();
    println!("Usage:  X-API-Key: {}", raw.as_str());
    Ok(())
}

pub fn default_token_path() -> PathBuf {
    crate::config::default_token_path()
}
