// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Gateway configuration: HTTP bind address/TLS, API-key auth, rate limiting,
//! and the data directory the [`sven_store::Store`] persists to.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_bind() -> String {
    "127.0.0.1:18790".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_auth_max_per_minute() -> u32 {
    5
}

fn default_auth_burst() -> u32 {
    2
}

fn default_agent_max_tool_rounds() -> u32 {
    32
}

/// HTTP server settings. `insecure_dev_mode` skips TLS entirely (plain HTTP)
/// for local development; production deployments should leave it `false` and
/// rely on `rcgen`-issued certs or a reverse proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub insecure_dev_mode: bool,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_auth_max_per_minute")]
    pub auth_max_per_minute: u32,
    #[serde(default = "default_auth_burst")]
    pub auth_burst: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            insecure_dev_mode: false,
            max_body_bytes: default_max_body_bytes(),
            token_file: None,
            auth_max_per_minute: default_auth_max_per_minute(),
            auth_burst: default_auth_burst(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub http: HttpConfig,
    /// Path to the agent/tools/channels config (same schema `sven` loads
    /// everywhere else). `None` uses the default discovery path.
    #[serde(default)]
    pub agent_config: Option<PathBuf>,
    /// Path the turn-state store persists to. `None` uses
    /// [`sven_store::Store::default_path`].
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Overrides `AgentConfig::max_tool_rounds` for turns driven through the
    /// gateway — independent of the CLI/TUI's own config file, since an
    /// unattended HTTP caller has no one to intervene on a runaway loop.
    #[serde(default = "default_agent_max_tool_rounds")]
    pub agent_max_tool_rounds: u32,
    /// Whether `GET /agent/system-layers` is served at all.
    #[serde(default = "default_true")]
    pub system_layers_endpoint_enabled: bool,
    /// Whether plan-mode endpoints (`/agent/plan/*`) are served.
    #[serde(default = "default_true")]
    pub plan_mode_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            agent_config: None,
            data_dir: None,
            agent_max_tool_rounds: default_agent_max_tool_rounds(),
            system_layers_endpoint_enabled: true,
            plan_mode_enabled: true,
        }
    }
}

impl GatewayConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(sven_store::Store::default_path)
    }

    pub fn token_path(&self) -> PathBuf {
        self.http
            .token_file
            .clone()
            .unwrap_or_else(default_token_path)
    }
}

pub fn default_token_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sven")
        .join("gateway")
        .join("api_key.yaml")
}

/// Load the gateway config from `path` (or the default discovery path),
/// falling back to [`GatewayConfig::default`] when no file exists.
pub fn load(path: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    let candidate = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };

    match candidate {
        Some(p) if p.exists() => {
            let text = std::fs::read_to_string(&p)
                .map_err(|e| anyhow::anyhow!("reading gateway config {}: {e}", p.display()))?;
            let cfg: GatewayConfig = serde_yaml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("parsing gateway config {}: {e}", p.display()))?;
            Ok(cfg)
        }
        _ => Ok(GatewayConfig::default()),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sven").join("gateway").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_loopback_bind() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.http.bind, "127.0.0.1:18790");
        assert!(!cfg.http.insecure_dev_mode);
    }

    #[test]
    fn default_agent_max_tool_rounds_is_32() {
        assert_eq!(GatewayConfig::default().agent_max_tool_rounds, 32);
    }

    #[test]
    fn load_missing_path_falls_back_to_default() {
        let cfg = load(Some(Path::new("/nonexistent/sven-gateway-test.yaml"))).unwrap();
        assert_eq!(cfg.http.bind, default_bind());
    }
}
