// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Persistent JSON state store for the gateway.
//!
//! A single JSON file under the data directory holds every chat, cron job,
//! provider setting, and channel configuration the gateway knows about.
//! Access is mediated by one [`Store`], which wraps a
//! [`tokio::sync::RwLock`] so readers never block on each other and writers
//! see a consistent snapshot. The write path serializes to a temp file next
//! to the target and renames it into place, so a reader never observes a
//! half-written file, and takes an `fs4` advisory lock on the target path for
//! the duration of the write so two gateway processes pointed at the same
//! data directory cannot corrupt each other's writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs4::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

pub mod migrate;
pub mod model;

pub use model::{
    Chat, CronJobSpec, CronJobState, CronWorkflowSpec, ProviderSetting, RuntimeMessage, State,
};

/// Current on-disk schema version. Bump when [`State`]'s shape changes in a
/// way that requires a migration step (see [`migrate`]).
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_CHAT_ID: &str = "default";
pub const DEFAULT_SESSION_ID: &str = "default-session";
pub const DEFAULT_USER_ID: &str = "default-user";
pub const DEFAULT_CHANNEL: &str = "console";
pub const DEFAULT_CRON_JOB_ID: &str = "system-default";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "state file schema_version {found} is newer than this binary supports ({supported})"
    )]
    SchemaTooNew { found: u32, supported: u32 },
    #[error("default cron job cannot be deleted")]
    DefaultCronProtected,
    #[error("default chat cannot be deleted")]
    DefaultChatProtected,
}

/// Single-writer, many-reader JSON state store.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    state: Arc<RwLock<State>>,
}

impl Store {
    /// Load state from `path`, creating a fresh default state if the file
    /// does not exist. Applies schema migrations and load-time
    /// normalization before returning.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let value: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                let mut state = migrate::migrate(value).map_err(|source| StoreError::Parse {
                    path: path.clone(),
                    source,
                })?;
                if state.schema_version > SCHEMA_VERSION {
                    return Err(StoreError::SchemaTooNew {
                        found: state.schema_version,
                        supported: SCHEMA_VERSION,
                    });
                }
                normalize(&mut state);
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut state = State::default();
                normalize(&mut state);
                state
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let store = Self {
            path,
            state: Arc::new(RwLock::new(state)),
        };
        store.persist().await?;
        Ok(store)
    }

    /// Default data-directory path: `~/.local/share/sven/gateway/state.json`
    /// (or the platform equivalent via the `dirs` crate).
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sven")
            .join("gateway")
            .join("state.json")
    }

    /// Shared-lock read. `f` receives an immutable reference to the state.
    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&State) -> R,
    {
        let guard = self.state.read().await;
        f(&guard)
    }

    /// Exclusive-lock write. `f` may mutate the state and returns a
    /// `Result<T, E>`; on `Ok` the state is persisted to disk before this
    /// function returns, on `Err` nothing is persisted (the in-memory state
    /// still reflects `f`'s mutations up to the point it returned, matching
    /// "no rollback on logical application errors" — callers that need
    /// atomicity should validate before mutating).
    pub async fn write<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut State) -> Result<T, E>,
        E: From<StoreError>,
    {
        let result = {
            let mut guard = self.state.write().await;
            f(&mut guard)
        };
        if result.is_ok() {
            self.persist().await.map_err(E::from)?;
        }
        result
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let snapshot = { self.state.read().await.clone() };
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist_blocking(&path, &snapshot))
            .await
            .expect("persist task panicked")
    }
}

fn persist_blocking(path: &Path, state: &State) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    // Advisory-lock the target file (created if absent) for the duration of
    // the write so a second process sharing this data directory cannot
    // interleave writes with this one.
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    lock_file
        .lock_exclusive()
        .map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(state).expect("State always serializes");
    std::fs::write(&tmp_path, json).map_err(|source| StoreError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    FileExt::unlock(&lock_file).ok();
    Ok(())
}

/// Load-time normalization: ensure every mapping exists, ensure the default
/// chat and default cron job are present, and repair a handful of
/// known-legacy shapes.
pub fn normalize(state: &mut State) {
    state.chats.entry(DEFAULT_CHAT_ID.to_string()).or_insert_with(|| Chat {
        id: DEFAULT_CHAT_ID.to_string(),
        name: "Default".to_string(),
        session_id: DEFAULT_SESSION_ID.to_string(),
        user_id: DEFAULT_USER_ID.to_string(),
        channel: DEFAULT_CHANNEL.to_string(),
        created_at: chrono_now_rfc3339(),
        updated_at: chrono_now_rfc3339(),
        meta: serde_json::Value::Object(Default::default()),
    });

    state
        .cron_jobs
        .entry(DEFAULT_CRON_JOB_ID.to_string())
        .or_insert_with(default_cron_job);
    state
        .cron_states
        .entry(DEFAULT_CRON_JOB_ID.to_string())
        .or_insert_with(CronJobState::default);

    // Lowercase provider ids and drop the legacy "demo" provider entry —
    // `demo` is a built-in adapter identity, not a configurable provider.
    let legacy_keys: Vec<String> = state.providers.keys().cloned().collect();
    for key in legacy_keys {
        let lower = key.to_lowercase();
        if lower != key {
            if let Some(v) = state.providers.remove(&key) {
                state.providers.insert(lower, v);
            }
        }
    }
    state.providers.remove("demo");

    // Clear active_llm if it points at a missing or disabled provider.
    if let Some(active) = state.active_llm.clone() {
        let still_valid = state
            .providers
            .get(&active)
            .map(|p| p.enabled)
            .unwrap_or(false);
        if !still_valid {
            state.active_llm = None;
        }
    }

    state.schema_version = SCHEMA_VERSION;
}

fn default_cron_job() -> CronJobSpec {
    CronJobSpec {
        id: DEFAULT_CRON_JOB_ID.to_string(),
        name: "Heartbeat".to_string(),
        enabled: true,
        schedule: model::CronSchedule {
            kind: model::ScheduleKind::Interval,
            cron: "3600s".to_string(),
            timezone: "UTC".to_string(),
        },
        task_type: model::CronTaskType::Text,
        text: Some("Perform routine housekeeping.".to_string()),
        workflow: None,
        dispatch: DEFAULT_CHANNEL.to_string(),
        runtime: model::CronRuntime::default(),
        meta: {
            let mut m = BTreeMap::new();
            m.insert(
                "system_default".to_string(),
                serde_json::Value::Bool(true),
            );
            m
        },
    }
}

fn chrono_now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_creates_default_state_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Store::load(&path).await.unwrap();
        assert!(path.exists());
        store
            .read(|s| {
                assert!(s.chats.contains_key(DEFAULT_CHAT_ID));
                assert!(s.cron_jobs.contains_key(DEFAULT_CRON_JOB_ID));
            })
            .await;
    }

    #[tokio::test]
    async fn round_trip_preserves_written_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Store::load(&path).await.unwrap();

        store
            .write::<_, (), StoreError>(|s| {
                s.chats.insert(
                    "custom".to_string(),
                    Chat {
                        id: "custom".to_string(),
                        name: "Custom chat".to_string(),
                        session_id: "sess-1".to_string(),
                        user_id: "user-1".to_string(),
                        channel: "webhook".to_string(),
                        created_at: chrono_now_rfc3339(),
                        updated_at: chrono_now_rfc3339(),
                        meta: serde_json::Value::Object(Default::default()),
                    },
                );
                Ok(())
            })
            .await
            .unwrap();

        let reloaded = Store::load(&path).await.unwrap();
        reloaded
            .read(|s| {
                assert!(s.chats.contains_key("custom"));
                assert_eq!(s.chats["custom"].channel, "webhook");
            })
            .await;
    }

    #[tokio::test]
    async fn default_cron_job_always_present_after_normalize() {
        let mut state = State::default();
        normalize(&mut state);
        assert!(state.cron_jobs.contains_key(DEFAULT_CRON_JOB_ID));
        assert_eq!(
            state.cron_jobs[DEFAULT_CRON_JOB_ID]
                .meta
                .get("system_default")
                .and_then(|v| v.as_bool()),
            Some(true)
        );
    }

    #[tokio::test]
    async fn normalize_lowercases_provider_ids_and_drops_demo() {
        let mut state = State::default();
        state.providers.insert(
            "OpenAI".to_string(),
            ProviderSetting {
                enabled: true,
                ..Default::default()
            },
        );
        state.providers.insert(
            "demo".to_string(),
            ProviderSetting {
                enabled: true,
                ..Default::default()
            },
        );
        normalize(&mut state);
        assert!(state.providers.contains_key("openai"));
        assert!(!state.providers.contains_key("demo"));
    }

    #[tokio::test]
    async fn active_llm_cleared_when_provider_missing() {
        let mut state = State::default();
        state.active_llm = Some("ghost".to_string());
        normalize(&mut state);
        assert_eq!(state.active_llm, None);
    }
}
