// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `/config/channels`: per-channel dispatch settings (`State.channels`, a
//! free-form JSON blob per channel name — webhook URLs, bot tokens, etc.)
//! plus the read-only list of channel types the running gateway can
//! actually dispatch to.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::ProcessError;
use crate::http::AppState;

pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let channels = state.orchestrator.store().read(|s| s.channels.clone()).await;
    Json(serde_json::json!({ "channels": channels }))
}

pub async fn replace_all(
    State(state): State<AppState>,
    Json(channels): Json<BTreeMap<String, serde_json::Value>>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    state
        .orchestrator
        .store()
        .write(|s| {
            s.channels = channels;
            Ok::<_, ProcessError>(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "replaced": true })))
}

pub async fn types(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "types": state.orchestrator.channels().names() }))
}

pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let cfg = state
        .orchestrator
        .store()
        .read(|s| s.channels.get(&name).cloned())
        .await
        .ok_or_else(|| ProcessError::NotFound(format!("channel config {name}")))?;
    Ok(Json(cfg))
}

pub async fn set(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(cfg): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    state
        .orchestrator
        .store()
        .write(|s| {
            s.channels.insert(name.clone(), cfg);
            Ok::<_, ProcessError>(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "updated": name })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    state
        .orchestrator
        .store()
        .write(|s| {
            if s.channels.remove(&name).is_none() {
                return Err(ProcessError::NotFound(format!("channel config {name}")));
            }
            Ok(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "deleted": name })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::test_state;
    use axum::extract::State as AxState;

    #[tokio::test]
    async fn types_lists_the_builtin_channels() {
        let (state, _dir) = test_state().await;
        let body = types(AxState(state)).await.0;
        let names: Vec<String> = body["types"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"console".to_string()));
    }

    #[tokio::test]
    async fn set_then_get_a_channel_config() {
        let (state, _dir) = test_state().await;
        set(
            AxState(state.clone()),
            Path("webhook".to_string()),
            Json(serde_json::json!({"enabled": true, "url": "https://example.test/hook"})),
        )
        .await
        .unwrap();
        let body = get(AxState(state), Path("webhook".to_string())).await.unwrap().0;
        assert_eq!(body["url"], "https://example.test/hook");
    }

    #[tokio::test]
    async fn deleting_an_unconfigured_channel_is_not_found() {
        let (state, _dir) = test_state().await;
        let err = delete(AxState(state), Path("ghost".to_string())).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn replace_all_overwrites_every_channel_config() {
        let (state, _dir) = test_state().await;
        set(
            AxState(state.clone()),
            Path("webhook".to_string()),
            Json(serde_json::json!({"enabled": true})),
        )
        .await
        .unwrap();
        let mut replacement = BTreeMap::new();
        replacement.insert("console".to_string(), serde_json::json!({"enabled": true}));
        replace_all(AxState(state.clone()), Json(replacement)).await.unwrap();
        let body = list(AxState(state)).await.0;
        assert!(body["channels"].get("webhook").is_none());
        assert!(body["channels"].get("console").is_some());
    }
}
