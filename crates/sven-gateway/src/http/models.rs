// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `/models/*`: the static model catalog plus per-provider settings
//! (`State.providers`) and the active model slot (`State.active_llm`).

use axum::extract::{Path, State};
use axum::Json;
use sven_store::model::ProviderSetting;

use crate::error::ProcessError;
use crate::http::AppState;

pub async fn catalog() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "models": sven_model::catalog::static_catalog() }))
}

pub async fn active(State(state): State<AppState>) -> Json<serde_json::Value> {
    let active = state.orchestrator.store().read(|s| s.active_llm.clone()).await;
    Json(serde_json::json!({ "active": active }))
}

pub async fn set_active(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let active = body
        .get("active")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProcessError::InvalidRequest("expected {\"active\": \"<model>\"}".into()))?
        .to_string();
    state
        .orchestrator
        .store()
        .write(|s| {
            s.active_llm = Some(active.clone());
            Ok::<_, ProcessError>(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "active": active })))
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let cfg = state
        .orchestrator
        .store()
        .read(|s| s.providers.get(&id).cloned())
        .await
        .ok_or_else(|| ProcessError::NotFound(format!("provider {id}")))?;
    Ok(Json(serde_json::to_value(cfg).unwrap_or_default()))
}

pub async fn set_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(cfg): Json<ProviderSetting>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    state
        .orchestrator
        .store()
        .write(|s| {
            s.providers.insert(id.clone(), cfg);
            Ok::<_, ProcessError>(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "updated": id })))
}

pub async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    state
        .orchestrator
        .store()
        .write(|s| {
            if s.providers.remove(&id).is_none() {
                return Err(ProcessError::NotFound(format!("provider {id}")));
            }
            Ok(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::test_state;
    use axum::extract::State as AxState;

    #[tokio::test]
    async fn catalog_is_non_empty() {
        let body = catalog().await.0;
        assert!(!body["models"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_active_then_active_round_trips() {
        let (state, _dir) = test_state().await;
        set_active(
            AxState(state.clone()),
            Json(serde_json::json!({ "active": "anthropic/claude" })),
        )
        .await
        .unwrap();
        let body = active(AxState(state)).await.0;
        assert_eq!(body["active"], "anthropic/claude");
    }

    #[tokio::test]
    async fn set_active_without_the_active_key_is_invalid() {
        let (state, _dir) = test_state().await;
        let err = set_active(AxState(state), Json(serde_json::json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[tokio::test]
    async fn get_config_for_unknown_provider_is_not_found() {
        let (state, _dir) = test_state().await;
        let err = get_config(AxState(state), Path("openai".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn set_config_then_delete_config_round_trips() {
        let (state, _dir) = test_state().await;
        set_config(
            AxState(state.clone()),
            Path("openai".to_string()),
            Json(ProviderSetting {
                enabled: true,
                ..ProviderSetting::default()
            }),
        )
        .await
        .unwrap();
        get_config(AxState(state.clone()), Path("openai".to_string()))
            .await
            .unwrap();
        delete_config(AxState(state), Path("openai".to_string())).await.unwrap();
    }
}
