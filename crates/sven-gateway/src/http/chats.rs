// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `/chats` CRUD: lightweight windows onto `Store.chats`/`histories`. The
//! default chat can be read but never deleted, same as the default cron job.

use axum::extract::{Path, State};
use axum::Json;

use crate::error::ProcessError;
use crate::http::AppState;

pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let chats = state
        .orchestrator
        .store()
        .read(|s| s.chats.values().cloned().collect::<Vec<_>>())
        .await;
    Json(serde_json::json!({ "chats": chats }))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let chat = state
        .orchestrator
        .store()
        .read(|s| s.chats.get(&id).cloned())
        .await
        .ok_or_else(|| ProcessError::NotFound(format!("chat {id}")))?;
    let history = state
        .orchestrator
        .store()
        .read(|s| s.histories.get(&id).cloned().unwrap_or_default())
        .await;
    Ok(Json(serde_json::json!({ "chat": chat, "history": history })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    if id == sven_store::DEFAULT_CHAT_ID {
        return Err(ProcessError::InvalidRequest(
            "the default chat cannot be deleted".into(),
        ));
    }
    state
        .orchestrator
        .store()
        .write(|s| {
            if s.chats.remove(&id).is_none() {
                return Err(ProcessError::NotFound(format!("chat {id}")));
            }
            s.histories.remove(&id);
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
    async fn list_is_empty_before_any_turn_runs() {
        let (state, _dir) = test_state().await;
        let body = list(AxState(state)).await.0;
        assert_eq!(body["chats"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn get_unknown_chat_is_not_found() {
        let (state, _dir) = test_state().await;
        let err = get(AxState(state), Path("missing".to_string())).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn deleting_the_default_chat_is_rejected() {
        let (state, _dir) = test_state().await;
        let err = delete(AxState(state), Path(sven_store::DEFAULT_CHAT_ID.to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[tokio::test]
    async fn deleting_an_unknown_chat_is_not_found() {
        let (state, _dir) = test_state().await;
        let err = delete(AxState(state), Path("ghost".to_string())).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
