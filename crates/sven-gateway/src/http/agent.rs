// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `/agent/*` routes: the turn orchestrator, the system-prompt layer
//! inspector, and plan-mode transitions.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures::stream::Stream;
use tokio::sync::mpsc;

use sven_config::AgentMode;
use sven_core::{system_prompt, PromptContext};

use crate::control::protocol::{AgentProcessRequest, AgentProcessResponse, PlanAction, TurnEvent};
use crate::error::ProcessError;
use crate::http::AppState;

/// `POST /agent/process`. `stream: true` in the body switches to SSE
/// framing; otherwise every event is buffered and returned as one JSON body.
pub async fn process(State(state): State<AppState>, Json(req): Json<AgentProcessRequest>) -> Response {
    let stream = req.stream;
    let rx = state.orchestrator.process(req);

    if stream {
        Sse::new(turn_event_stream(rx))
            .keep_alive(KeepAlive::default())
            .into_response()
    } else {
        let (reply, events) = drain_turn(rx).await;
        Json(AgentProcessResponse { reply, events }).into_response()
    }
}

fn turn_event_stream(
    mut rx: mpsc::Receiver<TurnEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(ev) = rx.recv().await {
            let terminal = matches!(ev, TurnEvent::Completed { .. } | TurnEvent::Error { .. });
            let event_name = match &ev {
                TurnEvent::StepStarted { .. } => "step_started",
                TurnEvent::ToolCall { .. } => "tool_call",
                TurnEvent::ToolResult { .. } => "tool_result",
                TurnEvent::AssistantDelta { .. } => "assistant_delta",
                TurnEvent::Completed { .. } => "completed",
                TurnEvent::Error { .. } => "error",
            };
            let data = serde_json::to_string(&ev).unwrap_or_default();
            yield Ok(Event::default().event(event_name).data(data));
            if terminal {
                break;
            }
        }
    }
}

async fn drain_turn(mut rx: mpsc::Receiver<TurnEvent>) -> (String, Vec<TurnEvent>) {
    let mut events = Vec::new();
    let mut reply = String::new();
    while let Some(ev) = rx.recv().await {
        if let TurnEvent::Completed { reply: r, .. } = &ev {
            reply = r.clone();
        }
        let terminal = matches!(ev, TurnEvent::Completed { .. } | TurnEvent::Error { .. });
        events.push(ev);
        if terminal {
            break;
        }
    }
    (reply, events)
}

/// `GET /agent/system-layers?mode=agent|plan|research`. Returns the stable
/// (cacheable) system-prompt layer for a mode plus its SHA-256, so operators
/// can verify what prompt a running gateway actually serves.
pub async fn system_layers(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let mode = match params.get("mode").map(String::as_str) {
        Some("research") => AgentMode::Research,
        Some("plan") => AgentMode::Plan,
        Some("agent") => AgentMode::Agent,
        _ => state.orchestrator.config().agent.default_mode,
    };
    let stable = system_prompt(mode, None, PromptContext::default().stable_only());
    let sha256 = sven_core::plan::hash_plan_prompts(&[("stable", stable.as_str())])
        .unwrap_or_default();
    Ok(Json(serde_json::json!({
        "mode": format!("{mode:?}").to_lowercase(),
        "layer": "stable",
        "content": stable,
        "sha256": sha256,
    })))
}

/// `GET /runtime-config`. Active feature flags, never secrets.
pub async fn runtime_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "system_layers_endpoint_enabled": true,
        "plan_mode_enabled": true,
        "channels": state.orchestrator.channels().names(),
    }))
}

pub async fn plan_state(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let snapshot = state.orchestrator.plan_snapshot(&chat_id).await?;
    Ok(Json(serde_json::to_value(snapshot).unwrap_or_default()))
}

pub async fn plan_action(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(action): Json<PlanAction>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let snapshot = state.orchestrator.apply_plan_action(&chat_id, action).await?;
    Ok(Json(serde_json::to_value(snapshot).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::test_state;
    use axum::extract::State as AxState;
    use sven_store::model::{MessageRole, RuntimeMessage};

    fn request(text: &str) -> AgentProcessRequest {
        AgentProcessRequest {
            input: vec![RuntimeMessage {
                id: "1".to_string(),
                role: MessageRole::User,
                kind: "message".to_string(),
                content: vec![serde_json::json!({"type": "text", "text": text})],
                metadata: serde_json::json!({}),
            }],
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            channel: "console".to_string(),
            stream: false,
            biz_params: Default::default(),
        }
    }

    #[tokio::test]
    async fn non_streaming_process_returns_the_mock_reply() {
        let (state, _dir) = test_state().await;
        let response = process(AxState(state), Json(request("ping"))).await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: AgentProcessResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.reply, "MOCK: ping");
    }

    #[tokio::test]
    async fn system_layers_defaults_to_the_agent_mode_stable_layer() {
        let (state, _dir) = test_state().await;
        let body = system_layers(AxState(state), Query(HashMap::new())).await.unwrap().0;
        assert_eq!(body["mode"], "agent");
        assert!(!body["sha256"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn runtime_config_reports_the_console_channel() {
        let (state, _dir) = test_state().await;
        let body = runtime_config(AxState(state)).await.0;
        assert!(body["channels"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "console"));
    }

    #[tokio::test]
    async fn plan_state_for_an_unknown_chat_is_not_found() {
        let (state, _dir) = test_state().await;
        let err = plan_state(AxState(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
