// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Wire shapes for `/agent/process`: the request envelope, the SSE event
//! sequence, and the non-streaming response. Plain JSON — no CBOR framing —
//! since every client of this surface is an HTTP/SSE consumer, not a P2P
//! operator.

use serde::{Deserialize, Serialize};
use sven_core::plan::PlanSpec;
use sven_store::model::RuntimeMessage;

/// `POST /agent/plan/{chat_id}` request body: one named state-machine
/// transition per call, mirroring [`sven_core::plan::PlanModeSnapshot`]'s
/// methods one-to-one.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    ToggleOn,
    ToggleOff {
        #[serde(default)]
        confirm: bool,
    },
    Compile {
        candidate: PlanSpec,
        #[serde(default)]
        unresolved: usize,
    },
    SubmitAnswer,
    Revise,
    FinishRevision {
        candidate: PlanSpec,
    },
    Execute {
        execution_session_id: String,
    },
    FinishExecution {
        succeeded: bool,
    },
}

/// `POST /agent/process` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentProcessRequest {
    pub input: Vec<RuntimeMessage>,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub biz_params: BizParams,
}

/// Per-request overrides. `tool` is a shortcut that skips the model call and
/// invokes the named tool directly with `tool_input`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BizParams {
    #[serde(default)]
    pub prompt_mode: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default)]
    pub dispatch_channel: Option<String>,
}

/// One step in the orchestrator loop, used to correlate `tool_call` with its
/// matching `tool_result` and to order `step_started` events.
pub type Step = u32;

#[derive(Debug, Clone, Serialize)]
pub struct WireToolCall {
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireToolResult {
    pub name: String,
    pub ok: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMeta {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// SSE payload carried by each `data: <json>\n\n` line. Tagged so clients can
/// dispatch on `type` without guessing shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    StepStarted {
        step: Step,
    },
    ToolCall {
        step: Step,
        tool_call: WireToolCall,
    },
    ToolResult {
        step: Step,
        tool_result: WireToolResult,
    },
    AssistantDelta {
        step: Step,
        delta: String,
    },
    Completed {
        step: Step,
        reply: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<CompletedMeta>,
    },
    Error {
        meta: ErrorMeta,
    },
}

/// Non-streaming `/agent/process` response body.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProcessResponse {
    pub reply: String,
    pub events: Vec<TurnEvent>,
}

/// `{error:{code, message, details?}}` envelope for non-stream error paths.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_started_serializes_with_type_tag() {
        let ev = TurnEvent::StepStarted { step: 1 };
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"type":"step_started","step":1}"#);
    }

    #[test]
    fn completed_omits_meta_when_absent() {
        let ev = TurnEvent::Completed {
            step: 3,
            reply: "hi".into(),
            meta: None,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(!json.contains("meta"));
    }

    #[test]
    fn error_event_carries_code_and_message() {
        let ev = TurnEvent::Error {
            meta: ErrorMeta {
                code: "provider_request_failed".into(),
                message: "timed out".into(),
                details: None,
            },
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("provider_request_failed"));
    }
}
