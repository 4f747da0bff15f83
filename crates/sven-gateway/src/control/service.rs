// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Orchestrates a single `POST /agent/process` call: resolves the chat,
//! applies pre-intercepts, builds or bypasses the model turn, bridges
//! `sven_core::AgentEvent` into the wire [`TurnEvent`] sequence, persists the
//! new messages, and dispatches the reply through a channel plugin.
//!
//! Grounded on `sven-node::control::service::ControlService` /
//! `agent_event_to_control`: the same "own the mutable state, drive the
//! agent, translate its events into a wire protocol" shape, minus the WS/CBOR
//! session bookkeeping that surface needed and this one does not.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::info_span;
use uuid::Uuid;

use sven_config::{AgentMode, Config, ModelConfig};
use sven_core::events::AgentEvent;
use sven_core::{plan::PlanModeSnapshot, AgentRuntimeContext};
use sven_store::model::{Chat, MessageRole, ProviderSetting, RuntimeMessage};
use sven_store::Store;
use sven_tools::{ToolCall, ToolRegistry};

use sven_channels::{ChannelRegistry, OutboundMessage};

use crate::agent_builder::build_turn_agent;
use crate::control::protocol::{
    AgentProcessRequest, CompletedMeta, ErrorMeta, PlanAction, TurnEvent, WireToolCall,
    WireToolResult,
};
use crate::error::ProcessError;

/// Meta key under which the chat's active prompt-mode override and plan-mode
/// snapshot are stored inside `Chat::meta` (a free-form JSON blob).
const META_PROMPT_MODE: &str = "prompt_mode";
const META_PLAN: &str = "plan";
const META_MODEL: &str = "model";

pub struct Orchestrator {
    store: Arc<Store>,
    channels: Arc<ChannelRegistry>,
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(store: Arc<Store>, channels: Arc<ChannelRegistry>, config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self {
            store,
            channels,
            config,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Run one cron-triggered turn to completion and return the final reply
    /// text, bypassing the SSE event channel entirely. Used by
    /// [`crate::gateway::SchedulerTurnRunner`].
    pub async fn run_cron_turn(
        self: &Arc<Self>,
        dispatch: &str,
        text: &str,
    ) -> Result<String, ProcessError> {
        let req = AgentProcessRequest {
            input: vec![RuntimeMessage {
                id: Uuid::new_v4().to_string(),
                role: MessageRole::User,
                kind: "message".to_string(),
                content: vec![serde_json::json!({"type": "text", "text": text})],
                metadata: serde_json::json!({}),
            }],
            session_id: sven_store::DEFAULT_SESSION_ID.to_string(),
            user_id: sven_store::DEFAULT_USER_ID.to_string(),
            channel: dispatch.to_string(),
            stream: false,
            biz_params: crate::control::protocol::BizParams {
                dispatch_channel: Some(dispatch.to_string()),
                ..Default::default()
            },
        };
        let mut rx = self.process(req);
        let mut reply = String::new();
        while let Some(ev) = rx.recv().await {
            match ev {
                TurnEvent::Completed { reply: r, .. } => reply = r,
                TurnEvent::Error { meta } => {
                    return Err(ProcessError::ProviderRequestFailed(meta.message))
                }
                _ => {}
            }
        }
        Ok(reply)
    }

    /// Run one turn to completion, streaming wire events through the
    /// returned receiver. The caller drains it fully for the non-streaming
    /// response or forwards each item as an SSE frame for the streaming one.
    pub fn process(self: &Arc<Self>, req: AgentProcessRequest) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(64);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_turn(req, tx.clone()).await {
                let _ = tx.send(TurnEvent::Error { meta: e.into_meta() }).await;
            }
        });
        rx
    }

    async fn run_turn(
        &self,
        req: AgentProcessRequest,
        tx: mpsc::Sender<TurnEvent>,
    ) -> Result<(), ProcessError> {
        let chat = self.resolve_chat(&req).await?;
        let span = info_span!("turn", session_id = %req.session_id, chat_id = %chat.id);
        let _enter = span.enter();

        let user_text = latest_user_text(&req.input);
        let mut step: u32 = 0;

        // ── Pre-intercepts ──────────────────────────────────────────────
        if let Some(reply) = self
            .try_intercept(&chat, user_text.as_deref(), &mut step, &tx)
            .await?
        {
            self.persist_turn(&chat, &req.input, &reply).await?;
            self.dispatch_reply(&req, &chat, &reply).await?;
            return Ok(());
        }

        // ── Direct-tool-mode shortcut ───────────────────────────────────
        if let Some(tool_name) = req.biz_params.tool.clone() {
            let reply = self
                .run_direct_tool(&tool_name, req.biz_params.tool_input.clone(), &mut step, &tx)
                .await?;
            self.persist_turn(&chat, &req.input, &reply).await?;
            self.dispatch_reply(&req, &chat, &reply).await?;
            return Ok(());
        }

        // ── Normal model turn ───────────────────────────────────────────
        let mode = self.resolve_mode(&chat, &req);
        let model_cfg = self.resolve_model_config(&chat).await?;
        let provider = sven_model::from_config(&model_cfg)
            .map_err(|e| ProcessError::ProviderNotConfigured(e.to_string()))?;
        let provider: Arc<dyn sven_model::ModelProvider> = Arc::from(provider);

        let mut agent = build_turn_agent(
            provider,
            Arc::new(self.config.agent.clone()),
            mode,
            AgentRuntimeContext::default(),
            self.config.tools.memory.memory_file.clone(),
            self.config.tools.web.search.api_key.clone(),
            self.config.tools.timeout_secs,
        );

        let history = self.load_history(&chat).await;
        if !history.is_empty() {
            agent.seed_history(history).await;
        }

        let text = user_text.unwrap_or_default();
        step += 1;
        let _ = tx.send(TurnEvent::StepStarted { step }).await;

        let (event_tx, mut event_rx) = mpsc::channel::<AgentEvent>(128);
        let bridge_tx = tx.clone();
        let bridge = tokio::spawn(async move {
            bridge_agent_events(&mut event_rx, bridge_tx, step).await
        });

        let submit_result = agent.submit(&text, event_tx).await;
        let (reply, _last_step) = bridge.await.unwrap_or_default();

        submit_result.map_err(|e| ProcessError::ProviderRequestFailed(e.to_string()))?;

        let _ = tx
            .send(TurnEvent::Completed {
                step,
                reply: reply.clone(),
                meta: Some(CompletedMeta { model_request: None }),
            })
            .await;

        self.persist_turn(&chat, &req.input, &reply).await?;
        self.dispatch_reply(&req, &chat, &reply).await?;
        Ok(())
    }

    /// Handle `/clear`, `/compact`, `/memory`, `/review`, and plan-mode slash
    /// toggles on the latest user text. Returns `Some(reply)` when the
    /// command was fully handled without a model call.
    async fn try_intercept(
        &self,
        chat: &Chat,
        user_text: Option<&str>,
        step: &mut u32,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<Option<String>, ProcessError> {
        let Some(text) = user_text.map(str::trim) else {
            return Ok(None);
        };

        *step += 1;
        let _ = tx.send(TurnEvent::StepStarted { step: *step }).await;

        let reply = if text == "/clear" {
            self.store
                .write::<_, (), ProcessError>(|s| {
                    s.histories.insert(chat.id.clone(), Vec::new());
                    Ok(())
                })
                .await?;
            Some("Conversation history cleared.".to_string())
        } else if text == "/compact" {
            self.store
                .write::<_, (), ProcessError>(|s| {
                    if let Some(hist) = s.histories.get_mut(&chat.id) {
                        let keep = self.config.agent.compaction_keep_recent;
                        if hist.len() > keep {
                            let drop_n = hist.len() - keep;
                            hist.drain(0..drop_n);
                        }
                    }
                    Ok(())
                })
                .await?;
            Some("Context compacted; older turns were dropped to free up space.".to_string())
        } else if text == "/plan on" {
            self.update_plan(&chat.id, |p| p.toggle_on().map_err(plan_err_to_process))
                .await?;
            Some("Plan mode enabled. Describe the change you want and I will produce a plan before touching any files.".to_string())
        } else if text == "/plan off" || text == "/plan off confirm" {
            let confirm = text.ends_with("confirm");
            self.update_plan(&chat.id, |p| {
                p.toggle_off(confirm).map_err(plan_err_to_process)
            })
            .await?;
            Some("Plan mode disabled.".to_string())
        } else {
            None
        };

        Ok(reply)
    }

    /// Read the chat's persisted plan-mode snapshot without mutating it.
    pub async fn plan_snapshot(&self, chat_id: &str) -> Result<PlanModeSnapshot, ProcessError> {
        let chat_id = chat_id.to_string();
        self.store
            .read(move |s| {
                s.chats.get(&chat_id).map(|c| {
                    c.meta
                        .get(META_PLAN)
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default()
                })
            })
            .await
            .ok_or_else(|| ProcessError::NotFound(format!("chat {chat_id}")))
    }

    /// Apply a named plan-mode transition and return the resulting snapshot.
    /// Drives the same [`PlanModeSnapshot`] methods `try_intercept` uses for
    /// the `/plan on` and `/plan off` slash commands, exposed here for the
    /// `/agent/plan/*` HTTP surface.
    pub async fn apply_plan_action(
        &self,
        chat_id: &str,
        action: PlanAction,
    ) -> Result<PlanModeSnapshot, ProcessError> {
        self.update_plan(chat_id, |p| match action.clone() {
            PlanAction::ToggleOn => p.toggle_on().map_err(plan_err_to_process),
            PlanAction::ToggleOff { confirm } => {
                p.toggle_off(confirm).map_err(plan_err_to_process)
            }
            PlanAction::Compile { candidate, unresolved } => {
                p.compile(candidate, unresolved).map_err(plan_err_to_process)
            }
            PlanAction::SubmitAnswer => p.submit_answer().map_err(plan_err_to_process),
            PlanAction::Revise => p.revise().map_err(plan_err_to_process),
            PlanAction::FinishRevision { candidate } => {
                p.finish_revision(candidate).map_err(plan_err_to_process)
            }
            PlanAction::Execute { execution_session_id } => {
                p.execute(execution_session_id).map_err(plan_err_to_process)
            }
            PlanAction::FinishExecution { succeeded } => {
                p.finish_execution(succeeded);
                Ok(())
            }
        })
        .await?;
        self.plan_snapshot(chat_id).await
    }

    /// Load the chat's persisted [`PlanModeSnapshot`], apply `f`, and persist
    /// the result in one `Store::write` transaction so a rejected transition
    /// never partially lands.
    async fn update_plan(
        &self,
        chat_id: &str,
        f: impl FnOnce(&mut PlanModeSnapshot) -> Result<(), ProcessError>,
    ) -> Result<(), ProcessError> {
        let chat_id = chat_id.to_string();
        self.store
            .write::<_, (), ProcessError>(|s| {
                let entry = s
                    .chats
                    .get_mut(&chat_id)
                    .ok_or_else(|| ProcessError::NotFound(format!("chat {chat_id}")))?;
                let mut snapshot: PlanModeSnapshot = entry
                    .meta
                    .get(META_PLAN)
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                f(&mut snapshot)?;
                if !entry.meta.is_object() {
                    entry.meta = serde_json::json!({});
                }
                entry
                    .meta
                    .as_object_mut()
                    .expect("just ensured object")
                    .insert(
                        META_PLAN.to_string(),
                        serde_json::to_value(&snapshot)
                            .expect("PlanModeSnapshot always serializes"),
                    );
                Ok(())
            })
            .await
    }

    async fn run_direct_tool(
        &self,
        tool_name: &str,
        tool_input: Option<serde_json::Value>,
        step: &mut u32,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<String, ProcessError> {
        let mut registry = ToolRegistry::new();
        register_direct_tools(&mut registry);
        let tool = registry
            .get(tool_name)
            .ok_or_else(|| ProcessError::ToolNotSupported(tool_name.to_string()))?;

        *step += 1;
        let _ = tx.send(TurnEvent::StepStarted { step: *step }).await;

        let args = tool_input.unwrap_or_else(|| serde_json::json!({}));
        let call = ToolCall {
            id: format!("direct_{}", Uuid::new_v4()),
            name: tool_name.to_string(),
            args: args.clone(),
        };
        let _ = tx
            .send(TurnEvent::ToolCall {
                step: *step,
                tool_call: WireToolCall {
                    name: tool_name.to_string(),
                    input: args,
                },
            })
            .await;

        let output = tool.execute(&call).await;
        let _ = tx
            .send(TurnEvent::ToolResult {
                step: *step,
                tool_result: WireToolResult {
                    name: tool_name.to_string(),
                    ok: !output.is_error,
                    output: output.content.clone(),
                    summary: None,
                },
            })
            .await;
        if output.is_error {
            return Err(ProcessError::ToolInvokeFailed(output.content));
        }

        let _ = tx
            .send(TurnEvent::Completed {
                step: *step,
                reply: output.content.clone(),
                meta: None,
            })
            .await;
        Ok(output.content)
    }

    fn resolve_mode(&self, chat: &Chat, req: &AgentProcessRequest) -> AgentMode {
        let raw = req
            .biz_params
            .prompt_mode
            .clone()
            .or_else(|| {
                chat.meta
                    .get(META_PROMPT_MODE)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            });
        match raw.as_deref() {
            Some("research") => AgentMode::Research,
            Some("plan") => AgentMode::Plan,
            Some("agent") => AgentMode::Agent,
            _ => self.config.agent.default_mode,
        }
    }

    async fn resolve_model_config(&self, chat: &Chat) -> Result<ModelConfig, ProcessError> {
        let active = self.store.read(|s| s.active_llm.clone()).await;
        let slot = chat
            .meta
            .get(META_MODEL)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or(active)
            .unwrap_or_else(|| format!("{}/{}", self.config.model.provider, self.config.model.name));

        let (provider_id, model_name) = slot
            .split_once('/')
            .map(|(p, m)| (p.to_string(), m.to_string()))
            .unwrap_or((slot.clone(), self.config.model.name.clone()));

        let setting: ProviderSetting = self
            .store
            .read(|s| s.providers.get(&provider_id).cloned())
            .await
            .unwrap_or_default();
        if !setting.enabled && provider_id != "mock" {
            return Err(ProcessError::ProviderNotConfigured(provider_id));
        }

        let resolved_name = setting
            .model_aliases
            .get(&model_name)
            .cloned()
            .unwrap_or(model_name);

        let driver_options = serde_json::json!({
            "headers": setting.headers,
            "timeout_ms": setting.timeout_ms,
            "reasoning_effort": setting.reasoning_effort,
        });

        Ok(ModelConfig {
            provider: provider_id,
            name: resolved_name,
            api_key: setting.api_key,
            base_url: setting.base_url,
            driver_options,
            ..ModelConfig::default()
        })
    }

    async fn resolve_chat(&self, req: &AgentProcessRequest) -> Result<Chat, ProcessError> {
        let existing = self
            .store
            .read(|s| {
                s.chats
                    .values()
                    .find(|c| {
                        c.session_id == req.session_id
                            && c.user_id == req.user_id
                            && c.channel == req.channel
                    })
                    .cloned()
            })
            .await;
        if let Some(chat) = existing {
            return Ok(chat);
        }

        let now = Utc::now().to_rfc3339();
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            name: format!("{}/{}", req.channel, req.user_id),
            session_id: req.session_id.clone(),
            user_id: req.user_id.clone(),
            channel: req.channel.clone(),
            created_at: now.clone(),
            updated_at: now,
            meta: serde_json::json!({}),
        };
        let inserted = chat.clone();
        self.store
            .write::<_, (), ProcessError>(|s| {
                s.chats.insert(chat.id.clone(), chat.clone());
                s.histories.insert(chat.id.clone(), Vec::new());
                Ok(())
            })
            .await?;
        Ok(inserted)
    }

    async fn load_history(&self, chat: &Chat) -> Vec<sven_model::Message> {
        let raw = self
            .store
            .read(|s| s.histories.get(&chat.id).cloned().unwrap_or_default())
            .await;
        raw.iter().map(runtime_to_model_message).collect()
    }

    async fn persist_turn(
        &self,
        chat: &Chat,
        input: &[RuntimeMessage],
        reply: &str,
    ) -> Result<(), ProcessError> {
        let now = Utc::now().to_rfc3339();
        let assistant = RuntimeMessage {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::Assistant,
            kind: "message".to_string(),
            content: vec![serde_json::json!({"type": "text", "text": reply})],
            metadata: serde_json::json!({}),
        };
        let chat_id = chat.id.clone();
        let input = input.to_vec();
        self.store
            .write::<_, (), ProcessError>(|s| {
                let hist = s.histories.entry(chat_id.clone()).or_default();
                hist.extend(input.clone());
                hist.push(assistant.clone());
                if let Some(c) = s.chats.get_mut(&chat_id) {
                    c.updated_at = now.clone();
                }
                Ok(())
            })
            .await
    }

    async fn dispatch_reply(
        &self,
        req: &AgentProcessRequest,
        chat: &Chat,
        reply: &str,
    ) -> Result<(), ProcessError> {
        let channel_name = req
            .biz_params
            .dispatch_channel
            .clone()
            .unwrap_or_else(|| req.channel.clone());
        let (enabled, config) = self
            .store
            .read(|s| {
                let cfg = s.channels.get(&channel_name).cloned();
                let enabled = cfg
                    .as_ref()
                    .and_then(|v| v.get("enabled"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(channel_name == "console");
                (enabled, cfg.unwrap_or_else(|| serde_json::json!({})))
            })
            .await;

        let message = OutboundMessage {
            recipient: chat.user_id.clone(),
            text: reply.to_string(),
        };
        match self
            .channels
            .dispatch(&channel_name, enabled, &config, &message)
            .await
        {
            Ok(()) => Ok(()),
            Err(sven_channels::ChannelError::InvalidChannel(c)) => {
                Err(ProcessError::InvalidChannel(c))
            }
            Err(sven_channels::ChannelError::ChannelDisabled(c)) => {
                Err(ProcessError::ChannelDisabled(c))
            }
            Err(sven_channels::ChannelError::ChannelNotSupported(c)) => {
                Err(ProcessError::ChannelNotSupported(c))
            }
            Err(e) => Err(ProcessError::ChannelDispatchFailed(e.to_string())),
        }
    }
}

fn register_direct_tools(reg: &mut ToolRegistry) {
    use sven_tools::{
        DeleteFileTool, EditFileTool, GrepTool, ListDirTool, ReadFileTool, RunTerminalCommandTool,
        WriteTool,
    };
    reg.register(ReadFileTool);
    reg.register(ListDirTool);
    reg.register(GrepTool);
    reg.register(WriteTool);
    reg.register(EditFileTool);
    reg.register(DeleteFileTool);
    reg.register(RunTerminalCommandTool::default());
}

/// Drain agent events into wire `TurnEvent`s until `TurnComplete`/`Aborted`,
/// returning the final reply text and the last step number reached (so the
/// caller's `Completed` event uses a step no earlier event already claimed).
async fn bridge_agent_events(
    rx: &mut mpsc::Receiver<AgentEvent>,
    tx: mpsc::Sender<TurnEvent>,
    mut step: u32,
) -> (String, u32) {
    let mut reply = String::new();
    while let Some(ev) = rx.recv().await {
        match ev {
            AgentEvent::TextDelta(delta) => {
                let _ = tx.send(TurnEvent::AssistantDelta { step, delta }).await;
            }
            AgentEvent::TextComplete(text) => {
                reply = text;
            }
            AgentEvent::ToolCallStarted(tc) => {
                step += 1;
                let _ = tx.send(TurnEvent::StepStarted { step }).await;
                let _ = tx
                    .send(TurnEvent::ToolCall {
                        step,
                        tool_call: WireToolCall {
                            name: tc.name.clone(),
                            input: tc.args.clone(),
                        },
                    })
                    .await;
            }
            AgentEvent::ToolCallFinished {
                tool_name,
                output,
                is_error,
                ..
            } => {
                let _ = tx
                    .send(TurnEvent::ToolResult {
                        step,
                        tool_result: WireToolResult {
                            name: tool_name,
                            ok: !is_error,
                            output,
                            summary: None,
                        },
                    })
                    .await;
            }
            AgentEvent::Aborted { partial_text } => {
                reply = partial_text;
                break;
            }
            AgentEvent::Error(msg) => {
                let _ = tx
                    .send(TurnEvent::Error {
                        meta: ErrorMeta {
                            code: "provider_request_failed".to_string(),
                            message: msg,
                            details: None,
                        },
                    })
                    .await;
            }
            AgentEvent::TurnComplete => break,
            _ => {}
        }
    }
    (reply, step)
}

fn latest_user_text(input: &[RuntimeMessage]) -> Option<String> {
    let last = input.iter().rev().find(|m| m.role == MessageRole::User)?;
    let text: String = last
        .content
        .iter()
        .filter_map(|v| v.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn runtime_to_model_message(m: &RuntimeMessage) -> sven_model::Message {
    let text: String = m
        .content
        .iter()
        .filter_map(|v| v.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    match m.role {
        MessageRole::User => sven_model::Message::user(text),
        MessageRole::Assistant => sven_model::Message::assistant(text),
        MessageRole::System => sven_model::Message::system(text),
        MessageRole::Tool => sven_model::Message::tool_result(&m.id, text),
    }
}

fn plan_err_to_process(e: sven_core::PlanError) -> ProcessError {
    ProcessError::Plan(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sven_config::{Config, ModelConfig};
    use sven_core::plan::PlanModeState;

    fn mock_config() -> Config {
        Config {
            model: ModelConfig {
                provider: "mock".to_string(),
                name: "mock-model".to_string(),
                ..ModelConfig::default()
            },
            ..Config::default()
        }
    }

    async fn test_orchestrator() -> (Arc<Orchestrator>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::load(dir.path().join("state.json")).await.unwrap());
        let channels = Arc::new(ChannelRegistry::with_builtins());
        let orch = Orchestrator::new(store, channels, Arc::new(mock_config()));
        (orch, dir)
    }

    fn user_turn(text: &str, session_id: &str) -> AgentProcessRequest {
        AgentProcessRequest {
            input: vec![RuntimeMessage {
                id: Uuid::new_v4().to_string(),
                role: MessageRole::User,
                kind: "message".to_string(),
                content: vec![serde_json::json!({"type": "text", "text": text})],
                metadata: serde_json::json!({}),
            }],
            session_id: session_id.to_string(),
            user_id: "test-user".to_string(),
            channel: "console".to_string(),
            stream: false,
            biz_params: crate::control::protocol::BizParams::default(),
        }
    }

    async fn drain(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn process_runs_a_turn_and_returns_the_mock_reply() {
        let (orch, _dir) = test_orchestrator().await;
        let events = drain(orch.process(user_turn("hi there", "s1"))).await;
        let reply = events.iter().find_map(|e| match e {
            TurnEvent::Completed { reply, .. } => Some(reply.clone()),
            _ => None,
        });
        assert_eq!(reply.as_deref(), Some("MOCK: hi there"));
    }

    #[tokio::test]
    async fn process_emits_step_started_before_completed() {
        let (orch, _dir) = test_orchestrator().await;
        let events = drain(orch.process(user_turn("order check", "s2"))).await;
        let step_started_idx = events
            .iter()
            .position(|e| matches!(e, TurnEvent::StepStarted { .. }));
        let completed_idx = events
            .iter()
            .position(|e| matches!(e, TurnEvent::Completed { .. }));
        assert!(step_started_idx.is_some() && completed_idx.is_some());
        assert!(step_started_idx.unwrap() < completed_idx.unwrap());
    }

    #[tokio::test]
    async fn repeated_turns_in_the_same_session_reuse_one_chat() {
        let (orch, _dir) = test_orchestrator().await;
        drain(orch.process(user_turn("first", "s3"))).await;
        drain(orch.process(user_turn("second", "s3"))).await;
        let chat_count = orch.store().read(|s| s.chats.len()).await;
        assert_eq!(chat_count, 1);
        let history_len = orch
            .store()
            .read(|s| s.histories.values().next().map(|h| h.len()).unwrap_or(0))
            .await;
        assert_eq!(history_len, 4); // two user + two assistant messages
    }

    #[tokio::test]
    async fn plan_on_slash_command_moves_chat_into_planning_intake() {
        let (orch, _dir) = test_orchestrator().await;
        drain(orch.process(user_turn("/plan on", "s4"))).await;
        let chat_id = orch
            .store()
            .read(|s| s.chats.values().next().map(|c| c.id.clone()))
            .await
            .unwrap();
        let snapshot = orch.plan_snapshot(&chat_id).await.unwrap();
        assert_eq!(snapshot.state, PlanModeState::PlanningIntake);
    }

    #[tokio::test]
    async fn apply_plan_action_toggle_off_without_confirm_is_rejected() {
        let (orch, _dir) = test_orchestrator().await;
        drain(orch.process(user_turn("/plan on", "s5"))).await;
        let chat_id = orch
            .store()
            .read(|s| s.chats.values().next().map(|c| c.id.clone()))
            .await
            .unwrap();
        let result = orch
            .apply_plan_action(&chat_id, PlanAction::ToggleOff { confirm: false })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_cron_turn_returns_the_assistant_reply() {
        let (orch, _dir) = test_orchestrator().await;
        let reply = orch.run_cron_turn("console", "daily digest").await.unwrap();
        assert_eq!(reply, "MOCK: daily digest");
    }

    #[tokio::test]
    async fn clear_slash_command_drops_prior_history_without_a_model_call() {
        let (orch, _dir) = test_orchestrator().await;
        drain(orch.process(user_turn("hello", "s6"))).await;
        drain(orch.process(user_turn("/clear", "s6"))).await;
        // try_intercept wipes histories, then run_turn still persists the
        // "/clear" message itself plus its canned reply — so two entries
        // remain, not the four that two real model turns would leave.
        let history_len = orch
            .store()
            .read(|s| s.histories.values().next().map(|h| h.len()).unwrap_or(0))
            .await;
        assert_eq!(history_len, 2);
    }
}
