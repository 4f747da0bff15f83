// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Constructs a `sven_core::Agent` for a single `/agent/process` call.
//!
//! Unlike the interactive CLI/TUI, the gateway has no long-lived process to
//! anchor a per-user agent to: each HTTP request is independent, and the
//! conversation's true state of record is [`sven_store::Store`], not an
//! in-memory `Agent`. So this builder produces a fresh `Agent` per call,
//! seeded from persisted history, rather than caching one per session.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use sven_config::{AgentConfig, AgentMode};
use sven_core::{Agent, AgentRuntimeContext};
use sven_tools::{
    DeleteFileTool, EditFileTool, FindFileTool, GrepTool, ListDirTool, ReadFileTool, ReadImageTool,
    ReadLintsTool, RunTerminalCommandTool, SearchCodebaseTool, ShellTool, SwitchModeTool, TodoItem,
    TodoWriteTool, ToolEvent, ToolRegistry, UpdateMemoryTool, WebFetchTool, WebSearchTool,
    WriteTool,
};

/// Build the tool-registry-backed `Agent` for one turn.
///
/// `timeout_secs` bounds `RunTerminalCommandTool`/`ShellTool`; `web_search_key`
/// is forwarded as-is (an empty key just disables results, matching
/// `WebSearchTool`'s own behaviour).
pub fn build_turn_agent(
    model: Arc<dyn sven_model::ModelProvider>,
    agent_config: Arc<AgentConfig>,
    mode: AgentMode,
    runtime: AgentRuntimeContext,
    memory_file: Option<String>,
    web_search_key: Option<String>,
    command_timeout_secs: u64,
) -> Agent {
    let max_ctx = model.catalog_context_window().unwrap_or(128_000) as usize;
    let mode_lock = Arc::new(Mutex::new(mode));
    let (tool_tx, tool_rx) = mpsc::channel::<ToolEvent>(64);
    let todos: Arc<Mutex<Vec<TodoItem>>> = Arc::new(Mutex::new(Vec::new()));

    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool);
    registry.register(ReadImageTool);
    registry.register(ListDirTool);
    registry.register(FindFileTool);
    registry.register(GrepTool);
    registry.register(SearchCodebaseTool);
    registry.register(WebFetchTool);
    registry.register(WebSearchTool {
        api_key: web_search_key,
    });
    registry.register(ReadLintsTool);
    registry.register(UpdateMemoryTool { memory_file });
    registry.register(TodoWriteTool::new(todos, tool_tx.clone()));
    registry.register(SwitchModeTool::new(mode_lock.clone(), tool_tx));
    registry.register(WriteTool);
    registry.register(EditFileTool);
    registry.register(DeleteFileTool);
    registry.register(RunTerminalCommandTool {
        timeout_secs: command_timeout_secs,
    });
    registry.register(ShellTool {
        timeout_secs: command_timeout_secs,
    });

    Agent::new(
        model,
        Arc::new(registry),
        agent_config,
        runtime,
        mode_lock,
        tool_rx,
        max_ctx,
    )
}
