// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Entities persisted by the [`crate::Store`]. Mirrors the data model: a
//! chat owns a session and is addressed by `(session_id, user_id, channel)`;
//! cron jobs and their mutable run state are tracked separately so that spec
//! edits never clobber `last_run_at`/`last_status`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Vec<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSetting {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub model_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub store: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Interval,
    Cron,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronSchedule {
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronTaskType {
    Text,
    Workflow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronRuntime {
    #[serde(default)]
    pub max_concurrency: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub misfire_grace_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronWorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronWorkflowEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronWorkflowSpec {
    #[serde(default = "default_workflow_version")]
    pub version: String,
    pub nodes: Vec<CronWorkflowNode>,
    pub edges: Vec<CronWorkflowEdge>,
    #[serde(default)]
    pub viewport: serde_json::Value,
}

fn default_workflow_version() -> String {
    "v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobSpec {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub task_type: CronTaskType,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub workflow: Option<CronWorkflowSpec>,
    pub dispatch: String,
    #[serde(default)]
    pub runtime: CronRuntime,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronJobState {
    #[serde(default)]
    pub next_run_at: Option<String>,
    #[serde(default)]
    pub last_run_at: Option<String>,
    #[serde(default)]
    pub last_status: RunStatus,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub last_execution: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub chats: BTreeMap<String, Chat>,
    #[serde(default)]
    pub histories: BTreeMap<String, Vec<RuntimeMessage>>,
    #[serde(default)]
    pub cron_jobs: BTreeMap<String, CronJobSpec>,
    #[serde(default)]
    pub cron_states: BTreeMap<String, CronJobState>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSetting>,
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
    #[serde(default)]
    pub skills: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub channels: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub active_llm: Option<String>,
    #[serde(default)]
    pub plans: BTreeMap<String, serde_json::Value>,
}
