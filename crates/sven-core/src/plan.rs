// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Plan-mode state machine.
//!
//! A chat can be toggled into plan mode, where the agent first produces a
//! validated [`PlanSpec`] through an intake/clarify loop before execution is
//! allowed to start. Execution itself runs in a separate, freshly seeded
//! chat so the planning conversation is never polluted by tool output.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanModeState {
    Off,
    PlanningIntake,
    PlanningClarify,
    PlanningReady,
    PlanningRevising,
    Executing,
    Done,
    Aborted,
}

impl PlanModeState {
    fn is_planning(self) -> bool {
        matches!(
            self,
            PlanModeState::PlanningIntake
                | PlanModeState::PlanningClarify
                | PlanModeState::PlanningReady
                | PlanModeState::PlanningRevising
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan mode is not enabled for this chat")]
    Disabled,
    #[error("toggling plan mode off requires confirm=true")]
    ToggleConfirmRequired,
    #[error("plan spec is missing or invalid")]
    SpecInvalid,
    #[error("no plan spec is present")]
    SpecMissing,
    #[error("clarification prompt is unconfigured")]
    PromptUnconfigured,
    #[error("invalid transition from {from:?} via {action}")]
    InvalidTransition { from: PlanModeState, action: &'static str },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub status: PlanTaskStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSpec {
    pub goal: String,
    #[serde(default)]
    pub scope_in: Vec<String>,
    #[serde(default)]
    pub scope_out: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub summary_for_execution: String,
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub updated_at: String,
}

/// Repair obvious structural issues (duplicate ids, dangling dependencies,
/// dependency cycles, multiple in-progress tasks) before validating.
///
/// Idempotent: `normalize_plan_spec(normalize_plan_spec(x)) ==
/// normalize_plan_spec(x)`.
pub fn normalize_plan_spec(mut spec: PlanSpec) -> PlanSpec {
    let mut seen_ids = HashSet::new();
    spec.tasks.retain(|t| seen_ids.insert(t.id.clone()));

    let valid_ids: HashSet<String> = spec.tasks.iter().map(|t| t.id.clone()).collect();
    for t in &mut spec.tasks {
        t.depends_on.retain(|d| valid_ids.contains(d) && d != &t.id);
    }

    break_dependency_cycles(&mut spec.tasks);

    let mut seen_in_progress = false;
    for t in &mut spec.tasks {
        if t.status == PlanTaskStatus::InProgress {
            if seen_in_progress {
                t.status = PlanTaskStatus::Pending;
            }
            seen_in_progress = true;
        }
    }

    spec
}

fn break_dependency_cycles(tasks: &mut [PlanTask]) {
    // Iteratively drop the first dependency edge found to lie on a cycle,
    // using a DFS coloring scheme, until no cycle remains. Task lists in
    // practice are small (tens of entries), so a simple repeated scan is
    // clearer than a cycle-free topological rebuild.
    loop {
        let Some((task_idx, dep)) = find_cyclic_edge(tasks) else {
            break;
        };
        tasks[task_idx].depends_on.retain(|d| d != &dep);
    }
}

fn find_cyclic_edge(tasks: &[PlanTask]) -> Option<(usize, String)> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let index_of = |id: &str| tasks.iter().position(|t| t.id == id);
    let mut color = vec![Color::White; tasks.len()];

    fn visit(
        i: usize,
        tasks: &[PlanTask],
        color: &mut [Color],
        index_of: &dyn Fn(&str) -> Option<usize>,
    ) -> Option<(usize, String)> {
        color[i] = Color::Gray;
        for dep in &tasks[i].depends_on {
            if let Some(j) = index_of(dep) {
                match color[j] {
                    Color::Gray => return Some((i, dep.clone())),
                    Color::White => {
                        if let Some(found) = visit(j, tasks, color, index_of) {
                            return Some(found);
                        }
                    }
                    Color::Black => {}
                }
            }
        }
        color[i] = Color::Black;
        None
    }

    for i in 0..tasks.len() {
        if color[i] == Color::White {
            if let Some(found) = visit(i, tasks, &mut color, &index_of) {
                return Some(found);
            }
        }
    }
    None
}

/// Structural validity check run after [`normalize_plan_spec`]. A second
/// failure after repair means the spec is rejected outright.
pub fn validate_plan_spec(spec: &PlanSpec) -> Result<(), PlanError> {
    if spec.tasks.is_empty() {
        return Err(PlanError::SpecInvalid);
    }
    let ids: HashSet<&str> = spec.tasks.iter().map(|t| t.id.as_str()).collect();
    if ids.len() != spec.tasks.len() {
        return Err(PlanError::SpecInvalid);
    }
    for t in &spec.tasks {
        for dep in &t.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(PlanError::SpecInvalid);
            }
        }
    }
    if find_cyclic_edge(&spec.tasks).is_some() {
        return Err(PlanError::SpecInvalid);
    }
    let in_progress_count = spec
        .tasks
        .iter()
        .filter(|t| t.status == PlanTaskStatus::InProgress)
        .count();
    if in_progress_count > 1 {
        return Err(PlanError::SpecInvalid);
    }
    Ok(())
}

/// Repair-then-revalidate: normalize once, validate; if still invalid, fail.
pub fn repair_and_validate(spec: PlanSpec) -> Result<PlanSpec, PlanError> {
    let repaired = normalize_plan_spec(spec);
    validate_plan_spec(&repaired)?;
    Ok(repaired)
}

/// Per-chat plan-mode bookkeeping persisted alongside the chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanModeSnapshot {
    pub state: PlanModeState,
    #[serde(default)]
    pub spec: Option<PlanSpec>,
    #[serde(default)]
    pub clarify_asked_count: u32,
    #[serde(default = "default_clarify_max")]
    pub clarify_max_count: u32,
    #[serde(default)]
    pub execution_session_id: Option<String>,
    #[serde(default)]
    pub source_prompt_version: Option<String>,
}

fn default_clarify_max() -> u32 {
    3
}

impl Default for PlanModeSnapshot {
    fn default() -> Self {
        Self {
            state: PlanModeState::Off,
            spec: None,
            clarify_asked_count: 0,
            clarify_max_count: default_clarify_max(),
            execution_session_id: None,
            source_prompt_version: None,
        }
    }
}

impl PlanModeSnapshot {
    pub fn toggle_on(&mut self) -> Result<(), PlanError> {
        self.state = PlanModeState::PlanningIntake;
        self.spec = None;
        self.clarify_asked_count = 0;
        Ok(())
    }

    pub fn toggle_off(&mut self, confirm: bool) -> Result<(), PlanError> {
        if self.state.is_planning() && !confirm {
            return Err(PlanError::ToggleConfirmRequired);
        }
        self.state = PlanModeState::Off;
        self.spec = None;
        self.execution_session_id = None;
        Ok(())
    }

    /// Compile intake/clarify answers into a candidate spec and decide
    /// whether more clarification is needed.
    ///
    /// `unresolved` is the count of ambiguous requirements the caller's
    /// intake-compilation step could not resolve from the conversation so
    /// far; it decides whether another clarifying question round is needed.
    pub fn compile(&mut self, candidate: PlanSpec, unresolved: usize) -> Result<(), PlanError> {
        if !matches!(
            self.state,
            PlanModeState::PlanningIntake | PlanModeState::PlanningClarify
        ) {
            return Err(PlanError::InvalidTransition {
                from: self.state,
                action: "compile",
            });
        }
        self.spec = Some(candidate);
        if unresolved > 0 && self.clarify_asked_count < self.clarify_max_count {
            self.state = PlanModeState::PlanningClarify;
        } else {
            let spec = self.spec.take().expect("just set");
            self.spec = Some(repair_and_validate(spec)?);
            self.state = PlanModeState::PlanningReady;
        }
        Ok(())
    }

    pub fn submit_answer(&mut self) -> Result<(), PlanError> {
        if self.state != PlanModeState::PlanningClarify {
            return Err(PlanError::InvalidTransition {
                from: self.state,
                action: "submit_answer",
            });
        }
        self.clarify_asked_count += 1;
        Ok(())
    }

    pub fn revise(&mut self) -> Result<(), PlanError> {
        if self.state != PlanModeState::PlanningReady {
            return Err(PlanError::InvalidTransition {
                from: self.state,
                action: "revise",
            });
        }
        self.state = PlanModeState::PlanningRevising;
        Ok(())
    }

    pub fn finish_revision(&mut self, candidate: PlanSpec) -> Result<(), PlanError> {
        if self.state != PlanModeState::PlanningRevising {
            return Err(PlanError::InvalidTransition {
                from: self.state,
                action: "finish_revision",
            });
        }
        self.spec = Some(repair_and_validate(candidate)?);
        self.state = PlanModeState::PlanningReady;
        Ok(())
    }

    /// Begin execution: requires a present, valid `spec`. Returns the new
    /// execution session id that the caller must seed a fresh chat with.
    pub fn execute(&mut self, new_execution_session_id: impl Into<String>) -> Result<(), PlanError> {
        if self.state != PlanModeState::PlanningReady {
            return Err(PlanError::InvalidTransition {
                from: self.state,
                action: "execute",
            });
        }
        let spec = self.spec.as_ref().ok_or(PlanError::SpecMissing)?;
        validate_plan_spec(spec)?;
        self.execution_session_id = Some(new_execution_session_id.into());
        self.state = PlanModeState::Executing;
        Ok(())
    }

    pub fn finish_execution(&mut self, succeeded: bool) {
        self.state = if succeeded {
            PlanModeState::Done
        } else {
            PlanModeState::Aborted
        };
    }
}

/// SHA-256 over the plan-mode system prompt files, recorded as
/// `source_prompt_version` so a resumed plan can detect that the prompts it
/// was compiled against have since changed.
pub fn hash_plan_prompts(files: &[(&str, &str)]) -> Result<String, PlanError> {
    if files.is_empty() || files.iter().any(|(_, content)| content.trim().is_empty()) {
        return Err(PlanError::PromptUnconfigured);
    }
    let mut hasher = Sha256::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
    }
    Ok(hex_digest(hasher))
}

fn hex_digest(hasher: Sha256) -> String {
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> PlanTask {
        PlanTask {
            id: id.to_string(),
            title: id.to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            status: PlanTaskStatus::Pending,
        }
    }

    #[test]
    fn toggle_off_without_confirm_in_planning_state_is_rejected() {
        let mut snap = PlanModeSnapshot::default();
        snap.toggle_on().unwrap();
        assert_eq!(snap.toggle_off(false), Err(PlanError::ToggleConfirmRequired));
        assert_eq!(snap.toggle_off(true), Ok(()));
        assert_eq!(snap.state, PlanModeState::Off);
    }

    #[test]
    fn compile_goes_to_clarify_when_unresolved_remain() {
        let mut snap = PlanModeSnapshot::default();
        snap.toggle_on().unwrap();
        let spec = PlanSpec {
            goal: "x".into(),
            tasks: vec![task("t1", &[])],
            ..Default::default()
        };
        snap.compile(spec, 2).unwrap();
        assert_eq!(snap.state, PlanModeState::PlanningClarify);
    }

    #[test]
    fn compile_goes_to_ready_when_resolved() {
        let mut snap = PlanModeSnapshot::default();
        snap.toggle_on().unwrap();
        let spec = PlanSpec {
            goal: "x".into(),
            tasks: vec![task("t1", &[])],
            ..Default::default()
        };
        snap.compile(spec, 0).unwrap();
        assert_eq!(snap.state, PlanModeState::PlanningReady);
        assert!(snap.spec.is_some());
    }

    #[test]
    fn clarify_caps_out_and_forces_ready() {
        let mut snap = PlanModeSnapshot::default();
        snap.clarify_max_count = 1;
        snap.toggle_on().unwrap();
        let spec = PlanSpec {
            goal: "x".into(),
            tasks: vec![task("t1", &[])],
            ..Default::default()
        };
        snap.compile(spec.clone(), 5).unwrap();
        assert_eq!(snap.state, PlanModeState::PlanningClarify);
        snap.submit_answer().unwrap();
        snap.compile(spec, 5).unwrap();
        assert_eq!(snap.state, PlanModeState::PlanningReady);
    }

    #[test]
    fn execute_without_spec_fails() {
        let mut snap = PlanModeSnapshot::default();
        snap.state = PlanModeState::PlanningReady;
        assert_eq!(snap.execute("sess-2"), Err(PlanError::SpecMissing));
    }

    #[test]
    fn execute_sets_executing_state_and_session_id() {
        let mut snap = PlanModeSnapshot::default();
        snap.state = PlanModeState::PlanningReady;
        snap.spec = Some(PlanSpec {
            goal: "x".into(),
            tasks: vec![task("t1", &[])],
            ..Default::default()
        });
        snap.execute("sess-2").unwrap();
        assert_eq!(snap.state, PlanModeState::Executing);
        assert_eq!(snap.execution_session_id.as_deref(), Some("sess-2"));
    }

    #[test]
    fn normalize_dedupes_task_ids() {
        let spec = PlanSpec {
            goal: "x".into(),
            tasks: vec![task("t1", &[]), task("t1", &[])],
            ..Default::default()
        };
        let normalized = normalize_plan_spec(spec);
        assert_eq!(normalized.tasks.len(), 1);
    }

    #[test]
    fn normalize_drops_dangling_dependency() {
        let spec = PlanSpec {
            goal: "x".into(),
            tasks: vec![task("t1", &["ghost"])],
            ..Default::default()
        };
        let normalized = normalize_plan_spec(spec);
        assert!(normalized.tasks[0].depends_on.is_empty());
    }

    #[test]
    fn normalize_breaks_cycles() {
        let spec = PlanSpec {
            goal: "x".into(),
            tasks: vec![task("a", &["b"]), task("b", &["a"])],
            ..Default::default()
        };
        let normalized = normalize_plan_spec(spec);
        assert!(find_cyclic_edge(&normalized.tasks).is_none());
    }

    #[test]
    fn normalize_keeps_only_first_in_progress_task() {
        let mut spec = PlanSpec {
            goal: "x".into(),
            tasks: vec![task("a", &[]), task("b", &[])],
            ..Default::default()
        };
        spec.tasks[0].status = PlanTaskStatus::InProgress;
        spec.tasks[1].status = PlanTaskStatus::InProgress;
        let normalized = normalize_plan_spec(spec);
        let in_progress = normalized
            .tasks
            .iter()
            .filter(|t| t.status == PlanTaskStatus::InProgress)
            .count();
        assert_eq!(in_progress, 1);
    }

    #[test]
    fn normalize_plan_spec_is_idempotent() {
        let spec = PlanSpec {
            goal: "x".into(),
            tasks: vec![task("a", &["ghost", "a"]), task("a", &[])],
            ..Default::default()
        };
        let once = normalize_plan_spec(spec);
        let twice = normalize_plan_spec(once.clone());
        assert_eq!(once.tasks.len(), twice.tasks.len());
        assert_eq!(
            once.tasks.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
            twice.tasks.iter().map(|t| t.id.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn validate_rejects_empty_task_list() {
        let spec = PlanSpec {
            goal: "x".into(),
            ..Default::default()
        };
        assert_eq!(validate_plan_spec(&spec), Err(PlanError::SpecInvalid));
    }

    #[test]
    fn hash_plan_prompts_rejects_empty_content() {
        assert_eq!(
            hash_plan_prompts(&[("a.md", "")]),
            Err(PlanError::PromptUnconfigured)
        );
    }

    #[test]
    fn hash_plan_prompts_is_deterministic() {
        let files = [("a.md", "hello"), ("b.md", "world")];
        assert_eq!(hash_plan_prompts(&files), hash_plan_prompts(&files));
    }

    #[test]
    fn hash_plan_prompts_changes_with_content() {
        let a = hash_plan_prompts(&[("a.md", "hello")]).unwrap();
        let b = hash_plan_prompts(&[("a.md", "hello!")]).unwrap();
        assert_ne!(a, b);
    }
}
