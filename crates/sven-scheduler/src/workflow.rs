// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Workflow DAG validation, planning, and node-handler registry.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sven_store::model::{CronWorkflowNode, CronWorkflowSpec};

use crate::error::SchedulerError;

/// Context passed to every node handler: job identity plus whatever the
/// upstream node produced (e.g. the text_event node's rendered message).
pub struct NodeContext<'a> {
    pub job_id: &'a str,
    pub node: &'a CronWorkflowNode,
    pub upstream_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NodeResult {
    /// When true, downstream nodes in this branch are not executed (used by
    /// `if_event` when its condition does not hold).
    pub stop: bool,
    /// Text this node produced, available to its direct successors as
    /// `NodeContext::upstream_text`.
    pub output_text: Option<String>,
}

impl NodeResult {
    pub fn pass(output_text: impl Into<String>) -> Self {
        Self {
            stop: false,
            output_text: Some(output_text.into()),
        }
    }
    pub fn stop() -> Self {
        Self {
            stop: true,
            output_text: None,
        }
    }
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn node_type(&self) -> &'static str;
    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeResult, SchedulerError>;
}

/// `start`: the workflow's single entry point. Always passes through.
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    fn node_type(&self) -> &'static str {
        "start"
    }
    async fn execute(&self, _ctx: NodeContext<'_>) -> Result<NodeResult, SchedulerError> {
        Ok(NodeResult::pass(""))
    }
}

/// `text_event`: renders a fixed message, read from `node.config.text`.
pub struct TextEventHandler;

#[async_trait]
impl NodeHandler for TextEventHandler {
    fn node_type(&self) -> &'static str {
        "text_event"
    }
    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeResult, SchedulerError> {
        let text = ctx
            .node
            .config
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(NodeResult::pass(text))
    }
}

/// `delay`: pauses the run for `node.config.seconds` before passing through.
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    fn node_type(&self) -> &'static str {
        "delay"
    }
    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeResult, SchedulerError> {
        let secs = ctx
            .node
            .config
            .get("seconds")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if secs > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
        }
        Ok(NodeResult::pass(ctx.upstream_text.unwrap_or_default()))
    }
}

/// `if_event`: stops the branch unless `upstream_text` contains
/// `node.config.contains`.
pub struct IfEventHandler;

#[async_trait]
impl NodeHandler for IfEventHandler {
    fn node_type(&self) -> &'static str {
        "if_event"
    }
    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeResult, SchedulerError> {
        let needle = ctx
            .node
            .config
            .get("contains")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let haystack = ctx.upstream_text.clone().unwrap_or_default();
        if needle.is_empty() || haystack.contains(needle) {
            Ok(NodeResult::pass(haystack))
        } else {
            Ok(NodeResult::stop())
        }
    }
}

/// Registry of node handlers, keyed by `node_type()`. Additional handlers
/// may be registered before a plan is built; unknown types are rejected at
/// plan-build time, not at execution time, so a bad workflow spec fails the
/// moment it is saved.
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn with_builtins() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        reg.register(StartHandler);
        reg.register(TextEventHandler);
        reg.register(DelayHandler);
        reg.register(IfEventHandler);
        reg
    }

    pub fn register(&mut self, handler: impl NodeHandler + 'static) {
        self.handlers
            .insert(handler.node_type().to_string(), Arc::new(handler));
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }
}

/// A validated, topologically ordered execution plan.
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    /// Node ids in an order such that every node appears after all of its
    /// upstream dependencies.
    pub order: Vec<String>,
    pub nodes_by_id: HashMap<String, CronWorkflowNode>,
    /// direct successors of each node id
    pub successors: HashMap<String, Vec<String>>,
    pub predecessors: HashMap<String, Vec<String>>,
}

/// Validate the DAG shape and build an executable plan.
///
/// Checks (in this order): exactly one `start` node, every edge endpoint
/// refers to a declared node, no cycle in the reachable subgraph, every node
/// type is known to `registry`.
pub fn build_workflow_plan(
    spec: &CronWorkflowSpec,
    registry: &NodeRegistry,
) -> Result<WorkflowPlan, SchedulerError> {
    let start_nodes: Vec<&CronWorkflowNode> =
        spec.nodes.iter().filter(|n| n.kind == "start").collect();
    if start_nodes.len() != 1 {
        return Err(SchedulerError::NotExactlyOneStart(start_nodes.len()));
    }

    let nodes_by_id: HashMap<String, CronWorkflowNode> = spec
        .nodes
        .iter()
        .map(|n| (n.id.clone(), n.clone()))
        .collect();

    let mut successors: HashMap<String, Vec<String>> = HashMap::new();
    let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
    for edge in &spec.edges {
        if !nodes_by_id.contains_key(&edge.from) {
            return Err(SchedulerError::DanglingEdge(edge.from.clone()));
        }
        if !nodes_by_id.contains_key(&edge.to) {
            return Err(SchedulerError::DanglingEdge(edge.to.clone()));
        }
        successors
            .entry(edge.from.clone())
            .or_default()
            .push(edge.to.clone());
        predecessors
            .entry(edge.to.clone())
            .or_default()
            .push(edge.from.clone());
    }

    for node in &spec.nodes {
        if registry.get(&node.kind).is_none() {
            return Err(SchedulerError::UnknownNodeType(node.kind.clone()));
        }
    }

    // Kahn's algorithm over the reachable subgraph from `start`.
    let start_id = start_nodes[0].id.clone();
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut reachable: HashSet<String> = HashSet::new();
    let mut frontier = VecDeque::new();
    frontier.push_back(start_id.clone());
    reachable.insert(start_id.clone());
    while let Some(id) = frontier.pop_front() {
        for succ in successors.get(&id).cloned().unwrap_or_default() {
            if reachable.insert(succ.clone()) {
                frontier.push_back(succ);
            }
        }
    }
    for id in &reachable {
        let count = predecessors
            .get(id)
            .map(|preds| preds.iter().filter(|p| reachable.contains(*p)).count())
            .unwrap_or(0);
        in_degree.insert(id.clone(), count);
    }

    let mut order = Vec::new();
    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut remaining = in_degree.clone();
    while let Some(id) = queue.pop_front() {
        order.push(id.clone());
        for succ in successors.get(&id).cloned().unwrap_or_default() {
            if let Some(d) = remaining.get_mut(&succ) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    if order.len() != reachable.len() {
        return Err(SchedulerError::Cycle);
    }

    Ok(WorkflowPlan {
        order,
        nodes_by_id,
        successors,
        predecessors,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub node_id: String,
    pub node_type: String,
    pub status: NodeRunStatus,
    pub continue_on_error: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub had_failures: bool,
    pub executions: Vec<NodeExecution>,
}

/// Execute every node in `plan.order`, skipping a node once any of its
/// upstream dependencies failed (unless that upstream had
/// `continue_on_error`, in which case the failure does not propagate).
pub async fn execute_workflow(
    job_id: &str,
    plan: &WorkflowPlan,
    registry: &NodeRegistry,
) -> WorkflowRunResult {
    let mut executions = Vec::new();
    let mut outputs: HashMap<String, Option<String>> = HashMap::new();
    let mut blocked: HashSet<String> = HashSet::new();
    let mut had_failures = false;

    for node_id in &plan.order {
        let node = &plan.nodes_by_id[node_id];

        if blocked.contains(node_id) {
            executions.push(NodeExecution {
                node_id: node_id.clone(),
                node_type: node.kind.clone(),
                status: NodeRunStatus::Skipped,
                continue_on_error: node.continue_on_error,
                started_at: Utc::now(),
                finished_at: Utc::now(),
                error: Some("upstream node failed".to_string()),
            });
            propagate_block(node_id, plan, &mut blocked);
            continue;
        }

        let upstream_text = plan
            .predecessors
            .get(node_id)
            .and_then(|preds| preds.first())
            .and_then(|p| outputs.get(p).cloned())
            .flatten();

        let handler = registry.get(&node.kind);
        let started_at = Utc::now();
        let (status, error, output_text, stop) = match handler {
            None => (
                NodeRunStatus::Failed,
                Some(format!("no handler registered for {}", node.kind)),
                None,
                true,
            ),
            Some(h) => {
                match h
                    .execute(NodeContext {
                        job_id,
                        node,
                        upstream_text,
                    })
                    .await
                {
                    Ok(result) => (NodeRunStatus::Succeeded, None, result.output_text, result.stop),
                    Err(e) => (NodeRunStatus::Failed, Some(e.to_string()), None, true),
                }
            }
        };
        let finished_at = Utc::now();

        if status == NodeRunStatus::Failed {
            had_failures = true;
            if !node.continue_on_error {
                propagate_block(node_id, plan, &mut blocked);
            }
        } else if stop {
            propagate_block(node_id, plan, &mut blocked);
        }

        outputs.insert(node_id.clone(), output_text);
        executions.push(NodeExecution {
            node_id: node_id.clone(),
            node_type: node.kind.clone(),
            status,
            continue_on_error: node.continue_on_error,
            started_at,
            finished_at,
            error,
        });
    }

    WorkflowRunResult {
        had_failures,
        executions,
    }
}

fn propagate_block(node_id: &str, plan: &WorkflowPlan, blocked: &mut HashSet<String>) {
    if let Some(succs) = plan.successors.get(node_id) {
        for s in succs {
            blocked.insert(s.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sven_store::model::CronWorkflowEdge;

    fn node(id: &str, kind: &str, config: serde_json::Value) -> CronWorkflowNode {
        CronWorkflowNode {
            id: id.to_string(),
            kind: kind.to_string(),
            config,
            continue_on_error: false,
        }
    }

    fn edge(from: &str, to: &str) -> CronWorkflowEdge {
        CronWorkflowEdge {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn requires_exactly_one_start_node() {
        let spec = CronWorkflowSpec {
            version: "v1".into(),
            nodes: vec![],
            edges: vec![],
            viewport: serde_json::Value::Null,
        };
        let reg = NodeRegistry::with_builtins();
        assert!(matches!(
            build_workflow_plan(&spec, &reg),
            Err(SchedulerError::NotExactlyOneStart(0))
        ));
    }

    #[test]
    fn dangling_edge_rejected() {
        let spec = CronWorkflowSpec {
            version: "v1".into(),
            nodes: vec![node("s", "start", serde_json::json!({}))],
            edges: vec![edge("s", "missing")],
            viewport: serde_json::Value::Null,
        };
        let reg = NodeRegistry::with_builtins();
        assert!(matches!(
            build_workflow_plan(&spec, &reg),
            Err(SchedulerError::DanglingEdge(_))
        ));
    }

    #[test]
    fn cycle_rejected() {
        let spec = CronWorkflowSpec {
            version: "v1".into(),
            nodes: vec![
                node("s", "start", serde_json::json!({})),
                node("a", "delay", serde_json::json!({})),
                node("b", "delay", serde_json::json!({})),
            ],
            edges: vec![edge("s", "a"), edge("a", "b"), edge("b", "a")],
            viewport: serde_json::Value::Null,
        };
        let reg = NodeRegistry::with_builtins();
        assert!(matches!(
            build_workflow_plan(&spec, &reg),
            Err(SchedulerError::Cycle)
        ));
    }

    #[test]
    fn unknown_node_type_rejected() {
        let spec = CronWorkflowSpec {
            version: "v1".into(),
            nodes: vec![
                node("s", "start", serde_json::json!({})),
                node("a", "does_not_exist", serde_json::json!({})),
            ],
            edges: vec![edge("s", "a")],
            viewport: serde_json::Value::Null,
        };
        let reg = NodeRegistry::with_builtins();
        assert!(matches!(
            build_workflow_plan(&spec, &reg),
            Err(SchedulerError::UnknownNodeType(_))
        ));
    }

    #[tokio::test]
    async fn linear_workflow_executes_in_order() {
        let spec = CronWorkflowSpec {
            version: "v1".into(),
            nodes: vec![
                node("s", "start", serde_json::json!({})),
                node("t", "text_event", serde_json::json!({"text": "hello"})),
            ],
            edges: vec![edge("s", "t")],
            viewport: serde_json::Value::Null,
        };
        let reg = NodeRegistry::with_builtins();
        let plan = build_workflow_plan(&spec, &reg).unwrap();
        let result = execute_workflow("job-1", &plan, &reg).await;
        assert!(!result.had_failures);
        assert_eq!(result.executions.len(), 2);
        assert_eq!(result.executions[1].status, NodeRunStatus::Succeeded);
    }

    #[tokio::test]
    async fn if_event_stops_branch_when_condition_false() {
        let spec = CronWorkflowSpec {
            version: "v1".into(),
            nodes: vec![
                node("s", "start", serde_json::json!({})),
                node("t", "text_event", serde_json::json!({"text": "hello"})),
                node("i", "if_event", serde_json::json!({"contains": "nope"})),
                node("t2", "text_event", serde_json::json!({"text": "unreachable"})),
            ],
            edges: vec![edge("s", "t"), edge("t", "i"), edge("i", "t2")],
            viewport: serde_json::Value::Null,
        };
        let reg = NodeRegistry::with_builtins();
        let plan = build_workflow_plan(&spec, &reg).unwrap();
        let result = execute_workflow("job-1", &plan, &reg).await;
        let t2 = result
            .executions
            .iter()
            .find(|e| e.node_id == "t2")
            .unwrap();
        assert_eq!(t2.status, NodeRunStatus::Skipped);
    }

    #[tokio::test]
    async fn continue_on_error_allows_siblings_to_run() {
        let mut failing = node("bad", "does_not_exist_but_registered", serde_json::json!({}));
        failing.continue_on_error = true;
        let mut reg = NodeRegistry::with_builtins();
        // Register a handler that always fails, to exercise continue_on_error.
        struct AlwaysFails;
        #[async_trait]
        impl NodeHandler for AlwaysFails {
            fn node_type(&self) -> &'static str {
                "does_not_exist_but_registered"
            }
            async fn execute(&self, _ctx: NodeContext<'_>) -> Result<NodeResult, SchedulerError> {
                Err(SchedulerError::Other(anyhow::anyhow!("boom")))
            }
        }
        reg.register(AlwaysFails);

        let spec = CronWorkflowSpec {
            version: "v1".into(),
            nodes: vec![
                node("s", "start", serde_json::json!({})),
                failing,
                node("t2", "text_event", serde_json::json!({"text": "ok"})),
            ],
            edges: vec![edge("s", "bad"), edge("bad", "t2")],
            viewport: serde_json::Value::Null,
        };
        let plan = build_workflow_plan(&spec, &reg).unwrap();
        let result = execute_workflow("job-1", &plan, &reg).await;
        assert!(result.had_failures);
        let t2 = result
            .executions
            .iter()
            .find(|e| e.node_id == "t2")
            .unwrap();
        assert_eq!(t2.status, NodeRunStatus::Succeeded);
    }
}
