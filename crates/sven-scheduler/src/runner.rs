// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Background ticker that polls due jobs and dispatches them, enforcing
//! per-job `max_concurrency` with a semaphore and per-job `timeout_seconds`
//! with `tokio::time::timeout`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sven_store::model::{CronJobSpec, CronJobState, CronTaskType, RunStatus};
use sven_store::Store;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::SchedulerError;
use crate::trigger::{next_fire, within_misfire_grace};
use crate::workflow::{build_workflow_plan, execute_workflow, NodeRegistry, WorkflowRunResult};

/// Abstraction the scheduler dispatches a due job's text or workflow output
/// through. Implemented by the process embedding this crate (the gateway)
/// so that `sven-scheduler` never depends on HTTP/channel plumbing.
#[async_trait::async_trait]
pub trait TurnRunner: Send + Sync {
    /// Run one agent turn on behalf of `job_id`/`dispatch` with `text` as the
    /// user input, returning the assistant's final text.
    async fn run_turn(&self, job_id: &str, dispatch: &str, text: &str) -> anyhow::Result<String>;
}

const DEFAULT_MAX_CONCURRENCY: u32 = 1;
const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_MISFIRE_GRACE_SECONDS: u64 = 60;
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Owns one semaphore per job id so that `max_concurrency` is enforced
/// independently across jobs.
pub struct Ticker {
    store: Arc<Store>,
    registry: Arc<NodeRegistry>,
    runner: Arc<dyn TurnRunner>,
    semaphores: tokio::sync::Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Ticker {
    pub fn new(store: Arc<Store>, runner: Arc<dyn TurnRunner>) -> Self {
        Self {
            store,
            registry: Arc::new(NodeRegistry::with_builtins()),
            runner,
            semaphores: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Run the poll loop until the process shuts down. Intended to be spawned
    /// as a background `tokio` task.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick_once().await {
                error!(error = %e, "scheduler tick failed");
            }
        }
    }

    /// Evaluate every enabled, unpaused job once and dispatch the due ones.
    /// Exposed separately from `run` so tests can drive a single tick
    /// deterministically.
    pub async fn tick_once(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let due = self.collect_due_jobs(now).await?;
        for (job, state) in due {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = this.dispatch_job(&job, &state).await {
                    warn!(job = %job.id, error = %e, "cron job dispatch failed");
                }
            });
        }
        Ok(())
    }

    async fn collect_due_jobs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(CronJobSpec, CronJobState)>, SchedulerError> {
        let due = self
            .store
            .read(|snapshot| {
                let mut due = Vec::new();
                for (id, job) in snapshot.cron_jobs.iter() {
                    if !job.enabled {
                        continue;
                    }
                    let state = snapshot.cron_states.get(id).cloned().unwrap_or_default();
                    if state.paused {
                        continue;
                    }
                    let grace = job
                        .runtime
                        .misfire_grace_seconds
                        .unwrap_or(DEFAULT_MISFIRE_GRACE_SECONDS);

                    let due_at = match &state.next_run_at {
                        Some(s) => match DateTime::parse_from_rfc3339(s) {
                            Ok(t) => t.with_timezone(&Utc),
                            Err(_) => continue,
                        },
                        None => match next_fire(&job.schedule, now) {
                            Some(t) => t,
                            None => continue,
                        },
                    };

                    if due_at <= now && within_misfire_grace(due_at, now, grace) {
                        due.push((job.clone(), state));
                    }
                }
                due
            })
            .await;
        Ok(due)
    }

    async fn job_semaphore(&self, job_id: &str, max_concurrency: u32) -> Arc<Semaphore> {
        let mut map = self.semaphores.lock().await;
        map.entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(max_concurrency as usize)))
            .clone()
    }

    async fn dispatch_job(
        &self,
        job: &CronJobSpec,
        _state: &CronJobState,
    ) -> Result<(), SchedulerError> {
        let max_concurrency = job
            .runtime
            .max_concurrency
            .unwrap_or(DEFAULT_MAX_CONCURRENCY);
        let timeout_secs = job
            .runtime
            .timeout_seconds
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let sem = self.job_semaphore(&job.id, max_concurrency).await;

        let permit = match sem.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                let running = max_concurrency - sem.available_permits() as u32;
                return Err(SchedulerError::MaxConcurrencyReached {
                    job: job.id.clone(),
                    running,
                    max: max_concurrency,
                });
            }
        };

        info!(job = %job.id, "dispatching cron job");
        self.mark_running(&job.id).await?;

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.run_job_body(job),
        )
        .await;

        drop(permit);

        match result {
            Ok(Ok(())) => self.mark_finished(&job.id, RunStatus::Succeeded, None).await,
            Ok(Err(e)) => {
                self.mark_finished(&job.id, RunStatus::Failed, Some(e.to_string()))
                    .await
            }
            Err(_) => {
                self.mark_finished(
                    &job.id,
                    RunStatus::Failed,
                    Some(SchedulerError::Timeout(timeout_secs).to_string()),
                )
                .await
            }
        }
    }

    async fn run_job_body(&self, job: &CronJobSpec) -> anyhow::Result<()> {
        match job.task_type {
            CronTaskType::Text => {
                let text = job.text.clone().unwrap_or_default();
                self.runner.run_turn(&job.id, &job.dispatch, &text).await?;
                Ok(())
            }
            CronTaskType::Workflow => {
                let spec = job
                    .workflow
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("workflow job {} has no workflow spec", job.id))?;
                let plan = build_workflow_plan(&spec, &self.registry)?;
                let result: WorkflowRunResult = execute_workflow(&job.id, &plan, &self.registry).await;
                if result.had_failures {
                    anyhow::bail!("workflow {} completed with node failures", job.id);
                }
                Ok(())
            }
        }
    }

    async fn mark_running(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.store
            .write::<_, (), SchedulerError>(|state| {
                let entry = state.cron_states.entry(job_id.to_string()).or_default();
                entry.last_status = RunStatus::Running;
                Ok(())
            })
            .await
    }

    async fn mark_finished(
        &self,
        job_id: &str,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<(), SchedulerError> {
        let now = Utc::now();
        self.store
            .write::<_, (), SchedulerError>(|state| {
                let next_run_at = state
                    .cron_jobs
                    .get(job_id)
                    .and_then(|job| next_fire(&job.schedule, now))
                    .map(|t| t.to_rfc3339());
                let entry = state.cron_states.entry(job_id.to_string()).or_default();
                entry.last_status = status;
                entry.last_error = error;
                entry.last_run_at = Some(now.to_rfc3339());
                entry.next_run_at = next_run_at;
                Ok(())
            })
            .await
    }
}
