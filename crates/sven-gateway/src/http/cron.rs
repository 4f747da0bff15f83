// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `/cron/jobs` CRUD plus pause/resume/run-now. The system default job
//! (`sven_store::DEFAULT_CRON_JOB_ID`) can be listed, read, and updated, but
//! never paused, resumed, or deleted — it is what keeps the gateway ticking
//! when an operator has configured nothing else.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use sven_store::model::{CronJobSpec, CronJobState};

use crate::error::ProcessError;
use crate::http::AppState;

fn guard_not_default(job_id: &str) -> Result<(), ProcessError> {
    if job_id == sven_store::DEFAULT_CRON_JOB_ID {
        Err(ProcessError::DefaultCronProtected)
    } else {
        Ok(())
    }
}

pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (jobs, states) = state
        .orchestrator
        .store()
        .read(|s| (s.cron_jobs.clone(), s.cron_states.clone()))
        .await;
    Json(serde_json::json!({ "jobs": jobs, "states": states }))
}

pub async fn create(
    State(state): State<AppState>,
    Json(spec): Json<CronJobSpec>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let next_run_at = sven_scheduler::next_fire(&spec.schedule, Utc::now()).map(|t| t.to_rfc3339());
    let job_id = spec.id.clone();
    state
        .orchestrator
        .store()
        .write(|s| {
            s.cron_jobs.insert(job_id.clone(), spec);
            s.cron_states.entry(job_id.clone()).or_insert(CronJobState {
                next_run_at,
                ..Default::default()
            });
            Ok::<_, ProcessError>(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "created": job_id })))
}

pub async fn get(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let (job, job_state) = state
        .orchestrator
        .store()
        .read(|s| (s.cron_jobs.get(&job_id).cloned(), s.cron_states.get(&job_id).cloned()))
        .await;
    let job = job.ok_or_else(|| ProcessError::NotFound(format!("cron job {job_id}")))?;
    Ok(Json(serde_json::json!({ "job": job, "state": job_state })))
}

pub async fn update(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(spec): Json<CronJobSpec>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    state
        .orchestrator
        .store()
        .write(|s| {
            if !s.cron_jobs.contains_key(&job_id) {
                return Err(ProcessError::NotFound(format!("cron job {job_id}")));
            }
            s.cron_jobs.insert(job_id.clone(), spec);
            Ok(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "updated": job_id })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    guard_not_default(&job_id)?;
    state
        .orchestrator
        .store()
        .write(|s| {
            if s.cron_jobs.remove(&job_id).is_none() {
                return Err(ProcessError::NotFound(format!("cron job {job_id}")));
            }
            s.cron_states.remove(&job_id);
            Ok(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "deleted": job_id })))
}

pub async fn pause(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    guard_not_default(&job_id)?;
    set_paused(&state, &job_id, true).await
}

pub async fn resume(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    guard_not_default(&job_id)?;
    set_paused(&state, &job_id, false).await
}

async fn set_paused(
    state: &AppState,
    job_id: &str,
    paused: bool,
) -> Result<Json<serde_json::Value>, ProcessError> {
    state
        .orchestrator
        .store()
        .write(|s| {
            let entry = s
                .cron_states
                .get_mut(job_id)
                .ok_or_else(|| ProcessError::NotFound(format!("cron job {job_id}")))?;
            entry.paused = paused;
            Ok(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "job_id": job_id, "paused": paused })))
}

/// `POST /cron/jobs/:job_id/run`. Dispatches the job's text immediately,
/// bypassing the schedule, and reports the reply without touching
/// `next_run_at`/`last_run_at` bookkeeping (that stays the ticker's job).
pub async fn run_now(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ProcessError> {
    let job = state
        .orchestrator
        .store()
        .read(|s| s.cron_jobs.get(&job_id).cloned())
        .await
        .ok_or_else(|| ProcessError::NotFound(format!("cron job {job_id}")))?;
    let text = job
        .text
        .ok_or_else(|| ProcessError::InvalidRequest("job has no text task to run".into()))?;
    let reply = state.orchestrator.run_cron_turn(&job.dispatch, &text).await?;
    Ok(Json(serde_json::json!({ "job_id": job_id, "reply": reply })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::test_state;
    use axum::extract::State as AxState;
    use sven_store::model::{CronSchedule, CronTaskType, ScheduleKind};

    fn sample_job(id: &str) -> CronJobSpec {
        CronJobSpec {
            id: id.to_string(),
            name: "digest".to_string(),
            enabled: true,
            schedule: CronSchedule {
                kind: ScheduleKind::Interval,
                cron: "1h".to_string(),
                timezone: "UTC".to_string(),
            },
            task_type: CronTaskType::Text,
            text: Some("say hi".to_string()),
            workflow: None,
            dispatch: "console".to_string(),
            runtime: Default::default(),
            meta: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_the_job() {
        let (state, _dir) = test_state().await;
        create(AxState(state.clone()), Json(sample_job("nightly")))
            .await
            .unwrap();
        let body = get(AxState(state), Path("nightly".to_string())).await.unwrap().0;
        assert_eq!(body["job"]["name"], "digest");
    }

    #[tokio::test]
    async fn pausing_the_default_job_is_rejected() {
        let (state, _dir) = test_state().await;
        let err = pause(AxState(state), Path(sven_store::DEFAULT_CRON_JOB_ID.to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "default_cron_protected");
    }

    #[tokio::test]
    async fn deleting_the_default_job_is_rejected() {
        let (state, _dir) = test_state().await;
        let err = delete(AxState(state), Path(sven_store::DEFAULT_CRON_JOB_ID.to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "default_cron_protected");
    }

    #[tokio::test]
    async fn pause_then_resume_toggles_the_paused_flag() {
        let (state, _dir) = test_state().await;
        create(AxState(state.clone()), Json(sample_job("paused-job")))
            .await
            .unwrap();
        let body = pause(AxState(state.clone()), Path("paused-job".to_string()))
            .await
            .unwrap()
            .0;
        assert_eq!(body["paused"], true);
        let body = resume(AxState(state), Path("paused-job".to_string()))
            .await
            .unwrap()
            .0;
        assert_eq!(body["paused"], false);
    }

    #[tokio::test]
    async fn run_now_dispatches_the_job_text_through_the_mock_model() {
        let (state, _dir) = test_state().await;
        create(AxState(state.clone()), Json(sample_job("ad-hoc")))
            .await
            .unwrap();
        let body = run_now(AxState(state), Path("ad-hoc".to_string())).await.unwrap().0;
        assert_eq!(body["reply"], "MOCK: say hi");
    }
}
