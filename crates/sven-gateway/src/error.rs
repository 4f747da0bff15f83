// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Central error mapping: every failure surfaced by the HTTP layer carries a
//! stable string code and an HTTP status, per the error kinds table.

use axum::http::StatusCode;
use thiserror::Error;

use crate::control::protocol::{ErrorEnvelope, ErrorMeta};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid request body")]
    InvalidJson,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid cron task type")]
    InvalidCronTaskType,
    #[error("invalid plan spec: {0}")]
    InvalidPlanSpec(String),
    #[error("invalid env key: {0}")]
    InvalidEnvKey(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid provider config: {0}")]
    InvalidProviderConfig(String),
    #[error("invalid model slot: {0}")]
    InvalidModelSlot(String),
    #[error("job id mismatch: expected {expected}, got {actual}")]
    JobIdMismatch { expected: String, actual: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("provider not found: {0}")]
    ProviderNotFound(String),
    #[error("default cron job cannot be paused, resumed, or deleted")]
    DefaultCronProtected,
    #[error("job {0} already has the maximum number of runs in flight")]
    CronBusy(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),
    #[error("provider not supported: {0}")]
    ProviderNotSupported(String),
    #[error("provider disabled: {0}")]
    ProviderDisabled(String),
    #[error("provider request failed: {0}")]
    ProviderRequestFailed(String),
    #[error("provider returned an invalid reply: {0}")]
    ProviderInvalidReply(String),
    #[error("tool disabled: {0}")]
    ToolDisabled(String),
    #[error("tool not supported: {0}")]
    ToolNotSupported(String),
    #[error("tool invocation failed: {0}")]
    ToolInvokeFailed(String),
    #[error("tool returned an invalid result: {0}")]
    ToolInvalidResult(String),
    #[error("tool permission denied: {0}")]
    ToolPermissionDenied(String),
    #[error("tool runtime unavailable: {0}")]
    ToolRuntimeUnavailable(String),
    #[error("invalid tool input: {0}")]
    InvalidToolInput(String),
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
    #[error("channel not supported: {0}")]
    ChannelNotSupported(String),
    #[error("channel disabled: {0}")]
    ChannelDisabled(String),
    #[error("channel dispatch failed: {0}")]
    ChannelDispatchFailed(String),
    #[error("plan mode is disabled")]
    PlanModeDisabled,
    #[error("plan spec missing")]
    PlanSpecMissing,
    #[error("plan prompt unconfigured")]
    PlanPromptUnconfigured,
    #[error("ai tool guide unavailable: {0}")]
    AiToolGuideUnavailable(String),
    #[error("streaming not supported for this request")]
    StreamNotSupported,
    #[error("feature disabled: {0}")]
    FeatureDisabled(String),
    #[error(transparent)]
    Store(#[from] sven_store::StoreError),
    #[error(transparent)]
    Scheduler(#[from] sven_scheduler::SchedulerError),
    #[error(transparent)]
    Plan(#[from] sven_core::PlanError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidCronTaskType => "invalid_cron_task_type",
            Self::InvalidPlanSpec(_) => "invalid_plan_spec",
            Self::InvalidEnvKey(_) => "invalid_env_key",
            Self::InvalidPath(_) => "invalid_path",
            Self::InvalidProviderConfig(_) => "invalid_provider_config",
            Self::InvalidModelSlot(_) => "invalid_model_slot",
            Self::JobIdMismatch { .. } => "job_id_mismatch",
            Self::NotFound(_) => "not_found",
            Self::ProviderNotFound(_) => "provider_not_found",
            Self::DefaultCronProtected => "default_cron_protected",
            Self::CronBusy(_) => "cron_busy",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::ProviderNotConfigured(_) => "provider_not_configured",
            Self::ProviderNotSupported(_) => "provider_not_supported",
            Self::ProviderDisabled(_) => "provider_disabled",
            Self::ProviderRequestFailed(_) => "provider_request_failed",
            Self::ProviderInvalidReply(_) => "provider_invalid_reply",
            Self::ToolDisabled(_) => "tool_disabled",
            Self::ToolNotSupported(_) => "tool_not_supported",
            Self::ToolInvokeFailed(_) => "tool_invoke_failed",
            Self::ToolInvalidResult(_) => "tool_invalid_result",
            Self::ToolPermissionDenied(_) => "tool_permission_denied",
            Self::ToolRuntimeUnavailable(_) => "tool_runtime_unavailable",
            Self::InvalidToolInput(_) => "invalid_tool_input",
            Self::InvalidChannel(_) => "invalid_channel",
            Self::ChannelNotSupported(_) => "channel_not_supported",
            Self::ChannelDisabled(_) => "channel_disabled",
            Self::ChannelDispatchFailed(_) => "channel_dispatch_failed",
            Self::PlanModeDisabled => "plan_mode_disabled",
            Self::PlanSpecMissing => "plan_spec_missing",
            Self::PlanPromptUnconfigured => "plan_prompt_unconfigured",
            Self::AiToolGuideUnavailable(_) => "ai_tool_guide_unavailable",
            Self::StreamNotSupported => "stream_not_supported",
            Self::FeatureDisabled(_) => "feature_disabled",
            Self::Store(_) => "store_error",
            Self::Scheduler(_) => "store_error",
            Self::Plan(inner) => plan_error_code(inner),
            Self::Other(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidJson
            | Self::InvalidRequest(_)
            | Self::InvalidCronTaskType
            | Self::InvalidPlanSpec(_)
            | Self::InvalidEnvKey(_)
            | Self::InvalidPath(_)
            | Self::InvalidProviderConfig(_)
            | Self::InvalidModelSlot(_)
            | Self::JobIdMismatch { .. }
            | Self::DefaultCronProtected
            | Self::ProviderNotConfigured(_)
            | Self::ProviderNotSupported(_)
            | Self::ToolNotSupported(_)
            | Self::InvalidToolInput(_)
            | Self::InvalidChannel(_)
            | Self::ChannelNotSupported(_)
            | Self::PlanSpecMissing
            | Self::PlanPromptUnconfigured => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            Self::CronBusy(_) => StatusCode::CONFLICT,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::ToolDisabled(_)
            | Self::ChannelDisabled(_)
            | Self::ProviderDisabled(_)
            | Self::ToolPermissionDenied(_)
            | Self::PlanModeDisabled
            | Self::FeatureDisabled(_) => StatusCode::FORBIDDEN,
            Self::ProviderRequestFailed(_)
            | Self::ProviderInvalidReply(_)
            | Self::ChannelDispatchFailed(_)
            | Self::ToolRuntimeUnavailable(_)
            | Self::AiToolGuideUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::ToolInvokeFailed(_) | Self::ToolInvalidResult(_) => StatusCode::BAD_REQUEST,
            Self::StreamNotSupported => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Scheduler(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Plan(inner) => plan_error_status(inner),
        }
    }

    pub fn into_meta(&self) -> ErrorMeta {
        ErrorMeta {
            code: self.code().to_string(),
            message: self.to_string(),
            details: None,
        }
    }
}

/// `sven_core::PlanError` carries its own sentinels; map each to the code the
/// distilled catalogue names rather than collapsing them all to one.
fn plan_error_code(err: &sven_core::PlanError) -> &'static str {
    match err {
        sven_core::PlanError::Disabled => "plan_mode_disabled",
        sven_core::PlanError::ToggleConfirmRequired => "plan_toggle_confirmation_required",
        sven_core::PlanError::SpecInvalid => "invalid_plan_spec",
        sven_core::PlanError::SpecMissing => "plan_spec_missing",
        sven_core::PlanError::PromptUnconfigured => "plan_prompt_unconfigured",
        sven_core::PlanError::InvalidTransition { .. } => "plan_state_invalid",
    }
}

fn plan_error_status(err: &sven_core::PlanError) -> StatusCode {
    match err {
        sven_core::PlanError::Disabled | sven_core::PlanError::PromptUnconfigured => {
            StatusCode::FORBIDDEN
        }
        sven_core::PlanError::ToggleConfirmRequired => StatusCode::CONFLICT,
        sven_core::PlanError::SpecInvalid
        | sven_core::PlanError::SpecMissing
        | sven_core::PlanError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
    }
}

impl axum::response::IntoResponse for ProcessError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = ErrorEnvelope {
            error: self.into_meta(),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cron_protected_maps_to_400() {
        assert_eq!(
            ProcessError::DefaultCronProtected.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn cron_busy_maps_to_409() {
        assert_eq!(
            ProcessError::CronBusy("x".into()).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn provider_request_failed_maps_to_502() {
        assert_eq!(
            ProcessError::ProviderRequestFailed("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn tool_disabled_maps_to_403() {
        assert_eq!(
            ProcessError::ToolDisabled("shell".into()).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn provider_not_found_maps_to_404() {
        assert_eq!(
            ProcessError::ProviderNotFound("openai".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProcessError::ProviderNotFound("openai".into()).code(),
            "provider_not_found"
        );
    }

    #[test]
    fn plan_toggle_confirm_required_maps_to_409_with_its_own_code() {
        let err = ProcessError::Plan(sven_core::PlanError::ToggleConfirmRequired);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "plan_toggle_confirmation_required");
    }

    #[test]
    fn plan_disabled_maps_to_403_not_the_generic_plan_code() {
        let err = ProcessError::Plan(sven_core::PlanError::Disabled);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "plan_mode_disabled");
    }

    #[test]
    fn job_id_mismatch_maps_to_400() {
        let err = ProcessError::JobIdMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "job_id_mismatch");
    }
}
