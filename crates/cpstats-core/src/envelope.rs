use serde::Serialize;

use crate::domain::NormalizedProfile;
use crate::error::PipelineError;
use crate::trace::TraceId;

/// Boundary response returned for every lookup, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<NormalizedProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    pub trace_id: TraceId,
}

impl LookupResponse {
    pub fn success(data: NormalizedProfile, from_cache: bool, trace_id: TraceId) -> Self {
        Self {
            success: true,
            data: Some(data),
            from_cache: Some(from_cache),
            error: None,
            trace_id,
        }
    }

    pub fn failure(error: &PipelineError, trace_id: TraceId) -> Self {
        Self {
            success: false,
            data: None,
            from_cache: None,
            error: Some(ResponseError::from(error)),
            trace_id,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        self.from_cache.unwrap_or(false)
    }
}

/// Structured error payload of a failed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl From<&PipelineError> for ResponseError {
    fn from(error: &PipelineError) -> Self {
        Self {
            code: error.code().to_owned(),
            message: error.to_string(),
            retryable: error.retryable(),
            retry_after_ms: error
                .retry_after()
                .map(|delay| u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}
