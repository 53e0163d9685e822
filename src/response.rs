//! In-process response envelope mirrored by the HTTP controller layer.
//!
//! Every surface call resolves to `{success, data | error, metadata}` with a
//! request id and execution time, so the thin controller outside this crate
//! maps responses 1:1 without reshaping.

use crate::error::TargetingError;
use crate::utils;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub request_id: String,
    pub execution_time_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    pub http_status: u16,
}

#[derive(Debug)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub metadata: ResponseMeta,
}

impl<T> Envelope<T> {
    /// Run an operation and wrap its outcome, timing included.
    pub fn capture<F>(op: F) -> Self
    where
        F: FnOnce() -> Result<T, TargetingError>,
    {
        let request_id = utils::new_request_id();
        let started = Instant::now();
        let outcome = op();
        let execution_time_ms = started.elapsed().as_millis() as u64;

        let metadata = ResponseMeta {
            request_id,
            execution_time_ms,
            warnings: Vec::new(),
        };

        match outcome {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
                metadata,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(ApiError {
                    code: e.code(),
                    message: e.to_string(),
                    http_status: e.http_status(),
                }),
                metadata,
            },
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.metadata.warnings.push(warning.into());
        self
    }
}
