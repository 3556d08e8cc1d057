//! Job contract: context, result, and the handler trait.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use tessera_core::JobRequest;

/// Progress callback type for job handlers.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// Context provided to a job handler for one execution.
pub struct JobContext {
    /// The host-delivered request being processed.
    pub request: JobRequest,
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(request: JobRequest) -> Self {
        Self {
            request,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback, if one is attached.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }
}

/// Result of one job execution.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// Job completed; the payload is the host-log entry body.
    Success(JsonValue),
    /// Job failed with a stable error code and a descriptive message.
    Failed { code: String, message: String },
}

impl JobResult {
    /// The `{status: ...}` record the host writes to its job log.
    pub fn host_entry(&self) -> JsonValue {
        match self {
            JobResult::Success(payload) => payload.clone(),
            JobResult::Failed { code, message } => json!({
                "status": "error",
                "error": {"code": code, "message": message}
            }),
        }
    }

    /// The handoff: entity ids created by this job, for downstream steps.
    pub fn new_entity_ids(&self) -> Vec<String> {
        match self {
            JobResult::Success(payload) => payload["new_entity_ids"]
                .as_array()
                .map(|ids| {
                    ids.iter()
                        .filter_map(|v| v.as_str())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            JobResult::Failed { .. } => Vec::new(),
        }
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn request() -> JobRequest {
        JobRequest {
            job_id: Uuid::new_v4(),
            job_collection: "jobs".into(),
            target_entity: "chunk-1".into(),
            target_collection: "extracted".into(),
            api_base: "http://localhost:8080".into(),
            network: "testnet".into(),
            rhiza: None,
        }
    }

    #[test]
    fn test_report_progress_without_callback_is_noop() {
        let ctx = JobContext::new(request());
        ctx.report_progress(50, Some("halfway"));
    }

    #[test]
    fn test_progress_callback_invoked() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let ctx = JobContext::new(request()).with_progress_callback(move |percent, message| {
            log_clone.lock().unwrap().push((percent, message.map(String::from)));
        });

        ctx.report_progress(25, Some("starting"));
        ctx.report_progress(100, None);

        let entries = log.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (25, Some("starting".to_string())));
        assert_eq!(entries[1], (100, None));
    }

    #[test]
    fn test_host_entry_for_failure() {
        let result = JobResult::Failed {
            code: "invalid_input".into(),
            message: "chunk text too short".into(),
        };
        let entry = result.host_entry();
        assert_eq!(entry["status"], "error");
        assert_eq!(entry["error"]["code"], "invalid_input");
        assert_eq!(entry["error"]["message"], "chunk text too short");
        assert!(result.new_entity_ids().is_empty());
    }

    #[test]
    fn test_new_entity_ids_from_success() {
        let result = JobResult::Success(json!({
            "status": "done",
            "new_entity_ids": ["e1", "e2"]
        }));
        assert_eq!(result.new_entity_ids(), vec!["e1".to_string(), "e2".to_string()]);
        assert_eq!(result.host_entry()["status"], "done");
    }
}
