//! Wire types for the task endpoints.
//!
//! The remote schema is unversioned and drifts between app releases, so
//! response fields are optional and validated at the call site instead of
//! letting a missing field surface as a parse error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Style;

/// Server-side job status.
///
/// The service reports both `failed` and `error` for failures; statuses it
/// starts emitting after an app update land in `Unknown`, carrying the raw
/// string for logging, and are treated as still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Unknown(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "queued" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" | "error" => JobStatus::Failed,
            _ => JobStatus::Unknown(raw),
        })
    }
}

/// Processing feature requested for a task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Feature {
    #[serde(rename = "enhance")]
    Enhance { models: Vec<String> },
    #[serde(rename = "stylization-v2")]
    Stylization { pipelines: Vec<Pipeline> },
}

#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    pub id: String,
}

impl Feature {
    pub fn enhance() -> Self {
        Feature::Enhance { models: vec![] }
    }

    pub fn stylization(style: &Style) -> Self {
        Feature::Stylization {
            pipelines: vec![Pipeline {
                id: style.as_pipeline_id().to_string(),
            }],
        }
    }
}

/// Local image metadata sent with the task creation request.
#[derive(Debug, Clone, Serialize)]
pub struct ImageMetadata {
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Task options mirrored from the official client.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOptions {
    pub high_quality_output: bool,
    pub save_input: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            high_quality_output: false,
            save_input: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateTaskRequest {
    pub image_content_type: String,
    pub image_md5: String,
    pub feature: Feature,
    pub metadata: ImageMetadata,
    pub options: ProcessOptions,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateTaskResponse {
    pub task_id: Option<String>,
    pub upload_url: Option<String>,
    #[serde(default)]
    pub upload_headers: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReprocessRequest {
    pub feature: Feature,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReprocessResponse {
    pub task_id: Option<String>,
}

/// Status poll response.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<TaskResultBody>,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskResultBody {
    #[serde(default)]
    pub outputs: Vec<TaskOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskOutput {
    pub url: Option<String>,
}

impl TaskStatusResponse {
    /// URL of the first output, if the task produced one.
    pub fn output_url(&self) -> Option<&str> {
        self.result
            .as_ref()?
            .outputs
            .first()?
            .url
            .as_deref()
    }

    /// Remote failure reason, best effort.
    pub fn failure_reason(&self) -> String {
        self.errors
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no reason given".to_string())
    }
}

/// Reference to a completed task's downloadable output.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub output_url: String,
}
