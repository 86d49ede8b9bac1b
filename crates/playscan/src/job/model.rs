//! Import job record and its state vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scene::ParsedScene;

/// Lifecycle status of an import job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    PreviewReady,
    Error,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::PreviewReady => "preview_ready",
            JobStatus::Error => "error",
            JobStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "preview_ready" => Some(JobStatus::PreviewReady),
            "error" => Some(JobStatus::Error),
            "completed" => Some(JobStatus::Completed),
            _ => None,
        }
    }

    /// Statuses a run may claim. `preview_ready` and `completed` are final
    /// from the runner's point of view.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Processing | JobStatus::Error
        )
    }

    /// Non-terminal statuses that the stale sweeper looks at.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stage a running job is in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Validating,
    Downloading,
    Extracting,
    Parsing,
    Finalizing,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Validating => "validating",
            ProcessingStage::Downloading => "downloading",
            ProcessingStage::Extracting => "extracting",
            ProcessingStage::Parsing => "parsing",
            ProcessingStage::Finalizing => "finalizing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validating" => Some(ProcessingStage::Validating),
            "downloading" => Some(ProcessingStage::Downloading),
            "extracting" => Some(ProcessingStage::Extracting),
            "parsing" => Some(ProcessingStage::Parsing),
            "finalizing" => Some(ProcessingStage::Finalizing),
            _ => None,
        }
    }

    /// Percentage band `[start, end]` allocated to this stage.
    pub fn band(&self) -> (u8, u8) {
        match self {
            ProcessingStage::Validating => (0, 10),
            ProcessingStage::Downloading => (10, 30),
            ProcessingStage::Extracting => (30, 70),
            ProcessingStage::Parsing => (70, 95),
            ProcessingStage::Finalizing => (95, 100),
        }
    }

    /// Overall percentage for a position `fraction` (0.0..=1.0) inside this stage.
    pub fn percent_at(&self, fraction: f64) -> u8 {
        let (start, end) = self.band();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f64::from(end - start);
        start + (span * fraction).floor() as u8
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens with the draft once a run succeeds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Stop at `preview_ready` and wait for the user to commit.
    #[default]
    Preview,
    /// Commit the draft through the configured scene sink right away.
    Create,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Preview => "preview",
            ImportMode::Create => "create",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preview" => Some(ImportMode::Preview),
            "create" => Some(ImportMode::Create),
            _ => None,
        }
    }
}

/// One ingestion attempt as persisted in the job store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: String,
    pub owner_id: String,
    pub file_paths: Vec<String>,
    #[serde(rename = "consentToRemoteAI")]
    pub consent_to_remote_ai: bool,
    pub mode: ImportMode,
    pub status: JobStatus,
    pub processing_stage: Option<ProcessingStage>,
    pub progress_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_data: Option<ParsedScene>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// A fresh `pending` job.
    pub fn new(
        owner_id: &str,
        file_paths: Vec<String>,
        consent_to_remote_ai: bool,
        mode: ImportMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            file_paths,
            consent_to_remote_ai,
            mode,
            status: JobStatus::Pending,
            processing_stage: None,
            progress_percentage: 0,
            status_message: Some("Queued".to_string()),
            draft_data: None,
            error_message: None,
            error_kind: None,
            scene_id: None,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            last_attempt_at: None,
        }
    }

    /// The namespace prefix every file path of this job must carry.
    pub fn owner_prefix(&self) -> String {
        format!("{}/", self.owner_id)
    }
}
