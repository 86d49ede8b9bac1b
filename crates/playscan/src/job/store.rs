//! Typed job store over the `import_jobs` table.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::db::job_repo::{self, JobRow};
use crate::db::{Database, DatabaseError};
use crate::scene::ParsedScene;

use super::model::{ImportJob, ImportMode, JobStatus, ProcessingStage};

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Fixed-width UTC timestamps so that SQL string comparison orders them.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(
    s: &str,
    job_id: &str,
    column: &'static str,
) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode {
            job_id: job_id.to_string(),
            column,
            reason: e.to_string(),
        })
}

fn decode_row(row: JobRow) -> Result<ImportJob, DatabaseError> {
    let decode_err = |column: &'static str, reason: String| DatabaseError::Decode {
        job_id: row.id.clone(),
        column,
        reason,
    };

    let file_paths: Vec<String> = serde_json::from_str(&row.file_paths)
        .map_err(|e| decode_err("file_paths", e.to_string()))?;
    let status = JobStatus::parse(&row.status)
        .ok_or_else(|| decode_err("status", format!("unknown status '{}'", row.status)))?;
    let mode = ImportMode::parse(&row.mode)
        .ok_or_else(|| decode_err("mode", format!("unknown mode '{}'", row.mode)))?;
    let processing_stage = match row.processing_stage.as_deref() {
        None => None,
        Some(s) => match ProcessingStage::parse(s) {
            Some(stage) => Some(stage),
            None => {
                log::warn!("Unknown stage '{}' on job {}, ignoring", s, row.id);
                None
            }
        },
    };
    let draft_data = row
        .draft_data
        .as_deref()
        .map(serde_json::from_str::<ParsedScene>)
        .transpose()
        .map_err(|e| decode_err("draft_data", e.to_string()))?;
    let created_at = parse_timestamp(&row.created_at, &row.id, "created_at")?;
    let updated_at = parse_timestamp(&row.updated_at, &row.id, "updated_at")?;
    let last_attempt_at = row
        .last_attempt_at
        .as_deref()
        .map(|s| parse_timestamp(s, &row.id, "last_attempt_at"))
        .transpose()?;

    Ok(ImportJob {
        id: row.id,
        owner_id: row.owner_id,
        file_paths,
        consent_to_remote_ai: row.consent_to_remote_ai,
        mode,
        status,
        processing_stage,
        progress_percentage: row.progress_percentage.min(100),
        status_message: row.status_message,
        draft_data,
        error_message: row.error_message,
        error_kind: row.error_kind,
        scene_id: row.scene_id,
        attempt_count: row.attempt_count,
        created_at,
        updated_at,
        last_attempt_at,
    })
}

fn encode_job(job: &ImportJob) -> Result<JobRow, serde_json::Error> {
    Ok(JobRow {
        id: job.id.clone(),
        owner_id: job.owner_id.clone(),
        file_paths: serde_json::to_string(&job.file_paths)?,
        consent_to_remote_ai: job.consent_to_remote_ai,
        mode: job.mode.as_str().to_string(),
        status: job.status.as_str().to_string(),
        processing_stage: job.processing_stage.map(|s| s.as_str().to_string()),
        progress_percentage: job.progress_percentage,
        status_message: job.status_message.clone(),
        draft_data: job.draft_data.as_ref().map(serde_json::to_string).transpose()?,
        error_message: job.error_message.clone(),
        error_kind: job.error_kind.clone(),
        scene_id: job.scene_id.clone(),
        attempt_count: job.attempt_count,
        created_at: format_timestamp(job.created_at),
        updated_at: format_timestamp(job.updated_at),
        last_attempt_at: job.last_attempt_at.map(format_timestamp),
    })
}

fn encode_draft(id: &str, draft: &ParsedScene) -> Result<String, DatabaseError> {
    serde_json::to_string(draft).map_err(|e| DatabaseError::Decode {
        job_id: id.to_string(),
        column: "draft_data",
        reason: e.to_string(),
    })
}

// ─── Lease ──────────────────────────────────────────────────────────────────

/// A run's claim on a job. Writes made through a superseded lease are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLease {
    pub attempt: u32,
}

/// How a run wants to claim its job.
#[derive(Debug, Clone)]
pub enum ClaimMode {
    /// Claim whatever runnable state the job is in.
    Any,
    /// Claim only if `updated_at` still equals the value the caller observed.
    IfUnchangedSince(DateTime<Utc>),
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Persistent store for import jobs.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn create(&self, job: &ImportJob) -> Result<(), DatabaseError> {
        let row = encode_job(job).map_err(|e| DatabaseError::Decode {
            job_id: job.id.clone(),
            column: "draft_data",
            reason: e.to_string(),
        })?;
        job_repo::insert(&self.db, &row)
    }

    pub fn get(&self, id: &str) -> Result<Option<ImportJob>, DatabaseError> {
        job_repo::find_by_id(&self.db, id)?.map(decode_row).transpose()
    }

    pub fn list_for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<ImportJob>, DatabaseError> {
        job_repo::list_by_owner(&self.db, owner_id, limit)?
            .into_iter()
            .map(decode_row)
            .collect()
    }

    /// In-flight jobs not touched for `threshold`, oldest first.
    pub fn find_stale(
        &self,
        threshold: Duration,
        limit: u32,
    ) -> Result<Vec<ImportJob>, DatabaseError> {
        let cutoff = format_timestamp(Utc::now() - threshold);
        job_repo::find_stale(&self.db, &cutoff, limit)?
            .into_iter()
            .map(decode_row)
            .collect()
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, DatabaseError> {
        job_repo::count_by_status(&self.db, status.as_str())
    }

    /// Moves a runnable job to `processing` at the start of the validating stage,
    /// clearing everything a previous run left behind.
    pub fn claim(&self, id: &str, mode: &ClaimMode) -> Result<Option<RunLease>, DatabaseError> {
        let expected = match mode {
            ClaimMode::Any => None,
            ClaimMode::IfUnchangedSince(ts) => Some(format_timestamp(*ts)),
        };
        let now = format_timestamp(Utc::now());
        let attempt = job_repo::claim(
            &self.db,
            id,
            expected.as_deref(),
            "Validating submission",
            &now,
        )?;
        Ok(attempt.map(|attempt| RunLease { attempt }))
    }

    pub fn record_progress(
        &self,
        id: &str,
        lease: RunLease,
        stage: ProcessingStage,
        percentage: u8,
        message: &str,
    ) -> Result<bool, DatabaseError> {
        job_repo::update_progress(
            &self.db,
            id,
            lease.attempt,
            stage.as_str(),
            percentage.min(100),
            message,
            &format_timestamp(Utc::now()),
        )
    }

    /// Whether `lease` is still the live run of an in-flight job.
    pub fn holds_lease(&self, id: &str, lease: RunLease) -> Result<bool, DatabaseError> {
        job_repo::holds_lease(&self.db, id, lease.attempt)
    }

    pub fn mark_preview_ready(
        &self,
        id: &str,
        lease: RunLease,
        draft: &ParsedScene,
    ) -> Result<bool, DatabaseError> {
        let draft_json = encode_draft(id, draft)?;
        job_repo::mark_preview_ready(
            &self.db,
            id,
            lease.attempt,
            &draft_json,
            &format_timestamp(Utc::now()),
        )
    }

    /// Records a committed scene and its draft in a single transition from
    /// `processing` to `completed`.
    pub fn mark_completed(
        &self,
        id: &str,
        lease: RunLease,
        draft: &ParsedScene,
        scene_id: &str,
    ) -> Result<bool, DatabaseError> {
        let draft_json = encode_draft(id, draft)?;
        job_repo::mark_completed(
            &self.db,
            id,
            lease.attempt,
            &draft_json,
            scene_id,
            &format_timestamp(Utc::now()),
        )
    }

    pub fn mark_error(
        &self,
        id: &str,
        lease: RunLease,
        stage: ProcessingStage,
        kind: &str,
        message: &str,
    ) -> Result<bool, DatabaseError> {
        job_repo::mark_error(
            &self.db,
            id,
            lease.attempt,
            stage.as_str(),
            kind,
            message,
            &format_timestamp(Utc::now()),
        )
    }
}
