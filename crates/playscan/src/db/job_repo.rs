//! Job repository: SQL access to the `import_jobs` table.
//!
//! Every write issued on behalf of a run is conditioned on the run's
//! `attempt_count`; a write that matches no row means the run lost its lease.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub owner_id: String,
    /// JSON array of blob paths.
    pub file_paths: String,
    pub consent_to_remote_ai: bool,
    pub mode: String,
    pub status: String,
    pub processing_stage: Option<String>,
    pub progress_percentage: u8,
    pub status_message: Option<String>,
    /// JSON-encoded scene draft.
    pub draft_data: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub scene_id: Option<String>,
    pub attempt_count: u32,
    pub created_at: String,
    pub updated_at: String,
    pub last_attempt_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            file_paths: row.get("file_paths")?,
            consent_to_remote_ai: row.get("consent_to_remote_ai")?,
            mode: row.get("mode")?,
            status: row.get("status")?,
            processing_stage: row.get("processing_stage")?,
            progress_percentage: row.get("progress_percentage")?,
            status_message: row.get("status_message")?,
            draft_data: row.get("draft_data")?,
            error_message: row.get("error_message")?,
            error_kind: row.get("error_kind")?,
            scene_id: row.get("scene_id")?,
            attempt_count: row.get("attempt_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            last_attempt_at: row.get("last_attempt_at")?,
        })
    }
}

pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO import_jobs (id, owner_id, file_paths, consent_to_remote_ai, mode,
             status, processing_stage, progress_percentage, status_message, draft_data,
             error_message, error_kind, scene_id, attempt_count, created_at, updated_at,
             last_attempt_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                job.id,
                job.owner_id,
                job.file_paths,
                job.consent_to_remote_ai,
                job.mode,
                job.status,
                job.processing_stage,
                job.progress_percentage,
                job.status_message,
                job.draft_data,
                job.error_message,
                job.error_kind,
                job.scene_id,
                job.attempt_count,
                job.created_at,
                job.updated_at,
                job.last_attempt_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM import_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Most recent jobs of one owner, newest first.
pub fn list_by_owner(
    db: &Database,
    owner_id: &str,
    limit: u32,
) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM import_jobs WHERE owner_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![owner_id, limit], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// In-flight jobs whose `updated_at` is older than `cutoff`, oldest first.
pub fn find_stale(db: &Database, cutoff: &str, limit: u32) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM import_jobs
             WHERE status IN ('pending', 'processing') AND updated_at < ?1
             ORDER BY updated_at ASC, id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cutoff, limit], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM import_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Claims a runnable job for a new run and wipes the previous run's output.
///
/// With `expected_updated_at` set, the claim only succeeds if the row was not
/// touched since it was read. Returns the new attempt number, or `None` when
/// the claim was lost.
pub fn claim(
    db: &Database,
    id: &str,
    expected_updated_at: Option<&str>,
    message: &str,
    now: &str,
) -> Result<Option<u32>, DatabaseError> {
    db.with_conn(|conn| {
        let attempt = conn
            .query_row(
                "UPDATE import_jobs SET status = 'processing', processing_stage = 'validating',
                 progress_percentage = 0, status_message = ?2, draft_data = NULL,
                 error_message = NULL, error_kind = NULL, scene_id = NULL,
                 attempt_count = attempt_count + 1, last_attempt_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status IN ('pending', 'processing', 'error')
                 AND (?4 IS NULL OR updated_at = ?4)
                 RETURNING attempt_count",
                params![id, message, now, expected_updated_at],
                |r| r.get::<_, u32>(0),
            )
            .optional()?;
        Ok(attempt)
    })
}

/// Records stage progress. The stored percentage never decreases.
pub fn update_progress(
    db: &Database,
    id: &str,
    attempt: u32,
    stage: &str,
    percentage: u8,
    message: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs SET processing_stage = ?3,
             progress_percentage = MAX(progress_percentage, ?4),
             status_message = ?5, updated_at = ?6
             WHERE id = ?1 AND attempt_count = ?2 AND status = 'processing'",
            params![id, attempt, stage, percentage, message, now],
        )?;
        Ok(changed == 1)
    })
}

pub fn mark_preview_ready(
    db: &Database,
    id: &str,
    attempt: u32,
    draft_json: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs SET status = 'preview_ready', processing_stage = NULL,
             progress_percentage = 100, status_message = 'Preview ready', draft_data = ?3,
             updated_at = ?4
             WHERE id = ?1 AND attempt_count = ?2 AND status = 'processing'",
            params![id, attempt, draft_json, now],
        )?;
        Ok(changed == 1)
    })
}

/// Finishes a create-mode run in one write: stores the draft and the committed
/// scene id and moves the job straight from `processing` to `completed`.
pub fn mark_completed(
    db: &Database,
    id: &str,
    attempt: u32,
    draft_json: &str,
    scene_id: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs SET status = 'completed', processing_stage = NULL,
             progress_percentage = 100, status_message = 'Scene created', draft_data = ?3,
             scene_id = ?4, updated_at = ?5
             WHERE id = ?1 AND attempt_count = ?2 AND status = 'processing'",
            params![id, attempt, draft_json, scene_id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Whether `attempt` is still the live run of an in-flight job.
pub fn holds_lease(db: &Database, id: &str, attempt: u32) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM import_jobs
             WHERE id = ?1 AND attempt_count = ?2 AND status = 'processing'",
            params![id, attempt],
            |r| r.get(0),
        )?;
        Ok(count == 1)
    })
}

/// Records a failed run. The failing stage stays in `processing_stage`.
pub fn mark_error(
    db: &Database,
    id: &str,
    attempt: u32,
    stage: &str,
    kind: &str,
    message: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs SET status = 'error', processing_stage = ?3, error_kind = ?4,
             error_message = ?5, status_message = 'Failed during ' || ?3, updated_at = ?6
             WHERE id = ?1 AND attempt_count = ?2 AND status = 'processing'",
            params![id, attempt, stage, kind, message, now],
        )?;
        Ok(changed == 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            file_paths: r#"["owner-1/scene.pdf"]"#.to_string(),
            consent_to_remote_ai: true,
            mode: "preview".to_string(),
            status: "pending".to_string(),
            processing_stage: None,
            progress_percentage: 0,
            status_message: Some("Queued".to_string()),
            draft_data: None,
            error_message: None,
            error_kind: None,
            scene_id: None,
            attempt_count: 0,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            last_attempt_at: None,
        }
    }

    const T1: &str = "2026-01-01T00:01:00.000Z";
    const T2: &str = "2026-01-01T00:02:00.000Z";

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_job("job-1")).unwrap();

        let found = find_by_id(&db, "job-1").unwrap().unwrap();
        assert_eq!(found.owner_id, "owner-1");
        assert_eq!(found.status, "pending");
        assert!(found.consent_to_remote_ai);
        assert_eq!(found.file_paths, r#"["owner-1/scene.pdf"]"#);
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_claim_resets_previous_run() {
        let db = test_db();
        let mut job = sample_job("c1");
        job.status = "error".to_string();
        job.error_message = Some("boom".to_string());
        job.error_kind = Some("extraction".to_string());
        job.progress_percentage = 55;
        job.attempt_count = 1;
        insert(&db, &job).unwrap();

        let attempt = claim(&db, "c1", None, "Validating", T1).unwrap();
        assert_eq!(attempt, Some(2));

        let found = find_by_id(&db, "c1").unwrap().unwrap();
        assert_eq!(found.status, "processing");
        assert_eq!(found.processing_stage.as_deref(), Some("validating"));
        assert_eq!(found.progress_percentage, 0);
        assert!(found.error_message.is_none());
        assert!(found.error_kind.is_none());
        assert_eq!(found.last_attempt_at.as_deref(), Some(T1));
    }

    #[test]
    fn test_claim_refuses_terminal_jobs() {
        let db = test_db();
        let mut job = sample_job("c2");
        job.status = "preview_ready".to_string();
        insert(&db, &job).unwrap();

        assert_eq!(claim(&db, "c2", None, "Validating", T1).unwrap(), None);
    }

    #[test]
    fn test_claim_with_stale_expectation_fails() {
        let db = test_db();
        insert(&db, &sample_job("c3")).unwrap();

        let first = claim(&db, "c3", Some("2026-01-01T00:00:00.000Z"), "Validating", T1).unwrap();
        assert_eq!(first, Some(1));

        // A second sweeper holding the old timestamp loses the race.
        let second = claim(&db, "c3", Some("2026-01-01T00:00:00.000Z"), "Validating", T2).unwrap();
        assert_eq!(second, None);
    }

    #[test]
    fn test_progress_never_decreases() {
        let db = test_db();
        insert(&db, &sample_job("p1")).unwrap();
        let attempt = claim(&db, "p1", None, "Validating", T1).unwrap().unwrap();

        assert!(update_progress(&db, "p1", attempt, "extracting", 50, "Extracting", T1).unwrap());
        assert!(update_progress(&db, "p1", attempt, "extracting", 40, "Extracting", T2).unwrap());

        let found = find_by_id(&db, "p1").unwrap().unwrap();
        assert_eq!(found.progress_percentage, 50);
        assert_eq!(found.updated_at, T2);
    }

    #[test]
    fn test_superseded_attempt_cannot_write() {
        let db = test_db();
        insert(&db, &sample_job("s1")).unwrap();
        let old = claim(&db, "s1", None, "Validating", T1).unwrap().unwrap();
        let new = claim(&db, "s1", None, "Validating", T2).unwrap().unwrap();
        assert_eq!(new, old + 1);

        assert!(!update_progress(&db, "s1", old, "parsing", 80, "Parsing", T2).unwrap());
        assert!(!mark_preview_ready(&db, "s1", old, "{}", T2).unwrap());
        assert!(!mark_error(&db, "s1", old, "parsing", "internal", "x", T2).unwrap());
        assert!(!mark_completed(&db, "s1", old, "{}", "scene-1", T2).unwrap());
        assert!(!holds_lease(&db, "s1", old).unwrap());
        assert!(update_progress(&db, "s1", new, "downloading", 10, "Downloading", T2).unwrap());
    }

    #[test]
    fn test_complete_from_processing_in_one_write() {
        let db = test_db();
        insert(&db, &sample_job("f1")).unwrap();
        let attempt = claim(&db, "f1", None, "Validating", T1).unwrap().unwrap();
        assert!(holds_lease(&db, "f1", attempt).unwrap());

        assert!(mark_completed(&db, "f1", attempt, r#"{"title":"T"}"#, "scene-9", T2).unwrap());

        let found = find_by_id(&db, "f1").unwrap().unwrap();
        assert_eq!(found.status, "completed");
        assert_eq!(found.progress_percentage, 100);
        assert_eq!(found.scene_id.as_deref(), Some("scene-9"));
        assert_eq!(found.draft_data.as_deref(), Some(r#"{"title":"T"}"#));
        assert!(found.processing_stage.is_none());
        assert!(!holds_lease(&db, "f1", attempt).unwrap());
    }

    #[test]
    fn test_complete_rejected_after_preview_ready() {
        let db = test_db();
        insert(&db, &sample_job("f2")).unwrap();
        let attempt = claim(&db, "f2", None, "Validating", T1).unwrap().unwrap();

        assert!(mark_preview_ready(&db, "f2", attempt, "{}", T1).unwrap());
        assert!(!mark_completed(&db, "f2", attempt, "{}", "scene-1", T2).unwrap());
        assert_eq!(find_by_id(&db, "f2").unwrap().unwrap().status, "preview_ready");
    }

    #[test]
    fn test_mark_error_keeps_stage() {
        let db = test_db();
        insert(&db, &sample_job("e1")).unwrap();
        let attempt = claim(&db, "e1", None, "Validating", T1).unwrap().unwrap();

        assert!(mark_error(&db, "e1", attempt, "extracting", "extraction", "no text", T2).unwrap());

        let found = find_by_id(&db, "e1").unwrap().unwrap();
        assert_eq!(found.status, "error");
        assert_eq!(found.processing_stage.as_deref(), Some("extracting"));
        assert_eq!(found.error_kind.as_deref(), Some("extraction"));
        assert_eq!(found.status_message.as_deref(), Some("Failed during extracting"));
    }

    #[test]
    fn test_find_stale_orders_oldest_first_and_limits() {
        let db = test_db();
        for (id, status, updated) in [
            ("a", "processing", "2026-01-01T00:00:03.000Z"),
            ("b", "pending", "2026-01-01T00:00:01.000Z"),
            ("c", "error", "2026-01-01T00:00:00.000Z"),
            ("d", "processing", "2026-01-01T00:00:02.000Z"),
            ("e", "processing", "2026-01-01T10:00:00.000Z"),
        ] {
            let mut job = sample_job(id);
            job.status = status.to_string();
            job.updated_at = updated.to_string();
            insert(&db, &job).unwrap();
        }

        let rows = find_stale(&db, "2026-01-01T01:00:00.000Z", 10).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);

        let rows = find_stale(&db, "2026-01-01T01:00:00.000Z", 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "b");
    }

    #[test]
    fn test_list_by_owner_and_count() {
        let db = test_db();
        for i in 0..4 {
            let mut job = sample_job(&format!("l{}", i));
            job.created_at = format!("2026-01-0{}T00:00:00.000Z", i + 1);
            insert(&db, &job).unwrap();
        }
        let mut other = sample_job("other");
        other.owner_id = "owner-2".to_string();
        insert(&db, &other).unwrap();

        let rows = list_by_owner(&db, "owner-1", 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].id, "l3");
        assert_eq!(count_by_status(&db, "pending").unwrap(), 5);
        assert_eq!(count_by_status(&db, "error").unwrap(), 0);
    }
}
