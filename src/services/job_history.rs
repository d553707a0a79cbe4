//! Job history service
//!
//! Stores recent import job completions in memory with file-backed
//! persistence so history survives worker restarts.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const MAX_HISTORY_SIZE: usize = 100;
const HISTORY_FILE: &str = "logs/job-history.json";

/// Job entry in history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub job_type: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHistoryResponse {
    pub jobs: Vec<JobHistoryEntry>,
    pub total: usize,
}

/// Job history storage backed by an in-memory deque + JSON file on disk.
pub struct JobHistoryService {
    history: Arc<RwLock<VecDeque<JobHistoryEntry>>>,
}

impl JobHistoryService {
    pub fn new() -> Self {
        let mut deque = VecDeque::with_capacity(MAX_HISTORY_SIZE);
        if let Some(loaded) = Self::load_from_disk() {
            for entry in loaded {
                deque.push_back(entry);
            }
            info!("Loaded {} job history entries from disk", deque.len());
        }
        Self {
            history: Arc::new(RwLock::new(deque)),
        }
    }

    /// Record a completed job
    pub fn record_completed(
        &self,
        id: Uuid,
        job_type: &str,
        user_id: Uuid,
        started_at: DateTime<Utc>,
        details: Option<String>,
    ) {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds() as u64;

        self.add_entry(JobHistoryEntry {
            id,
            user_id,
            job_type: job_type.to_string(),
            status: "completed".to_string(),
            started_at,
            completed_at,
            duration_ms,
            error: None,
            details,
        });
    }

    /// Record a failed job
    pub fn record_failed(
        &self,
        id: Uuid,
        job_type: &str,
        user_id: Uuid,
        started_at: DateTime<Utc>,
        error: String,
    ) {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds() as u64;

        self.add_entry(JobHistoryEntry {
            id,
            user_id,
            job_type: job_type.to_string(),
            status: "failed".to_string(),
            started_at,
            completed_at,
            duration_ms,
            error: Some(error),
            details: None,
        });
    }

    fn add_entry(&self, entry: JobHistoryEntry) {
        let mut history = self.history.write();

        if history.len() >= MAX_HISTORY_SIZE {
            history.pop_back();
        }

        history.push_front(entry);

        Self::save_to_disk(&history);
    }

    /// Get recent job history filtered by user (multi-tenant safe)
    pub fn get_recent_for_user(&self, user_id: Uuid, limit: usize) -> JobHistoryResponse {
        let history = self.history.read();
        let jobs: Vec<JobHistoryEntry> = history
            .iter()
            .filter(|j| j.user_id == user_id)
            .take(limit)
            .cloned()
            .collect();
        let total = jobs.len();

        JobHistoryResponse { jobs, total }
    }

    fn load_from_disk() -> Option<Vec<JobHistoryEntry>> {
        let path = Path::new(HISTORY_FILE);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<JobHistoryEntry>>(&content) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!("Failed to parse job history file: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read job history file: {}", e);
                None
            }
        }
    }

    fn save_to_disk(history: &VecDeque<JobHistoryEntry>) {
        let path = Path::new(HISTORY_FILE);
        if let Some(dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create job history directory: {}", e);
                return;
            }
        }
        let entries: Vec<&JobHistoryEntry> = history.iter().collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("Failed to write job history file: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize job history: {}", e),
        }
    }
}

impl Default for JobHistoryService {
    fn default() -> Self {
        Self::new()
    }
}

// Global instance for easy access
pub static JOB_HISTORY: Lazy<JobHistoryService> = Lazy::new(JobHistoryService::new);

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_service() -> JobHistoryService {
        JobHistoryService {
            history: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_HISTORY_SIZE))),
        }
    }

    #[test]
    fn test_record_completed_job() {
        let service = fresh_service();
        let id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let started_at = Utc::now() - chrono::Duration::seconds(5);

        service.record_completed(
            id,
            "import.clients",
            user_id,
            started_at,
            Some("2/3 rows imported".to_string()),
        );

        let history = service.get_recent_for_user(user_id, 10);
        assert_eq!(history.jobs.len(), 1);
        assert_eq!(history.jobs[0].id, id);
        assert_eq!(history.jobs[0].status, "completed");
    }

    #[test]
    fn test_record_failed_job() {
        let service = fresh_service();
        let user_id = Uuid::new_v4();

        service.record_failed(
            Uuid::new_v4(),
            "import.invoices",
            user_id,
            Utc::now(),
            "Connection timeout".to_string(),
        );

        let history = service.get_recent_for_user(user_id, 10);
        assert_eq!(history.jobs.len(), 1);
        assert_eq!(history.jobs[0].status, "failed");
        assert_eq!(history.jobs[0].error, Some("Connection timeout".to_string()));
    }

    #[test]
    fn test_history_is_scoped_per_user() {
        let service = fresh_service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        service.record_completed(Uuid::new_v4(), "import.clients", alice, Utc::now(), None);
        service.record_completed(Uuid::new_v4(), "import.clients", bob, Utc::now(), None);

        assert_eq!(service.get_recent_for_user(alice, 10).jobs.len(), 1);
        assert_eq!(service.get_recent_for_user(bob, 10).jobs.len(), 1);
    }

    #[test]
    fn test_history_is_capped() {
        let service = fresh_service();
        let user_id = Uuid::new_v4();
        for _ in 0..(MAX_HISTORY_SIZE + 10) {
            service.record_completed(Uuid::new_v4(), "import.clients", user_id, Utc::now(), None);
        }
        let history = service.get_recent_for_user(user_id, MAX_HISTORY_SIZE * 2);
        assert_eq!(history.jobs.len(), MAX_HISTORY_SIZE);
    }
}
