use aurora_pdf_core::{AppConfig, JobId, Toolkit};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::artifact_store::{ArtifactStore, StoredArtifact};

/// Global application state
pub struct AppState {
    pub toolkit: Toolkit,
    /// Delivered artifacts indexed by the job that produced them
    artifacts: RwLock<HashMap<JobId, Arc<ArtifactStore>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_toolkit(Toolkit::new(config))
    }

    pub fn with_toolkit(toolkit: Toolkit) -> Self {
        Self {
            toolkit,
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    /// Keep a finished job's artifacts until the job is swept.
    pub async fn keep_artifacts(&self, job_id: JobId, store: Arc<ArtifactStore>) {
        self.artifacts.write().await.insert(job_id, store);
    }

    pub async fn artifacts(&self, job_id: JobId) -> Option<Arc<ArtifactStore>> {
        self.artifacts.read().await.get(&job_id).cloned()
    }

    /// The `n`th artifact (1-based) of a job.
    pub async fn artifact(&self, job_id: JobId, n: usize) -> Option<StoredArtifact> {
        self.artifacts(job_id).await.and_then(|store| store.get(n))
    }

    /// Drop completed jobs from the ledger along with their artifacts.
    ///
    /// Returns how many jobs were removed.
    pub async fn sweep(&self) -> usize {
        let cleared = self.toolkit.tracker().clear_completed().await;
        self.forget(&cleared).await;
        cleared.len()
    }

    /// Drop completed and failed jobs last updated more than `retention` ago,
    /// along with their artifacts.
    pub async fn expire(&self, retention: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let expired = self.toolkit.tracker().clear_finished_before(cutoff).await;
        self.forget(&expired).await;
        expired.len()
    }

    async fn forget(&self, ids: &[JobId]) {
        if ids.is_empty() {
            return;
        }
        let mut artifacts = self.artifacts.write().await;
        for id in ids {
            artifacts.remove(id);
        }
        debug!("Released artifacts of {} job(s)", ids.len());
    }
}
