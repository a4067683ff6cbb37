use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use super::job::{Job, JobId, JobSnapshot, JobStatus, OperationKind, SourceRef};
use crate::error::{Error, Result};
use crate::intake::SourceFile;

/// Reason recorded on a job whose run was dropped before it finished.
pub const CANCELLED: &str = "cancelled before completion";

/// Backlog of creation notices kept for slow listeners.
const CREATED_CAPACITY: usize = 64;

/// A tracked job plus the channel its observers listen on.
struct JobSlot {
    /// One writer at a time per job
    job: Mutex<Job>,
    events: watch::Sender<JobSnapshot>,
}

impl JobSlot {
    /// Fail the job unless it already finished. Called with the job lock held.
    fn abandon(&self, job: &mut Job) {
        if job.fail(CANCELLED).is_ok() {
            self.events.send_replace(job.snapshot());
            warn!("Job {} ({}) {}", job.id(), job.kind(), CANCELLED);
        }
    }
}

/// Handle on a job held by the run executing it.
///
/// Dropping the guard while the job is still pending or processing fails the
/// job, so a run that is cancelled midway never blocks a later attempt on the
/// same files.
pub struct JobGuard {
    id: JobId,
    slot: Arc<JobSlot>,
}

impl JobGuard {
    pub const fn id(&self) -> JobId {
        self.id
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Ok(mut job) = self.slot.job.try_lock() {
            self.slot.abandon(&mut job);
            return;
        }

        // Someone else holds the lock for a moment; finish the job from a task
        let slot = Arc::clone(&self.slot);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let mut job = slot.job.lock().await;
                    slot.abandon(&mut job);
                });
            }
            Err(_) => warn!("Job {}: dropped outside a runtime, left as is", self.id),
        }
    }
}

/// Ledger of every job in the process.
///
/// The tracker is passive: pipelines push progress into it and it never
/// decides anything about how an operation runs. Jobs stay in the ledger
/// until [`JobTracker::clear_completed`] or [`JobTracker::clear_finished_before`]
/// sweeps them.
pub struct JobTracker {
    jobs: RwLock<HashMap<JobId, Arc<JobSlot>>>,
    created: broadcast::Sender<JobId>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker {
    pub fn new() -> Self {
        let (created, _) = broadcast::channel(CREATED_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            created,
        }
    }

    /// Register a new pending job over `files`.
    ///
    /// Fails with [`Error::JobInFlight`] while a job of the same kind is still
    /// running on the same set of file contents.
    pub async fn create(&self, kind: OperationKind, files: &[SourceFile]) -> Result<JobId> {
        let (id, _) = self.insert(kind, files).await?;
        Ok(id)
    }

    /// Register a job for a run that is about to execute it.
    ///
    /// Like [`JobTracker::create`], but the returned guard fails the job if
    /// the run is dropped before completing or failing it.
    pub async fn start(&self, kind: OperationKind, files: &[SourceFile]) -> Result<JobGuard> {
        let (id, slot) = self.insert(kind, files).await?;
        Ok(JobGuard { id, slot })
    }

    /// Ids of jobs as they are created, for observers that arrive first.
    pub fn watch_created(&self) -> broadcast::Receiver<JobId> {
        self.created.subscribe()
    }

    async fn insert(&self, kind: OperationKind, files: &[SourceFile]) -> Result<(JobId, Arc<JobSlot>)> {
        let job = Job::new(kind, files.iter().map(SourceRef::from).collect());
        let id = job.id();

        let mut jobs = self.jobs.write().await;

        let digests = job.digest_set();
        let existing = jobs.values().find_map(|slot| {
            let current = slot.events.borrow();
            let same_files = {
                let mut other: Vec<&str> = current.files.iter().map(|f| f.digest.as_str()).collect();
                other.sort_unstable();
                other == digests
            };
            (current.kind == kind && !current.status.is_terminal() && same_files).then_some(current.id)
        });
        if let Some(existing) = existing {
            warn!("Rejected {} job: {} is still running on the same files", kind, existing);
            return Err(Error::JobInFlight {
                operation: kind.to_string(),
                existing,
            });
        }

        let (events, _) = watch::channel(job.snapshot());
        let slot = Arc::new(JobSlot {
            job: Mutex::new(job),
            events,
        });
        jobs.insert(id, Arc::clone(&slot));
        drop(jobs);

        info!("Created {} job {} over {} file(s)", kind, id, files.len());
        // Nobody listening is fine
        let _ = self.created.send(id);
        Ok((id, slot))
    }

    async fn slot(&self, id: JobId) -> Result<Arc<JobSlot>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::JobNotFound(id))
    }

    /// Apply one mutation under the job's lock and publish the new state.
    async fn update<F>(&self, id: JobId, mutate: F) -> Result<JobSnapshot>
    where
        F: FnOnce(&mut Job) -> Result<()> + Send,
    {
        let slot = self.slot(id).await?;
        let mut job = slot.job.lock().await;
        mutate(&mut job)?;
        let snapshot = job.snapshot();
        slot.events.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn report_progress(&self, id: JobId, percent: f32) -> Result<JobSnapshot> {
        let snapshot = self.update(id, |job| job.report_progress(percent)).await?;
        debug!("Job {} at {:.0}%", id, snapshot.progress);
        Ok(snapshot)
    }

    pub async fn complete(&self, id: JobId, result: Option<Bytes>) -> Result<JobSnapshot> {
        let snapshot = self.update(id, |job| job.complete(result)).await?;
        info!("Job {} ({}) completed", id, snapshot.kind);
        Ok(snapshot)
    }

    pub async fn fail(&self, id: JobId, reason: impl Into<String> + Send) -> Result<JobSnapshot> {
        let reason = reason.into();
        let snapshot = self.update(id, |job| job.fail(reason.clone())).await?;
        warn!("Job {} ({}) failed: {}", id, snapshot.kind, reason);
        Ok(snapshot)
    }

    pub async fn snapshot(&self, id: JobId) -> Result<JobSnapshot> {
        let slot = self.slot(id).await?;
        let snapshot = slot.events.borrow().clone();
        Ok(snapshot)
    }

    /// Every tracked job, oldest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let jobs = self.jobs.read().await;
        let mut snapshots: Vec<JobSnapshot> = jobs.values().map(|slot| slot.events.borrow().clone()).collect();
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    /// Watch a job's state. The receiver sees the current state immediately.
    pub async fn subscribe(&self, id: JobId) -> Result<watch::Receiver<JobSnapshot>> {
        Ok(self.slot(id).await?.events.subscribe())
    }

    /// The result buffer attached on completion, if any.
    pub async fn result(&self, id: JobId) -> Result<Option<Bytes>> {
        let slot = self.slot(id).await?;
        let job = slot.job.lock().await;
        Ok(job.result().cloned())
    }

    /// Drop every completed job from the ledger and return their ids.
    ///
    /// Failed jobs are kept so the error stays visible until the caller
    /// deals with it.
    pub async fn clear_completed(&self) -> Vec<JobId> {
        let mut jobs = self.jobs.write().await;
        let completed: Vec<JobId> = jobs
            .iter()
            .filter(|(_, slot)| slot.events.borrow().status == JobStatus::Completed)
            .map(|(id, _)| *id)
            .collect();

        for id in &completed {
            jobs.remove(id);
        }

        if !completed.is_empty() {
            info!("Cleared {} completed job(s)", completed.len());
        }
        completed
    }

    /// Drop every completed or failed job whose last update is older than
    /// `cutoff`, and return their ids.
    pub async fn clear_finished_before(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .iter()
            .filter(|(_, slot)| {
                let current = slot.events.borrow();
                current.status.is_terminal() && current.updated_at < cutoff
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            jobs.remove(id);
        }

        if !expired.is_empty() {
            info!("Expired {} finished job(s)", expired.len());
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
