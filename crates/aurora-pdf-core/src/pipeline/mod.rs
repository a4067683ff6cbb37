//! Document operation pipelines.
//!
//! Every operation follows the same shape: load its sources, run page
//! operations step by step while reporting progress, deliver the produced
//! buffers, then complete or fail its job. [`run_operation`] owns that shape;
//! each [`Operation`] only supplies the steps.

mod compress;
mod convert;
mod merge;
mod organize;
mod rotate;
mod sign;
mod split;

pub use compress::CompressOperation;
pub use convert::ConvertOperation;
pub use merge::{FileOrderEntry, MergeOperation, MergeQueue};
pub use organize::{OrganizeOperation, PageItem, PageItemId, PageSequence};
pub use rotate::{RotateOperation, RotateRequest, RotateTarget};
pub use sign::SignOperation;
pub use split::{SplitOperation, SplitSpec};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::delivery::{Artifact, OutputSink};
use crate::error::{Error, Result};
use crate::intake::SourceFile;
use crate::jobs::{JobId, JobTracker, OperationKind};
use crate::pdf::DocumentHandle;

/// Where a pipeline invocation is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    LoadingSource,
    Ready,
    Executing,
    Delivered,
    Failed,
}

impl PipelineStage {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Whether the pipeline may move from `self` to `next`.
    ///
    /// `LoadingSource` can be re-entered from `Executing` so multi-source
    /// operations load each input only after the previous one is consumed.
    pub const fn can_advance_to(self, next: Self) -> bool {
        use PipelineStage::{Delivered, Executing, Failed, Idle, LoadingSource, Ready};
        matches!(
            (self, next),
            (Idle, LoadingSource)
                | (LoadingSource, Ready)
                | (Ready | Executing, Executing)
                | (Executing, LoadingSource | Delivered)
                | (Idle | LoadingSource | Ready | Executing, Failed)
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LoadingSource => "loading-source",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One document operation.
#[async_trait]
pub trait Operation: Send + Sync {
    fn kind(&self) -> OperationKind;

    /// Input files, in the order the operation consumes them.
    fn sources(&self) -> &[SourceFile];

    /// Run the operation's steps against `run`.
    async fn execute(&self, run: &mut PipelineRun<'_>) -> Result<()>;
}

/// Outcome of a successful pipeline invocation.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobId,
    pub stage: PipelineStage,
    pub artifacts: Vec<Artifact>,
}

/// State of one pipeline invocation, handed to [`Operation::execute`].
pub struct PipelineRun<'a> {
    job_id: JobId,
    tracker: &'a JobTracker,
    sink: &'a dyn OutputSink,
    pacing: Duration,
    stage: PipelineStage,
    artifacts: Vec<Artifact>,
}

impl<'a> PipelineRun<'a> {
    fn new(job_id: JobId, tracker: &'a JobTracker, sink: &'a dyn OutputSink, pacing: Duration) -> Self {
        Self {
            job_id,
            tracker,
            sink,
            pacing,
            stage: PipelineStage::Idle,
            artifacts: Vec::new(),
        }
    }

    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    pub const fn stage(&self) -> PipelineStage {
        self.stage
    }

    fn advance(&mut self, next: PipelineStage) {
        if self.stage == next {
            return;
        }
        if !self.stage.can_advance_to(next) {
            warn!("Job {}: unexpected stage change {} -> {}", self.job_id, self.stage, next);
        }
        debug!("Job {}: {} -> {}", self.job_id, self.stage, next);
        self.stage = next;
    }

    /// Run CPU-bound document work on the blocking pool so it does not
    /// stall the async workers.
    pub async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| Error::Unknown(format!("document task for job {} panicked: {e}", self.job_id)))?
    }

    /// Parse a source into a handle owned by this invocation.
    pub async fn load(&mut self, file: &SourceFile) -> Result<DocumentHandle> {
        self.advance(PipelineStage::LoadingSource);
        let source = file.clone();
        let handle = self.blocking(move || DocumentHandle::from_source(&source)).await?;
        debug!("Job {}: loaded {} ({} pages)", self.job_id, file.name(), handle.page_count());
        self.advance(PipelineStage::Ready);
        Ok(handle)
    }

    /// Record that `done` of `total` steps have finished.
    pub async fn step(&mut self, done: usize, total: usize) -> Result<()> {
        self.advance(PipelineStage::Executing);
        self.tracker
            .report_progress(self.job_id, crate::util::percent(done, total))
            .await?;
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        Ok(())
    }

    /// Hand an artifact to the sink. Failure here fails the whole job.
    pub async fn deliver(&mut self, artifact: Artifact) -> Result<()> {
        self.advance(PipelineStage::Executing);
        self.sink.deliver(&artifact).await?;
        debug!(
            "Job {}: delivered {} ({} bytes)",
            self.job_id,
            artifact.filename,
            artifact.len()
        );
        self.artifacts.push(artifact);
        Ok(())
    }
}

/// Run `operation` as a tracked job.
///
/// The job is created first (which may be refused with `JobInFlight`), then
/// the operation executes. On success the job completes, with the produced
/// buffer attached when there is exactly one and the sink does not keep it
/// already; on failure the job moves to `error` and the original error is
/// returned. If the returned future is dropped midway, the job fails as
/// cancelled.
pub async fn run_operation(
    operation: &dyn Operation,
    tracker: &JobTracker,
    sink: &dyn OutputSink,
    pacing: Duration,
) -> Result<JobReport> {
    let guard = tracker.start(operation.kind(), operation.sources()).await?;
    let job_id = guard.id();
    let mut run = PipelineRun::new(job_id, tracker, sink, pacing);

    match operation.execute(&mut run).await {
        Ok(()) => {
            run.advance(PipelineStage::Delivered);
            let result = match run.artifacts.as_slice() {
                [single] if !sink.keeps_artifacts() => Some(single.bytes.clone()),
                _ => None,
            };
            tracker.complete(job_id, result).await?;
            Ok(JobReport {
                job_id,
                stage: run.stage,
                artifacts: run.artifacts,
            })
        }
        Err(e) => {
            run.advance(PipelineStage::Failed);
            if let Err(mark_err) = tracker.fail(job_id, e.to_string()).await {
                warn!("Job {}: could not record failure: {}", job_id, mark_err);
            }
            Err(e)
        }
    }
}
