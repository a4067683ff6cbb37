//! AuroraPDF Core Library
//!
//! This library provides the document operations behind AuroraPDF:
//! - File intake and validation
//! - Page range parsing
//! - Merge, split, rotate, organize, sign and compress pipelines
//! - Job lifecycle tracking with progress subscriptions
//! - Output naming and delivery

pub mod collaborators;
pub mod config;
pub mod delivery;
pub mod error;
pub mod intake;
pub mod jobs;
pub mod pdf;
pub mod pipeline;
pub mod ranges;
pub mod util;

pub use collaborators::{Compressor, DocxConverter, LopdfCompressor};
pub use config::{AppConfig, CompressionLevel, LimitsConfig, RotationPolicy};
pub use delivery::{Artifact, DirectorySink, MemorySink, OutputName, OutputSink, output_filename};
pub use error::{Error, Result, ValidationError};
pub use intake::{FileId, SourceFile};
pub use jobs::{JobGuard, JobId, JobSnapshot, JobStatus, JobTracker, OperationKind};
pub use pdf::{DocumentHandle, ImageStamp};
pub use pipeline::{
    JobReport, MergeQueue, Operation, PageSequence, PipelineStage, RotateRequest, RotateTarget, SplitSpec,
    run_operation,
};
pub use ranges::{PageRange, ParsedRanges, parse_ranges, split_by_interval};

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use pipeline::{
    CompressOperation, ConvertOperation, MergeOperation, OrganizeOperation, RotateOperation, SignOperation,
    SplitOperation,
};

/// High-level entry point that owns the configuration and the job ledger
pub struct Toolkit {
    config: AppConfig,
    tracker: Arc<JobTracker>,
    compressor: Arc<dyn Compressor>,
    converter: Option<Arc<dyn DocxConverter>>,
}

impl Toolkit {
    /// Create a toolkit with its own job ledger
    pub fn new(config: AppConfig) -> Self {
        Self::with_tracker(config, Arc::new(JobTracker::new()))
    }

    /// Create with a shared job ledger
    pub fn with_tracker(config: AppConfig, tracker: Arc<JobTracker>) -> Self {
        Self {
            config,
            tracker,
            compressor: Arc::new(LopdfCompressor),
            converter: None,
        }
    }

    /// Replace the bundled compressor
    #[must_use]
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Register a Word converter; without one `convert` is unsupported
    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn DocxConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    pub const fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// Validate a buffer against the configured limits
    pub fn accept(
        &self,
        bytes: impl Into<Bytes>,
        name: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Result<SourceFile> {
        SourceFile::accept(bytes, name, media_type, &self.config.limits)
    }

    /// Check a batch size against the configured limits
    pub fn accept_batch(&self, count: usize) -> Result<()> {
        intake::validate_batch(count, &self.config.limits)?;
        Ok(())
    }

    fn pacing(&self) -> Duration {
        Duration::from_millis(self.config.pipeline.progress_pacing_ms)
    }

    /// Run any operation as a tracked job
    pub async fn run(&self, operation: &dyn Operation, sink: &dyn OutputSink) -> Result<JobReport> {
        debug!(
            "Running {} over {} file(s)",
            operation.kind(),
            operation.sources().len()
        );
        run_operation(operation, &self.tracker, sink, self.pacing()).await
    }

    /// Concatenate `files` in order. Fewer than two files fail before any job exists.
    pub async fn merge(&self, files: Vec<SourceFile>, sink: &dyn OutputSink) -> Result<JobReport> {
        let operation = MergeOperation::new(files)?;
        self.run(&operation, sink).await
    }

    pub async fn split(&self, file: SourceFile, spec: SplitSpec, sink: &dyn OutputSink) -> Result<JobReport> {
        self.run(&SplitOperation::new(file, spec), sink).await
    }

    /// Rotate pages. `policy` falls back to the configured rotation policy.
    pub async fn rotate(
        &self,
        file: SourceFile,
        angle: i64,
        target: RotateTarget,
        policy: Option<RotationPolicy>,
        sink: &dyn OutputSink,
    ) -> Result<JobReport> {
        let request = RotateRequest {
            angle,
            target,
            policy: policy.unwrap_or(self.config.pipeline.rotation_policy),
        };
        let operation = RotateOperation::new(file, request)?;
        self.run(&operation, sink).await
    }

    pub async fn organize(
        &self,
        file: SourceFile,
        sequence: PageSequence,
        sink: &dyn OutputSink,
    ) -> Result<JobReport> {
        self.run(&OrganizeOperation::new(file, sequence), sink).await
    }

    pub async fn sign(&self, file: SourceFile, stamp: ImageStamp, sink: &dyn OutputSink) -> Result<JobReport> {
        self.run(&SignOperation::new(file, stamp), sink).await
    }

    /// Compress with the registered compressor. `level` falls back to the configured level.
    pub async fn compress(
        &self,
        file: SourceFile,
        level: Option<CompressionLevel>,
        sink: &dyn OutputSink,
    ) -> Result<JobReport> {
        let level = level.unwrap_or(self.config.pipeline.compression);
        let operation = CompressOperation::new(file, level, Arc::clone(&self.compressor));
        self.run(&operation, sink).await
    }

    /// Convert to Word with the registered converter
    pub async fn convert(&self, file: SourceFile, sink: &dyn OutputSink) -> Result<JobReport> {
        let converter = self.converter.clone().ok_or(Error::Unsupported("convert"))?;
        self.run(&ConvertOperation::new(file, converter), sink).await
    }
}
