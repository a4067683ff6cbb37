use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::intake::{FileId, SourceFile};

/// Identifier of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle state of a job. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of document operation a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Merge,
    Split,
    Rotate,
    Organize,
    Compress,
    Convert,
    Sign,
    Edit,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Split => "split",
            Self::Rotate => "rotate",
            Self::Organize => "organize",
            Self::Compress => "compress",
            Self::Convert => "convert",
            Self::Sign => "sign",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job remembers about one of its input files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: FileId,
    pub name: String,
    pub size: usize,
    pub digest: String,
}

impl From<&SourceFile> for SourceRef {
    fn from(file: &SourceFile) -> Self {
        Self {
            id: file.id(),
            name: file.name().to_string(),
            size: file.len(),
            digest: file.digest().to_string(),
        }
    }
}

/// Point-in-time view of a job, safe to hand to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub kind: OperationKind,
    pub status: JobStatus,
    pub progress: f32,
    pub files: Vec<SourceRef>,
    pub error: Option<String>,
    pub has_result: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One user-triggered operation and its outcome.
///
/// Every mutator refuses to run once the job is terminal, so a completed or
/// failed job can never drift back to `pending` or `processing`.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    kind: OperationKind,
    files: Vec<SourceRef>,
    status: JobStatus,
    progress: f32,
    result: Option<Bytes>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: OperationKind, files: Vec<SourceRef>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            files,
            status: JobStatus::Pending,
            progress: 0.0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn id(&self) -> JobId {
        self.id
    }

    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    pub const fn status(&self) -> JobStatus {
        self.status
    }

    pub const fn progress(&self) -> f32 {
        self.progress
    }

    pub fn files(&self) -> &[SourceRef] {
        &self.files
    }

    pub const fn result(&self) -> Option<&Bytes> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Sorted content digests of the inputs, identifying the file set.
    pub fn digest_set(&self) -> Vec<&str> {
        let mut digests: Vec<&str> = self.files.iter().map(|f| f.digest.as_str()).collect();
        digests.sort_unstable();
        digests
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::JobTerminal {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Move to `processing` and raise progress to `percent`.
    ///
    /// Progress only moves forward: lower values leave the recorded
    /// high-water mark unchanged, and non-finite values are ignored.
    pub fn report_progress(&mut self, percent: f32) -> Result<()> {
        self.ensure_active()?;
        self.status = JobStatus::Processing;
        if percent.is_finite() {
            self.progress = self.progress.max(percent.clamp(0.0, 100.0));
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Finish successfully. Progress is forced to 100.
    pub fn complete(&mut self, result: Option<Bytes>) -> Result<()> {
        self.ensure_active()?;
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.result = result;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.ensure_active()?;
        self.status = JobStatus::Error;
        self.error = Some(reason.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            kind: self.kind,
            status: self.status,
            progress: self.progress,
            files: self.files.clone(),
            error: self.error.clone(),
            has_result: self.result.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
