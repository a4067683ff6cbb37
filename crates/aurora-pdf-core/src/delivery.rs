//! Output naming and delivery of produced buffers.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::error::{Error, Result};

/// Fixed name of every merge output.
pub const MERGED_FILENAME: &str = "merged-document.pdf";

/// Which kind of output a filename is derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputName {
    Merged,
    /// 1-based split part number
    Part(usize),
    Compressed,
    Edited,
    Signed,
    Rotated,
    Organized,
    Docx,
}

/// File stem of an uploaded name: directories and a trailing `.pdf`
/// (any case) are stripped.
pub fn file_stem(original: &str) -> &str {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(original);

    let stem = match name.len().checked_sub(4) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".pdf") => &name[..cut],
        _ => name,
    };

    if stem.is_empty() { "document" } else { stem }
}

/// Deterministic output filename for `original`.
pub fn output_filename(original: &str, output: OutputName) -> String {
    let stem = file_stem(original);
    match output {
        OutputName::Merged => MERGED_FILENAME.to_string(),
        OutputName::Part(n) => format!("{stem}_part_{n}.pdf"),
        OutputName::Compressed => format!("{stem}_compressed.pdf"),
        OutputName::Edited => format!("{stem}_edited.pdf"),
        OutputName::Signed => format!("{stem}_signed.pdf"),
        OutputName::Rotated => format!("{stem}_rotated.pdf"),
        OutputName::Organized => format!("{stem}_organized.pdf"),
        OutputName::Docx => format!("{stem}.docx"),
    }
}

/// A produced buffer and the name it is delivered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Bytes,
}

impl Artifact {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Media type implied by the filename extension.
    pub fn media_type(&self) -> &'static str {
        if Path::new(&self.filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"))
        {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        } else {
            crate::config::PDF_MEDIA_TYPE
        }
    }
}

/// Destination for finished artifacts.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Hand over one artifact. An error fails the job that produced it.
    async fn deliver(&self, artifact: &Artifact) -> Result<()>;

    /// Whether delivered artifacts stay reachable through the sink itself.
    /// Jobs delivered to such a sink do not also hold their result buffer.
    fn keeps_artifacts(&self) -> bool {
        false
    }
}

/// Writes artifacts into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `filename` ends up.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    async fn deliver(&self, artifact: &Artifact) -> Result<()> {
        let delivery_error = |e: std::io::Error| Error::Delivery {
            filename: artifact.filename.clone(),
            reason: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(delivery_error)?;
        let path = self.path_for(&artifact.filename);
        tokio::fs::write(&path, &artifact.bytes).await.map_err(delivery_error)?;

        debug!("Wrote {} ({} bytes)", path.display(), artifact.len());
        Ok(())
    }

    fn keeps_artifacts(&self) -> bool {
        true
    }
}

/// Keeps delivered artifacts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<Artifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in delivery order.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Remove and return everything delivered so far.
    pub fn take(&self) -> Vec<Artifact> {
        std::mem::take(&mut *self.artifacts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn deliver(&self, artifact: &Artifact) -> Result<()> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(artifact.clone());
        Ok(())
    }
}
