//! File validation and intake.
//!
//! Raw uploads become [`SourceFile`]s only after passing [`validate`]. A
//! `SourceFile` is immutable: the bytes are reference counted, so cloning one
//! into a job or a pipeline never copies the document.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::error::{Result, ValidationError};

/// Stable identifier assigned to every accepted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated upload.
#[derive(Clone)]
pub struct SourceFile {
    id: FileId,
    name: String,
    media_type: String,
    digest: String,
    bytes: Bytes,
}

impl SourceFile {
    /// Validate and accept a buffer.
    pub fn accept(
        bytes: impl Into<Bytes>,
        name: impl Into<String>,
        media_type: impl Into<String>,
        limits: &LimitsConfig,
    ) -> Result<Self> {
        let bytes = bytes.into();
        let name = name.into();
        let media_type = media_type.into();

        validate(&name, bytes.len() as u64, &media_type, limits)?;

        Ok(Self {
            id: FileId::new(),
            digest: crate::util::content_digest(&bytes),
            name,
            media_type,
            bytes,
        })
    }

    /// Read a file from disk and accept it as a PDF.
    pub async fn from_path(path: impl AsRef<std::path::Path>, limits: &LimitsConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        Self::accept(bytes, name, limits.media_type.clone(), limits)
    }

    pub const fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// MD5 hex of the content, computed once on intake.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes_len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Check one file against the intake limits. Pure; no side effects.
pub fn validate(
    name: &str,
    size: u64,
    media_type: &str,
    limits: &LimitsConfig,
) -> std::result::Result<(), ValidationError> {
    if size > limits.max_file_size {
        return Err(ValidationError::FileTooLarge {
            size,
            max: limits.max_file_size,
        });
    }

    if media_type != limits.media_type {
        return Err(ValidationError::InvalidType {
            found: media_type.to_string(),
            expected: limits.media_type.clone(),
        });
    }

    if size == 0 {
        return Err(ValidationError::EmptyFile(name.to_string()));
    }

    Ok(())
}

/// Check the number of files in one batch.
pub const fn validate_batch(count: usize, limits: &LimitsConfig) -> std::result::Result<(), ValidationError> {
    if count > limits.max_files {
        return Err(ValidationError::TooManyFiles {
            count,
            max: limits.max_files,
        });
    }
    Ok(())
}
