use thiserror::Error;

use crate::jobs::{JobId, JobStatus};

/// Reasons a file is refused at intake.
///
/// These are raised before any job exists, so a rejected upload never
/// shows up in the job ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file too large: {size} bytes (maximum is {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("invalid file type '{found}', only {expected} is accepted")]
    InvalidType { found: String, expected: String },

    #[error("too many files: {count} (maximum is {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("file '{0}' is empty")]
    EmptyFile(String),
}

/// Unified error type for aurora-pdf-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Intake validation (size, media type, batch size)
/// - Page range parsing and page addressing
/// - PDF loading, mutation and saving
/// - Job lifecycle transitions
/// - Output delivery
/// - Configuration and general I/O
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Intake Errors
    // ==========================================================================
    /// The file was rejected at intake
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Merge was invoked with fewer than two files
    #[error("at least {required} PDF files are required, got {provided}")]
    InsufficientInputs { required: usize, provided: usize },

    // ==========================================================================
    // Range Errors
    // ==========================================================================
    /// No usable page range could be parsed
    #[error("invalid page ranges: no usable range in '{0}'")]
    InvalidRangeSpecification(String),

    /// A page index outside the document was addressed
    #[error("invalid page index {index} (document has {total} pages)")]
    PageOutOfRange { index: usize, total: usize },

    /// Rotation angle is not a multiple of 90 degrees
    #[error("invalid rotation {0}: angle must be a multiple of 90 degrees")]
    InvalidRotation(i64),

    // ==========================================================================
    // Document Errors
    // ==========================================================================
    /// The bytes could not be parsed as a PDF
    #[error("unreadable document '{name}': {reason}")]
    UnreadableDocument { name: String, reason: String },

    /// The page tree of a loaded document is malformed
    #[error("malformed page tree: {0}")]
    PageTree(String),

    /// The stamp image or its placement is invalid
    #[error("invalid stamp: {0}")]
    InvalidStamp(String),

    /// Failed to save a PDF
    #[error("failed to save PDF: {0}")]
    PdfSave(String),

    /// No collaborator is registered for the requested operation
    #[error("operation '{0}' is not supported by this build")]
    Unsupported(&'static str),

    // ==========================================================================
    // Job Errors
    // ==========================================================================
    /// No job with this identifier is tracked
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// A terminal job was asked to change state
    #[error("job {id} is already {status} and cannot change state")]
    JobTerminal { id: JobId, status: JobStatus },

    /// Another job of the same type is already running on the same files
    #[error("a {operation} job ({existing}) is already running on these files")]
    JobInFlight { operation: String, existing: JobId },

    // ==========================================================================
    // Delivery Errors
    // ==========================================================================
    /// Writing an output artifact failed
    #[error("failed to deliver '{filename}': {reason}")]
    Delivery { filename: String, reason: String },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for failures with no better classification
    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl Error {
    /// True for errors caused by the caller's input rather than the system.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InsufficientInputs { .. }
                | Self::InvalidRangeSpecification(_)
                | Self::PageOutOfRange { .. }
                | Self::InvalidRotation(_)
                | Self::UnreadableDocument { .. }
                | Self::PageTree(_)
                | Self::InvalidStamp(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
