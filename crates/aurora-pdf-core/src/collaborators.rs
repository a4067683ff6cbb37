//! Interfaces for operations whose algorithms live outside this crate.
//!
//! Compression ships with a lossless lopdf-based implementation. Conversion
//! to Word has no bundled implementation; callers register one or report the
//! operation as unsupported.

use tracing::debug;

use crate::config::CompressionLevel;
use crate::error::{Error, Result};
use crate::pdf::DocumentHandle;

/// Shrinks a PDF without changing what it shows.
///
/// Both collaborators receive the document the pipeline already parsed.
pub trait Compressor: Send + Sync {
    fn name(&self) -> &'static str;

    fn compress(&self, document: DocumentHandle, level: CompressionLevel) -> Result<Vec<u8>>;
}

/// Converts a PDF into a `.docx` document.
pub trait DocxConverter: Send + Sync {
    fn name(&self) -> &'static str;

    fn convert_to_docx(&self, document: &DocumentHandle) -> Result<Vec<u8>>;
}

/// Lossless compression by re-encoding streams with Flate.
///
/// - `low`: compress streams only
/// - `medium`: also drop objects nothing refers to
/// - `high`: also delete empty streams and renumber objects densely
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfCompressor;

impl Compressor for LopdfCompressor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn compress(&self, document: DocumentHandle, level: CompressionLevel) -> Result<Vec<u8>> {
        let name = document.name().to_string();
        let mut doc = document.into_document();

        match level {
            CompressionLevel::Low => {}
            CompressionLevel::Medium => {
                doc.prune_objects();
            }
            CompressionLevel::High => {
                doc.prune_objects();
                doc.delete_zero_length_streams();
                doc.renumber_objects();
            }
        }
        doc.compress();

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| Error::PdfSave(format!("Failed to save compressed PDF: {e}")))?;

        debug!("Compressed {} at {} level to {} bytes", name, level.as_str(), output.len());
        Ok(output)
    }
}
