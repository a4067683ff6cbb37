//! Multipart form intake shared by the document routes.

use aurora_pdf_core::{SourceFile, Toolkit};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::helpers::{ApiError, ApiResult, ResultExt};

/// Parts that carry PDF documents.
const DOCUMENT_FIELDS: [&str; 2] = ["file", "files"];

/// A non-document file part, such as a signature image.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub media_type: String,
    pub bytes: Bytes,
}

/// A parsed upload: validated documents in submission order plus the text
/// fields and any other file parts.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub documents: Vec<SourceFile>,
    fields: HashMap<String, String>,
    attachments: HashMap<String, Attachment>,
}

impl UploadForm {
    /// Read every part of `multipart`, validating documents against the
    /// toolkit's limits as they arrive.
    pub async fn read(toolkit: &Toolkit, mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.or_bad_request()? {
            let name = field.name().unwrap_or("").to_string();

            let Some(filename) = field.file_name().map(str::to_string) else {
                let value = field.text().await.or_bad_request()?;
                form.fields.insert(name, value);
                continue;
            };

            let media_type = field.content_type().map_or_else(
                || mime_guess::from_path(&filename).first_or_octet_stream().to_string(),
                str::to_string,
            );
            let bytes = field.bytes().await.or_bad_request()?;

            if DOCUMENT_FIELDS.contains(&name.as_str()) {
                // Count before accepting so an oversized batch fails fast
                toolkit.accept_batch(form.documents.len() + 1)?;
                let file = toolkit.accept(bytes, filename, media_type)?;
                debug!("Accepted {} ({} bytes)", file.name(), file.len());
                form.documents.push(file);
            } else {
                form.attachments.insert(
                    name,
                    Attachment {
                        filename,
                        media_type,
                        bytes,
                    },
                );
            }
        }

        Ok(form)
    }

    /// Text field value, blank values treated as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Parse a text field, failing with 400 when it is missing or malformed.
    pub fn parse<T: FromStr>(&self, name: &str) -> ApiResult<T> {
        let value = self
            .field(name)
            .ok_or_else(|| ApiError::bad_request(format!("missing field '{name}'")))?;
        value
            .parse()
            .map_err(|_| ApiError::bad_request(format!("invalid value '{value}' for '{name}'")))
    }

    /// Parse an optional text field; missing or malformed values give `None`.
    pub fn parse_or_none<T: FromStr>(&self, name: &str) -> Option<T> {
        self.field(name).and_then(|v| v.parse().ok())
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.get(name)
    }

    /// The single document of a one-file operation.
    pub fn single_document(mut self) -> ApiResult<(SourceFile, Self)> {
        if self.documents.is_empty() {
            return Err(ApiError::bad_request("No file uploaded"));
        }
        let file = self.documents.remove(0);
        Ok((file, self))
    }
}
