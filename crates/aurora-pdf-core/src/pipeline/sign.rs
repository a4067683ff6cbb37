use async_trait::async_trait;

use super::{Operation, PipelineRun};
use crate::delivery::{Artifact, OutputName, output_filename};
use crate::error::Result;
use crate::intake::SourceFile;
use crate::jobs::OperationKind;
use crate::pdf::{ImageStamp, stamp_image};

/// Stamp a rasterized signature onto one page.
#[derive(Debug)]
pub struct SignOperation {
    file: [SourceFile; 1],
    stamp: ImageStamp,
}

impl SignOperation {
    pub fn new(file: SourceFile, stamp: ImageStamp) -> Self {
        Self { file: [file], stamp }
    }
}

#[async_trait]
impl Operation for SignOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Sign
    }

    fn sources(&self) -> &[SourceFile] {
        &self.file
    }

    async fn execute(&self, run: &mut PipelineRun<'_>) -> Result<()> {
        let [file] = &self.file;
        let mut handle = run.load(file).await?;

        let stamp = self.stamp.clone();
        let bytes = run
            .blocking(move || {
                stamp_image(&mut handle, &stamp)?;
                handle.save()
            })
            .await?;
        run.step(1, 2).await?;

        let filename = output_filename(file.name(), OutputName::Signed);
        run.deliver(Artifact::new(filename, bytes)).await?;
        run.step(2, 2).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::delivery::MemorySink;
    use crate::error::Error;
    use crate::jobs::{JobStatus, JobTracker};
    use crate::pdf::testing::{create_test_pdf, create_test_png, document_texts};
    use crate::pipeline::run_operation;
    use bytes::Bytes;
    use std::time::Duration;

    fn stamp(page: usize, image: Vec<u8>) -> ImageStamp {
        ImageStamp {
            page,
            x: 72.0,
            y: 72.0,
            width: 144.0,
            height: 48.0,
            image: Bytes::from(image),
        }
    }

    fn file() -> SourceFile {
        SourceFile::accept(create_test_pdf(2), "contract.pdf", "application/pdf", &LimitsConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_sign_produces_signed_copy() {
        let tracker = JobTracker::new();
        let sink = MemorySink::new();
        let op = SignOperation::new(file(), stamp(1, create_test_png(8, 4)));

        let report = run_operation(&op, &tracker, &sink, Duration::ZERO).await.unwrap();
        let artifact = &report.artifacts[0];
        assert_eq!(artifact.filename, "contract_signed.pdf");
        assert_eq!(document_texts(&artifact.bytes), vec!["Page 1", "Page 2"]);
        assert!(String::from_utf8_lossy(&artifact.bytes).contains("/SMask"));
    }

    #[tokio::test]
    async fn test_sign_with_bad_image_fails_job() {
        let tracker = JobTracker::new();
        let op = SignOperation::new(file(), stamp(0, b"not a png".to_vec()));

        let result = run_operation(&op, &tracker, &MemorySink::new(), Duration::ZERO).await;
        assert!(matches!(result, Err(Error::InvalidStamp(_))));
        assert_eq!(tracker.list().await[0].status, JobStatus::Error);
    }
}
