use async_trait::async_trait;
use std::sync::Arc;

use super::{Operation, PipelineRun};
use crate::collaborators::DocxConverter;
use crate::delivery::{Artifact, OutputName, output_filename};
use crate::error::Result;
use crate::intake::SourceFile;
use crate::jobs::OperationKind;

/// Hand a PDF to a registered [`DocxConverter`].
pub struct ConvertOperation {
    file: [SourceFile; 1],
    converter: Arc<dyn DocxConverter>,
}

impl ConvertOperation {
    pub fn new(file: SourceFile, converter: Arc<dyn DocxConverter>) -> Self {
        Self {
            file: [file],
            converter,
        }
    }
}

#[async_trait]
impl Operation for ConvertOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Convert
    }

    fn sources(&self) -> &[SourceFile] {
        &self.file
    }

    async fn execute(&self, run: &mut PipelineRun<'_>) -> Result<()> {
        let [file] = &self.file;
        let handle = run.load(file).await?;
        run.step(1, 2).await?;

        let converter = Arc::clone(&self.converter);
        let bytes = run.blocking(move || converter.convert_to_docx(&handle)).await?;
        let filename = output_filename(file.name(), OutputName::Docx);
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
    use crate::pdf::DocumentHandle;
    use crate::pdf::testing::create_test_pdf;
    use crate::pipeline::run_operation;
    use std::time::Duration;

    struct PageCountConverter;

    impl DocxConverter for PageCountConverter {
        fn name(&self) -> &'static str {
            "page-count"
        }

        fn convert_to_docx(&self, document: &DocumentHandle) -> Result<Vec<u8>> {
            Ok(format!("{} pages", document.page_count()).into_bytes())
        }
    }

    struct FailingConverter;

    impl DocxConverter for FailingConverter {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn convert_to_docx(&self, _document: &DocumentHandle) -> Result<Vec<u8>> {
            Err(Error::Unknown("converter crashed".to_string()))
        }
    }

    fn file() -> SourceFile {
        SourceFile::accept(create_test_pdf(1), "notes.pdf", "application/pdf", &LimitsConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_convert_uses_registered_converter() {
        let tracker = JobTracker::new();
        let op = ConvertOperation::new(file(), Arc::new(PageCountConverter));
        let report = run_operation(&op, &tracker, &MemorySink::new(), Duration::ZERO).await.unwrap();

        let artifact = &report.artifacts[0];
        assert_eq!(artifact.filename, "notes.docx");
        assert_eq!(artifact.bytes.as_ref(), b"1 pages");
        assert!(artifact.media_type().contains("wordprocessingml"));
    }

    #[tokio::test]
    async fn test_converter_failure_fails_job() {
        let tracker = JobTracker::new();
        let op = ConvertOperation::new(file(), Arc::new(FailingConverter));
        let result = run_operation(&op, &tracker, &MemorySink::new(), Duration::ZERO).await;

        assert!(matches!(result, Err(Error::Unknown(_))));
        assert_eq!(tracker.list().await[0].status, JobStatus::Error);
    }
}
