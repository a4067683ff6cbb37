use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{Operation, PipelineRun};
use crate::collaborators::Compressor;
use crate::config::CompressionLevel;
use crate::delivery::{Artifact, OutputName, output_filename};
use crate::error::Result;
use crate::intake::SourceFile;
use crate::jobs::OperationKind;

pub struct CompressOperation {
    file: [SourceFile; 1],
    level: CompressionLevel,
    compressor: Arc<dyn Compressor>,
}

impl CompressOperation {
    pub fn new(file: SourceFile, level: CompressionLevel, compressor: Arc<dyn Compressor>) -> Self {
        Self {
            file: [file],
            level,
            compressor,
        }
    }
}

#[async_trait]
impl Operation for CompressOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Compress
    }

    fn sources(&self) -> &[SourceFile] {
        &self.file
    }

    async fn execute(&self, run: &mut PipelineRun<'_>) -> Result<()> {
        let [file] = &self.file;
        let handle = run.load(file).await?;
        run.step(1, 2).await?;

        let compressor = Arc::clone(&self.compressor);
        let level = self.level;
        let bytes = run.blocking(move || compressor.compress(handle, level)).await?;
        info!(
            "{} compressed {} at {} level: {} -> {} bytes",
            self.compressor.name(),
            file.name(),
            self.level.as_str(),
            file.len(),
            bytes.len()
        );

        let filename = output_filename(file.name(), OutputName::Compressed);
        run.deliver(Artifact::new(filename, bytes)).await?;
        run.step(2, 2).await
    }
}
