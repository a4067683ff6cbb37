use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use super::{Operation, PipelineRun};
use crate::delivery::{Artifact, OutputName, output_filename};
use crate::error::{Error, Result};
use crate::intake::SourceFile;
use crate::jobs::OperationKind;
use crate::pdf::PageAssembler;
use crate::ranges::{PageRange, parse_ranges, split_by_interval};

/// How a document is cut into parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitSpec {
    /// A new part every N pages
    Interval(NonZeroUsize),
    /// One part per range in a 1-based expression such as `"1-3,5"`
    Ranges(String),
}

impl SplitSpec {
    /// The parts this spec produces for a document of `page_count` pages.
    pub fn ranges(&self, page_count: usize) -> Vec<PageRange> {
        match self {
            Self::Interval(interval) => split_by_interval(page_count, *interval),
            Self::Ranges(expression) => parse_ranges(expression, page_count).ranges,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Interval(interval) => format!("every {interval} pages"),
            Self::Ranges(expression) => expression.clone(),
        }
    }
}

/// Emit one document per range, in range order.
#[derive(Debug)]
pub struct SplitOperation {
    file: [SourceFile; 1],
    spec: SplitSpec,
}

impl SplitOperation {
    pub fn new(file: SourceFile, spec: SplitSpec) -> Self {
        Self { file: [file], spec }
    }
}

#[async_trait]
impl Operation for SplitOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Split
    }

    fn sources(&self) -> &[SourceFile] {
        &self.file
    }

    async fn execute(&self, run: &mut PipelineRun<'_>) -> Result<()> {
        let [file] = &self.file;
        let handle = Arc::new(run.load(file).await?);

        let ranges = self.spec.ranges(handle.page_count());
        if ranges.is_empty() {
            return Err(Error::InvalidRangeSpecification(self.spec.describe()));
        }
        debug!("Splitting {} into {} part(s)", file.name(), ranges.len());

        let total = ranges.len();
        for (done, range) in ranges.iter().enumerate() {
            let source = Arc::clone(&handle);
            let indices = range.to_vec();
            let bytes = run
                .blocking(move || {
                    let mut assembler = PageAssembler::new();
                    assembler.append_pages(&source, &indices)?;
                    assembler.finish()
                })
                .await?;

            let filename = output_filename(file.name(), OutputName::Part(done + 1));
            run.deliver(Artifact::new(filename, bytes)).await?;
            run.step(done + 1, total).await?;
        }
        Ok(())
    }
}
