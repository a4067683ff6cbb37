use async_trait::async_trait;

use super::{Operation, PipelineRun};
use crate::delivery::{Artifact, OutputName, output_filename};
use crate::error::{Error, Result};
use crate::intake::{FileId, SourceFile};
use crate::jobs::OperationKind;
use crate::pdf::PageAssembler;

/// Fewest inputs a merge accepts.
pub const MIN_MERGE_INPUTS: usize = 2;

/// A merge input and its position in the queue.
#[derive(Debug, Clone)]
pub struct FileOrderEntry {
    pub file: SourceFile,
    /// Always equal to the entry's index in its queue
    pub order: usize,
}

/// Ordered merge inputs.
///
/// Editing returns a new queue; the order keys of every queue are a dense
/// permutation of `0..len`.
#[derive(Debug, Clone, Default)]
pub struct MergeQueue {
    entries: Vec<FileOrderEntry>,
}

impl MergeQueue {
    pub fn new(files: impl IntoIterator<Item = SourceFile>) -> Self {
        Self::from_files(files.into_iter().collect())
    }

    fn from_files(files: Vec<SourceFile>) -> Self {
        let entries = files
            .into_iter()
            .enumerate()
            .map(|(order, file)| FileOrderEntry { file, order })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[FileOrderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The files in merge order.
    pub fn files(&self) -> Vec<SourceFile> {
        self.entries.iter().map(|e| e.file.clone()).collect()
    }

    /// Add a file at the end.
    #[must_use]
    pub fn with_file(&self, file: SourceFile) -> Self {
        let mut files = self.files();
        files.push(file);
        Self::from_files(files)
    }

    /// Move the entry at `from` to position `to`, as a drag-and-drop does.
    /// `None` when either position is outside the queue.
    pub fn moved(&self, from: usize, to: usize) -> Option<Self> {
        if from >= self.len() || to >= self.len() {
            return None;
        }
        let mut files = self.files();
        let file = files.remove(from);
        files.insert(to, file);
        Some(Self::from_files(files))
    }

    /// Drop the file with `id`; unknown ids leave the queue as it was.
    #[must_use]
    pub fn without(&self, id: FileId) -> Self {
        Self::from_files(self.files().into_iter().filter(|f| f.id() != id).collect())
    }
}

/// Concatenate every page of every input, in input order.
#[derive(Debug)]
pub struct MergeOperation {
    files: Vec<SourceFile>,
}

impl MergeOperation {
    /// Fails with [`Error::InsufficientInputs`] for fewer than two files.
    pub fn new(files: Vec<SourceFile>) -> Result<Self> {
        if files.len() < MIN_MERGE_INPUTS {
            return Err(Error::InsufficientInputs {
                required: MIN_MERGE_INPUTS,
                provided: files.len(),
            });
        }
        Ok(Self { files })
    }

    pub fn from_queue(queue: &MergeQueue) -> Result<Self> {
        Self::new(queue.files())
    }
}

#[async_trait]
impl Operation for MergeOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Merge
    }

    fn sources(&self) -> &[SourceFile] {
        &self.files
    }

    async fn execute(&self, run: &mut PipelineRun<'_>) -> Result<()> {
        let total = self.files.len();
        let mut assembler = PageAssembler::new();

        for (done, file) in self.files.iter().enumerate() {
            // Each handle is dropped before the next file is loaded
            let handle = run.load(file).await?;
            assembler = run
                .blocking(move || {
                    assembler.append_all(&handle)?;
                    Ok(assembler)
                })
                .await?;
            run.step(done + 1, total).await?;
        }

        let bytes = run.blocking(move || assembler.finish()).await?;
        let filename = output_filename(self.files[0].name(), OutputName::Merged);
        run.deliver(Artifact::new(filename, bytes)).await
    }
}
