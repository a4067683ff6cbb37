use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::{Operation, PipelineRun};
use crate::delivery::{Artifact, OutputName, output_filename};
use crate::error::{Error, Result};
use crate::intake::SourceFile;
use crate::jobs::OperationKind;
use crate::pdf::{PageAssembler, PageIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PageItemId(Uuid);

impl PageItemId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PageItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of an organize sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageItem {
    pub id: PageItemId,
    /// Zero-based page of the source document this item copies
    pub source_index: usize,
    pub selected: bool,
}

impl PageItem {
    fn new(source_index: usize) -> Self {
        Self {
            id: PageItemId::new(),
            source_index,
            selected: false,
        }
    }
}

/// The pages an organize operation will output, in output order.
///
/// Every edit returns a new sequence; positions are indices into
/// [`PageSequence::items`] and `None` means the position does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageSequence {
    items: Vec<PageItem>,
}

impl PageSequence {
    /// One item per page, in document order.
    pub fn for_pages(page_count: usize) -> Self {
        Self {
            items: (0..page_count).map(PageItem::new).collect(),
        }
    }

    /// A sequence given directly as 1-based page numbers; repeats duplicate.
    pub fn from_page_numbers(page_numbers: &[usize], page_count: usize) -> Result<Self> {
        let items = page_numbers
            .iter()
            .map(|&n| PageIndex::try_from_page_number(n, page_count).map(|i| PageItem::new(i.as_usize())))
            .collect::<Result<_>>()?;
        Ok(Self { items })
    }

    pub fn items(&self) -> &[PageItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, id: PageItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Source page of every item, in output order.
    pub fn source_indices(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.source_index).collect()
    }

    /// Move the item at `from` to `to`.
    pub fn moved(&self, from: usize, to: usize) -> Option<Self> {
        if from >= self.len() || to >= self.len() {
            return None;
        }
        let mut items = self.items.clone();
        let item = items.remove(from);
        items.insert(to, item);
        Some(Self { items })
    }

    pub fn without(&self, position: usize) -> Option<Self> {
        if position >= self.len() {
            return None;
        }
        let mut items = self.items.clone();
        items.remove(position);
        Some(Self { items })
    }

    /// Insert a copy of the item at `position` directly after it.
    ///
    /// The copy gets a fresh id, so repeating this on the same item puts the
    /// newest copy at the head of the run of copies.
    pub fn with_duplicate(&self, position: usize) -> Option<Self> {
        let source_index = self.items.get(position)?.source_index;
        let mut items = self.items.clone();
        items.insert(position + 1, PageItem::new(source_index));
        Some(Self { items })
    }

    pub fn toggled(&self, position: usize) -> Option<Self> {
        let mut items = self.items.clone();
        let item = items.get_mut(position)?;
        item.selected = !item.selected;
        Some(Self { items })
    }

    /// Drop every selected item.
    #[must_use]
    pub fn without_selected(&self) -> Self {
        Self {
            items: self.items.iter().filter(|item| !item.selected).cloned().collect(),
        }
    }
}

/// Copy pages into a new document following a [`PageSequence`].
#[derive(Debug)]
pub struct OrganizeOperation {
    file: [SourceFile; 1],
    sequence: PageSequence,
}

impl OrganizeOperation {
    pub fn new(file: SourceFile, sequence: PageSequence) -> Self {
        Self { file: [file], sequence }
    }
}

#[async_trait]
impl Operation for OrganizeOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Organize
    }

    fn sources(&self) -> &[SourceFile] {
        &self.file
    }

    async fn execute(&self, run: &mut PipelineRun<'_>) -> Result<()> {
        let [file] = &self.file;
        if self.sequence.is_empty() {
            return Err(Error::InvalidRangeSpecification("no pages left to organize".to_string()));
        }

        let handle = run.load(file).await?;
        run.step(1, 3).await?;

        let indices = self.sequence.source_indices();
        let assembler = run
            .blocking(move || {
                let mut assembler = PageAssembler::new();
                assembler.append_pages(&handle, &indices)?;
                Ok(assembler)
            })
            .await?;
        run.step(2, 3).await?;

        let bytes = run.blocking(move || assembler.finish()).await?;
        let filename = output_filename(file.name(), OutputName::Organized);
        run.deliver(Artifact::new(filename, bytes)).await?;
        run.step(3, 3).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::delivery::MemorySink;
    use crate::jobs::{JobStatus, JobTracker};
    use crate::pdf::testing::{create_test_pdf, document_texts};
    use crate::pipeline::run_operation;
    use std::time::Duration;

    #[test]
    fn test_duplicate_then_delete() {
        let sequence = PageSequence::for_pages(5)
            .with_duplicate(2)
            .unwrap()
            .without(0)
            .unwrap();
        assert_eq!(sequence.source_indices(), vec![1, 2, 2, 3, 4]);
        assert_eq!(sequence.len(), 5);

        // The copy is a distinct item
        assert_ne!(sequence.items()[1].id, sequence.items()[2].id);
    }

    #[test]
    fn test_repeated_duplicate_goes_to_head_of_run() {
        let base = PageSequence::for_pages(2);
        let first = base.with_duplicate(0).unwrap();
        let first_copy = first.items()[1].id;
        let second = first.with_duplicate(0).unwrap();

        assert_eq!(second.source_indices(), vec![0, 0, 0, 1]);
        assert_eq!(second.position(first_copy), Some(2));
    }

    #[test]
    fn test_moves_and_bounds() {
        let sequence = PageSequence::for_pages(4);
        let moved = sequence.moved(3, 0).unwrap();
        assert_eq!(moved.source_indices(), vec![3, 0, 1, 2]);

        assert!(sequence.moved(4, 0).is_none());
        assert!(sequence.without(4).is_none());
        assert!(sequence.with_duplicate(9).is_none());
        assert!(sequence.toggled(4).is_none());
    }

    #[test]
    fn test_delete_selected() {
        let sequence = PageSequence::for_pages(4)
            .toggled(1)
            .unwrap()
            .toggled(3)
            .unwrap();
        assert!(sequence.items()[1].selected);
        assert_eq!(sequence.without_selected().source_indices(), vec![0, 2]);
    }

    #[test]
    fn test_from_page_numbers() {
        let sequence = PageSequence::from_page_numbers(&[3, 1, 1], 3).unwrap();
        assert_eq!(sequence.source_indices(), vec![2, 0, 0]);

        assert!(PageSequence::from_page_numbers(&[0], 3).is_err());
        assert!(matches!(
            PageSequence::from_page_numbers(&[4], 3),
            Err(Error::PageOutOfRange { index: 3, total: 3 })
        ));
    }

    #[tokio::test]
    async fn test_organize_output_follows_sequence() {
        let file = SourceFile::accept(create_test_pdf(5), "deck.pdf", "application/pdf", &LimitsConfig::default()).unwrap();
        let sequence = PageSequence::for_pages(5)
            .with_duplicate(2)
            .unwrap()
            .without(0)
            .unwrap()
            .moved(4, 0)
            .unwrap();

        let tracker = JobTracker::new();
        let sink = MemorySink::new();
        let op = OrganizeOperation::new(file, sequence);
        let report = run_operation(&op, &tracker, &sink, Duration::ZERO).await.unwrap();

        let artifact = &report.artifacts[0];
        assert_eq!(artifact.filename, "deck_organized.pdf");
        assert_eq!(
            document_texts(&artifact.bytes),
            vec!["Page 5", "Page 2", "Page 3", "Page 3", "Page 4"]
        );
    }

    #[tokio::test]
    async fn test_empty_sequence_fails() {
        let file = SourceFile::accept(create_test_pdf(1), "deck.pdf", "application/pdf", &LimitsConfig::default()).unwrap();
        let sequence = PageSequence::for_pages(1).without(0).unwrap();

        let tracker = JobTracker::new();
        let op = OrganizeOperation::new(file, sequence);
        let result = run_operation(&op, &tracker, &MemorySink::new(), Duration::ZERO).await;
        assert!(matches!(result, Err(Error::InvalidRangeSpecification(_))));
        assert_eq!(tracker.list().await[0].status, JobStatus::Error);
    }
}
