use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::debug;

use super::{Operation, PipelineRun};
use crate::config::RotationPolicy;
use crate::delivery::{Artifact, OutputName, output_filename};
use crate::error::{Error, Result};
use crate::intake::SourceFile;
use crate::jobs::OperationKind;
use crate::ranges::parse_ranges;

/// Which pages a rotation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotateTarget {
    All,
    /// 1-based range expression
    Pages(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotateRequest {
    /// Degrees clockwise, a multiple of 90 (negative turns counter-clockwise)
    pub angle: i64,
    pub target: RotateTarget,
    pub policy: RotationPolicy,
}

impl RotateRequest {
    /// The distinct pages to rotate, ascending.
    ///
    /// Overlapping ranges name a page once, so no page is turned twice in
    /// one invocation whatever the policy.
    pub fn targets(&self, page_count: usize) -> Result<BTreeSet<usize>> {
        let targets = match &self.target {
            RotateTarget::All => (0..page_count).collect(),
            RotateTarget::Pages(expression) => parse_ranges(expression, page_count).index_set(),
        };
        if targets.is_empty() {
            let expression = match &self.target {
                RotateTarget::All => "all pages".to_string(),
                RotateTarget::Pages(expression) => expression.clone(),
            };
            return Err(Error::InvalidRangeSpecification(expression));
        }
        Ok(targets)
    }

    /// Rotation a page ends up with, given its current rotation.
    pub const fn resolve(&self, current: i64) -> i64 {
        match self.policy {
            RotationPolicy::Absolute => self.angle.rem_euclid(360),
            RotationPolicy::Additive => (current.rem_euclid(360) + self.angle.rem_euclid(360)).rem_euclid(360),
        }
    }
}

/// Set the rotation of selected pages; page count and order are unchanged.
#[derive(Debug)]
pub struct RotateOperation {
    file: [SourceFile; 1],
    request: RotateRequest,
}

impl RotateOperation {
    /// Fails with [`Error::InvalidRotation`] unless the angle is a multiple of 90.
    pub fn new(file: SourceFile, request: RotateRequest) -> Result<Self> {
        if request.angle % 90 != 0 {
            return Err(Error::InvalidRotation(request.angle));
        }
        Ok(Self { file: [file], request })
    }
}

#[async_trait]
impl Operation for RotateOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Rotate
    }

    fn sources(&self) -> &[SourceFile] {
        &self.file
    }

    async fn execute(&self, run: &mut PipelineRun<'_>) -> Result<()> {
        let [file] = &self.file;
        let mut handle = run.load(file).await?;
        let targets = self.request.targets(handle.page_count())?;

        let total = targets.len();
        for (done, index) in targets.into_iter().enumerate() {
            let current = handle.rotation(index)?;
            let rotation = self.request.resolve(current);
            handle.set_rotation(index, rotation)?;
            debug!("Page {}: rotation {} -> {}", index + 1, current, rotation);
            run.step(done + 1, total).await?;
        }

        let bytes = run.blocking(move || handle.save()).await?;
        let filename = output_filename(file.name(), OutputName::Rotated);
        run.deliver(Artifact::new(filename, bytes)).await
    }
}
