//! Document operation routes.
//!
//! Each route reads a multipart upload, runs the matching toolkit operation
//! on its own task against a fresh [`ArtifactStore`], keeps the store for the
//! job, and answers with the first artifact as a download.
//!
//! The job is in the ledger from the moment the operation starts, so a client
//! can find it through `GET /api/jobs` and follow `/api/jobs/{id}/events`
//! while the upload request is still waiting. A client that disconnects does
//! not cancel the job; its artifacts stay downloadable from the job routes.

use aurora_pdf_core::{
    CompressionLevel, DocumentHandle, Error, ImageStamp, JobReport, PageSequence, RotateTarget, RotationPolicy,
    SourceFile, SplitSpec, parse_ranges,
};
use axum::extract::State;
use axum::response::Response;
use axum_extra::extract::Multipart;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{error, info};

use super::upload::UploadForm;
use crate::artifact_store::ArtifactStore;
use crate::helpers::{ApiError, ApiResult, ResultExt, attachment};
use crate::state::AppState;

const MERGED_DOWNLOAD: &str = "merged-document.pdf";
const SPLIT_DOWNLOAD: &str = "split-part-1.pdf";
const ROTATED_DOWNLOAD: &str = "rotated.pdf";

/// Respond with the first artifact of `report`, downloaded as `filename`
/// (the artifact's own name when `None`).
fn first_artifact(report: &JobReport, filename: Option<&str>, extra: &[(&'static str, String)]) -> ApiResult<Response> {
    let artifact = report
        .artifacts
        .first()
        .ok_or_else(|| Error::Unknown(format!("job {} delivered nothing", report.job_id)))?;

    let mut headers = vec![("x-job-id", report.job_id.to_string())];
    headers.extend_from_slice(extra);

    attachment(
        artifact.bytes.clone(),
        filename.unwrap_or(&artifact.filename),
        artifact.media_type(),
        &headers,
    )
}

/// Run an operation on its own task and keep its artifacts once it succeeds.
///
/// `start` receives the state and the store the operation delivers into.
async fn run_detached<F, Fut>(state: &Arc<AppState>, start: F) -> ApiResult<JobReport>
where
    F: FnOnce(Arc<AppState>, Arc<ArtifactStore>) -> Fut,
    Fut: Future<Output = aurora_pdf_core::Result<JobReport>> + Send + 'static,
{
    let store = Arc::new(ArtifactStore::new()?);
    let operation = start(Arc::clone(state), Arc::clone(&store));
    let state = Arc::clone(state);

    let task = tokio::spawn(async move {
        let report = operation.await?;
        state.keep_artifacts(report.job_id, store).await;
        Ok::<_, Error>(report)
    });

    let result = task
        .await
        .map_err(|e| {
            error!("Operation task failed: {}", e);
            e
        })
        .or_internal_error()?;
    Ok(result?)
}

/// Page count of an uploaded document, parsed off the async workers.
async fn count_pages(file: &SourceFile) -> ApiResult<usize> {
    let file = file.clone();
    let count = tokio::task::spawn_blocking(move || DocumentHandle::from_source(&file).map(|h| h.page_count()))
        .await
        .or_internal_error()??;
    Ok(count)
}

/// Interval for split-by-pages; missing, zero or unparseable means 1.
fn page_interval(form: &UploadForm) -> NonZeroUsize {
    form.parse_or_none::<usize>("pageInterval")
        .and_then(NonZeroUsize::new)
        .unwrap_or(NonZeroUsize::MIN)
}

pub async fn merge(State(state): State<Arc<AppState>>, multipart: Multipart) -> ApiResult<Response> {
    let form = UploadForm::read(&state.toolkit, multipart).await?;
    info!("Merging {} file(s)", form.documents.len());

    let files = form.documents;
    let report = run_detached(&state, |state, store| async move { state.toolkit.merge(files, &*store).await }).await?;

    first_artifact(&report, Some(MERGED_DOWNLOAD), &[])
}

pub async fn split(State(state): State<Arc<AppState>>, multipart: Multipart) -> ApiResult<Response> {
    let (file, form) = UploadForm::read(&state.toolkit, multipart).await?.single_document()?;

    let spec = if form.field("mode") == Some("pages") {
        SplitSpec::Interval(page_interval(&form))
    } else {
        SplitSpec::Ranges(form.field("pageRanges").unwrap_or_default().to_string())
    };
    info!("Splitting {} by {}", file.name(), spec.describe());

    let report =
        run_detached(&state, |state, store| async move { state.toolkit.split(file, spec, &*store).await }).await?;

    let parts = report.artifacts.len().to_string();
    first_artifact(&report, Some(SPLIT_DOWNLOAD), &[("x-split-parts", parts)])
}

pub async fn rotate(State(state): State<Arc<AppState>>, multipart: Multipart) -> ApiResult<Response> {
    let (file, form) = UploadForm::read(&state.toolkit, multipart).await?.single_document()?;

    let angle: i64 = form.parse("angle")?;
    let target = if form.field("rotateAll") == Some("true") {
        RotateTarget::All
    } else {
        RotateTarget::Pages(form.field("pageRange").unwrap_or_default().to_string())
    };
    let policy = form
        .field("policy")
        .and_then(RotationPolicy::from_name)
        .unwrap_or(RotationPolicy::Additive);

    let report = run_detached(&state, |state, store| async move {
        state.toolkit.rotate(file, angle, target, Some(policy), &*store).await
    })
    .await?;

    first_artifact(&report, Some(ROTATED_DOWNLOAD), &[])
}

pub async fn organize(State(state): State<Arc<AppState>>, multipart: Multipart) -> ApiResult<Response> {
    let (file, form) = UploadForm::read(&state.toolkit, multipart).await?.single_document()?;

    let order = form.field("order").unwrap_or_default();
    let page_count = count_pages(&file).await?;
    let pages: Vec<usize> = parse_ranges(order, page_count).indices().map(|i| i + 1).collect();
    let sequence = PageSequence::from_page_numbers(&pages, page_count)?;

    let report = run_detached(&state, |state, store| async move {
        state.toolkit.organize(file, sequence, &*store).await
    })
    .await?;

    first_artifact(&report, None, &[])
}

pub async fn sign(State(state): State<Arc<AppState>>, multipart: Multipart) -> ApiResult<Response> {
    let (file, form) = UploadForm::read(&state.toolkit, multipart).await?.single_document()?;

    let image = form
        .attachment("image")
        .ok_or_else(|| ApiError::bad_request("No signature image uploaded"))?;
    if !image.media_type.starts_with("image/") {
        return Err(ApiError::bad_request(format!(
            "signature '{}' is {}, expected an image",
            image.filename, image.media_type
        )));
    }
    let page: usize = form.parse_or_none("page").unwrap_or(1);
    let stamp = ImageStamp {
        page: page
            .checked_sub(1)
            .ok_or_else(|| ApiError::bad_request("pages are numbered from 1"))?,
        x: form.parse("x")?,
        y: form.parse("y")?,
        width: form.parse("width")?,
        height: form.parse("height")?,
        image: image.bytes.clone(),
    };

    let report =
        run_detached(&state, |state, store| async move { state.toolkit.sign(file, stamp, &*store).await }).await?;

    first_artifact(&report, None, &[])
}

pub async fn compress(State(state): State<Arc<AppState>>, multipart: Multipart) -> ApiResult<Response> {
    let (file, form) = UploadForm::read(&state.toolkit, multipart).await?.single_document()?;
    let level = form.field("level").and_then(CompressionLevel::from_name);

    let report =
        run_detached(&state, |state, store| async move { state.toolkit.compress(file, level, &*store).await }).await?;

    first_artifact(&report, None, &[])
}

pub async fn convert(State(state): State<Arc<AppState>>, multipart: Multipart) -> ApiResult<Response> {
    if !state.toolkit.has_converter() {
        return Err(Error::Unsupported("convert").into());
    }
    let (file, _) = UploadForm::read(&state.toolkit, multipart).await?.single_document()?;

    let report =
        run_detached(&state, |state, store| async move { state.toolkit.convert(file, &*store).await }).await?;

    first_artifact(&report, None, &[])
}
