//! Job ledger routes - listing, progress streaming and artifact downloads.

use aurora_pdf_core::{JobId, JobSnapshot};
use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::helpers::{ApiError, ApiResult, OptionExt, ResultExt, attachment};
use crate::state::AppState;

/// A job as returned by the API: its snapshot plus what it delivered.
#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub snapshot: JobSnapshot,
    pub artifacts: Vec<ArtifactView>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactView {
    pub filename: String,
    pub size: usize,
    pub url: String,
}

fn parse_job_id(id: &str) -> ApiResult<JobId> {
    id.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid job id '{id}'")))
}

async fn job_view(state: &AppState, snapshot: JobSnapshot) -> JobView {
    let artifacts = match state.artifacts(snapshot.id).await {
        Some(store) => store
            .entries()
            .into_iter()
            .enumerate()
            .map(|(i, entry)| ArtifactView {
                url: format!("/api/jobs/{}/artifacts/{}", snapshot.id, i + 1),
                filename: entry.filename,
                size: entry.size,
            })
            .collect(),
        None => Vec::new(),
    };
    JobView { snapshot, artifacts }
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobView>> {
    let mut views = Vec::new();
    for snapshot in state.toolkit.tracker().list().await {
        views.push(job_view(&state, snapshot).await);
    }
    Json(views)
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<JobView>> {
    let id = parse_job_id(&id)?;
    let snapshot = state.toolkit.tracker().snapshot(id).await?;
    Ok(Json(job_view(&state, snapshot).await))
}

/// Stream a job's progress as server-sent `progress` events.
///
/// The current state is sent immediately; the stream ends after the
/// terminal state has been sent.
pub async fn job_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let id = parse_job_id(&id)?;
    let mut rx = state.toolkit.tracker().subscribe(id).await?;

    let stream = async_stream::stream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            match Event::default().event("progress").json_data(&snapshot) {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    error!("Failed to encode progress for job {}: {}", id, e);
                    break;
                }
            }

            if snapshot.status.is_terminal() {
                debug!("Progress stream for job {} finished", id);
                break;
            }
            if rx.changed().await.is_err() {
                // Job was swept while streaming
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// Download the `n`th artifact (1-based) a job delivered.
pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path((id, n)): Path<(String, usize)>,
) -> ApiResult<Response> {
    let id = parse_job_id(&id)?;
    let entry = state
        .artifact(id, n)
        .await
        .or_not_found("Artifact not found")?;

    // Read outside any lock
    let data = tokio::fs::read(&entry.path).await.or_internal_error()?;
    attachment(data, &entry.filename, entry.media_type, &[("x-job-id", id.to_string())])
}

pub async fn clear_completed(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.sweep().await;
    Json(json!({ "cleared": cleared }))
}
