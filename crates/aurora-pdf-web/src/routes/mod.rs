//! HTTP route handlers for the AuroraPDF service.
//!
//! Document routes take multipart uploads and answer with the produced file;
//! job routes expose the ledger as JSON and server-sent events. Errors are
//! always `{"error": msg}` JSON.

mod jobs;
mod pdf;
mod upload;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// All API routes, without middleware.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Document operations
        .route("/api/pdf/merge", post(pdf::merge))
        .route("/api/pdf/split", post(pdf::split))
        .route("/api/pdf/rotate", post(pdf::rotate))
        .route("/api/pdf/organize", post(pdf::organize))
        .route("/api/pdf/sign", post(pdf::sign))
        .route("/api/pdf/compress", post(pdf::compress))
        .route("/api/pdf/convert", post(pdf::convert))
        // Job ledger
        .route("/api/jobs", get(jobs::list_jobs))
        .route("/api/jobs/clear-completed", post(jobs::clear_completed))
        .route("/api/jobs/{id}", get(jobs::get_job))
        .route("/api/jobs/{id}/events", get(jobs::job_events))
        .route("/api/jobs/{id}/artifacts/{n}", get(jobs::download_artifact))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use aurora_pdf_core::AppConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Document, Object, Stream};
    use tower::ServiceExt;

    const BOUNDARY: &str = "aurora-test-boundary";

    /// Build a PDF whose pages each show `Page N`.
    fn create_test_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources = Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]);

        let mut kids = Vec::with_capacity(pages);
        for n in 1..=pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Dictionary(resources.clone())),
                (
                    "MediaBox",
                    Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
                ),
            ]));
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Count", Object::Integer(i64::try_from(pages).unwrap())),
                ("Kids", Object::Array(kids)),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn page_count(bytes: &[u8]) -> usize {
        Document::load_mem(bytes).unwrap().get_pages().len()
    }

    fn rotations(bytes: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| {
                doc.get_dictionary(*id)
                    .unwrap()
                    .get(b"Rotate")
                    .and_then(Object::as_i64)
                    .unwrap_or(0)
            })
            .collect()
    }

    enum Part<'a> {
        File(&'a str, &'a str, Vec<u8>),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: Vec<Part<'_>>) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(name, filename, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}").as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post_form(uri: &str, parts: Vec<Part<'_>>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(AppConfig::default()))
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response {
        router(Arc::clone(state)).oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = send(&state(), get("/api/health")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "OK");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_merge_returns_merged_document() {
        let state = state();
        let request = post_form(
            "/api/pdf/merge",
            vec![
                Part::File("files", "a.pdf", create_test_pdf(2)),
                Part::File("files", "b.pdf", create_test_pdf(3)),
            ],
        );
        let response = send(&state, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "content-type"), "application/pdf");
        assert_eq!(
            header_str(&response, "content-disposition"),
            "attachment; filename=\"merged-document.pdf\""
        );
        assert_eq!(page_count(&body_bytes(response).await), 5);
    }

    #[tokio::test]
    async fn test_merge_single_file_is_bad_request() {
        let state = state();
        let request = post_form("/api/pdf/merge", vec![Part::File("files", "a.pdf", create_test_pdf(1))]);
        let response = send(&state, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("at least 2"));
        assert!(state.toolkit.tracker().is_empty().await);
    }

    #[tokio::test]
    async fn test_non_pdf_upload_rejected() {
        let state = state();
        let request = post_form(
            "/api/pdf/merge",
            vec![
                Part::File("files", "a.pdf", create_test_pdf(1)),
                Part::File("files", "notes.txt", b"hello".to_vec()),
            ],
        );
        let response = send(&state, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("invalid file type"));
    }

    #[tokio::test]
    async fn test_too_many_files_rejected() {
        let mut config = AppConfig::default();
        config.limits.max_files = 2;
        let state = Arc::new(AppState::new(config));

        let parts = (0..3)
            .map(|_| Part::File("files", "a.pdf", create_test_pdf(1)))
            .collect();
        let response = send(&state, post_form("/api/pdf/merge", parts)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("too many files"));
    }

    #[tokio::test]
    async fn test_split_by_interval_returns_first_part() {
        let state = state();
        let request = post_form(
            "/api/pdf/split",
            vec![
                Part::File("file", "report.pdf", create_test_pdf(5)),
                Part::Text("mode", "pages"),
                Part::Text("pageInterval", "2"),
            ],
        );
        let response = send(&state, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-split-parts"), "3");
        assert_eq!(
            header_str(&response, "content-disposition"),
            "attachment; filename=\"split-part-1.pdf\""
        );
        let job_id = header_str(&response, "x-job-id").to_string();
        assert_eq!(page_count(&body_bytes(response).await), 2);

        // Every part stays downloadable under its derived name
        let response = send(&state, get(&format!("/api/jobs/{job_id}/artifacts/3"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_str(&response, "content-disposition"),
            "attachment; filename=\"report_part_3.pdf\""
        );
        assert_eq!(page_count(&body_bytes(response).await), 1);

        let response = send(&state, get(&format!("/api/jobs/{job_id}/artifacts/4"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_split_with_unusable_ranges_is_bad_request() {
        let state = state();
        let request = post_form(
            "/api/pdf/split",
            vec![
                Part::File("file", "report.pdf", create_test_pdf(3)),
                Part::Text("mode", "ranges"),
                Part::Text("pageRanges", "7-9,x"),
            ],
        );
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rotate_is_additive_over_http() {
        let state = state();
        let request = post_form(
            "/api/pdf/rotate",
            vec![
                Part::File("file", "scan.pdf", create_test_pdf(3)),
                Part::Text("angle", "90"),
                Part::Text("rotateAll", "false"),
                Part::Text("pageRange", "1,3"),
            ],
        );
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_str(&response, "content-disposition"),
            "attachment; filename=\"rotated.pdf\""
        );
        let once = body_bytes(response).await;
        assert_eq!(rotations(&once), vec![90, 0, 90]);

        let request = post_form(
            "/api/pdf/rotate",
            vec![
                Part::File("file", "scan.pdf", once),
                Part::Text("angle", "90"),
                Part::Text("rotateAll", "true"),
            ],
        );
        let twice = body_bytes(send(&state, request).await).await;
        assert_eq!(rotations(&twice), vec![180, 90, 180]);
    }

    #[tokio::test]
    async fn test_rotate_rejects_bad_angle() {
        let state = state();
        let request = post_form(
            "/api/pdf/rotate",
            vec![
                Part::File("file", "scan.pdf", create_test_pdf(1)),
                Part::Text("angle", "45"),
                Part::Text("rotateAll", "true"),
            ],
        );
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_organize_follows_order() {
        let state = state();
        let request = post_form(
            "/api/pdf/organize",
            vec![
                Part::File("file", "deck.pdf", create_test_pdf(3)),
                Part::Text("order", "3,1,1"),
            ],
        );
        let response = send(&state, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_str(&response, "content-disposition"),
            "attachment; filename=\"deck_organized.pdf\""
        );
        assert_eq!(page_count(&body_bytes(response).await), 3);
    }

    #[tokio::test]
    async fn test_convert_without_converter_is_not_implemented() {
        let state = state();
        let request = post_form("/api/pdf/convert", vec![Part::File("file", "a.pdf", create_test_pdf(1))]);
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_jobs_listing_and_sweep() {
        let state = state();
        let request = post_form(
            "/api/pdf/compress",
            vec![Part::File("file", "big.pdf", create_test_pdf(2))],
        );
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let job_id = header_str(&response, "x-job-id").to_string();

        let jobs = body_json(send(&state, get("/api/jobs")).await).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        assert_eq!(jobs[0]["status"], "completed");
        assert_eq!(jobs[0]["kind"], "compress");
        assert_eq!(jobs[0]["artifacts"][0]["filename"], "big_compressed.pdf");

        let job = body_json(send(&state, get(&format!("/api/jobs/{job_id}"))).await).await;
        assert_eq!(job["progress"], 100.0);

        let request = Request::builder()
            .method("POST")
            .uri("/api/jobs/clear-completed")
            .body(Body::empty())
            .unwrap();
        let cleared = body_json(send(&state, request).await).await;
        assert_eq!(cleared["cleared"], 1);

        let response = send(&state, get(&format!("/api/jobs/{job_id}"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_job_ids() {
        let state = state();
        let response = send(&state, get("/api/jobs/not-a-uuid")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&state, get(&format!("/api/jobs/{}", aurora_pdf_core::JobId::new()))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_events_stream_ends_with_terminal_state() {
        let state = state();
        let request = post_form(
            "/api/pdf/organize",
            vec![
                Part::File("file", "deck.pdf", create_test_pdf(2)),
                Part::Text("order", "2,1"),
            ],
        );
        let response = send(&state, request).await;
        let job_id = header_str(&response, "x-job-id").to_string();

        let response = send(&state, get(&format!("/api/jobs/{job_id}/events"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("event: progress"));
        assert!(body.contains("\"status\":\"completed\""));
    }

    fn paced_state(pacing_ms: u64) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.pipeline.progress_pacing_ms = pacing_ms;
        Arc::new(AppState::new(config))
    }

    fn merge_request() -> Request<Body> {
        post_form(
            "/api/pdf/merge",
            vec![
                Part::File("files", "a.pdf", create_test_pdf(1)),
                Part::File("files", "b.pdf", create_test_pdf(2)),
            ],
        )
    }

    /// Id of the first job in the ledger, once one shows up.
    async fn wait_for_job(state: &Arc<AppState>) -> String {
        let poll = async {
            loop {
                let jobs = body_json(send(state, get("/api/jobs")).await).await;
                if let Some(id) = jobs[0]["id"].as_str() {
                    return id.to_string();
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), poll).await.unwrap()
    }

    #[tokio::test]
    async fn test_events_follow_a_running_job() {
        let state = paced_state(100);
        let upload = tokio::spawn({
            let state = Arc::clone(&state);
            async move { send(&state, merge_request()).await }
        });

        let job_id = wait_for_job(&state).await;
        let response = send(&state, get(&format!("/api/jobs/{job_id}/events"))).await;
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("\"status\":\"processing\""));
        assert!(body.contains("\"status\":\"completed\""));

        let response = upload.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-job-id"), job_id);

        // The artifact store holds the output, so the ledger does not
        let job = body_json(send(&state, get(&format!("/api/jobs/{job_id}"))).await).await;
        assert_eq!(job["has_result"], false);
        assert_eq!(job["artifacts"][0]["filename"], "merged-document.pdf");
    }

    #[tokio::test]
    async fn test_abandoned_request_still_finishes_job() {
        let state = paced_state(100);
        let abandoned = tokio::time::timeout(std::time::Duration::from_millis(30), send(&state, merge_request())).await;
        assert!(abandoned.is_err());

        let job_id = wait_for_job(&state).await;
        let mut rx = state
            .toolkit
            .tracker()
            .subscribe(job_id.parse().unwrap())
            .await
            .unwrap();
        while !rx.borrow_and_update().status.is_terminal() {
            rx.changed().await.unwrap();
        }

        // keep_artifacts runs right after completion on the same task
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let job = body_json(send(&state, get(&format!("/api/jobs/{job_id}"))).await).await;
        assert_eq!(job["status"], "completed");
        let response = send(&state, get(&format!("/api/jobs/{job_id}/artifacts/1"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(page_count(&body_bytes(response).await), 3);

        // A fresh attempt on the same files is accepted
        let response = send(&state, merge_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
