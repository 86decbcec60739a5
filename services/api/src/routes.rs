//! Router and handlers.

use crate::context::{request_id_middleware, Admin, RequestId};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use ingest::store::clamp_limit;
use ingest::{IngestRequest, RowError, UploadBatch, UploadKind, Uploader};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Room for multipart framing and the `kind` field on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub ok: bool,
    pub batch_id: Uuid,
    pub correlation_id: String,
    pub row_count: i64,
    pub error_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct BatchListResponse {
    ok: bool,
    batches: Vec<UploadBatch>,
    viewer: Uploader,
}

#[derive(Serialize)]
struct BatchResponse {
    ok: bool,
    batch: UploadBatch,
}

#[derive(Serialize)]
struct BatchErrorsResponse {
    ok: bool,
    batch_id: Uuid,
    errors: Vec<RowError>,
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Admin(uploader): Admin,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut kind: Option<String> = None;
    let mut file: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("kind") => kind = Some(field.text().await?),
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                file = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let kind: UploadKind = kind
        .as_deref()
        .and_then(|k| k.parse::<UploadKind>().ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid kind".to_string()))?;
    let (filename, payload) = file
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing file".to_string()))?;

    let outcome = state
        .ingestor
        .ingest(IngestRequest {
            kind,
            filename,
            uploader,
            payload,
            correlation_id: Some(request_id),
        })
        .await?;

    Ok(Json(UploadResponse {
        ok: outcome.is_processed(),
        batch_id: outcome.batch_id,
        correlation_id: outcome.correlation_id,
        row_count: outcome.row_count,
        error_count: outcome.error_count,
        error: outcome.error,
    }))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    Admin(viewer): Admin,
    Query(params): Query<ListQuery>,
) -> Result<Json<BatchListResponse>, ApiError> {
    let batches = state.store.list_batches(clamp_limit(params.limit)).await?;
    Ok(Json(BatchListResponse {
        ok: true,
        batches,
        viewer,
    }))
}

async fn batch_handler(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = state
        .store
        .get_batch(batch_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Batch {batch_id} not found")))?;
    Ok(Json(BatchResponse { ok: true, batch }))
}

async fn batch_errors_handler(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchErrorsResponse>, ApiError> {
    if state.store.get_batch(batch_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Batch {batch_id} not found")));
    }
    let errors = state.store.batch_errors(batch_id).await?;
    Ok(Json(BatchErrorsResponse {
        ok: true,
        batch_id,
        errors,
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.ingestor.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    // CORS for the admin frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/uploads", get(list_handler).post(upload_handler))
        .route("/uploads/:id", get(batch_handler))
        .route("/uploads/:id/errors", get(batch_errors_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AccessPolicy;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use ingest::{BatchStatus, IngestStore, Ingestor, MemoryStore};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ingest-test-boundary";

    fn test_app(max_upload_bytes: usize, policy: AccessPolicy) -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(store.clone(), store.clone()).with_max_upload_bytes(max_upload_bytes);
        let state = Arc::new(AppState::new(ingestor, policy));
        (store, app(state))
    }

    fn multipart_body(kind: Option<&str>, file: Option<(&str, &str)>) -> String {
        let mut body = String::new();
        if let Some(kind) = kind {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"kind\"\r\n\r\n{kind}\r\n"
            ));
        }
        if let Some((filename, content)) = file {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: text/csv\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn upload_request(body: String, email: Option<&str>, request_id: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/uploads")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .header("x-request-id", request_id);
        if let Some(email) = email {
            builder = builder.header("x-user-email", email);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-user-email", "admin@example.com")
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const ACTUALS: &str = "Geography,Product,Week Ending 01-07-24,Week Ending 01-14-24\nStoreA,SKU1,100,-5\n";

    // -------------------------------------------------------------------------
    // UPLOAD
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_upload_processed() {
        let (store, app) = test_app(1024 * 1024, AccessPolicy::default());
        let body = multipart_body(Some("actuals_circana"), Some(("weekly.csv", ACTUALS)));

        let response = app
            .oneshot(upload_request(body, Some("admin@example.com"), "req-upload"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-upload");

        let json = json_body(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["rowCount"], 1);
        assert_eq!(json["errorCount"], 1);
        assert_eq!(json["correlationId"], "req-upload");

        let batches = store.list_batches(10).await.unwrap();
        assert_eq!(batches[0].original_filename.as_deref(), Some("weekly.csv"));
        assert_eq!(store.audit_events().await[0].correlation_id, "req-upload");
    }

    #[tokio::test]
    async fn test_upload_failed_batch_is_200_with_ok_false() {
        let (store, app) = test_app(1024 * 1024, AccessPolicy::default());
        let body = multipart_body(Some("budget"), Some(("b.csv", "Call Point,Weeks\nKroger,4\n")));

        let response = app
            .oneshot(upload_request(body, Some("admin@example.com"), "req-fail"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["ok"], false);
        assert_eq!(
            json["error"],
            "Budget CSV missing required columns (PPG - Item, Total Cases Budgeted)"
        );
        let batch_id: Uuid = json["batchId"].as_str().unwrap().parse().unwrap();
        let batch = store.get_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
    }

    #[tokio::test]
    async fn test_upload_invalid_kind() {
        let (store, app) = test_app(1024 * 1024, AccessPolicy::default());
        let body = multipart_body(Some("forecast"), Some(("x.csv", ACTUALS)));

        let response = app
            .oneshot(upload_request(body, Some("admin@example.com"), "req-kind"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid kind");
        assert!(store.list_batches(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let (_, app) = test_app(1024 * 1024, AccessPolicy::default());
        let body = multipart_body(Some("budget"), None);

        let response = app
            .oneshot(upload_request(body, Some("admin@example.com"), "req-nofile"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Missing file");
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let (store, app) = test_app(16, AccessPolicy::default());
        let body = multipart_body(Some("actuals_circana"), Some(("big.csv", ACTUALS)));

        let response = app
            .oneshot(upload_request(body, Some("admin@example.com"), "req-big"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["error"], "File too large (max 0 MB).");
        assert!(store.list_batches(10).await.unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // IDENTITY
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_anonymous_upload_rejected() {
        let (_, app) = test_app(1024 * 1024, AccessPolicy::default());
        let body = multipart_body(Some("budget"), Some(("b.csv", ACTUALS)));

        let response = app.oneshot(upload_request(body, None, "req-anon")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["x-request-id"], "req-anon");
    }

    #[tokio::test]
    async fn test_caller_not_on_allowlist() {
        let policy = AccessPolicy::new(vec!["boss@example.com".to_string()], Vec::new());
        let (_, app) = test_app(1024 * 1024, policy);
        let body = multipart_body(Some("budget"), Some(("b.csv", ACTUALS)));

        let response = app
            .oneshot(upload_request(body, Some("admin@example.com"), "req-deny"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    // -------------------------------------------------------------------------
    // QUERIES
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_detail_and_errors() {
        let (_, app) = test_app(1024 * 1024, AccessPolicy::default());
        let body = multipart_body(Some("actuals"), Some(("weekly.csv", ACTUALS)));
        let response = app
            .clone()
            .oneshot(upload_request(body, Some("admin@example.com"), "req-1"))
            .await
            .unwrap();
        let batch_id = json_body(response).await["batchId"].as_str().unwrap().to_string();

        let list = json_body(app.clone().oneshot(get_request("/uploads?limit=5")).await.unwrap()).await;
        assert_eq!(list["ok"], true);
        assert_eq!(list["batches"].as_array().unwrap().len(), 1);
        assert_eq!(list["batches"][0]["status"], "processed");
        assert_eq!(list["viewer"]["email"], "admin@example.com");

        let detail = json_body(
            app.clone()
                .oneshot(get_request(&format!("/uploads/{batch_id}")))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(detail["batch"]["kind"], "actuals_circana");
        assert_eq!(detail["batch"]["row_count"], 1);

        let errors = json_body(
            app.clone()
                .oneshot(get_request(&format!("/uploads/{batch_id}/errors")))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(errors["errors"].as_array().unwrap().len(), 1);
        assert_eq!(errors["errors"][0]["row_number"], 2);
        assert_eq!(errors["errors"][0]["message"], "Negative volume not allowed");
    }

    #[tokio::test]
    async fn test_unknown_batch_is_404() {
        let (_, app) = test_app(1024 * 1024, AccessPolicy::default());
        let uri = format!("/uploads/{}/errors", Uuid::new_v4());
        let response = app.oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["ok"], false);
    }

    #[tokio::test]
    async fn test_health_is_public_and_echoes_generated_request_id() {
        let (_, app) = test_app(1024, AccessPolicy::default());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let echoed = response.headers()["x-request-id"].to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&echoed).is_ok());
    }
}
