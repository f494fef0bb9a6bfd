// src/routes/analyze_vitals.rs
//! Vitals ingestion endpoint.
//!
//! `POST /analyze_vitals` runs a linear pipeline: method gate, bearer token
//! verification, payload parse, stress scoring, upsert. Each gate either
//! passes the request on or ends it with exactly one response. The upsert
//! is the last step, so a request rejected earlier writes nothing.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::error::{IngestError, ProcessingError};
use crate::{AppContext, VitalsReading, VitalsRecord};

const BEARER_PREFIX: &str = "Bearer ";

/// Largest request body read into memory; a reading is a few dozen bytes.
const MAX_BODY_BYTES: usize = 64 * 1024;

// ---

/// Mounted for every method so non-POST requests get the service's own 405.
pub fn router() -> Router<AppContext> {
    // ---
    Router::new().route("/analyze_vitals", any(handler))
}

/// Handle `/analyze_vitals`.
///
/// Takes the raw request so the body is only read once the method and
/// bearer gates have passed. Responds `201` with the computed score, or
/// with the status of the first gate that rejected the request.
async fn handler(State(ctx): State<AppContext>, request: Request) -> Response {
    // ---
    let (parts, body) = request.into_parts();
    let method = parts.method;
    let headers = parts.headers;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("analyze_vitals", %request_id, %method);

    async move {
        match ingest(&ctx, &method, &headers, body).await {
            Ok(record) => {
                info!(
                    "Processed {} at {}: stress_score={} stress_flag={}",
                    record.crew_id, record.timestamp, record.stress_score, record.stress_flag
                );
                (
                    StatusCode::CREATED,
                    format!(
                        "Processed {}: Stress Score {}",
                        record.crew_id, record.stress_score
                    ),
                )
                    .into_response()
            }
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}

/// Run the gates in order and persist the scored reading.
async fn ingest(
    ctx: &AppContext,
    method: &Method,
    headers: &HeaderMap,
    body: Body,
) -> Result<VitalsRecord, IngestError> {
    // ---
    if *method != Method::POST {
        return Err(IngestError::MethodNotAllowed);
    }

    let token = bearer_token(headers)?;
    let subject = ctx.verifier.verify(token).await?;
    info!("Caller verified: uid = {}", subject.uid);

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(ProcessingError::Body)?;
    let reading = VitalsReading::from_json(&body)?;
    let scored = reading.to_scored();
    debug!(
        "Scored {}: heart_rate={} sleep_hours={} -> {} ({})",
        scored.document_id(),
        scored.heart_rate,
        scored.sleep_hours,
        scored.stress_score,
        scored.stress_flag
    );

    let record = ctx
        .store
        .upsert(&scored)
        .await
        .map_err(ProcessingError::from)?;

    Ok(record)
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, IngestError> {
    // ---
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(IngestError::MissingToken)?
        .to_str()
        .map_err(|_| IngestError::MalformedToken)?;

    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(IngestError::MalformedToken),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::identity::{TokenVerifier, VerifiedSubject, VerifyError};
    use crate::models::{ScoredVitals, StressFlag};
    use crate::store::{MemoryVitalsStore, StoreError, VitalsStore};

    const GOOD_TOKEN: &str = "good-token";

    /// Accepts `GOOD_TOKEN` only and counts every call.
    #[derive(Default)]
    struct StubVerifier {
        calls: AtomicUsize,
    }

    impl StubVerifier {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenVerifier for StubVerifier {
        async fn verify(&self, token: &str) -> Result<VerifiedSubject, VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == GOOD_TOKEN {
                Ok(VerifiedSubject {
                    uid: "user-1".to_string(),
                })
            } else {
                Err(VerifyError::Rejected("TOKEN_EXPIRED".to_string()))
            }
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl VitalsStore for UnavailableStore {
        async fn upsert(&self, _vitals: &ScoredVitals) -> Result<VitalsRecord, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn app(store: Arc<dyn VitalsStore>, verifier: Arc<StubVerifier>) -> Router {
        crate::routes::router(AppContext::new(store, verifier))
    }

    fn request(method: Method, auth: Option<&str>, body: &str) -> Request<Body> {
        // ---
        let mut builder = Request::builder()
            .method(method)
            .uri("/analyze_vitals")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn post(body: &str) -> Request<Body> {
        request(Method::POST, Some("Bearer good-token"), body)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        // ---
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    const REFERENCE_BODY: &str =
        r#"{"crew_id":"C1","heart_rate":100,"sleep_hours":2,"timestamp":"T1"}"#;

    #[tokio::test]
    async fn test_reference_reading_is_scored_and_stored() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let verifier = Arc::new(StubVerifier::default());

        let (status, body) = send(app(store.clone(), verifier.clone()), post(REFERENCE_BODY)).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, "Processed C1: Stress Score 40");
        assert_eq!(verifier.calls(), 1);

        let record = store.get("C1_T1").await.unwrap();
        assert_eq!(record.stress_score, 40.0);
        assert_eq!(record.stress_flag, StressFlag::Normal);
        assert_eq!(record.heart_rate, 100.0);
        assert_eq!(record.sleep_hours, 2.0);
    }

    #[tokio::test]
    async fn test_high_reading_is_clamped() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let body = r#"{"crew_id":"C1","heart_rate":200,"sleep_hours":0,"timestamp":"T9"}"#;

        let (status, text) = send(
            app(store.clone(), Arc::new(StubVerifier::default())),
            post(body),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(text, "Processed C1: Stress Score 100");
        let record = store.get("C1_T9").await.unwrap();
        assert_eq!(record.stress_score, 100.0);
        assert_eq!(record.stress_flag, StressFlag::High);
    }

    #[tokio::test]
    async fn test_numeric_strings_are_accepted() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let body = r#"{"crew_id":"C2","heart_rate":"95","sleep_hours":"0.5","timestamp":"T1"}"#;

        let (status, text) = send(
            app(store.clone(), Arc::new(StubVerifier::default())),
            post(body),
        )
        .await;

        // 95 * 0.6 - 0.5 * 10 = 52
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(text, "Processed C2: Stress Score 52");
        assert_eq!(
            store.get("C2_T1").await.unwrap().stress_flag,
            StressFlag::High
        );
    }

    #[tokio::test]
    async fn test_resubmission_overwrites() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let verifier = Arc::new(StubVerifier::default());
        let second = r#"{"crew_id":"C1","heart_rate":150,"sleep_hours":2,"timestamp":"T1"}"#;

        let (first_status, _) = send(app(store.clone(), verifier.clone()), post(REFERENCE_BODY)).await;
        let (second_status, text) = send(app(store.clone(), verifier.clone()), post(second)).await;

        assert_eq!(first_status, StatusCode::CREATED);
        assert_eq!(second_status, StatusCode::CREATED);
        assert_eq!(text, "Processed C1: Stress Score 70");
        assert_eq!(store.len().await, 1);

        let record = store.get("C1_T1").await.unwrap();
        assert_eq!(record.heart_rate, 150.0);
        assert_eq!(record.stress_flag, StressFlag::High);
    }

    #[tokio::test]
    async fn test_non_post_is_rejected_before_auth() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let verifier = Arc::new(StubVerifier::default());

        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let (status, body) = send(
                app(store.clone(), verifier.clone()),
                request(method, None, REFERENCE_BODY),
            )
            .await;

            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(body, "Only POST requests are accepted");
        }

        assert_eq!(verifier.calls(), 0);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let verifier = Arc::new(StubVerifier::default());

        let (status, body) = send(
            app(store.clone(), verifier.clone()),
            request(Method::POST, None, REFERENCE_BODY),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Unauthorized: No token provided");
        assert_eq!(verifier.calls(), 0);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_authorization_header() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let verifier = Arc::new(StubVerifier::default());

        for auth in ["Token good-token", "bearer good-token", "Bearer ", "good-token"] {
            let (status, body) = send(
                app(store.clone(), verifier.clone()),
                request(Method::POST, Some(auth), REFERENCE_BODY),
            )
            .await;

            assert_eq!(status, StatusCode::UNAUTHORIZED, "header {auth:?}");
            assert_eq!(body, "Unauthorized: Invalid token format");
        }

        assert_eq!(verifier.calls(), 0);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_token_reports_reason() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let verifier = Arc::new(StubVerifier::default());

        let (status, body) = send(
            app(store.clone(), verifier.clone()),
            request(Method::POST, Some("Bearer stale-token"), REFERENCE_BODY),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Invalid token: Identity provider error: TOKEN_EXPIRED");
        assert_eq!(verifier.calls(), 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_missing_crew_id_is_a_processing_error() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let body = r#"{"heart_rate":100,"sleep_hours":2,"timestamp":"T1"}"#;

        let (status, text) = send(
            app(store.clone(), Arc::new(StubVerifier::default())),
            post(body),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text, "Error processing vitals");
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_payloads_share_one_response() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let verifier = Arc::new(StubVerifier::default());
        let bodies = [
            "",
            "{not json",
            r#"{"crew_id":"C1","heart_rate":"fast","sleep_hours":2,"timestamp":"T1"}"#,
            r#"{"crew_id":"C1","heart_rate":-5,"sleep_hours":2,"timestamp":"T1"}"#,
            r#"{"crew_id":"","heart_rate":80,"sleep_hours":2,"timestamp":"T1"}"#,
        ];

        for body in bodies {
            let (status, text) = send(app(store.clone(), verifier.clone()), post(body)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "body {body:?}");
            assert_eq!(text, "Error processing vitals");
        }

        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_a_processing_error() {
        // ---
        let (status, text) = send(
            app(Arc::new(UnavailableStore), Arc::new(StubVerifier::default())),
            post(REFERENCE_BODY),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text, "Error processing vitals");
    }

    #[tokio::test]
    async fn test_oversized_body_does_not_skip_gates() {
        // ---
        let store = Arc::new(MemoryVitalsStore::new());
        let verifier = Arc::new(StubVerifier::default());
        let big = "x".repeat(3 * 1024 * 1024);

        let (status, body) = send(
            app(store.clone(), verifier.clone()),
            request(Method::GET, None, &big),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "Only POST requests are accepted");

        let (status, body) = send(
            app(store.clone(), verifier.clone()),
            request(Method::POST, None, &big),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Unauthorized: No token provided");
        assert_eq!(verifier.calls(), 0);

        let (status, body) = send(app(store.clone(), verifier.clone()), post(&big)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Error processing vitals");
        assert_eq!(verifier.calls(), 1);

        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn test_bearer_token_extraction() {
        // ---
        let mut headers = HeaderMap::new();
        assert!(matches!(
            bearer_token(&headers),
            Err(IngestError::MissingToken)
        ));

        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }
}
