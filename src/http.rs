//! HTTP surface over a shared [`ProvenanceRegistry`].
//!
//! | Route                          | Success                                  |
//! |--------------------------------|------------------------------------------|
//! | `GET /merkle-root`             | `{"root", "leaf_count", "published_at"}` |
//! | `GET /tracks/:id/proof`        | `{"track_id", "leaf", "proof", "root"}`  |
//! | `POST /verify`                 | `{"verified": bool}`                     |
//! | `GET /tracks/:id/verification` | `{"verdict": ..}`                        |
//!
//! Storage failures surface as 503 with a generic body; backend details only
//! go to the log.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::merkle::{Hash32, MerkleProof, ProofStep, Side};
use crate::metrics::{record_http_request, LatencyTimer};
use crate::registry::{NotFoundReason, ProvenanceRegistry, RegistryError};

/// Errors returned by the HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("track {track_id} not found: {reason}")]
    NotFound {
        track_id: i64,
        reason: NotFoundReason,
    },

    /// Request body was not valid JSON, missed a field, or carried malformed hex
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No tree loaded, stale root, or a storage failure
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound { track_id, reason } => Self::NotFound { track_id, reason },
            other => {
                warn!(error = %other, "Registry unavailable for request");
                Self::Unavailable(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::NotFound { track_id, reason } => json!({
                "error": "not_found",
                "track_id": track_id,
                "reason": reason,
            }),
            Self::BadRequest(message) => json!({ "error": "bad_request", "message": message }),
            // Never leak backend details
            Self::Unavailable(_) => json!({ "error": "unavailable" }),
        };
        (status, Json(body)).into_response()
    }
}

/// Proof element as posted by clients: a full step, or a bare sibling hash
/// (the shape most JS Merkle libraries emit).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProofStepInput {
    Step { sibling: String, side: Option<Side> },
    Sibling(String),
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    leaf: String,
    proof: Vec<ProofStepInput>,
    root: String,
}

impl VerifyRequest {
    fn parse(self) -> Result<(Hash32, MerkleProof, Hash32), ApiError> {
        let hash = |field: &str, raw: &str| {
            Hash32::from_hex(raw).map_err(|e| ApiError::BadRequest(format!("{field}: {e}")))
        };

        let leaf = hash("leaf", self.leaf.as_str())?;
        let root = hash("root", self.root.as_str())?;

        let mut steps = Vec::with_capacity(self.proof.len());
        for (i, step) in self.proof.iter().enumerate() {
            let (raw, side) = match step {
                ProofStepInput::Step { sibling, side } => (sibling, side.unwrap_or(Side::UNKNOWN)),
                ProofStepInput::Sibling(sibling) => (sibling, Side::UNKNOWN),
            };
            steps.push(ProofStep {
                sibling: hash(&format!("proof[{i}]"), raw.as_str())?,
                side,
            });
        }

        Ok((leaf, MerkleProof::new(steps), root))
    }
}

/// Build the router. Share the registry with the rebuild loop via the `Arc`.
pub fn router(registry: Arc<ProvenanceRegistry>) -> Router {
    Router::new()
        .route("/merkle-root", get(merkle_root))
        .route("/tracks/:id/proof", get(track_proof))
        .route("/tracks/:id/verification", get(track_verification))
        .route("/verify", post(verify))
        .with_state(registry)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(
    addr: SocketAddr,
    registry: Arc<ProvenanceRegistry>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(%addr, error = %e, "Failed to bind HTTP listener");
        e
    })?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown)
        .await
}

fn finish(route: &str, response: Response) -> Response {
    record_http_request(route, response.status().as_u16());
    response
}

async fn merkle_root(State(registry): State<Arc<ProvenanceRegistry>>) -> Response {
    let _timer = LatencyTimer::new("/merkle-root");
    let response = match registry.published_root().await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "root": null }))).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    };
    finish("/merkle-root", response)
}

async fn track_proof(
    State(registry): State<Arc<ProvenanceRegistry>>,
    Path(track_id): Path<i64>,
) -> Response {
    let _timer = LatencyTimer::new("/tracks/:id/proof");
    let response = match registry.proof_for_track(track_id).await {
        Ok(issued) => Json(issued).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    };
    finish("/tracks/:id/proof", response)
}

async fn track_verification(
    State(registry): State<Arc<ProvenanceRegistry>>,
    Path(track_id): Path<i64>,
) -> Response {
    let _timer = LatencyTimer::new("/tracks/:id/verification");
    let response = match registry.verify_track(track_id, None).await {
        Ok(verdict) => Json(json!({ "track_id": track_id, "verdict": verdict })).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    };
    finish("/tracks/:id/verification", response)
}

async fn verify(
    State(registry): State<Arc<ProvenanceRegistry>>,
    request: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let _timer = LatencyTimer::new("/verify");
    let parsed = request
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
        .and_then(|Json(request)| request.parse());
    let response = match parsed {
        Ok((leaf, proof, root)) => {
            let verified = registry.verify(&leaf, &proof, &root);
            Json(json!({ "verified": verified })).into_response()
        }
        Err(e) => e.into_response(),
    };
    finish("/verify", response)
}
