//! REST API for the strata kernel.
//!
//! Thin marshaling over the mutation entry point: every write becomes one
//! branched mutation, every read goes straight to the trunk (optionally
//! pinned to an older version with `as_of`).

/// Item endpoints, including attributes.
pub mod items;
/// Linkage endpoints.
pub mod linkages;
/// Type registry endpoints.
pub mod registry;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use crate::catalog::CatalogError;
use crate::mutation::{MutationError, Orchestrator};
use crate::store::{DoltStore, VersionedStore};

/// Shared state behind every handler.
pub struct AppState {
    store: Arc<DoltStore>,
    orchestrator: Orchestrator<DoltStore>,
}

impl AppState {
    /// Build state over a Dolt store client.
    #[must_use]
    pub fn new(store: Arc<DoltStore>, orchestrator: Orchestrator<DoltStore>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    /// The store client.
    #[must_use]
    pub fn store(&self) -> &DoltStore {
        &self.store
    }

    /// The mutation entry point.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator<DoltStore> {
        &self.orchestrator
    }
}

/// API routes mounted under `/api/v1`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(registry::routes())
        .merge(items::routes())
        .merge(linkages::routes())
        .route("/api/v1/version", get(trunk_version))
}

/// Trunk version payload.
#[derive(Debug, Clone, Serialize)]
pub struct VersionResponse {
    /// Current trunk head commit.
    pub version: String,
}

/// GET /api/v1/version
///
/// Current trunk head.
async fn trunk_version(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VersionResponse>, ApiError> {
    let mut session = state
        .store()
        .acquire_session()
        .await
        .map_err(MutationError::ResourceUnavailable)?;
    let head = state
        .store()
        .head(&mut session)
        .await
        .map_err(MutationError::Store)?;
    Ok(Json(VersionResponse {
        version: head.to_string(),
    }))
}

// =============================================================================
// Error Handling
// =============================================================================

/// API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Anything surfaced by the mutation core or the catalog.
    #[error(transparent)]
    Mutation(#[from] MutationError),
    /// Malformed request input.
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        Self::Mutation(MutationError::Validation(err))
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Mutation(MutationError::Validation(err)) => match err {
                CatalogError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                CatalogError::AlreadyExists { .. } => (StatusCode::CONFLICT, "already_exists"),
                CatalogError::InUse { .. } => (StatusCode::CONFLICT, "in_use"),
                CatalogError::TypeMismatch { .. }
                | CatalogError::UnknownValueKind(_)
                | CatalogError::InvalidVersion(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                CatalogError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
            Self::Mutation(MutationError::Conflict { .. }) => (StatusCode::CONFLICT, "conflict"),
            Self::Mutation(MutationError::LockTimeout { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "lock_timeout")
            }
            Self::Mutation(MutationError::ResourceUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "resource_unavailable")
            }
            Self::Mutation(MutationError::BranchCreate { .. } | MutationError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            Self::Mutation(MutationError::Conflict { .. }) => {
                "merge conflict: please retry with fresh data".to_string()
            }
            Self::Mutation(MutationError::LockTimeout { .. }) => {
                "temporarily unavailable, retry".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({ "error": message, "code": code }));
        (status, body).into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================
