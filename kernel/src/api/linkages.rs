//! REST endpoints for typed linkages between items.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use super::items::{ReadQuery, WriteQuery, WriteResponse};
use super::{ApiError, AppState};
use crate::catalog::{self, Linkage};
use crate::mutation::MutationError;
use crate::store::CommitId;

/// Routes for linkage resources.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/items/{id}/linkages",
            post(add_linkage).get(list_linkages),
        )
        .route(
            "/api/v1/items/{id}/linkages/{link_type}/{to_item}",
            delete(remove_linkage),
        )
}

/// Request to add a linkage from the item in the path.
#[derive(Debug, Clone, Deserialize)]
pub struct AddLinkageRequest {
    /// Registered linkage type.
    pub link_type: String,
    /// Target item id.
    pub to_item: String,
    /// Expected base version.
    #[serde(default)]
    pub base_version: Option<String>,
}

/// Linkage payload.
#[derive(Debug, Clone, Serialize)]
pub struct LinkageResponse {
    /// Source item id.
    pub from_item: String,
    /// Linkage type name.
    pub link_type: String,
    /// Target item id.
    pub to_item: String,
}

/// Response for a linkage write.
#[derive(Debug, Clone, Serialize)]
pub struct LinkageWriteResponse {
    /// The linkage after the write.
    pub linkage: LinkageResponse,
    /// New trunk head.
    pub new_version: String,
}

fn linkage_to_response(linkage: &Linkage) -> LinkageResponse {
    LinkageResponse {
        from_item: linkage.from_item.clone(),
        link_type: linkage.link_type.clone(),
        to_item: linkage.to_item.clone(),
    }
}

/// POST /api/v1/items/{id}/linkages
///
/// Link the item to another item.
async fn add_linkage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddLinkageRequest>,
) -> Result<(StatusCode, Json<LinkageWriteResponse>), ApiError> {
    let base = req.base_version.map(CommitId::new);
    let message = format!("link item {id} -[{}]-> {}", req.link_type, req.to_item);
    let from_item = id.clone();
    let link_type = req.link_type;
    let to_item = req.to_item;

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::linkages::add_linkage(&mut **session, &from_item, &link_type, &to_item)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LinkageWriteResponse {
            linkage: linkage_to_response(&outcome.result),
            new_version: outcome.new_version.to_string(),
        }),
    ))
}

/// GET /api/v1/items/{id}/linkages
///
/// Outbound linkages of the item.
async fn list_linkages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Vec<LinkageResponse>>, ApiError> {
    let mut conn = state
        .store()
        .pool()
        .acquire()
        .await
        .map_err(|e| MutationError::Store(e.into()))?;
    let linkages =
        catalog::linkages::list_linkages(&mut conn, &id, query.as_of.as_deref()).await?;
    Ok(Json(linkages.iter().map(linkage_to_response).collect()))
}

/// DELETE /api/v1/items/{id}/linkages/{link_type}/{to_item}
///
/// Remove a linkage.
async fn remove_linkage(
    State(state): State<Arc<AppState>>,
    Path((id, link_type, to_item)): Path<(String, String, String)>,
    Query(query): Query<WriteQuery>,
) -> Result<Json<WriteResponse>, ApiError> {
    let base = query.base_version.map(CommitId::new);
    let message = format!("unlink item {id} -[{link_type}]-> {to_item}");
    let from_item = id.clone();
    let kind = link_type.clone();
    let target = to_item.clone();

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::linkages::remove_linkage(&mut **session, &from_item, &kind, &target)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok(Json(WriteResponse {
        new_version: outcome.new_version.to_string(),
    }))
}
