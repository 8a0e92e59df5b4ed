//! REST endpoints for the type registries.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};

use super::items::WriteResponse;
use super::{ApiError, AppState};
use crate::catalog::{self, ValueKind};
use crate::mutation::MutationError;
use crate::store::CommitId;

/// Routes for the type registries.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/item-types",
            post(create_item_type).get(list_item_types),
        )
        .route(
            "/api/v1/attribute-types",
            post(create_attribute_type).get(list_attribute_types),
        )
        .route(
            "/api/v1/linkage-types",
            post(create_linkage_type).get(list_linkage_types),
        )
}

/// Request to register a named type.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTypeRequest {
    /// Type name.
    pub name: String,
    /// Expected base version.
    #[serde(default)]
    pub base_version: Option<String>,
}

/// Request to register an attribute type.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAttributeTypeRequest {
    /// Type name.
    pub name: String,
    /// Kind its values must satisfy.
    pub value_kind: ValueKind,
    /// Expected base version.
    #[serde(default)]
    pub base_version: Option<String>,
}

/// Attribute type payload.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeTypeResponse {
    /// Type name.
    pub name: String,
    /// Value kind.
    pub value_kind: ValueKind,
}

/// POST /api/v1/item-types
async fn create_item_type(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTypeRequest>,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let base = req.base_version.map(CommitId::new);
    let message = format!("register item type '{}'", req.name);
    let name = req.name;

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::registry::create_item_type(&mut **session, &name)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            new_version: outcome.new_version.to_string(),
        }),
    ))
}

/// GET /api/v1/item-types
async fn list_item_types(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let mut conn = state
        .store()
        .pool()
        .acquire()
        .await
        .map_err(|e| MutationError::Store(e.into()))?;
    Ok(Json(catalog::registry::list_item_types(&mut conn).await?))
}

/// POST /api/v1/attribute-types
async fn create_attribute_type(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAttributeTypeRequest>,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let base = req.base_version.map(CommitId::new);
    let message = format!("register attribute type '{}'", req.name);
    let name = req.name;
    let kind = req.value_kind;

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::registry::create_attribute_type(&mut **session, &name, kind)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            new_version: outcome.new_version.to_string(),
        }),
    ))
}

/// GET /api/v1/attribute-types
async fn list_attribute_types(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AttributeTypeResponse>>, ApiError> {
    let mut conn = state
        .store()
        .pool()
        .acquire()
        .await
        .map_err(|e| MutationError::Store(e.into()))?;
    let types = catalog::registry::list_attribute_types(&mut conn).await?;
    Ok(Json(
        types
            .into_iter()
            .map(|t| AttributeTypeResponse {
                name: t.name,
                value_kind: t.value_kind,
            })
            .collect(),
    ))
}

/// POST /api/v1/linkage-types
async fn create_linkage_type(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTypeRequest>,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let base = req.base_version.map(CommitId::new);
    let message = format!("register linkage type '{}'", req.name);
    let name = req.name;

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::registry::create_linkage_type(&mut **session, &name)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            new_version: outcome.new_version.to_string(),
        }),
    ))
}

/// GET /api/v1/linkage-types
async fn list_linkage_types(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let mut conn = state
        .store()
        .pool()
        .acquire()
        .await
        .map_err(|e| MutationError::Store(e.into()))?;
    Ok(Json(
        catalog::registry::list_linkage_types(&mut conn).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_type_request_parses_value_kind() {
        let json = r#"{ "name": "color", "value_kind": "text" }"#;
        let req: CreateAttributeTypeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.value_kind, ValueKind::Text);

        let json = r#"{ "name": "due", "value_kind": "timestamp" }"#;
        let req: CreateAttributeTypeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.value_kind, ValueKind::Timestamp);
    }

    #[test]
    fn unknown_value_kind_is_rejected_at_the_edge() {
        let json = r#"{ "name": "size", "value_kind": "decimal" }"#;
        assert!(serde_json::from_str::<CreateAttributeTypeRequest>(json).is_err());
    }
}
