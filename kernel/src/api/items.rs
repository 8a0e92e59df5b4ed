//! REST endpoints for items and their attributes.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::catalog::{self, Item, ItemAttribute, NewItem};
use crate::mutation::MutationError;
use crate::store::CommitId;

/// Routes for item resources.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/items", post(create_item).get(list_items))
        .route(
            "/api/v1/items/{id}",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route(
            "/api/v1/items/{id}/attributes/{attr_type}",
            put(set_attribute).delete(unset_attribute),
        )
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to create an item.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemRequest {
    /// Registered item type.
    pub item_type: String,
    /// Display name.
    pub name: String,
    /// Free-form body.
    #[serde(default)]
    pub body: String,
    /// Expected base version; defaults to the trunk head at execution time.
    #[serde(default)]
    pub base_version: Option<String>,
}

/// Request to update an item.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateItemRequest {
    /// New display name, when present.
    #[serde(default)]
    pub name: Option<String>,
    /// New body, when present.
    #[serde(default)]
    pub body: Option<String>,
    /// Expected base version.
    #[serde(default)]
    pub base_version: Option<String>,
}

/// Request to set an attribute value.
#[derive(Debug, Clone, Deserialize)]
pub struct SetAttributeRequest {
    /// The value, validated against the attribute type's kind.
    pub value: String,
    /// Expected base version.
    #[serde(default)]
    pub base_version: Option<String>,
}

/// Query parameters for reads.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReadQuery {
    /// Filter by item type.
    pub item_type: Option<String>,
    /// Pin the read to an older trunk version.
    pub as_of: Option<String>,
}

/// Query parameters for body-less writes.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WriteQuery {
    /// Expected base version.
    pub base_version: Option<String>,
}

/// Item payload.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    /// Item id.
    pub id: String,
    /// Item type name.
    pub item_type: String,
    /// Display name.
    pub name: String,
    /// Free-form body.
    pub body: String,
    /// Creation timestamp (ISO8601).
    pub created_at: String,
    /// Last-update timestamp (ISO8601).
    pub updated_at: String,
}

/// Attribute payload.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeResponse {
    /// Attribute type name.
    pub attr_type: String,
    /// Stored value.
    pub value: String,
}

/// Item detail payload: the item plus its attributes.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDetailResponse {
    /// The item.
    pub item: ItemResponse,
    /// Its attributes.
    pub attributes: Vec<AttributeResponse>,
}

/// Response for an item write: the item plus the trunk version it produced.
#[derive(Debug, Clone, Serialize)]
pub struct ItemWriteResponse {
    /// The item after the write.
    pub item: ItemResponse,
    /// New trunk head.
    pub new_version: String,
}

/// Response for an attribute write.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeWriteResponse {
    /// The attribute after the write.
    pub attribute: AttributeResponse,
    /// New trunk head.
    pub new_version: String,
}

/// Response for a bare write (delete, unset).
#[derive(Debug, Clone, Serialize)]
pub struct WriteResponse {
    /// New trunk head.
    pub new_version: String,
}

fn item_to_response(item: &Item) -> ItemResponse {
    ItemResponse {
        id: item.id.clone(),
        item_type: item.item_type.clone(),
        name: item.name.clone(),
        body: item.body.clone(),
        created_at: item.created_at.to_rfc3339(),
        updated_at: item.updated_at.to_rfc3339(),
    }
}

fn attribute_to_response(attribute: &ItemAttribute) -> AttributeResponse {
    AttributeResponse {
        attr_type: attribute.attr_type.clone(),
        value: attribute.value.clone(),
    }
}

// =============================================================================
// API Handlers
// =============================================================================

/// POST /api/v1/items
///
/// Create an item as one branched mutation.
async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ItemWriteResponse>), ApiError> {
    let base = req.base_version.map(CommitId::new);
    let message = format!("create item '{}'", req.name);
    let new = NewItem {
        item_type: req.item_type,
        name: req.name,
        body: req.body,
    };

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::items::create_item(&mut **session, new)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ItemWriteResponse {
            item: item_to_response(&outcome.result),
            new_version: outcome.new_version.to_string(),
        }),
    ))
}

/// GET /api/v1/items
///
/// List items on the trunk, optionally filtered and pinned.
async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    let mut conn = state
        .store()
        .pool()
        .acquire()
        .await
        .map_err(|e| MutationError::Store(e.into()))?;
    let items = catalog::items::list_items(
        &mut conn,
        query.item_type.as_deref(),
        query.as_of.as_deref(),
    )
    .await?;
    Ok(Json(items.iter().map(item_to_response).collect()))
}

/// GET /api/v1/items/{id}
///
/// Fetch one item with its attributes.
async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ItemDetailResponse>, ApiError> {
    let mut conn = state
        .store()
        .pool()
        .acquire()
        .await
        .map_err(|e| MutationError::Store(e.into()))?;
    let as_of = query.as_of.as_deref();
    let item = catalog::items::get_item(&mut conn, &id, as_of).await?;
    let attributes = catalog::attributes::list_attributes(&mut conn, &id, as_of).await?;
    Ok(Json(ItemDetailResponse {
        item: item_to_response(&item),
        attributes: attributes.iter().map(attribute_to_response).collect(),
    }))
}

/// PATCH /api/v1/items/{id}
///
/// Update an item's name and/or body.
async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<ItemWriteResponse>, ApiError> {
    let base = req.base_version.map(CommitId::new);
    let message = format!("update item {id}");
    let name = req.name;
    let body = req.body;
    let item_id = id.clone();

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::items::update_item(
                    &mut **session,
                    &item_id,
                    name.as_deref(),
                    body.as_deref(),
                )
                .await
                .map_err(MutationError::from)
            })
        })
        .await?;

    Ok(Json(ItemWriteResponse {
        item: item_to_response(&outcome.result),
        new_version: outcome.new_version.to_string(),
    }))
}

/// DELETE /api/v1/items/{id}
///
/// Delete an item; refused while inbound linkages exist.
async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<WriteQuery>,
) -> Result<Json<WriteResponse>, ApiError> {
    let base = query.base_version.map(CommitId::new);
    let message = format!("delete item {id}");
    let item_id = id.clone();

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::items::delete_item(&mut **session, &item_id)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok(Json(WriteResponse {
        new_version: outcome.new_version.to_string(),
    }))
}

/// PUT /api/v1/items/{id}/attributes/{attr_type}
///
/// Set (insert or replace) a typed attribute.
async fn set_attribute(
    State(state): State<Arc<AppState>>,
    Path((id, attr_type)): Path<(String, String)>,
    Json(req): Json<SetAttributeRequest>,
) -> Result<Json<AttributeWriteResponse>, ApiError> {
    let base = req.base_version.map(CommitId::new);
    let message = format!("set attribute {attr_type} on item {id}");
    let value = req.value;
    let item_id = id.clone();
    let attr = attr_type.clone();

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::attributes::set_attribute(&mut **session, &item_id, &attr, &value)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok(Json(AttributeWriteResponse {
        attribute: attribute_to_response(&outcome.result),
        new_version: outcome.new_version.to_string(),
    }))
}

/// DELETE /api/v1/items/{id}/attributes/{attr_type}
///
/// Remove a typed attribute.
async fn unset_attribute(
    State(state): State<Arc<AppState>>,
    Path((id, attr_type)): Path<(String, String)>,
    Query(query): Query<WriteQuery>,
) -> Result<Json<WriteResponse>, ApiError> {
    let base = query.base_version.map(CommitId::new);
    let message = format!("unset attribute {attr_type} on item {id}");
    let item_id = id.clone();
    let attr = attr_type.clone();

    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::attributes::unset_attribute(&mut **session, &item_id, &attr)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;

    Ok(Json(WriteResponse {
        new_version: outcome.new_version.to_string(),
    }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_item_request_deserializes_with_defaults() {
        let json = r#"{
            "item_type": "note",
            "name": "first"
        }"#;

        let req: CreateItemRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.item_type, "note");
        assert_eq!(req.name, "first");
        assert_eq!(req.body, "");
        assert!(req.base_version.is_none());
    }

    #[test]
    fn create_item_request_accepts_pinned_base() {
        let json = r#"{
            "item_type": "note",
            "name": "pinned",
            "body": "text",
            "base_version": "a1b2c3"
        }"#;

        let req: CreateItemRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.base_version.as_deref(), Some("a1b2c3"));
    }

    #[test]
    fn update_item_request_fields_are_optional() {
        let req: UpdateItemRequest = serde_json::from_str("{}").unwrap();
        assert!(req.name.is_none());
        assert!(req.body.is_none());
        assert!(req.base_version.is_none());
    }

    #[test]
    fn item_write_response_serializes_version() {
        let response = ItemWriteResponse {
            item: ItemResponse {
                id: "i1".to_string(),
                item_type: "note".to_string(),
                name: "n".to_string(),
                body: String::new(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
            new_version: "deadbeef".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"new_version\":\"deadbeef\""));
        assert!(json.contains("\"id\":\"i1\""));
    }
}
