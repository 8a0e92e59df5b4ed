//! Tool definitions and dispatch for the MCP front end.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::catalog::{self, CatalogError, NewItem};
use crate::mutation::MutationError;
use crate::store::{CommitId, VersionedStore};

/// Tool failure rendered into an `isError` content frame.
pub(super) struct ToolError {
    pub(super) code: &'static str,
    pub(super) message: String,
    pub(super) retryable: bool,
}

impl From<MutationError> for ToolError {
    fn from(err: MutationError) -> Self {
        let code = match &err {
            MutationError::Validation(CatalogError::NotFound { .. }) => "not_found",
            MutationError::Validation(CatalogError::AlreadyExists { .. }) => "already_exists",
            MutationError::Validation(CatalogError::InUse { .. }) => "in_use",
            MutationError::Validation(_) => "bad_request",
            MutationError::Conflict { .. } => "conflict",
            MutationError::LockTimeout { .. } => "lock_timeout",
            MutationError::ResourceUnavailable(_) => "resource_unavailable",
            MutationError::BranchCreate { .. } | MutationError::Store(_) => "internal",
        };
        Self {
            code,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl From<CatalogError> for ToolError {
    fn from(err: CatalogError) -> Self {
        MutationError::Validation(err).into()
    }
}

fn invalid_args(message: impl Into<String>) -> ToolError {
    ToolError {
        code: "bad_request",
        message: message.into(),
        retryable: false,
    }
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| invalid_args(format!("invalid arguments: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Definitions advertised by `tools/list`.
pub(super) fn tool_definitions() -> Value {
    json!([
        {
            "name": "item_create",
            "description": "Create an item of a registered type",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "item_type": { "type": "string" },
                    "name": { "type": "string" },
                    "body": { "type": "string" },
                    "base_version": { "type": "string" }
                },
                "required": ["item_type", "name"]
            }
        },
        {
            "name": "item_get",
            "description": "Fetch an item with its attributes, optionally at an older version",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "as_of": { "type": "string" }
                },
                "required": ["id"]
            }
        },
        {
            "name": "items_list",
            "description": "List items, optionally filtered by type and pinned to a version",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "item_type": { "type": "string" },
                    "as_of": { "type": "string" }
                }
            }
        },
        {
            "name": "item_update",
            "description": "Update an item's name and/or body",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "name": { "type": "string" },
                    "body": { "type": "string" },
                    "base_version": { "type": "string" }
                },
                "required": ["id"]
            }
        },
        {
            "name": "item_delete",
            "description": "Delete an item (refused while other items link to it)",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "base_version": { "type": "string" }
                },
                "required": ["id"]
            }
        },
        {
            "name": "attribute_set",
            "description": "Set a typed attribute on an item",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "item_id": { "type": "string" },
                    "attr_type": { "type": "string" },
                    "value": { "type": "string" },
                    "base_version": { "type": "string" }
                },
                "required": ["item_id", "attr_type", "value"]
            }
        },
        {
            "name": "attribute_unset",
            "description": "Remove a typed attribute from an item",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "item_id": { "type": "string" },
                    "attr_type": { "type": "string" },
                    "base_version": { "type": "string" }
                },
                "required": ["item_id", "attr_type"]
            }
        },
        {
            "name": "linkage_add",
            "description": "Link one item to another with a registered linkage type",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "from_item": { "type": "string" },
                    "link_type": { "type": "string" },
                    "to_item": { "type": "string" },
                    "base_version": { "type": "string" }
                },
                "required": ["from_item", "link_type", "to_item"]
            }
        },
        {
            "name": "linkage_remove",
            "description": "Remove a linkage between two items",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "from_item": { "type": "string" },
                    "link_type": { "type": "string" },
                    "to_item": { "type": "string" },
                    "base_version": { "type": "string" }
                },
                "required": ["from_item", "link_type", "to_item"]
            }
        },
        {
            "name": "trunk_version",
            "description": "Read the current trunk head commit",
            "inputSchema": { "type": "object", "properties": {} }
        }
    ])
}

/// Dispatch one tool call.
pub(super) async fn call_tool(
    state: &AppState,
    name: &str,
    arguments: Value,
) -> Result<Value, ToolError> {
    match name {
        "item_create" => item_create(state, parse(arguments)?).await,
        "item_get" => item_get(state, parse(arguments)?).await,
        "items_list" => items_list(state, parse(arguments)?).await,
        "item_update" => item_update(state, parse(arguments)?).await,
        "item_delete" => item_delete(state, parse(arguments)?).await,
        "attribute_set" => attribute_set(state, parse(arguments)?).await,
        "attribute_unset" => attribute_unset(state, parse(arguments)?).await,
        "linkage_add" => linkage_add(state, parse(arguments)?).await,
        "linkage_remove" => linkage_remove(state, parse(arguments)?).await,
        "trunk_version" => trunk_version(state).await,
        other => Err(invalid_args(format!("unknown tool: {other}"))),
    }
}

async fn pool_conn(
    state: &AppState,
) -> Result<sqlx::pool::PoolConnection<sqlx::MySql>, ToolError> {
    state
        .store()
        .pool()
        .acquire()
        .await
        .map_err(|e| MutationError::Store(e.into()).into())
}

#[derive(Debug, Deserialize)]
struct ItemCreateArgs {
    item_type: String,
    name: String,
    #[serde(default)]
    body: String,
    base_version: Option<String>,
}

async fn item_create(state: &AppState, args: ItemCreateArgs) -> Result<Value, ToolError> {
    let base = args.base_version.map(CommitId::new);
    let message = format!("create item '{}'", args.name);
    let new = NewItem {
        item_type: args.item_type,
        name: args.name,
        body: args.body,
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
    Ok(json!({
        "item": to_json(&outcome.result),
        "new_version": outcome.new_version.to_string()
    }))
}

#[derive(Debug, Deserialize)]
struct ItemGetArgs {
    id: String,
    as_of: Option<String>,
}

async fn item_get(state: &AppState, args: ItemGetArgs) -> Result<Value, ToolError> {
    let mut conn = pool_conn(state).await?;
    let as_of = args.as_of.as_deref();
    let item = catalog::items::get_item(&mut conn, &args.id, as_of).await?;
    let attributes = catalog::attributes::list_attributes(&mut conn, &args.id, as_of).await?;
    Ok(json!({ "item": to_json(&item), "attributes": to_json(&attributes) }))
}

#[derive(Debug, Deserialize)]
struct ItemsListArgs {
    item_type: Option<String>,
    as_of: Option<String>,
}

async fn items_list(state: &AppState, args: ItemsListArgs) -> Result<Value, ToolError> {
    let mut conn = pool_conn(state).await?;
    let items =
        catalog::items::list_items(&mut conn, args.item_type.as_deref(), args.as_of.as_deref())
            .await?;
    Ok(json!({ "items": to_json(&items) }))
}

#[derive(Debug, Deserialize)]
struct ItemUpdateArgs {
    id: String,
    name: Option<String>,
    body: Option<String>,
    base_version: Option<String>,
}

async fn item_update(state: &AppState, args: ItemUpdateArgs) -> Result<Value, ToolError> {
    let base = args.base_version.map(CommitId::new);
    let message = format!("update item {}", args.id);
    let id = args.id;
    let name = args.name;
    let body = args.body;
    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::items::update_item(&mut **session, &id, name.as_deref(), body.as_deref())
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;
    Ok(json!({
        "item": to_json(&outcome.result),
        "new_version": outcome.new_version.to_string()
    }))
}

#[derive(Debug, Deserialize)]
struct ItemDeleteArgs {
    id: String,
    base_version: Option<String>,
}

async fn item_delete(state: &AppState, args: ItemDeleteArgs) -> Result<Value, ToolError> {
    let base = args.base_version.map(CommitId::new);
    let message = format!("delete item {}", args.id);
    let id = args.id;
    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::items::delete_item(&mut **session, &id)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;
    Ok(json!({ "new_version": outcome.new_version.to_string() }))
}

#[derive(Debug, Deserialize)]
struct AttributeSetArgs {
    item_id: String,
    attr_type: String,
    value: String,
    base_version: Option<String>,
}

async fn attribute_set(state: &AppState, args: AttributeSetArgs) -> Result<Value, ToolError> {
    let base = args.base_version.map(CommitId::new);
    let message = format!("set attribute {} on item {}", args.attr_type, args.item_id);
    let item_id = args.item_id;
    let attr_type = args.attr_type;
    let value = args.value;
    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::attributes::set_attribute(&mut **session, &item_id, &attr_type, &value)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;
    Ok(json!({
        "attribute": to_json(&outcome.result),
        "new_version": outcome.new_version.to_string()
    }))
}

#[derive(Debug, Deserialize)]
struct AttributeUnsetArgs {
    item_id: String,
    attr_type: String,
    base_version: Option<String>,
}

async fn attribute_unset(state: &AppState, args: AttributeUnsetArgs) -> Result<Value, ToolError> {
    let base = args.base_version.map(CommitId::new);
    let message = format!(
        "unset attribute {} on item {}",
        args.attr_type, args.item_id
    );
    let item_id = args.item_id;
    let attr_type = args.attr_type;
    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::attributes::unset_attribute(&mut **session, &item_id, &attr_type)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;
    Ok(json!({ "new_version": outcome.new_version.to_string() }))
}

#[derive(Debug, Deserialize)]
struct LinkageArgs {
    from_item: String,
    link_type: String,
    to_item: String,
    base_version: Option<String>,
}

async fn linkage_add(state: &AppState, args: LinkageArgs) -> Result<Value, ToolError> {
    let base = args.base_version.map(CommitId::new);
    let message = format!(
        "link item {} -[{}]-> {}",
        args.from_item, args.link_type, args.to_item
    );
    let from_item = args.from_item;
    let link_type = args.link_type;
    let to_item = args.to_item;
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
    Ok(json!({
        "linkage": to_json(&outcome.result),
        "new_version": outcome.new_version.to_string()
    }))
}

async fn linkage_remove(state: &AppState, args: LinkageArgs) -> Result<Value, ToolError> {
    let base = args.base_version.map(CommitId::new);
    let message = format!(
        "unlink item {} -[{}]-> {}",
        args.from_item, args.link_type, args.to_item
    );
    let from_item = args.from_item;
    let link_type = args.link_type;
    let to_item = args.to_item;
    let outcome = state
        .orchestrator()
        .run(&message, base, |session| {
            Box::pin(async move {
                catalog::linkages::remove_linkage(&mut **session, &from_item, &link_type, &to_item)
                    .await
                    .map_err(MutationError::from)
            })
        })
        .await?;
    Ok(json!({ "new_version": outcome.new_version.to_string() }))
}

async fn trunk_version(state: &AppState) -> Result<Value, ToolError> {
    let mut session = state
        .store()
        .acquire_session()
        .await
        .map_err(|e| ToolError::from(MutationError::ResourceUnavailable(e)))?;
    let head = state
        .store()
        .head(&mut session)
        .await
        .map_err(|e| ToolError::from(MutationError::Store(e)))?;
    Ok(json!({ "version": head.to_string() }))
}
