//! Catalog of items, typed attributes and typed linkages.
//!
//! Plain parameterized SQL over whatever session/branch is currently active.
//! Writes are meant to run inside a branched mutation; reads default to the
//! trunk and accept an `AS OF` version for point-in-time queries.

/// Typed attribute values on items.
pub mod attributes;
/// Validation and database errors.
pub mod error;
/// Item CRUD.
pub mod items;
/// Typed linkages between items.
pub mod linkages;
/// Registries of item, attribute and linkage types.
pub mod registry;
/// Domain types.
pub mod types;

pub use error::CatalogError;
pub use items::NewItem;
pub use types::{AttributeType, Item, ItemAttribute, Linkage, ValueKind};

use sqlx::mysql::MySqlPool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS item_types (
        name VARCHAR(64) NOT NULL PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS items (
        id CHAR(36) NOT NULL PRIMARY KEY,
        item_type VARCHAR(64) NOT NULL,
        name VARCHAR(255) NOT NULL,
        body TEXT NOT NULL,
        created_at DATETIME(6) NOT NULL,
        updated_at DATETIME(6) NOT NULL,
        KEY idx_items_type (item_type)
    )",
    "CREATE TABLE IF NOT EXISTS attribute_types (
        name VARCHAR(64) NOT NULL PRIMARY KEY,
        value_kind VARCHAR(16) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS item_attributes (
        item_id CHAR(36) NOT NULL,
        attr_type VARCHAR(64) NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (item_id, attr_type)
    )",
    "CREATE TABLE IF NOT EXISTS linkage_types (
        name VARCHAR(64) NOT NULL PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS item_linkages (
        from_item CHAR(36) NOT NULL,
        link_type VARCHAR(64) NOT NULL,
        to_item CHAR(36) NOT NULL,
        PRIMARY KEY (from_item, link_type, to_item),
        KEY idx_linkages_to (to_item)
    )",
];

/// Idempotent schema bootstrap, run once at startup against the trunk.
///
/// # Errors
///
/// Returns an error when a DDL statement fails.
pub async fn ensure_schema(pool: &MySqlPool) -> Result<(), CatalogError> {
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

/// Validate a caller-supplied version reference before splicing it into an
/// `AS OF` clause. Commit hashes are plain alphanumerics; anything else is
/// rejected rather than quoted.
pub(crate) fn validate_version_ref(version: &str) -> Result<&str, CatalogError> {
    if !version.is_empty() && version.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(version)
    } else {
        Err(CatalogError::InvalidVersion(version.to_string()))
    }
}
