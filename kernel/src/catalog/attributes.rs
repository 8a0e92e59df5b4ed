//! Typed attribute values on items.

use sqlx::MySqlConnection;
use tracing::instrument;

use super::items::item_exists;
use super::registry::attribute_type_kind;
use super::{validate_version_ref, CatalogError, ItemAttribute};

/// Set (insert or replace) an attribute on an item.
///
/// The value must parse under the attribute type's registered kind; a
/// mismatch is rejected before anything is written.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] for an unknown item or attribute type
/// and [`CatalogError::TypeMismatch`] for an invalid value.
#[instrument(skip(conn, value))]
pub async fn set_attribute(
    conn: &mut MySqlConnection,
    item_id: &str,
    attr_type: &str,
    value: &str,
) -> Result<ItemAttribute, CatalogError> {
    let kind = attribute_type_kind(conn, attr_type).await?;
    kind.validate(attr_type, value)?;

    if !item_exists(conn, item_id).await? {
        return Err(CatalogError::NotFound {
            entity: "item",
            id: item_id.to_string(),
        });
    }

    sqlx::query(
        "INSERT INTO item_attributes (item_id, attr_type, value) VALUES (?, ?, ?) \
         ON DUPLICATE KEY UPDATE value = VALUES(value)",
    )
    .bind(item_id)
    .bind(attr_type)
    .bind(value)
    .execute(&mut *conn)
    .await?;

    Ok(ItemAttribute {
        attr_type: attr_type.to_string(),
        value: value.to_string(),
    })
}

/// Remove an attribute from an item.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when the attribute was not set.
#[instrument(skip(conn))]
pub async fn unset_attribute(
    conn: &mut MySqlConnection,
    item_id: &str,
    attr_type: &str,
) -> Result<(), CatalogError> {
    let done = sqlx::query("DELETE FROM item_attributes WHERE item_id = ? AND attr_type = ?")
        .bind(item_id)
        .bind(attr_type)
        .execute(&mut *conn)
        .await?;
    if done.rows_affected() == 0 {
        return Err(CatalogError::NotFound {
            entity: "attribute",
            id: format!("{item_id}/{attr_type}"),
        });
    }
    Ok(())
}

/// Attributes attached to an item, optionally pinned to a version.
///
/// # Errors
///
/// Returns an error when the query fails or the version reference is bad.
pub async fn list_attributes(
    conn: &mut MySqlConnection,
    item_id: &str,
    as_of: Option<&str>,
) -> Result<Vec<ItemAttribute>, CatalogError> {
    let sql = match as_of {
        Some(version) => format!(
            "SELECT attr_type, value FROM item_attributes AS OF '{}' \
             WHERE item_id = ? ORDER BY attr_type",
            validate_version_ref(version)?
        ),
        None => {
            "SELECT attr_type, value FROM item_attributes WHERE item_id = ? ORDER BY attr_type"
                .to_string()
        }
    };
    Ok(sqlx::query_as::<_, ItemAttribute>(&sql)
        .bind(item_id)
        .fetch_all(&mut *conn)
        .await?)
}
