//! Registries of item, attribute and linkage types.

use sqlx::{MySqlConnection, Row};

use super::{is_unique_violation, AttributeType, CatalogError, ValueKind};

/// Register a new item type.
///
/// # Errors
///
/// Returns [`CatalogError::AlreadyExists`] when the name is taken.
pub async fn create_item_type(conn: &mut MySqlConnection, name: &str) -> Result<(), CatalogError> {
    sqlx::query("INSERT INTO item_types (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CatalogError::AlreadyExists {
                    entity: "item type",
                    id: name.to_string(),
                }
            } else {
                CatalogError::Db(e)
            }
        })?;
    Ok(())
}

/// List registered item types.
///
/// # Errors
///
/// Returns an error when the query fails.
pub async fn list_item_types(conn: &mut MySqlConnection) -> Result<Vec<String>, CatalogError> {
    let rows = sqlx::query("SELECT name FROM item_types ORDER BY name")
        .fetch_all(&mut *conn)
        .await?;
    let mut names = Vec::with_capacity(rows.len());
    for row in rows {
        names.push(row.try_get::<String, _>("name")?);
    }
    Ok(names)
}

/// Register a new attribute type with its value kind.
///
/// # Errors
///
/// Returns [`CatalogError::AlreadyExists`] when the name is taken.
pub async fn create_attribute_type(
    conn: &mut MySqlConnection,
    name: &str,
    kind: ValueKind,
) -> Result<(), CatalogError> {
    sqlx::query("INSERT INTO attribute_types (name, value_kind) VALUES (?, ?)")
        .bind(name)
        .bind(kind.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CatalogError::AlreadyExists {
                    entity: "attribute type",
                    id: name.to_string(),
                }
            } else {
                CatalogError::Db(e)
            }
        })?;
    Ok(())
}

/// List registered attribute types.
///
/// # Errors
///
/// Returns an error when the query fails or a stored kind is unreadable.
pub async fn list_attribute_types(
    conn: &mut MySqlConnection,
) -> Result<Vec<AttributeType>, CatalogError> {
    let rows = sqlx::query("SELECT name, value_kind FROM attribute_types ORDER BY name")
        .fetch_all(&mut *conn)
        .await?;
    let mut types = Vec::with_capacity(rows.len());
    for row in rows {
        types.push(AttributeType {
            name: row.try_get("name")?,
            value_kind: ValueKind::parse(&row.try_get::<String, _>("value_kind")?)?,
        });
    }
    Ok(types)
}

/// Look up the value kind of one attribute type.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when the type is not registered.
pub async fn attribute_type_kind(
    conn: &mut MySqlConnection,
    name: &str,
) -> Result<ValueKind, CatalogError> {
    let row = sqlx::query("SELECT value_kind FROM attribute_types WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CatalogError::NotFound {
            entity: "attribute type",
            id: name.to_string(),
        })?;
    ValueKind::parse(&row.try_get::<String, _>("value_kind")?)
}

/// Register a new linkage type.
///
/// # Errors
///
/// Returns [`CatalogError::AlreadyExists`] when the name is taken.
pub async fn create_linkage_type(
    conn: &mut MySqlConnection,
    name: &str,
) -> Result<(), CatalogError> {
    sqlx::query("INSERT INTO linkage_types (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CatalogError::AlreadyExists {
                    entity: "linkage type",
                    id: name.to_string(),
                }
            } else {
                CatalogError::Db(e)
            }
        })?;
    Ok(())
}

/// List registered linkage types.
///
/// # Errors
///
/// Returns an error when the query fails.
pub async fn list_linkage_types(conn: &mut MySqlConnection) -> Result<Vec<String>, CatalogError> {
    let rows = sqlx::query("SELECT name FROM linkage_types ORDER BY name")
        .fetch_all(&mut *conn)
        .await?;
    let mut names = Vec::with_capacity(rows.len());
    for row in rows {
        names.push(row.try_get::<String, _>("name")?);
    }
    Ok(names)
}

/// Whether a linkage type is registered.
///
/// # Errors
///
/// Returns an error when the query fails.
pub(crate) async fn linkage_type_exists(
    conn: &mut MySqlConnection,
    name: &str,
) -> Result<bool, CatalogError> {
    let row = sqlx::query("SELECT COUNT(*) FROM linkage_types WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    let count: i64 = row.try_get(0)?;
    Ok(count > 0)
}
