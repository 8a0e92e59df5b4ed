//! Item CRUD.

use chrono::Utc;
use sqlx::{MySqlConnection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::{validate_version_ref, CatalogError, Item};

/// Fields for a new item.
#[derive(Debug, Clone)]
pub struct NewItem {
    /// Registered item type name.
    pub item_type: String,
    /// Display name.
    pub name: String,
    /// Free-form body.
    pub body: String,
}

const ITEM_COLUMNS: &str = "id, item_type, name, body, created_at, updated_at";

pub(crate) async fn item_exists(
    conn: &mut MySqlConnection,
    id: &str,
) -> Result<bool, CatalogError> {
    let row = sqlx::query("SELECT COUNT(*) FROM items WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    let count: i64 = row.try_get(0)?;
    Ok(count > 0)
}

async fn item_type_exists(conn: &mut MySqlConnection, name: &str) -> Result<bool, CatalogError> {
    let row = sqlx::query("SELECT COUNT(*) FROM item_types WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    let count: i64 = row.try_get(0)?;
    Ok(count > 0)
}

/// Create an item with a fresh id.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when the item type is not registered.
#[instrument(skip(conn, new), fields(item_type = %new.item_type))]
pub async fn create_item(conn: &mut MySqlConnection, new: NewItem) -> Result<Item, CatalogError> {
    if !item_type_exists(conn, &new.item_type).await? {
        return Err(CatalogError::NotFound {
            entity: "item type",
            id: new.item_type,
        });
    }

    let now = Utc::now();
    let item = Item {
        id: Uuid::new_v4().to_string(),
        item_type: new.item_type,
        name: new.name,
        body: new.body,
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO items (id, item_type, name, body, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&item.id)
    .bind(&item.item_type)
    .bind(&item.name)
    .bind(&item.body)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(item)
}

/// Fetch one item, optionally pinned to an older version.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when the item does not exist at the
/// requested version.
pub async fn get_item(
    conn: &mut MySqlConnection,
    id: &str,
    as_of: Option<&str>,
) -> Result<Item, CatalogError> {
    let sql = match as_of {
        Some(version) => format!(
            "SELECT {ITEM_COLUMNS} FROM items AS OF '{}' WHERE id = ?",
            validate_version_ref(version)?
        ),
        None => format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"),
    };
    sqlx::query_as::<_, Item>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CatalogError::NotFound {
            entity: "item",
            id: id.to_string(),
        })
}

/// List items, optionally filtered by type and pinned to a version.
///
/// # Errors
///
/// Returns an error when the query fails or the version reference is bad.
pub async fn list_items(
    conn: &mut MySqlConnection,
    item_type: Option<&str>,
    as_of: Option<&str>,
) -> Result<Vec<Item>, CatalogError> {
    let source = match as_of {
        Some(version) => format!("items AS OF '{}'", validate_version_ref(version)?),
        None => "items".to_string(),
    };
    let items = if let Some(type_name) = item_type {
        let sql =
            format!("SELECT {ITEM_COLUMNS} FROM {source} WHERE item_type = ? ORDER BY created_at");
        sqlx::query_as::<_, Item>(&sql)
            .bind(type_name)
            .fetch_all(&mut *conn)
            .await?
    } else {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM {source} ORDER BY created_at");
        sqlx::query_as::<_, Item>(&sql).fetch_all(&mut *conn).await?
    };
    Ok(items)
}

/// Update an item's name and/or body.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when the item does not exist.
#[instrument(skip(conn, name, body))]
pub async fn update_item(
    conn: &mut MySqlConnection,
    id: &str,
    name: Option<&str>,
    body: Option<&str>,
) -> Result<Item, CatalogError> {
    let current = get_item(conn, id, None).await?;
    let name = name.unwrap_or(&current.name);
    let body = body.unwrap_or(&current.body);
    sqlx::query("UPDATE items SET name = ?, body = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(body)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    get_item(conn, id, None).await
}

/// Delete an item along with its attributes and outbound linkages.
///
/// # Errors
///
/// Returns [`CatalogError::InUse`] while other items still link to it, and
/// [`CatalogError::NotFound`] when it does not exist.
#[instrument(skip(conn))]
pub async fn delete_item(conn: &mut MySqlConnection, id: &str) -> Result<(), CatalogError> {
    if !item_exists(conn, id).await? {
        return Err(CatalogError::NotFound {
            entity: "item",
            id: id.to_string(),
        });
    }

    let row = sqlx::query("SELECT COUNT(*) FROM item_linkages WHERE to_item = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    let inbound: i64 = row.try_get(0)?;
    if inbound > 0 {
        return Err(CatalogError::InUse {
            id: id.to_string(),
            count: u64::try_from(inbound).unwrap_or(u64::MAX),
        });
    }

    sqlx::query("DELETE FROM item_attributes WHERE item_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM item_linkages WHERE from_item = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
