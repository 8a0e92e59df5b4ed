//! Typed linkages between items.

use sqlx::MySqlConnection;
use tracing::instrument;

use super::items::item_exists;
use super::registry::linkage_type_exists;
use super::{is_unique_violation, validate_version_ref, CatalogError, Linkage};

/// Link `from_item` to `to_item` with a registered linkage type.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] for an unknown linkage type or
/// endpoint and [`CatalogError::AlreadyExists`] for a duplicate linkage.
#[instrument(skip(conn))]
pub async fn add_linkage(
    conn: &mut MySqlConnection,
    from_item: &str,
    link_type: &str,
    to_item: &str,
) -> Result<Linkage, CatalogError> {
    if !linkage_type_exists(conn, link_type).await? {
        return Err(CatalogError::NotFound {
            entity: "linkage type",
            id: link_type.to_string(),
        });
    }
    for endpoint in [from_item, to_item] {
        if !item_exists(conn, endpoint).await? {
            return Err(CatalogError::NotFound {
                entity: "item",
                id: endpoint.to_string(),
            });
        }
    }

    sqlx::query("INSERT INTO item_linkages (from_item, link_type, to_item) VALUES (?, ?, ?)")
        .bind(from_item)
        .bind(link_type)
        .bind(to_item)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CatalogError::AlreadyExists {
                    entity: "linkage",
                    id: format!("{from_item}/{link_type}/{to_item}"),
                }
            } else {
                CatalogError::Db(e)
            }
        })?;

    Ok(Linkage {
        from_item: from_item.to_string(),
        link_type: link_type.to_string(),
        to_item: to_item.to_string(),
    })
}

/// Remove a linkage.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when the linkage does not exist.
#[instrument(skip(conn))]
pub async fn remove_linkage(
    conn: &mut MySqlConnection,
    from_item: &str,
    link_type: &str,
    to_item: &str,
) -> Result<(), CatalogError> {
    let done = sqlx::query(
        "DELETE FROM item_linkages WHERE from_item = ? AND link_type = ? AND to_item = ?",
    )
    .bind(from_item)
    .bind(link_type)
    .bind(to_item)
    .execute(&mut *conn)
    .await?;
    if done.rows_affected() == 0 {
        return Err(CatalogError::NotFound {
            entity: "linkage",
            id: format!("{from_item}/{link_type}/{to_item}"),
        });
    }
    Ok(())
}

/// Outbound linkages of an item, optionally pinned to a version.
///
/// # Errors
///
/// Returns an error when the query fails or the version reference is bad.
pub async fn list_linkages(
    conn: &mut MySqlConnection,
    from_item: &str,
    as_of: Option<&str>,
) -> Result<Vec<Linkage>, CatalogError> {
    let sql = match as_of {
        Some(version) => format!(
            "SELECT from_item, link_type, to_item FROM item_linkages AS OF '{}' \
             WHERE from_item = ? ORDER BY link_type, to_item",
            validate_version_ref(version)?
        ),
        None => "SELECT from_item, link_type, to_item FROM item_linkages \
                 WHERE from_item = ? ORDER BY link_type, to_item"
            .to_string(),
    };
    Ok(sqlx::query_as::<_, Linkage>(&sql)
        .bind(from_item)
        .fetch_all(&mut *conn)
        .await?)
}
