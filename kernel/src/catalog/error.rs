//! Validation and database errors from the catalog.

/// Catalog-level errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Entity lookup failed.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity class, e.g. "item" or "attribute type".
        entity: &'static str,
        /// The identifier that missed.
        id: String,
    },
    /// Uniqueness violated.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Entity class.
        entity: &'static str,
        /// The colliding identifier.
        id: String,
    },
    /// The item still has inbound linkages and cannot be deleted.
    #[error("item {id} is referenced by {count} linkage(s)")]
    InUse {
        /// The item being deleted.
        id: String,
        /// How many linkages still point at it.
        count: u64,
    },
    /// The value does not parse under the attribute type's kind.
    #[error("value {value:?} is not a valid {kind} for attribute type {attr_type}")]
    TypeMismatch {
        /// The attribute type being set.
        attr_type: String,
        /// The kind the value was checked against.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },
    /// Unknown value kind name.
    #[error("unknown value kind: {0}")]
    UnknownValueKind(String),
    /// A version reference that is not a plain commit hash.
    #[error("invalid version reference: {0}")]
    InvalidVersion(String),
    /// Database-level failure.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
