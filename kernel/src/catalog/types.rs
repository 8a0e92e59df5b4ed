//! Domain types for the catalog.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CatalogError;

/// Kind of value an attribute type accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Arbitrary text.
    Text,
    /// A 64-bit signed integer.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// An RFC 3339 timestamp.
    Timestamp,
}

impl ValueKind {
    /// Canonical lowercase name, as stored.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        }
    }

    /// Parse the stored name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownValueKind`] for anything else.
    pub fn parse(name: &str) -> Result<Self, CatalogError> {
        match name {
            "text" => Ok(Self::Text),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            "timestamp" => Ok(Self::Timestamp),
            other => Err(CatalogError::UnknownValueKind(other.to_string())),
        }
    }

    /// Check `value` against this kind.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::TypeMismatch`] when the value does not parse.
    pub fn validate(self, attr_type: &str, value: &str) -> Result<(), CatalogError> {
        let ok = match self {
            Self::Text => true,
            Self::Integer => value.parse::<i64>().is_ok(),
            Self::Boolean => matches!(value, "true" | "false"),
            Self::Timestamp => DateTime::parse_from_rfc3339(value).is_ok(),
        };
        if ok {
            Ok(())
        } else {
            Err(CatalogError::TypeMismatch {
                attr_type: attr_type.to_string(),
                kind: self.as_str(),
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A generic item.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Item {
    /// Unique id.
    pub id: String,
    /// Registered item type name.
    pub item_type: String,
    /// Display name.
    pub name: String,
    /// Free-form body.
    pub body: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A typed attribute value attached to an item.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ItemAttribute {
    /// Attribute type name.
    pub attr_type: String,
    /// Stored value.
    pub value: String,
}

/// A registered attribute type.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeType {
    /// Type name.
    pub name: String,
    /// Kind its values must satisfy.
    pub value_kind: ValueKind,
}

/// A typed linkage between two items.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Linkage {
    /// Source item id.
    pub from_item: String,
    /// Linkage type name.
    pub link_type: String,
    /// Target item id.
    pub to_item: String,
}
