//! Property types and values.

use crate::item::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    /// UTF-8 text.
    String,
    /// Raw bytes.
    Binary,
    /// 64-bit signed integer.
    Long,
    /// 64-bit float.
    Double,
    /// Boolean.
    Boolean,
    /// A qualified name.
    Name,
    /// A repository path.
    Path,
    /// A reference to another node. Values are target node IDs.
    Reference,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Binary => "Binary",
            Self::Long => "Long",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::Name => "Name",
            Self::Path => "Path",
            Self::Reference => "Reference",
        };
        f.write_str(name)
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 text.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// 64-bit signed integer.
    Long(i64),
    /// 64-bit float.
    Double(f64),
    /// Boolean.
    Boolean(bool),
    /// A qualified name.
    Name(String),
    /// A repository path.
    Path(String),
    /// Target of a REFERENCE property.
    Reference(NodeId),
}

impl Value {
    /// Returns the type tag matching this value.
    #[must_use]
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Binary(_) => PropertyType::Binary,
            Self::Long(_) => PropertyType::Long,
            Self::Double(_) => PropertyType::Double,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Name(_) => PropertyType::Name,
            Self::Path(_) => PropertyType::Path,
            Self::Reference(_) => PropertyType::Reference,
        }
    }

    /// Returns the target node if this is a reference value.
    #[must_use]
    pub fn as_reference(&self) -> Option<NodeId> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Reference(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_tags() {
        assert_eq!(Value::from("x").property_type(), PropertyType::String);
        assert_eq!(Value::from(3_i64).property_type(), PropertyType::Long);
        assert_eq!(Value::from(true).property_type(), PropertyType::Boolean);
        assert_eq!(
            Value::from(NodeId::new()).property_type(),
            PropertyType::Reference
        );
    }

    #[test]
    fn only_references_have_targets() {
        let target = NodeId::new();
        assert_eq!(Value::Reference(target).as_reference(), Some(target));
        assert_eq!(Value::Path("/a".into()).as_reference(), None);
    }
}
