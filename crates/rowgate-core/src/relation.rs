use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub schema: String,
    pub name: String,
}

impl Relation {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn public(name: impl Into<String>) -> Self {
        Self::new("public", name)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\".\"{}\"", self.schema, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Privilege {
    Insert,
    Update,
    Delete,
    Select,
}

impl Privilege {
    /// Verb fragment used in denial messages, trailing space included.
    pub fn verb(&self) -> &'static str {
        match self {
            Privilege::Insert => "INSERT INTO ",
            Privilege::Update => "UPDATE ",
            Privilege::Delete => "DELETE FROM ",
            Privilege::Select => "SELECT ",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Select => "SELECT",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TablePermission {
    pub relation: Relation,
    pub privilege: Privilege,
}

impl TablePermission {
    pub fn new(relation: Relation, privilege: Privilege) -> Self {
        Self {
            relation,
            privilege,
        }
    }
}

impl fmt::Display for TablePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ON {}", self.privilege, self.relation)
    }
}

/// Opaque primary-key value. Composite keys join their parts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Self> {
        let mut parts = Vec::new();
        for value in values {
            match value {
                Value::String(s) => parts.push(s.clone()),
                Value::Number(n) => parts.push(n.to_string()),
                Value::Bool(b) => parts.push(b.to_string()),
                Value::Null => return None,
                other => parts.push(other.to_string()),
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts.join("/")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn relation_display_quotes_both_parts() {
        let relation = Relation::public("issues");

        assert_eq!(relation.to_string(), "\"public\".\"issues\"");
    }

    #[test]
    fn relation_equality_covers_schema() {
        assert_ne!(Relation::new("app", "issues"), Relation::public("issues"));
        assert_eq!(Relation::public("issues"), Relation::public("issues"));
    }

    #[test]
    fn privilege_verbs_match_denial_format() {
        assert_eq!(Privilege::Insert.verb(), "INSERT INTO ");
        assert_eq!(Privilege::Update.verb(), "UPDATE ");
        assert_eq!(Privilege::Delete.verb(), "DELETE FROM ");
    }

    #[test]
    fn table_permission_hash_consistent_with_equality() {
        use std::collections::HashSet;

        let a = TablePermission::new(Relation::public("issues"), Privilege::Update);
        let b = TablePermission::new(Relation::public("issues"), Privilege::Update);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn row_id_from_single_value() {
        let id = RowId::from_values([&json!("i1")]).unwrap();

        assert_eq!(id, RowId::new("i1"));
    }

    #[test]
    fn row_id_from_number_value() {
        let id = RowId::from_values([&json!(42)]).unwrap();

        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn row_id_composite_joins_with_slash() {
        let a = json!("p1");
        let b = json!(7);
        let id = RowId::from_values([&a, &b]).unwrap();

        assert_eq!(id.as_str(), "p1/7");
    }

    #[test]
    fn row_id_null_part_yields_none() {
        let a = json!("p1");
        let b = Value::Null;

        assert_eq!(RowId::from_values([&a, &b]), None);
        assert_eq!(RowId::from_values([]), None);
    }
}
