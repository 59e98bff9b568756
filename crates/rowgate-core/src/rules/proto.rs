//! Wire form of the compiled DDLX rules, as emitted by the rules pipeline.
//! The messages are written by hand instead of generated so the crate builds
//! without a protoc step; tags are part of the stable wire contract.

use crate::relation::Relation;

#[derive(Clone, PartialEq, prost::Message)]
pub struct TableRef {
    #[prost(string, tag = "1")]
    pub schema: String,
    #[prost(string, tag = "2")]
    pub name: String,
}

impl TableRef {
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

impl From<&TableRef> for Relation {
    fn from(table: &TableRef) -> Self {
        Relation::new(table.schema.clone(), table.name.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum PrivilegeKind {
    Unspecified = 0,
    Insert = 1,
    Update = 2,
    Delete = 3,
    Select = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum PredefinedRole {
    Unspecified = 0,
    Anyone = 1,
    Authenticated = 2,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum GrantRoleName {
    #[prost(enumeration = "PredefinedRole", tag = "3")]
    Predefined(i32),
    #[prost(string, tag = "4")]
    Application(String),
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GrantRecord {
    #[prost(message, optional, tag = "1")]
    pub table: Option<TableRef>,
    #[prost(enumeration = "PrivilegeKind", tag = "2")]
    pub privilege: i32,
    #[prost(oneof = "GrantRoleName", tags = "3, 4")]
    pub role: Option<GrantRoleName>,
    /// Empty means the grant is not column-restricted.
    #[prost(string, repeated, tag = "5")]
    pub columns: Vec<String>,
    #[prost(string, optional, tag = "6")]
    pub check: Option<String>,
    #[prost(message, optional, tag = "7")]
    pub scope: Option<TableRef>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum AssignRoleSource {
    #[prost(string, tag = "4")]
    Name(String),
    #[prost(string, tag = "5")]
    Column(String),
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AssignRecord {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(message, optional, tag = "2")]
    pub table: Option<TableRef>,
    #[prost(string, tag = "3")]
    pub user_column: String,
    #[prost(oneof = "AssignRoleSource", tags = "4, 5")]
    pub role: Option<AssignRoleSource>,
    #[prost(message, optional, tag = "6")]
    pub scope: Option<TableRef>,
    /// The ASSIGN's IF clause; a row only confers its role when this holds.
    #[prost(string, optional, tag = "7")]
    pub condition: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Rules {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, repeated, tag = "2")]
    pub grants: Vec<GrantRecord>,
    #[prost(message, repeated, tag = "3")]
    pub assigns: Vec<AssignRecord>,
}
