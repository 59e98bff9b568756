pub mod proto;

use std::collections::HashSet;

use crate::auth::Auth;
use crate::change::Change;
use crate::check::{CheckError, EvalError, Predicate};
use crate::relation::{Privilege, Relation};
use crate::schema::SchemaVersion;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("grant record is missing its table")]
    MissingGrantTable,

    #[error("grant record on {relation} is missing its role")]
    MissingGrantRole { relation: Relation },

    #[error("grant record on {relation} has an unknown privilege")]
    UnknownPrivilege { relation: Relation },

    #[error("assign record '{assign_id}' is missing its table")]
    MissingAssignTable { assign_id: String },

    #[error("assign record '{assign_id}' is missing its role source")]
    MissingAssignRole { assign_id: String },

    #[error("invalid check on {relation}: {source}")]
    Check {
        relation: Relation,
        #[source]
        source: CheckError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantRole {
    Anyone,
    Authenticated,
    Application(String),
}

/// A compiled GRANT: what one role may do to one table, possibly restricted
/// to a column set, gated by a CHECK, and limited to a scope subtree.
#[derive(Debug, Clone)]
pub struct Grant {
    pub table: Relation,
    pub privilege: Privilege,
    pub role: GrantRole,
    pub columns: Option<HashSet<String>>,
    pub check: Option<Predicate>,
    pub scope: Option<Relation>,
}

impl Grant {
    pub fn compile(record: &proto::GrantRecord, schema: &SchemaVersion) -> Result<Self, CompileError> {
        let table: Relation = record
            .table
            .as_ref()
            .ok_or(CompileError::MissingGrantTable)?
            .into();

        let privilege = match proto::PrivilegeKind::try_from(record.privilege) {
            Ok(proto::PrivilegeKind::Insert) => Privilege::Insert,
            Ok(proto::PrivilegeKind::Update) => Privilege::Update,
            Ok(proto::PrivilegeKind::Delete) => Privilege::Delete,
            Ok(proto::PrivilegeKind::Select) => Privilege::Select,
            Ok(proto::PrivilegeKind::Unspecified) | Err(_) => {
                return Err(CompileError::UnknownPrivilege { relation: table });
            }
        };

        let role = match &record.role {
            Some(proto::GrantRoleName::Application(name)) => GrantRole::Application(name.clone()),
            Some(proto::GrantRoleName::Predefined(value)) => {
                match proto::PredefinedRole::try_from(*value) {
                    Ok(proto::PredefinedRole::Anyone) => GrantRole::Anyone,
                    Ok(proto::PredefinedRole::Authenticated) => GrantRole::Authenticated,
                    Ok(proto::PredefinedRole::Unspecified) | Err(_) => {
                        return Err(CompileError::MissingGrantRole { relation: table });
                    }
                }
            }
            None => return Err(CompileError::MissingGrantRole { relation: table }),
        };

        let columns = if record.columns.is_empty() {
            None
        } else {
            Some(record.columns.iter().cloned().collect())
        };

        let check = record
            .check
            .as_deref()
            .map(|source| {
                Predicate::compile(source, schema.table(&table)).map_err(|e| CompileError::Check {
                    relation: table.clone(),
                    source: e,
                })
            })
            .transpose()?;

        Ok(Self {
            table,
            privilege,
            role,
            columns,
            check,
            scope: record.scope.as_ref().map(Into::into),
        })
    }

    /// Column rule of §the write path: a column-restricted grant accepts a
    /// change only when every provided column is in its list. Change kinds
    /// without a column set always pass.
    pub fn column_rule(&self, change: &Change) -> bool {
        let Some(allowed) = &self.columns else {
            return true;
        };
        match change.column_set() {
            None => true,
            Some(provided) => provided.iter().all(|column| allowed.contains(column)),
        }
    }

    pub fn check_rule(&self, change: &Change, auth: &Auth) -> Result<bool, EvalError> {
        match &self.check {
            None => Ok(true),
            Some(predicate) => predicate.evaluate(change.check_record(), auth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Record;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn grant_record(privilege: proto::PrivilegeKind) -> proto::GrantRecord {
        proto::GrantRecord {
            table: Some(proto::TableRef::public("issues")),
            privilege: privilege as i32,
            role: Some(proto::GrantRoleName::Application("member".to_string())),
            columns: vec![],
            check: None,
            scope: None,
        }
    }

    #[test]
    fn compile_maps_privilege_and_role() {
        let grant = Grant::compile(&grant_record(proto::PrivilegeKind::Update), &SchemaVersion::default())
            .unwrap();

        assert_eq!(grant.table, Relation::public("issues"));
        assert_eq!(grant.privilege, Privilege::Update);
        assert_eq!(grant.role, GrantRole::Application("member".to_string()));
        assert_eq!(grant.columns, None);
    }

    #[test]
    fn compile_rejects_missing_table() {
        let mut record = grant_record(proto::PrivilegeKind::Insert);
        record.table = None;

        let err = Grant::compile(&record, &SchemaVersion::default()).unwrap_err();

        assert!(matches!(err, CompileError::MissingGrantTable));
    }

    #[test]
    fn compile_rejects_unspecified_privilege() {
        let record = grant_record(proto::PrivilegeKind::Unspecified);

        let err = Grant::compile(&record, &SchemaVersion::default()).unwrap_err();

        assert!(matches!(err, CompileError::UnknownPrivilege { .. }));
    }

    #[test]
    fn compile_rejects_bad_check_expression() {
        let mut record = grant_record(proto::PrivilegeKind::Update);
        record.check = Some("not a valid ( expression".to_string());

        let err = Grant::compile(&record, &SchemaVersion::default()).unwrap_err();

        assert!(matches!(err, CompileError::Check { .. }));
    }

    #[test]
    fn empty_column_list_means_unrestricted() {
        let grant = Grant::compile(&grant_record(proto::PrivilegeKind::Update), &SchemaVersion::default())
            .unwrap();
        let change = Change::update(
            Relation::public("issues"),
            record(&[("id", json!("i1")), ("title", json!("a"))]),
            record(&[("id", json!("i1")), ("title", json!("b"))]),
        );

        assert!(grant.column_rule(&change));
    }

    #[test]
    fn column_rule_rejects_extra_columns() {
        let mut raw = grant_record(proto::PrivilegeKind::Update);
        raw.columns = vec!["title".to_string()];
        let grant = Grant::compile(&raw, &SchemaVersion::default()).unwrap();

        let only_title = Change::update(
            Relation::public("issues"),
            record(&[("id", json!("i1")), ("title", json!("a")), ("priority", json!(1))]),
            record(&[("id", json!("i1")), ("title", json!("b")), ("priority", json!(1))]),
        );
        let title_and_priority = Change::update(
            Relation::public("issues"),
            record(&[("id", json!("i1")), ("title", json!("a")), ("priority", json!(1))]),
            record(&[("id", json!("i1")), ("title", json!("b")), ("priority", json!(2))]),
        );

        assert!(grant.column_rule(&only_title));
        assert!(!grant.column_rule(&title_and_priority));
    }

    #[test]
    fn column_rule_skipped_for_delete() {
        let mut raw = grant_record(proto::PrivilegeKind::Delete);
        raw.columns = vec!["title".to_string()];
        let grant = Grant::compile(&raw, &SchemaVersion::default()).unwrap();

        let change = Change::delete(
            Relation::public("issues"),
            record(&[("id", json!("i1")), ("priority", json!(1))]),
        );

        assert!(grant.column_rule(&change));
    }

    #[test]
    fn check_rule_evaluates_against_change() {
        let mut raw = grant_record(proto::PrivilegeKind::Insert);
        raw.check = Some("row.owner_id = auth.user_id".to_string());
        let grant = Grant::compile(&raw, &SchemaVersion::default()).unwrap();
        let auth = Auth::user("alice");

        let own = Change::insert(
            Relation::public("issues"),
            record(&[("id", json!("i1")), ("owner_id", json!("alice"))]),
        );
        let other = Change::insert(
            Relation::public("issues"),
            record(&[("id", json!("i2")), ("owner_id", json!("bob"))]),
        );

        assert!(grant.check_rule(&own, &auth).unwrap());
        assert!(!grant.check_rule(&other, &auth).unwrap());
    }
}
