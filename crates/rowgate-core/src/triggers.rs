use std::collections::HashMap;

use serde_json::Value;

use crate::auth::Auth;
use crate::change::{Change, Record};
use crate::check::{EvalError, Predicate};
use crate::relation::Relation;
use crate::role::Role;
use crate::rules::{CompileError, proto};
use crate::schema::SchemaVersion;

#[derive(Debug, Clone)]
pub enum RoleNameSource {
    Static(String),
    Column(String),
}

/// One ASSIGN compiled into a handler keyed on its user-role table. Fired
/// for every change the write buffer applies.
#[derive(Debug, Clone)]
pub struct AssignTrigger {
    pub assign_id: String,
    pub table: Relation,
    pub user_column: String,
    pub source: RoleNameSource,
    pub scope: Option<Relation>,
    pub condition: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoleEvent {
    Insert(Role),
    Update { old: Role, new: Role },
    Delete(Role),
}

#[derive(Debug, Clone, Default)]
pub struct TriggerTable {
    by_table: HashMap<Relation, Vec<AssignTrigger>>,
}

impl TriggerTable {
    pub fn compile(
        assigns: &[proto::AssignRecord],
        schema: &SchemaVersion,
    ) -> Result<Self, CompileError> {
        let mut by_table: HashMap<Relation, Vec<AssignTrigger>> = HashMap::new();
        for assign in assigns {
            let table: Relation = assign
                .table
                .as_ref()
                .ok_or_else(|| CompileError::MissingAssignTable {
                    assign_id: assign.id.clone(),
                })?
                .into();
            let source = match &assign.role {
                Some(proto::AssignRoleSource::Name(name)) => RoleNameSource::Static(name.clone()),
                Some(proto::AssignRoleSource::Column(column)) => {
                    RoleNameSource::Column(column.clone())
                }
                None => {
                    return Err(CompileError::MissingAssignRole {
                        assign_id: assign.id.clone(),
                    });
                }
            };
            let condition = assign
                .condition
                .as_deref()
                .map(|text| {
                    Predicate::compile(text, schema.table(&table)).map_err(|e| {
                        CompileError::Check {
                            relation: table.clone(),
                            source: e,
                        }
                    })
                })
                .transpose()?;

            let trigger = AssignTrigger {
                assign_id: assign.id.clone(),
                table: table.clone(),
                user_column: assign.user_column.clone(),
                source,
                scope: assign.scope.as_ref().map(Into::into),
                condition,
            };
            by_table.entry(table).or_default().push(trigger);
        }
        Ok(Self { by_table })
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }

    /// Role events produced by one change, per the binding matrix: a row
    /// binds the current user when its user column matches and the ASSIGN's
    /// IF clause holds.
    pub fn fire(
        &self,
        schema: &SchemaVersion,
        change: &Change,
        auth: &Auth,
    ) -> Result<Vec<RoleEvent>, EvalError> {
        let Some(user_id) = auth.user_id.as_deref() else {
            return Ok(Vec::new());
        };
        let Some(triggers) = self.by_table.get(change.relation()) else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for trigger in triggers {
            match change {
                Change::Insert(insert) => {
                    if trigger.binds(&insert.record, user_id, auth)?
                        && let Some(role) = trigger.role_for(schema, &insert.record)
                    {
                        events.push(RoleEvent::Insert(role));
                    }
                }
                Change::Delete(delete) => {
                    if trigger.binds(&delete.old_record, user_id, auth)?
                        && let Some(role) = trigger.role_for(schema, &delete.old_record)
                    {
                        events.push(RoleEvent::Delete(role));
                    }
                }
                Change::Update(update) => {
                    let was_bound = trigger.binds(&update.old_record, user_id, auth)?;
                    let is_bound = trigger.binds(&update.record, user_id, auth)?;
                    match (was_bound, is_bound) {
                        (true, true) => {
                            if let (Some(old), Some(new)) = (
                                trigger.role_for(schema, &update.old_record),
                                trigger.role_for(schema, &update.record),
                            ) {
                                events.push(RoleEvent::Update { old, new });
                            }
                        }
                        (true, false) => {
                            if let Some(old) = trigger.role_for(schema, &update.old_record) {
                                events.push(RoleEvent::Delete(old));
                            }
                        }
                        (false, true) => {
                            if let Some(new) = trigger.role_for(schema, &update.record) {
                                events.push(RoleEvent::Insert(new));
                            }
                        }
                        (false, false) => {}
                    }
                }
                // Synthetic: the original update already fired.
                Change::ScopeMove(_) => {}
            }
        }
        Ok(events)
    }
}

impl AssignTrigger {
    fn binds(&self, record: &Record, user_id: &str, auth: &Auth) -> Result<bool, EvalError> {
        let bound = matches!(record.get(&self.user_column), Some(Value::String(s)) if s == user_id);
        if !bound {
            return Ok(false);
        }
        match &self.condition {
            None => Ok(true),
            Some(predicate) => predicate.evaluate(record, auth),
        }
    }

    /// The role a bound row confers, if its name and scope resolve.
    fn role_for(&self, schema: &SchemaVersion, record: &Record) -> Option<Role> {
        let user_id = match record.get(&self.user_column) {
            Some(Value::String(s)) => s.clone(),
            _ => return None,
        };
        let role = match &self.source {
            RoleNameSource::Static(name) => name.clone(),
            RoleNameSource::Column(column) => match record.get(column) {
                Some(Value::String(s)) => s.clone(),
                _ => return None,
            },
        };
        match &self.scope {
            None => Some(Role::Unscoped {
                assign_id: self.assign_id.clone(),
                user_id,
                role,
            }),
            Some(scope_relation) => {
                let table = schema.table(&self.table)?;
                let fk = table
                    .foreign_keys
                    .iter()
                    .find(|fk| &fk.parent == scope_relation)?;
                let values = fk
                    .columns
                    .iter()
                    .map(|column| record.get(column))
                    .collect::<Option<Vec<_>>>()?;
                let scope_id = crate::relation::RowId::from_values(values)?;
                Some(Role::Scoped {
                    assign_id: self.assign_id.clone(),
                    user_id,
                    role,
                    scope: (scope_relation.clone(), scope_id),
                })
            }
        }
    }
}
