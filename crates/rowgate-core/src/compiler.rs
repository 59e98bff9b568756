use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::auth::Auth;
use crate::relation::{Relation, TablePermission};
use crate::role::{AssignedRoles, Role, RoleGrant, RoleRecord};
use crate::rules::{CompileError, Grant, proto};
use crate::schema::SchemaVersion;
use crate::triggers::TriggerTable;

pub(crate) struct CompiledRules {
    pub assigned: Vec<Arc<Role>>,
    pub roles: HashMap<TablePermission, AssignedRoles>,
    pub grants: Vec<Arc<Grant>>,
    pub scoped_roles: HashMap<Relation, Vec<Arc<Role>>>,
    pub scopes: Vec<Relation>,
    pub triggers: TriggerTable,
}

/// Turns the raw rules record and the materialized assignment rows into the
/// immutable lookup tables of a `Permissions` value.
pub(crate) fn compile(
    auth: &Auth,
    schema: &SchemaVersion,
    rules: &proto::Rules,
    role_records: &[RoleRecord],
) -> Result<CompiledRules, CompileError> {
    // Stale roles reference an ASSIGN that no longer exists; they are
    // silently dropped, not an error.
    let assign_ids: HashSet<&str> = rules.assigns.iter().map(|a| a.id.as_str()).collect();

    let mut assigned: Vec<Arc<Role>> = vec![Arc::new(Role::Anyone)];
    if let Some(user_id) = &auth.user_id {
        assigned.push(Arc::new(Role::Authenticated {
            user_id: user_id.clone(),
        }));
    }
    assigned.extend(
        role_records
            .iter()
            .filter(|record| assign_ids.contains(record.assign_id.as_str()))
            .map(|record| Arc::new(Role::from_record(record))),
    );

    let grants = rules
        .grants
        .iter()
        .map(|record| Grant::compile(record, schema).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;

    let mut roles: HashMap<TablePermission, AssignedRoles> = HashMap::new();
    for role in &assigned {
        for grant in &grants {
            if role.matches(grant) {
                let key = TablePermission::new(grant.table.clone(), grant.privilege);
                roles
                    .entry(key)
                    .or_default()
                    .push(RoleGrant::new(Arc::clone(role), Arc::clone(grant)));
            }
        }
    }

    let mut scoped_roles: HashMap<Relation, Vec<Arc<Role>>> = HashMap::new();
    for role in &assigned {
        if let Some((scope_relation, _)) = role.scope() {
            scoped_roles
                .entry(scope_relation.clone())
                .or_default()
                .push(Arc::clone(role));
        }
    }
    let mut scopes: Vec<Relation> = scoped_roles.keys().cloned().collect();
    scopes.sort();

    let triggers = TriggerTable::compile(&rules.assigns, schema)?;

    tracing::debug!(
        roles = assigned.len(),
        grants = grants.len(),
        actions = roles.len(),
        scopes = scopes.len(),
        "compiled permission tables"
    );

    Ok(CompiledRules {
        assigned,
        roles,
        grants,
        scoped_roles,
        scopes,
        triggers,
    })
}
