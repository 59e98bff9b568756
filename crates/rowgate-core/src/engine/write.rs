use std::collections::HashMap;

use crate::auth::Auth;
use crate::change::{Change, Lsn, ScopeMove, Transaction};
use crate::graph::ScopeGraph;
use crate::permissions::Permissions;
use crate::relation::{Relation, RowId, TablePermission};
use crate::role::{AssignedRoles, RoleGrant};

use super::PermissionError;

/// Validates a client transaction change by change. Each allowed change is
/// applied to the write buffer and its triggers fired before the next change
/// is considered; the first denial aborts the whole transaction and leaves
/// the caller's `Permissions` untouched.
pub(crate) fn validate_write<G: ScopeGraph>(
    perms: &Permissions,
    graph: &G,
    tx: &Transaction,
) -> Result<Permissions, PermissionError> {
    let mut next = perms.clone();
    for change in &tx.changes {
        let expanded = {
            let view = next.write_buffer.with_upstream(graph);
            expand_scope_moves(&next, &view, change)
        };
        for half in &expanded {
            let view = next.write_buffer.with_upstream(graph);
            check_change(&next, &view, half, tx.lsn)?;
        }

        let events = next.triggers.fire(&next.schema, change, &next.auth)?;
        let mut buffer =
            next.write_buffer
                .apply_change(&next.schema, &next.scopes, graph.config(), change);
        if !events.is_empty() {
            buffer = buffer.update_transient_roles(events, &next.grants);
        }
        next.write_buffer = buffer;
    }
    Ok(next)
}

/// An update that modifies a foreign key participating in any scope is
/// validated twice: once as itself (pre-image scope) and once as a synthetic
/// scope move carrying the post-update row (new scope). Expansion is never
/// recursive.
fn expand_scope_moves(
    perms: &Permissions,
    view: &impl ScopeGraph,
    change: &Change,
) -> Vec<Change> {
    let mut expanded = vec![change.clone()];
    if let Change::Update(update) = change {
        let moved = perms
            .scopes
            .iter()
            .any(|scope| !view.modified_fks(scope, change).is_empty());
        if moved {
            expanded.push(Change::ScopeMove(ScopeMove {
                relation: update.relation.clone(),
                record: update.record.clone(),
            }));
        }
    }
    expanded
}

fn check_change(
    perms: &Permissions,
    view: &impl ScopeGraph,
    change: &Change,
    lsn: Lsn,
) -> Result<(), PermissionError> {
    let action = TablePermission::new(change.relation().clone(), change.required_privilege());
    let empty = AssignedRoles::default();
    let bucket = perms.roles.get(&action).unwrap_or(&empty);
    let buffered = perms.write_buffer.transient_role_grants(&action);
    if bucket.is_empty() && buffered.is_empty() {
        tracing::debug!(%action, "no candidate roles");
        return Err(denied(&action));
    }

    let (buffered_scoped, buffered_unscoped): (Vec<_>, Vec<_>) =
        buffered.iter().cloned().partition(|rg| rg.role.has_scope());

    for role_grant in bucket.unscoped.iter().chain(buffered_unscoped.iter()) {
        if accepts(role_grant, change, &perms.auth)? {
            tracing::trace!(role = %role_grant.role, %action, "allowed by unscoped role");
            return Ok(());
        }
    }

    let mut roots: HashMap<Relation, Vec<RowId>> = HashMap::new();
    for role_grant in bucket.scoped.iter().chain(buffered_scoped.iter()) {
        let Some((scope_relation, scope_id)) = role_grant.role.scope() else {
            continue;
        };
        let ids = roots.entry(scope_relation.clone()).or_insert_with(|| {
            view.scope_id(scope_relation, change)
                .into_iter()
                .map(|(id, _)| id)
                .collect()
        });
        if ids.contains(scope_id) && accepts(role_grant, change, &perms.auth)? {
            tracing::trace!(role = %role_grant.role, %action, "allowed by scoped role");
            return Ok(());
        }
    }

    let mut candidates: Vec<RoleGrant> = bucket.iter().cloned().collect();
    candidates.extend(buffered.iter().cloned());
    for (role_grant, transient) in perms.transient_lut.for_roles(&candidates, lsn) {
        let (target_relation, target_id) = &transient.target;
        let ids = roots.entry(target_relation.clone()).or_insert_with(|| {
            view.scope_id(target_relation, change)
                .into_iter()
                .map(|(id, _)| id)
                .collect()
        });
        if ids.contains(target_id) && accepts(&role_grant, change, &perms.auth)? {
            tracing::trace!(role = %role_grant.role, %action, "allowed by transient permission");
            return Ok(());
        }
    }

    tracing::debug!(%action, "no candidate accepted the change");
    Err(denied(&action))
}

fn accepts(role_grant: &RoleGrant, change: &Change, auth: &Auth) -> Result<bool, PermissionError> {
    if !role_grant.grant.column_rule(change) {
        return Ok(false);
    }
    Ok(role_grant.grant.check_rule(change, auth)?)
}

fn denied(action: &TablePermission) -> PermissionError {
    PermissionError::Denied {
        privilege: action.privilege,
        relation: action.relation.clone(),
    }
}
