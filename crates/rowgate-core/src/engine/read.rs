use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::change::{Change, Lsn, Record, Transaction};
use crate::graph::ScopeGraph;
use crate::permissions::Permissions;
use crate::relation::{Privilege, Relation, RowId, TablePermission};
use crate::role::RoleGrant;
use crate::rules::Grant;
use crate::scope::ScopePath;

/// A change that became unreadable to the user by virtue of its own
/// mutation; the shapes subsystem turns this into a local delete on the
/// client.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOut {
    pub change: Change,
    pub relation: Relation,
    pub id: RowId,
    pub scope_path: ScopePath,
}

/// Filters an outbound transaction down to the changes the user may see,
/// preserving order. Updates that were visible before but not after their
/// own mutation are re-emitted as move-outs.
pub(crate) fn filter_read<G: ScopeGraph>(
    perms: &Permissions,
    graph: &G,
    tx: &Transaction,
) -> (Transaction, Vec<MoveOut>) {
    let mut changes = Vec::new();
    let mut move_outs = Vec::new();

    for change in &tx.changes {
        let post_view = post_image_view(change);
        match read_decision(perms, graph, &post_view, tx.lsn) {
            Some(allowance) => changes.push(project_change(perms, change, &allowance)),
            None => {
                if let Change::Update(update) = change {
                    let pre_view = Change::delete(update.relation.clone(), update.old_record.clone());
                    if let Some(pre) = read_decision(perms, graph, &pre_view, tx.lsn)
                        && let Some(id) = perms.schema.row_id(&update.relation, &update.old_record)
                    {
                        move_outs.push(MoveOut {
                            change: change.clone(),
                            relation: update.relation.clone(),
                            id,
                            scope_path: pre.scope_path,
                        });
                    }
                }
            }
        }
    }

    (Transaction::new(tx.lsn, changes), move_outs)
}

struct ReadAllowance {
    grants: Vec<Arc<Grant>>,
    scope_path: ScopePath,
}

/// Visibility of an update is decided on its post-image; other change kinds
/// carry a single image.
fn post_image_view(change: &Change) -> Change {
    match change {
        Change::Update(update) => Change::ScopeMove(crate::change::ScopeMove {
            relation: update.relation.clone(),
            record: update.record.clone(),
        }),
        other => other.clone(),
    }
}

/// Read-path decision: the action is always SELECT, the column rule does not
/// apply, and the write buffer is not consulted — the read graph is
/// authoritative. Every accepting grant is collected so projection can take
/// the union of their column lists. A CHECK that fails to evaluate rejects
/// its candidate; the read path has no error channel.
fn read_decision<G: ScopeGraph>(
    perms: &Permissions,
    graph: &G,
    change: &Change,
    lsn: Lsn,
) -> Option<ReadAllowance> {
    let action = TablePermission::new(change.relation().clone(), Privilege::Select);
    let bucket = perms.roles.get(&action)?;
    if bucket.is_empty() {
        return None;
    }

    let mut accepted: Vec<Arc<Grant>> = Vec::new();
    let mut scope_path = ScopePath::default();

    for role_grant in &bucket.unscoped {
        if check_passes(role_grant, change, perms) {
            accepted.push(Arc::clone(&role_grant.grant));
        }
    }

    let mut roots: HashMap<Relation, Vec<(RowId, ScopePath)>> = HashMap::new();
    for role_grant in &bucket.scoped {
        let Some((scope_relation, scope_id)) = role_grant.role.scope() else {
            continue;
        };
        let resolved = roots
            .entry(scope_relation.clone())
            .or_insert_with(|| graph.scope_id(scope_relation, change));
        let matched = resolved.iter().find(|(id, _)| id == scope_id);
        if let Some((_, path)) = matched
            && check_passes(role_grant, change, perms)
        {
            if scope_path.is_empty() {
                scope_path = path.clone();
            }
            accepted.push(Arc::clone(&role_grant.grant));
        }
    }

    let candidates: Vec<RoleGrant> = bucket.iter().cloned().collect();
    for (role_grant, transient) in perms.transient_lut.for_roles(&candidates, lsn) {
        let (target_relation, target_id) = &transient.target;
        let resolved = roots
            .entry(target_relation.clone())
            .or_insert_with(|| graph.scope_id(target_relation, change));
        if resolved.iter().any(|(id, _)| id == target_id) && check_passes(&role_grant, change, perms)
        {
            accepted.push(Arc::clone(&role_grant.grant));
        }
    }

    if accepted.is_empty() {
        None
    } else {
        Some(ReadAllowance {
            grants: accepted,
            scope_path,
        })
    }
}

fn check_passes(role_grant: &RoleGrant, change: &Change, perms: &Permissions) -> bool {
    match role_grant.grant.check_rule(change, &perms.auth) {
        Ok(passed) => passed,
        Err(error) => {
            tracing::warn!(role = %role_grant.role, %error, "check failed to evaluate on read");
            false
        }
    }
}

/// Column projection: a change allowed only by column-limited grants is
/// re-emitted with its records narrowed to the union of the accepting
/// grants' columns. Primary-key columns and columns the accepting CHECKs
/// read always survive, so filtering an already-filtered transaction is the
/// identity.
fn project_change(perms: &Permissions, change: &Change, allowance: &ReadAllowance) -> Change {
    if allowance.grants.iter().any(|grant| grant.columns.is_none()) {
        return change.clone();
    }

    let mut keep: BTreeSet<String> = BTreeSet::new();
    for grant in &allowance.grants {
        if let Some(columns) = &grant.columns {
            keep.extend(columns.iter().cloned());
        }
        if let Some(check) = &grant.check {
            keep.extend(check.row_columns());
        }
    }
    if let Some(table) = perms.schema.table(change.relation()) {
        keep.extend(table.primary_key.iter().cloned());
    }

    let filter = |record: &Record| -> Record {
        record
            .iter()
            .filter(|(column, _)| keep.contains(*column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    };

    match change {
        Change::Insert(insert) => Change::insert(insert.relation.clone(), filter(&insert.record)),
        Change::Update(update) => Change::update(
            update.relation.clone(),
            filter(&update.old_record),
            filter(&update.record),
        ),
        Change::Delete(delete) => {
            Change::delete(delete.relation.clone(), filter(&delete.old_record))
        }
        Change::ScopeMove(scope_move) => Change::ScopeMove(crate::change::ScopeMove {
            relation: scope_move.relation.clone(),
            record: filter(&scope_move.record),
        }),
    }
}
