use std::sync::Arc;

use crate::change::{Change, Record, Transaction};
use crate::engine::EngineConfig;
use crate::graph::ScopeGraph;
use crate::relation::{Relation, RowId, TablePermission};
use crate::role::{Role, RoleGrant};
use crate::rules::Grant;
use crate::schema::SchemaVersion;
use crate::triggers::RoleEvent;

#[derive(Debug, Clone, PartialEq)]
enum BufferedRow {
    Present(Record),
    Deleted,
}

/// A role materialized by an assign trigger during the current transaction,
/// pre-matched against the grant list so lookups stay cheap.
#[derive(Debug, Clone)]
struct TransientRole {
    role: Arc<Role>,
    grants: Vec<RoleGrant>,
}

/// Layers the pending writes of one client transaction over an upstream
/// graph, so write *k* is validated against a graph that already includes
/// writes 1..k−1. Persistent data: every operation returns a new buffer.
#[derive(Debug, Clone, Default)]
pub struct WriteBuffer {
    rows: im::HashMap<(Relation, RowId), BufferedRow>,
    transients: im::Vector<TransientRole>,
}

impl WriteBuffer {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.transients.is_empty()
    }

    /// Rebinds the overlay onto an upstream graph, yielding a layered view
    /// that satisfies the graph contract.
    pub fn with_upstream<'a, G: ScopeGraph>(&'a self, upstream: &'a G) -> BufferedGraph<'a, G> {
        BufferedGraph {
            upstream,
            buffer: self,
        }
    }

    /// Records a validated change so subsequent scope lookups see its
    /// effect. Only rows that can participate in some scope path are kept;
    /// the overlay is monotonic within one transaction.
    pub fn apply_change(
        &self,
        schema: &SchemaVersion,
        scopes: &[Relation],
        config: EngineConfig,
        change: &Change,
    ) -> Self {
        if !participates_in_scope(schema, scopes, config.max_scope_depth, change.relation()) {
            return self.clone();
        }

        let relation = change.relation().clone();
        let mut rows = self.rows.clone();
        match change {
            Change::Insert(insert) => {
                if let Some(id) = schema.row_id(&relation, &insert.record) {
                    rows.insert((relation, id), BufferedRow::Present(insert.record.clone()));
                }
            }
            Change::Update(update) => {
                let old_id = schema.row_id(&relation, &update.old_record);
                let new_id = schema.row_id(&relation, &update.record);
                if let (Some(old_id), Some(new_id)) = (old_id, new_id) {
                    if old_id != new_id {
                        rows.insert((relation.clone(), old_id), BufferedRow::Deleted);
                    }
                    rows.insert((relation, new_id), BufferedRow::Present(update.record.clone()));
                }
            }
            Change::Delete(delete) => {
                if let Some(id) = schema.row_id(&relation, &delete.old_record) {
                    rows.insert((relation, id), BufferedRow::Deleted);
                }
            }
            // Synthetic twin of an update that was already applied.
            Change::ScopeMove(_) => {}
        }
        Self {
            rows,
            transients: self.transients.clone(),
        }
    }

    /// RoleGrants for `action` derived from roles the pending triggers have
    /// materialized but that have not yet round-tripped.
    pub fn transient_role_grants(&self, action: &TablePermission) -> Vec<RoleGrant> {
        self.transients
            .iter()
            .flat_map(|transient| transient.grants.iter())
            .filter(|role_grant| {
                role_grant.grant.table == action.relation
                    && role_grant.grant.privilege == action.privilege
            })
            .cloned()
            .collect()
    }

    /// Integrates role edits produced by assign triggers, matching new roles
    /// against the grant list exactly like the rules compiler does.
    pub fn update_transient_roles(&self, events: Vec<RoleEvent>, grants: &[Arc<Grant>]) -> Self {
        let mut transients = self.transients.clone();
        for event in events {
            match event {
                RoleEvent::Insert(role) => {
                    insert_transient(&mut transients, role, grants);
                }
                RoleEvent::Delete(role) => {
                    remove_transient(&mut transients, &role);
                }
                RoleEvent::Update { old, new } => {
                    remove_transient(&mut transients, &old);
                    insert_transient(&mut transients, new, grants);
                }
            }
        }
        Self {
            rows: self.rows.clone(),
            transients,
        }
    }

    /// Called when the client's own transaction reappears from upstream: the
    /// overlay entries it covered are redundant now. Once the overlay is
    /// empty the transient roles are dropped too — the authoritative
    /// assignment rows arrive through a rules update.
    pub fn receive_transaction(&self, schema: &SchemaVersion, tx: &Transaction) -> Self {
        let mut rows = self.rows.clone();
        for change in &tx.changes {
            let relation = change.relation();
            match change {
                Change::Insert(insert) => {
                    if let Some(id) = schema.row_id(relation, &insert.record) {
                        rows.remove(&(relation.clone(), id));
                    }
                }
                Change::Update(update) => {
                    if let Some(id) = schema.row_id(relation, &update.record) {
                        rows.remove(&(relation.clone(), id));
                    }
                    if let Some(id) = schema.row_id(relation, &update.old_record) {
                        rows.remove(&(relation.clone(), id));
                    }
                }
                Change::Delete(delete) => {
                    if let Some(id) = schema.row_id(relation, &delete.old_record) {
                        rows.remove(&(relation.clone(), id));
                    }
                }
                Change::ScopeMove(_) => {}
            }
        }
        let transients = if rows.is_empty() {
            im::Vector::new()
        } else {
            self.transients.clone()
        };
        Self { rows, transients }
    }
}

fn insert_transient(transients: &mut im::Vector<TransientRole>, role: Role, grants: &[Arc<Grant>]) {
    remove_transient(transients, &role);
    let role = Arc::new(role);
    let matched = grants
        .iter()
        .filter(|grant| role.matches(grant))
        .map(|grant| RoleGrant::new(Arc::clone(&role), Arc::clone(grant)))
        .collect();
    transients.push_back(TransientRole {
        role,
        grants: matched,
    });
}

fn remove_transient(transients: &mut im::Vector<TransientRole>, role: &Role) {
    transients.retain(|transient| transient.role.as_ref() != role);
}

fn participates_in_scope(
    schema: &SchemaVersion,
    scopes: &[Relation],
    max_depth: usize,
    relation: &Relation,
) -> bool {
    scopes.iter().any(|scope| {
        scope == relation || !schema.fk_paths(relation, scope, max_depth).is_empty()
    })
}

/// A write buffer bound to its upstream graph: a graph decorator whose row
/// lookups consult the overlay first.
pub struct BufferedGraph<'a, G: ScopeGraph> {
    upstream: &'a G,
    buffer: &'a WriteBuffer,
}

impl<G: ScopeGraph> ScopeGraph for BufferedGraph<'_, G> {
    fn schema(&self) -> &SchemaVersion {
        self.upstream.schema()
    }

    fn config(&self) -> EngineConfig {
        self.upstream.config()
    }

    fn row(&self, relation: &Relation, id: &RowId) -> Option<Record> {
        match self.buffer.rows.get(&(relation.clone(), id.clone())) {
            Some(BufferedRow::Present(record)) => Some(record.clone()),
            Some(BufferedRow::Deleted) => None,
            None => self.upstream.row(relation, id),
        }
    }
}
