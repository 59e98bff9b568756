use crate::change::{Change, Record};
use crate::engine::EngineConfig;
use crate::relation::{Relation, RowId};
use crate::schema::SchemaVersion;
use crate::scope::{self, ScopePath};

/// The capability the decision engine consumes to reason about the data
/// graph. Implementations supply row lookup and schema access; scope
/// resolution is provided once on top of those so every graph resolves
/// scopes identically.
pub trait ScopeGraph {
    fn schema(&self) -> &SchemaVersion;

    fn row(&self, relation: &Relation, id: &RowId) -> Option<Record>;

    fn config(&self) -> EngineConfig {
        EngineConfig::default()
    }

    /// Scope roots in `scope` reachable from `change` via foreign-key
    /// parents.
    fn scope_id(&self, scope: &Relation, change: &Change) -> Vec<(RowId, ScopePath)> {
        scope::resolve_scope(
            self.schema(),
            self.config().max_scope_depth,
            |relation, id| self.row(relation, id),
            scope,
            change,
        )
    }

    /// Foreign-key columns modified by `change` that participate in the
    /// scope path for `scope`.
    fn modified_fks(&self, scope: &Relation, change: &Change) -> Vec<String> {
        scope::modified_fks(
            self.schema(),
            self.config().max_scope_depth,
            scope,
            change,
        )
    }
}
