use std::sync::Arc;

use rowgate_core::change::{Change, Record};
use rowgate_core::engine::EngineConfig;
use rowgate_core::graph::ScopeGraph;
use rowgate_core::relation::{Relation, RowId};
use rowgate_core::schema::SchemaVersion;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("record for {relation} has no primary key")]
    MissingPrimaryKey { relation: Relation },
}

/// Reference graph provider: user-visible rows held in memory, resolved
/// against the schema's foreign-key metadata. Serves as the read graph and
/// as the upstream of the write buffer for embedders, tests, and benches.
#[derive(Debug, Clone)]
pub struct MemoryGraph {
    schema: Arc<SchemaVersion>,
    config: EngineConfig,
    rows: im::HashMap<(Relation, RowId), Record>,
}

impl MemoryGraph {
    pub fn new(schema: Arc<SchemaVersion>) -> Self {
        Self::with_config(schema, EngineConfig::default())
    }

    pub fn with_config(schema: Arc<SchemaVersion>, config: EngineConfig) -> Self {
        Self {
            schema,
            config,
            rows: im::HashMap::new(),
        }
    }

    pub fn insert(&mut self, relation: Relation, record: Record) -> Result<(), GraphError> {
        let id = self
            .schema
            .row_id(&relation, &record)
            .ok_or_else(|| GraphError::MissingPrimaryKey {
                relation: relation.clone(),
            })?;
        self.rows.insert((relation, id), record);
        Ok(())
    }

    /// Applies a replicated change to the underlying rows, mirroring what
    /// the upstream database does when a validated transaction commits.
    pub fn apply(&mut self, change: &Change) -> Result<(), GraphError> {
        match change {
            Change::Insert(insert) => self.insert(insert.relation.clone(), insert.record.clone()),
            Change::Update(update) => {
                let relation = update.relation.clone();
                let old_id = self.schema.row_id(&relation, &update.old_record);
                if let Some(old_id) = old_id {
                    self.rows.remove(&(relation.clone(), old_id));
                }
                self.insert(relation, update.record.clone())
            }
            Change::Delete(delete) => {
                let relation = delete.relation.clone();
                let id = self
                    .schema
                    .row_id(&relation, &delete.old_record)
                    .ok_or_else(|| GraphError::MissingPrimaryKey {
                        relation: relation.clone(),
                    })?;
                self.rows.remove(&(relation, id));
                Ok(())
            }
            Change::ScopeMove(_) => Ok(()),
        }
    }

    pub fn apply_transaction(
        &mut self,
        tx: &rowgate_core::change::Transaction,
    ) -> Result<(), GraphError> {
        for change in &tx.changes {
            self.apply(change)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ScopeGraph for MemoryGraph {
    fn schema(&self) -> &SchemaVersion {
        &self.schema
    }

    fn config(&self) -> EngineConfig {
        self.config
    }

    fn row(&self, relation: &Relation, id: &RowId) -> Option<Record> {
        self.rows.get(&(relation.clone(), id.clone())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issues() -> Relation {
        Relation::public("issues")
    }

    fn projects() -> Relation {
        Relation::public("projects")
    }

    fn schema() -> Arc<SchemaVersion> {
        Arc::new(
            SchemaVersion::builder()
                .table(projects(), ["id", "name"], ["id"])
                .table(issues(), ["id", "title", "project_id"], ["id"])
                .foreign_key(issues(), ["project_id"], projects(), ["id"])
                .build(),
        )
    }

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn issue(id: &str, project: &str) -> Record {
        record(&[
            ("id", json!(id)),
            ("title", json!("t")),
            ("project_id", json!(project)),
        ])
    }

    #[test]
    fn inserted_row_can_be_read_back() {
        let mut graph = MemoryGraph::new(schema());
        graph.insert(issues(), issue("i1", "p7")).unwrap();

        let row = graph.row(&issues(), &RowId::new("i1"));

        assert!(row.is_some());
        assert_eq!(row.unwrap().get("project_id"), Some(&json!("p7")));
    }

    #[test]
    fn insert_without_primary_key_is_rejected() {
        let mut graph = MemoryGraph::new(schema());

        let err = graph
            .insert(issues(), record(&[("title", json!("t"))]))
            .unwrap_err();

        assert!(matches!(err, GraphError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn scope_id_resolves_through_rows() {
        let mut graph = MemoryGraph::new(schema());
        graph.insert(issues(), issue("i42", "p7")).unwrap();

        let change = Change::update(issues(), issue("i42", "p7"), issue("i42", "p7"));
        let roots = graph.scope_id(&projects(), &change);

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].0, RowId::new("p7"));
    }

    #[test]
    fn applied_update_replaces_row() {
        let mut graph = MemoryGraph::new(schema());
        graph.insert(issues(), issue("i1", "p7")).unwrap();

        graph
            .apply(&Change::update(issues(), issue("i1", "p7"), issue("i1", "p8")))
            .unwrap();

        let row = graph.row(&issues(), &RowId::new("i1")).unwrap();
        assert_eq!(row.get("project_id"), Some(&json!("p8")));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn applied_delete_removes_row() {
        let mut graph = MemoryGraph::new(schema());
        graph.insert(issues(), issue("i1", "p7")).unwrap();

        graph
            .apply(&Change::delete(issues(), issue("i1", "p7")))
            .unwrap();

        assert!(graph.is_empty());
    }
}
