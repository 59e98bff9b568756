use std::collections::HashMap;

use crate::change::Record;
use crate::relation::{Relation, RowId};

/// Table and foreign-key metadata for one schema version, as provided by the
/// schema loader. Rowgate never reads the database itself; it only consults
/// this snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaVersion {
    tables: HashMap<Relation, TableInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub relation: Relation,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub parent: Relation,
    pub parent_columns: Vec<String>,
}

/// One hop of a foreign-key path: the child relation and the key it follows
/// toward its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct FkHop {
    pub child: Relation,
    pub fk: ForeignKey,
}

impl SchemaVersion {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn table(&self, relation: &Relation) -> Option<&TableInfo> {
        self.tables.get(relation)
    }

    /// Primary-key value of a record, if the table is known and every key
    /// column is present and non-null.
    pub fn row_id(&self, relation: &Relation, record: &Record) -> Option<RowId> {
        let table = self.table(relation)?;
        let values = table
            .primary_key
            .iter()
            .map(|column| record.get(column))
            .collect::<Option<Vec<_>>>()?;
        RowId::from_values(values)
    }

    /// Every simple foreign-key path from `from` up to `to`, bounded in
    /// length. A path never revisits a relation, so cyclic metadata cannot
    /// hang the walk.
    pub fn fk_paths(&self, from: &Relation, to: &Relation, max_depth: usize) -> Vec<Vec<FkHop>> {
        let mut paths = Vec::new();
        let mut visited = vec![from.clone()];
        self.collect_paths(from, to, max_depth, &mut visited, &mut Vec::new(), &mut paths);
        paths
    }

    fn collect_paths(
        &self,
        current: &Relation,
        target: &Relation,
        remaining: usize,
        visited: &mut Vec<Relation>,
        trail: &mut Vec<FkHop>,
        out: &mut Vec<Vec<FkHop>>,
    ) {
        if remaining == 0 {
            return;
        }
        let Some(table) = self.table(current) else {
            return;
        };
        for fk in &table.foreign_keys {
            if visited.contains(&fk.parent) {
                continue;
            }
            trail.push(FkHop {
                child: current.clone(),
                fk: fk.clone(),
            });
            if &fk.parent == target {
                out.push(trail.clone());
            } else {
                visited.push(fk.parent.clone());
                self.collect_paths(&fk.parent, target, remaining - 1, visited, trail, out);
                visited.pop();
            }
            trail.pop();
        }
    }

    /// Foreign-key columns of `relation` that begin some path toward `to`.
    pub fn scope_fk_columns(&self, from: &Relation, to: &Relation, max_depth: usize) -> Vec<String> {
        let mut columns = Vec::new();
        for path in self.fk_paths(from, to, max_depth) {
            if let Some(first) = path.first() {
                for column in &first.fk.columns {
                    if !columns.contains(column) {
                        columns.push(column.clone());
                    }
                }
            }
        }
        columns
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: HashMap<Relation, TableInfo>,
}

impl SchemaBuilder {
    pub fn table(
        mut self,
        relation: Relation,
        columns: impl IntoIterator<Item = impl Into<String>>,
        primary_key: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let info = TableInfo {
            relation: relation.clone(),
            columns: columns.into_iter().map(Into::into).collect(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
            foreign_keys: Vec::new(),
        };
        self.tables.insert(relation, info);
        self
    }

    pub fn foreign_key(
        mut self,
        child: Relation,
        columns: impl IntoIterator<Item = impl Into<String>>,
        parent: Relation,
        parent_columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let fk = ForeignKey {
            columns: columns.into_iter().map(Into::into).collect(),
            parent,
            parent_columns: parent_columns.into_iter().map(Into::into).collect(),
        };
        self.tables
            .entry(child.clone())
            .or_insert_with(|| TableInfo {
                relation: child,
                columns: Vec::new(),
                primary_key: Vec::new(),
                foreign_keys: Vec::new(),
            })
            .foreign_keys
            .push(fk);
        self
    }

    pub fn build(self) -> SchemaVersion {
        SchemaVersion {
            tables: self.tables,
        }
    }
}
