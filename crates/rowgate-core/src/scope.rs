use crate::change::{Change, Record};
use crate::relation::{Relation, RowId};
use crate::schema::{FkHop, SchemaVersion};

/// The chain of rows visited while resolving a scope root, from the change's
/// own row up to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopePath(pub Vec<(Relation, RowId)>);

impl ScopePath {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Scope roots reachable from `change` by walking foreign keys up to
/// `scope`. Multiple roots are possible when the schema admits several paths;
/// results are deduplicated by root id.
pub fn resolve_scope<F>(
    schema: &SchemaVersion,
    max_depth: usize,
    lookup: F,
    scope: &Relation,
    change: &Change,
) -> Vec<(RowId, ScopePath)>
where
    F: Fn(&Relation, &RowId) -> Option<Record>,
{
    let relation = change.relation();
    let record = change.scope_record();

    if relation == scope {
        return match schema.row_id(scope, record) {
            Some(id) => vec![(id.clone(), ScopePath(vec![(scope.clone(), id)]))],
            None => Vec::new(),
        };
    }

    let mut results: Vec<(RowId, ScopePath)> = Vec::new();
    for path in schema.fk_paths(relation, scope, max_depth) {
        if let Some((root, trail)) = walk_path(schema, &lookup, relation, record, &path)
            && !results.iter().any(|(id, _)| id == &root)
        {
            results.push((root, trail));
        }
    }
    results
}

fn walk_path<F>(
    schema: &SchemaVersion,
    lookup: &F,
    relation: &Relation,
    record: &Record,
    path: &[FkHop],
) -> Option<(RowId, ScopePath)>
where
    F: Fn(&Relation, &RowId) -> Option<Record>,
{
    let mut trail = Vec::new();
    if let Some(own_id) = schema.row_id(relation, record) {
        trail.push((relation.clone(), own_id));
    }

    let mut current = record.clone();
    let mut root = None;
    for (index, hop) in path.iter().enumerate() {
        let values = hop
            .fk
            .columns
            .iter()
            .map(|column| current.get(column))
            .collect::<Option<Vec<_>>>()?;
        let parent_id = RowId::from_values(values)?;
        trail.push((hop.fk.parent.clone(), parent_id.clone()));

        if index + 1 == path.len() {
            // The root's id comes from the last hop's key; the root row
            // itself is never fetched, so a pending root created earlier in
            // the same transaction still anchors its children.
            root = Some(parent_id);
        } else {
            current = lookup(&hop.fk.parent, &parent_id)?;
        }
    }
    root.map(|id| (id, ScopePath(trail)))
}

/// Foreign-key columns modified by `change` that participate in the path
/// toward `scope`. Non-updates modify no foreign keys.
pub fn modified_fks(
    schema: &SchemaVersion,
    max_depth: usize,
    scope: &Relation,
    change: &Change,
) -> Vec<String> {
    let Change::Update(update) = change else {
        return Vec::new();
    };
    let changed = update.changed_columns();
    schema
        .scope_fk_columns(&update.relation, scope, max_depth)
        .into_iter()
        .filter(|column| changed.contains(column))
        .collect()
}
