use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;

use crate::relation::{Privilege, Relation};

pub type Record = BTreeMap<String, Value>;

/// Log position used to time-order events and key transient permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(u64);

impl Lsn {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub relation: Relation,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedRecord {
    pub relation: Relation,
    pub old_record: Record,
    pub record: Record,
}

impl UpdatedRecord {
    /// Columns whose value differs between the old and the new image,
    /// including columns present in only one of them.
    pub fn changed_columns(&self) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (column, value) in &self.record {
            if self.old_record.get(column) != Some(value) {
                changed.insert(column.clone());
            }
        }
        for column in self.old_record.keys() {
            if !self.record.contains_key(column) {
                changed.insert(column.clone());
            }
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletedRecord {
    pub relation: Relation,
    pub old_record: Record,
}

/// Synthetic half of an expanded update whose foreign keys move it into a
/// different scope. Carries the post-update row.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeMove {
    pub relation: Relation,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert(NewRecord),
    Update(UpdatedRecord),
    Delete(DeletedRecord),
    ScopeMove(ScopeMove),
}

impl Change {
    pub fn insert(relation: Relation, record: Record) -> Self {
        Change::Insert(NewRecord { relation, record })
    }

    pub fn update(relation: Relation, old_record: Record, record: Record) -> Self {
        Change::Update(UpdatedRecord {
            relation,
            old_record,
            record,
        })
    }

    pub fn delete(relation: Relation, old_record: Record) -> Self {
        Change::Delete(DeletedRecord {
            relation,
            old_record,
        })
    }

    pub fn relation(&self) -> &Relation {
        match self {
            Change::Insert(c) => &c.relation,
            Change::Update(c) => &c.relation,
            Change::Delete(c) => &c.relation,
            Change::ScopeMove(c) => &c.relation,
        }
    }

    pub fn required_privilege(&self) -> Privilege {
        match self {
            Change::Insert(_) => Privilege::Insert,
            Change::Update(_) => Privilege::Update,
            Change::Delete(_) => Privilege::Delete,
            Change::ScopeMove(_) => Privilege::Update,
        }
    }

    /// The record image a scope walk starts from: the pre-image for updates
    /// and deletes, the row itself for inserts and scope moves.
    pub fn scope_record(&self) -> &Record {
        match self {
            Change::Insert(c) => &c.record,
            Change::Update(c) => &c.old_record,
            Change::Delete(c) => &c.old_record,
            Change::ScopeMove(c) => &c.record,
        }
    }

    /// The record image CHECK predicates evaluate against.
    pub fn check_record(&self) -> &Record {
        match self {
            Change::Insert(c) => &c.record,
            Change::Update(c) => &c.record,
            Change::Delete(c) => &c.old_record,
            Change::ScopeMove(c) => &c.record,
        }
    }

    /// Columns subject to the grant column rule. `None` means no column
    /// check applies to this change kind.
    pub fn column_set(&self) -> Option<BTreeSet<String>> {
        match self {
            Change::Insert(c) => Some(c.record.keys().cloned().collect()),
            Change::Update(c) => Some(c.changed_columns()),
            Change::Delete(_) => None,
            Change::ScopeMove(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub changes: Vec<Change>,
    pub lsn: Lsn,
}

impl Transaction {
    pub fn new(lsn: Lsn, changes: Vec<Change>) -> Self {
        Self { changes, lsn }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
