use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::change::Lsn;
use crate::relation::{Relation, RowId};
use crate::role::RoleGrant;

/// A permission valid for a bounded range of log positions, inserted by an
/// adjacent subsystem as a side-effect of an earlier write. Keyed back to
/// the ASSIGN that produced the role it extends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transient {
    pub assign_id: String,
    pub target: (Relation, RowId),
    pub valid_to: Lsn,
}

/// Process-wide transient-permissions table. Many readers, rare writers;
/// the decision engine only reads, observing the entries valid at its query
/// LSN.
#[derive(Debug, Default)]
pub struct TransientStore {
    entries: RwLock<HashMap<String, Vec<Transient>>>,
}

pub const DEFAULT_STORE: &str = "transient_permissions";

static REGISTRY: OnceLock<RwLock<HashMap<String, Arc<TransientStore>>>> = OnceLock::new();

impl TransientStore {
    /// Handle to the named process-wide store, creating it on first use.
    pub fn named(name: &str) -> Arc<TransientStore> {
        let registry = REGISTRY.get_or_init(|| RwLock::new(HashMap::new()));
        if let Some(store) = registry.read().get(name) {
            return Arc::clone(store);
        }
        let mut stores = registry.write();
        Arc::clone(
            stores
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(TransientStore::default())),
        )
    }

    pub fn insert(&self, transient: Transient) {
        self.entries
            .write()
            .entry(transient.assign_id.clone())
            .or_default()
            .push(transient);
    }

    /// Drops every entry no longer valid at `lsn`.
    pub fn remove_expired(&self, lsn: Lsn) {
        let mut entries = self.entries.write();
        entries.retain(|_, transients| {
            transients.retain(|t| t.valid_to >= lsn);
            !transients.is_empty()
        });
    }

    /// For each candidate RoleGrant whose role originates from an ASSIGN,
    /// the transient entries applicable at `lsn`.
    pub fn for_roles(&self, candidates: &[RoleGrant], lsn: Lsn) -> Vec<(RoleGrant, Transient)> {
        let entries = self.entries.read();
        let mut results = Vec::new();
        for candidate in candidates {
            let Some(assign_id) = candidate.role.assign_id() else {
                continue;
            };
            if let Some(transients) = entries.get(assign_id) {
                for transient in transients {
                    if transient.valid_to >= lsn {
                        results.push((candidate.clone(), transient.clone()));
                    }
                }
            }
        }
        results
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Privilege;
    use crate::role::Role;
    use crate::rules::{Grant, GrantRole};
    use std::sync::Arc;

    fn member_role_grant(assign_id: &str) -> RoleGrant {
        RoleGrant::new(
            Arc::new(Role::Scoped {
                assign_id: assign_id.to_string(),
                user_id: "alice".to_string(),
                role: "member".to_string(),
                scope: (Relation::public("projects"), RowId::new("p7")),
            }),
            Arc::new(Grant {
                table: Relation::public("issues"),
                privilege: Privilege::Update,
                role: GrantRole::Application("member".to_string()),
                columns: None,
                check: None,
                scope: Some(Relation::public("projects")),
            }),
        )
    }

    fn transient(assign_id: &str, target_id: &str, valid_to: u64) -> Transient {
        Transient {
            assign_id: assign_id.to_string(),
            target: (Relation::public("projects"), RowId::new(target_id)),
            valid_to: Lsn::new(valid_to),
        }
    }

    #[test]
    fn named_returns_same_store_for_same_name() {
        let a = TransientStore::named("test_same_name");
        let b = TransientStore::named("test_same_name");

        a.insert(transient("a1", "p9", 100));

        assert!(!b.is_empty());
    }

    #[test]
    fn named_returns_distinct_stores_for_distinct_names() {
        let a = TransientStore::named("test_distinct_a");
        let b = TransientStore::named("test_distinct_b");

        a.insert(transient("a1", "p9", 100));

        assert!(b.is_empty());
    }

    #[test]
    fn for_roles_matches_by_assign_id_and_lsn() {
        let store = TransientStore::default();
        store.insert(transient("assign-1", "p9", 50));

        let candidates = vec![member_role_grant("assign-1")];

        let valid = store.for_roles(&candidates, Lsn::new(40));
        let expired = store.for_roles(&candidates, Lsn::new(60));

        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].1.target.1, RowId::new("p9"));
        assert!(expired.is_empty());
    }

    #[test]
    fn for_roles_skips_synthetic_roles() {
        let store = TransientStore::default();
        store.insert(transient("assign-1", "p9", 50));

        let candidates = vec![RoleGrant::new(
            Arc::new(Role::Anyone),
            Arc::new(Grant {
                table: Relation::public("issues"),
                privilege: Privilege::Select,
                role: GrantRole::Anyone,
                columns: None,
                check: None,
                scope: None,
            }),
        )];

        assert!(store.for_roles(&candidates, Lsn::new(40)).is_empty());
    }

    #[test]
    fn remove_expired_drops_stale_entries() {
        let store = TransientStore::default();
        store.insert(transient("assign-1", "p9", 10));
        store.insert(transient("assign-2", "p8", 100));

        store.remove_expired(Lsn::new(50));

        let candidates = vec![member_role_grant("assign-2")];
        assert_eq!(store.for_roles(&candidates, Lsn::new(50)).len(), 1);
        let gone = vec![member_role_grant("assign-1")];
        assert!(store.for_roles(&gone, Lsn::new(5)).is_empty());
    }
}
