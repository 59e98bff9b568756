use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::rules::{Grant, GrantRole};
use crate::relation::{Relation, RowId};

/// A materialized assignment row, as loaded from the user-role tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub assign_id: String,
    pub user_id: String,
    pub role: String,
    pub scope: Option<(Relation, RowId)>,
}

/// A role the authenticated user holds. `Anyone` and `Authenticated` are
/// synthesized at compile time; the other two come from assignment rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Anyone,
    Authenticated {
        user_id: String,
    },
    Unscoped {
        assign_id: String,
        user_id: String,
        role: String,
    },
    Scoped {
        assign_id: String,
        user_id: String,
        role: String,
        scope: (Relation, RowId),
    },
}

impl Role {
    pub fn from_record(record: &RoleRecord) -> Self {
        match &record.scope {
            Some(scope) => Role::Scoped {
                assign_id: record.assign_id.clone(),
                user_id: record.user_id.clone(),
                role: record.role.clone(),
                scope: scope.clone(),
            },
            None => Role::Unscoped {
                assign_id: record.assign_id.clone(),
                user_id: record.user_id.clone(),
                role: record.role.clone(),
            },
        }
    }

    pub fn assign_id(&self) -> Option<&str> {
        match self {
            Role::Anyone | Role::Authenticated { .. } => None,
            Role::Unscoped { assign_id, .. } | Role::Scoped { assign_id, .. } => Some(assign_id),
        }
    }

    pub fn scope(&self) -> Option<(&Relation, &RowId)> {
        match self {
            Role::Scoped { scope, .. } => Some((&scope.0, &scope.1)),
            _ => None,
        }
    }

    pub fn has_scope(&self) -> bool {
        matches!(self, Role::Scoped { .. })
    }

    /// Role–grant matching: names must agree and the scope relations must
    /// agree as options. A scoped grant never pairs with an unscoped role;
    /// anything weaker would let a scoped grant accept changes outside any
    /// scope.
    pub fn matches(&self, grant: &Grant) -> bool {
        let name_matches = match (self, &grant.role) {
            (Role::Anyone, GrantRole::Anyone) => true,
            (Role::Authenticated { .. }, GrantRole::Authenticated) => true,
            (Role::Unscoped { role, .. }, GrantRole::Application(name))
            | (Role::Scoped { role, .. }, GrantRole::Application(name)) => role == name,
            _ => false,
        };
        name_matches && self.scope().map(|(relation, _)| relation) == grant.scope.as_ref()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Anyone => write!(f, "anyone"),
            Role::Authenticated { user_id } => write!(f, "authenticated:{user_id}"),
            Role::Unscoped { role, user_id, .. } => write!(f, "{role}:{user_id}"),
            Role::Scoped {
                role,
                user_id,
                scope,
                ..
            } => write!(f, "{role}:{user_id}@{}/{}", scope.0, scope.1),
        }
    }
}

/// A role paired with one grant it satisfies. The matchable unit of the
/// decision engine.
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub role: Arc<Role>,
    pub grant: Arc<Grant>,
}

impl RoleGrant {
    pub fn new(role: Arc<Role>, grant: Arc<Grant>) -> Self {
        Self { role, grant }
    }
}

/// All RoleGrants for one `(relation, privilege)` key, split so the cheap
/// half can be tested without a graph traversal.
#[derive(Debug, Clone, Default)]
pub struct AssignedRoles {
    pub scoped: Vec<RoleGrant>,
    pub unscoped: Vec<RoleGrant>,
}

impl AssignedRoles {
    pub fn push(&mut self, role_grant: RoleGrant) {
        if role_grant.role.has_scope() {
            self.scoped.push(role_grant);
        } else {
            self.unscoped.push(role_grant);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scoped.is_empty() && self.unscoped.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleGrant> {
        self.unscoped.iter().chain(self.scoped.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Privilege;

    fn grant(role: GrantRole, scope: Option<Relation>) -> Grant {
        Grant {
            table: Relation::public("issues"),
            privilege: Privilege::Update,
            role,
            columns: None,
            check: None,
            scope,
        }
    }

    fn member_scoped(scope_id: &str) -> Role {
        Role::Scoped {
            assign_id: "assign-1".to_string(),
            user_id: "alice".to_string(),
            role: "member".to_string(),
            scope: (Relation::public("projects"), RowId::new(scope_id)),
        }
    }

    #[test]
    fn anyone_matches_anyone_grant_only() {
        let anyone_grant = grant(GrantRole::Anyone, None);
        let member_grant = grant(GrantRole::Application("member".to_string()), None);

        assert!(Role::Anyone.matches(&anyone_grant));
        assert!(!Role::Anyone.matches(&member_grant));
    }

    #[test]
    fn authenticated_matches_authenticated_grant() {
        let role = Role::Authenticated {
            user_id: "alice".to_string(),
        };

        assert!(role.matches(&grant(GrantRole::Authenticated, None)));
        assert!(!role.matches(&grant(GrantRole::Anyone, None)));
    }

    #[test]
    fn scoped_role_matches_grant_with_same_scope_relation() {
        let role = member_scoped("p7");
        let matching = grant(
            GrantRole::Application("member".to_string()),
            Some(Relation::public("projects")),
        );
        let wrong_scope = grant(
            GrantRole::Application("member".to_string()),
            Some(Relation::public("teams")),
        );

        assert!(role.matches(&matching));
        assert!(!role.matches(&wrong_scope));
    }

    #[test]
    fn scoped_grant_never_pairs_with_unscoped_role() {
        let role = Role::Unscoped {
            assign_id: "assign-1".to_string(),
            user_id: "alice".to_string(),
            role: "member".to_string(),
        };
        let scoped_grant = grant(
            GrantRole::Application("member".to_string()),
            Some(Relation::public("projects")),
        );

        assert!(!role.matches(&scoped_grant));
    }

    #[test]
    fn scoped_role_never_pairs_with_unscoped_grant() {
        let role = member_scoped("p7");

        assert!(!role.matches(&grant(GrantRole::Application("member".to_string()), None)));
    }

    #[test]
    fn from_record_picks_variant_by_scope() {
        let unscoped = RoleRecord {
            assign_id: "a1".to_string(),
            user_id: "alice".to_string(),
            role: "admin".to_string(),
            scope: None,
        };
        let scoped = RoleRecord {
            scope: Some((Relation::public("projects"), RowId::new("p7"))),
            ..unscoped.clone()
        };

        assert!(!Role::from_record(&unscoped).has_scope());
        assert!(Role::from_record(&scoped).has_scope());
    }

    #[test]
    fn assigned_roles_split_by_scope() {
        let mut bucket = AssignedRoles::default();
        let g = Arc::new(grant(GrantRole::Application("member".to_string()), None));
        bucket.push(RoleGrant::new(
            Arc::new(Role::Unscoped {
                assign_id: "a1".to_string(),
                user_id: "alice".to_string(),
                role: "member".to_string(),
            }),
            Arc::clone(&g),
        ));
        bucket.push(RoleGrant::new(Arc::new(member_scoped("p7")), g));

        assert_eq!(bucket.unscoped.len(), 1);
        assert_eq!(bucket.scoped.len(), 1);
        assert!(!bucket.is_empty());
    }
}
