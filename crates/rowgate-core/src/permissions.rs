use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::Auth;
use crate::change::Transaction;
use crate::compiler;
use crate::engine::{self, MoveOut, PermissionError};
use crate::graph::ScopeGraph;
use crate::relation::{Relation, TablePermission};
use crate::role::{AssignedRoles, Role, RoleRecord};
use crate::rules::{CompileError, Grant, proto};
use crate::schema::SchemaVersion;
use crate::transient::{self, TransientStore};
use crate::triggers::TriggerTable;
use crate::write_buffer::WriteBuffer;

/// The raw inputs retained across rebuilds: a partial update recompiles
/// against whatever parts it does not replace.
#[derive(Debug, Clone, Default)]
pub(crate) struct Source {
    pub rules: proto::Rules,
    pub roles: Vec<RoleRecord>,
}

#[derive(Debug, Default)]
pub struct RulesUpdate {
    pub schema: Option<Arc<SchemaVersion>>,
    pub rules: Option<proto::Rules>,
    pub roles: Option<Vec<RoleRecord>>,
}

/// The compiled permission tables for one authenticated session. Immutable
/// after build: rule changes produce a new value, and validation rebinds the
/// write buffer in its result instead of mutating in place.
#[derive(Debug, Clone)]
pub struct Permissions {
    pub(crate) auth: Auth,
    pub(crate) schema: Arc<SchemaVersion>,
    pub(crate) source: Source,
    pub(crate) assigned: Vec<Arc<Role>>,
    pub(crate) roles: HashMap<TablePermission, AssignedRoles>,
    pub(crate) grants: Vec<Arc<Grant>>,
    pub(crate) scoped_roles: HashMap<Relation, Vec<Arc<Role>>>,
    pub(crate) scopes: Vec<Relation>,
    pub(crate) triggers: TriggerTable,
    pub(crate) write_buffer: WriteBuffer,
    pub(crate) transient_lut: Arc<TransientStore>,
}

impl Permissions {
    /// An empty, not-yet-ready value; `update` performs the first compile.
    pub fn new(auth: Auth, transient_lut: Option<&str>) -> Self {
        Self {
            auth,
            schema: Arc::new(SchemaVersion::default()),
            source: Source::default(),
            assigned: Vec::new(),
            roles: HashMap::new(),
            grants: Vec::new(),
            scoped_roles: HashMap::new(),
            scopes: Vec::new(),
            triggers: TriggerTable::default(),
            write_buffer: WriteBuffer::default(),
            transient_lut: TransientStore::named(
                transient_lut.unwrap_or(transient::DEFAULT_STORE),
            ),
        }
    }

    /// Recompiles with the provided parts replacing the retained source;
    /// everything else carries over, including the in-flight write buffer.
    pub fn update(&self, input: RulesUpdate) -> Result<Self, CompileError> {
        let schema = input.schema.unwrap_or_else(|| Arc::clone(&self.schema));
        let rules = input.rules.unwrap_or_else(|| self.source.rules.clone());
        let roles = input.roles.unwrap_or_else(|| self.source.roles.clone());

        let compiled = compiler::compile(&self.auth, &schema, &rules, &roles)?;

        Ok(Self {
            auth: self.auth.clone(),
            schema,
            source: Source { rules, roles },
            assigned: compiled.assigned,
            roles: compiled.roles,
            grants: compiled.grants,
            scoped_roles: compiled.scoped_roles,
            scopes: compiled.scopes,
            triggers: compiled.triggers,
            write_buffer: self.write_buffer.clone(),
            transient_lut: Arc::clone(&self.transient_lut),
        })
    }

    /// The candidate roles this session holds, synthetic ones included.
    pub fn assigned_roles(&self) -> Vec<Role> {
        self.assigned.iter().map(|role| (**role).clone()).collect()
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn scopes(&self) -> &[Relation] {
        &self.scopes
    }

    /// Scoped roles grouped by the relation their scope is rooted in.
    pub fn roles_for_scope(&self, scope: &Relation) -> &[Arc<Role>] {
        self.scoped_roles
            .get(scope)
            .map(|roles| roles.as_slice())
            .unwrap_or(&[])
    }

    pub fn write_buffer(&self) -> &WriteBuffer {
        &self.write_buffer
    }

    /// Validates an inbound client transaction as a whole. On success the
    /// returned value differs only in its write buffer; on denial the error
    /// carries the formatted message and `self` is unchanged.
    pub fn validate_write<G: ScopeGraph>(
        &self,
        graph: &G,
        tx: &Transaction,
    ) -> Result<Self, PermissionError> {
        engine::validate_write(self, graph, tx)
    }

    /// Filters an outbound transaction to what the user may observe, with
    /// move-outs for rows whose own mutation made them unreadable.
    pub fn filter_read<G: ScopeGraph>(
        &self,
        graph: &G,
        tx: &Transaction,
    ) -> (Transaction, Vec<MoveOut>) {
        engine::filter_read(self, graph, tx)
    }

    /// Observes the loop-back of the client's own writes from upstream,
    /// dropping the now-redundant overlay.
    pub fn receive_transaction(&self, tx: &Transaction) -> Self {
        let mut next = self.clone();
        next.write_buffer = self.write_buffer.receive_transaction(&self.schema, tx);
        next
    }
}
