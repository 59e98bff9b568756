pub mod auth;
pub mod change;
pub mod check;
mod compiler;
pub mod engine;
pub mod graph;
pub mod permissions;
pub mod relation;
pub mod role;
pub mod rules;
pub mod schema;
pub mod scope;
pub mod transient;
pub mod triggers;
pub mod write_buffer;

pub use auth::Auth;
pub use change::{Change, Lsn, Record, Transaction};
pub use engine::{EngineConfig, MoveOut, PermissionError};
pub use graph::ScopeGraph;
pub use permissions::{Permissions, RulesUpdate};
pub use relation::{Privilege, Relation, RowId, TablePermission};
pub use role::{Role, RoleGrant, RoleRecord};
pub use schema::SchemaVersion;
pub use scope::ScopePath;
pub use transient::{Transient, TransientStore};
pub use write_buffer::WriteBuffer;
