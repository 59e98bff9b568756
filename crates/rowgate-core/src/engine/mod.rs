mod read;
mod write;

pub use read::MoveOut;
pub(crate) use read::filter_read;
pub(crate) use write::validate_write;

use crate::check::EvalError;
use crate::relation::{Privilege, Relation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on foreign-key hops when resolving a scope root.
    pub max_scope_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_scope_depth: 8 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("permissions: user does not have permission to {}{}", .privilege.verb(), .relation)]
    Denied {
        privilege: Privilege,
        relation: Relation,
    },

    #[error("permissions: check evaluation failed: {0}")]
    Eval(#[from] EvalError),
}
