pub mod memory;

pub use memory::{GraphError, MemoryGraph};
