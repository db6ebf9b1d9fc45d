//! Node tracking: the slot/liveness registry and the table model rendered from it.

pub mod registry;
pub mod table;

pub use registry::{
    Liveness, NodeEntry, NodeRegistry, Observation, RegistryError, DEFAULT_CAPACITY,
};
pub use table::{NodeRow, NodeTable};
