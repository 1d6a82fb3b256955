pub mod engine;
pub mod subsets;
pub mod traverse;
pub mod workspace;

pub use engine::{midsolve_internal, MidTable, MidValue};
pub use traverse::midsolve;
pub use workspace::{
    midsolve_workspace, midsolve_workspace_memory_usage, midsolve_workspace_size,
    workspace_from_bytes, MIN_SLICE,
};
