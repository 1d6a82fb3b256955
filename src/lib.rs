pub mod board;
pub mod error;
pub mod halfsuper;
pub mod io;
pub mod mid;
pub mod thread;

pub use board::{Board, Position};
pub use error::{BoardError, MidError, PoolError};
pub use halfsuper::{Halfsuper, Halfsupers};
pub use mid::{
    midsolve, midsolve_internal, midsolve_workspace, midsolve_workspace_memory_usage,
    midsolve_workspace_size, workspace_from_bytes,
};
pub use thread::{PoolKind, Scheduler, ThreadTime, TimeKind};
