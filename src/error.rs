use crate::thread::PoolKind;

/// Reasons a board or position is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// A square holds both a black and a white stone
    #[error("black and white stones overlap")]
    Overlap,

    /// Stones outside the nine bits of each quadrant lane
    #[error("stones outside the 6x6 board")]
    OutOfRange,

    /// Black moves first, so black has as many stones as white or one more
    #[error("inconsistent stone counts: black {black}, white {white}")]
    Unbalanced { black: u32, white: u32 },

    /// A middle position needs the stone that was just placed
    #[error("a middle position needs at least one stone")]
    EmptyMiddle,

    #[error("failed to parse position: {0}")]
    Parse(String),
}

/// Precondition failures of the mid-game solver.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MidError {
    #[error(transparent)]
    Board(#[from] BoardError),

    /// The solver only handles positions with at most 18 empty squares
    #[error("midsolve needs at least 18 stones, position has {0}")]
    TooFewStones(usize),

    #[error("stone count {0} is outside 18..=36")]
    SliceRange(usize),

    #[error("subset parameters out of range: n = {n}, k = {k}")]
    SubsetRange { n: usize, k: usize },

    #[error("workspace too small: need {needed} halfsuper pairs, got {actual}")]
    WorkspaceTooSmall { needed: usize, actual: usize },

    #[error("workspace buffer cannot be aligned to halfsuper pairs")]
    Misaligned,
}

/// Failures surfaced by the thread pools.
///
/// `Clone` so that a stored job failure can be returned from every later call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("{pool} job failed: {message}")]
    Job { pool: PoolKind, message: String },

    #[error("thread pool has shut down")]
    ShutDown,

    #[error("no {0} thread pool was started")]
    NoPool(PoolKind),

    #[error("only the thread that created the scheduler may wait on it")]
    NotMaster,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}
