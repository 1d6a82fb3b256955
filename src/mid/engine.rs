//! Retrograde sweep over every position reachable from a root within its empty squares.
//!
//! Layer `n` holds the positions with `n` more stones than the root, all rotations
//! at once as halfsupers. The sweep walks from the full board back to the root,
//! reading layer `n + 1` from the workspace and writing layer `n` for the next pass.

use std::collections::HashMap;

use log::debug;

use crate::board::{Board, Position, Side};
use crate::error::MidError;
use crate::halfsuper::{halfsuper_wins, rmax, state_parity, Halfsuper, Halfsupers};
use crate::mid::subsets::{
    absolute_offsets, child_ranks, choose, filled_ranks, relative_offsets, scatter, set_entry,
    subsets, Subsets,
};
use crate::mid::workspace::{End, Grab, Workspace, MIN_SLICE};
use crate::thread::{ThreadTime, TimeKind};

/// Win and not-lose halfsupers of one board of layer 0 or 1, for the player to act.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidValue {
    pub win: Halfsuper,
    pub notlose: Halfsuper,
    /// Parity of the local rotation states stored
    pub parity: bool,
}

impl MidValue {
    /// Game value for the player to act once the board is rotated by `local`.
    ///
    /// Panics if `local` is not in the stored parity class.
    pub fn value(&self, local: u8) -> i32 {
        assert_eq!(
            state_parity(local),
            self.parity,
            "rotation state {local} is outside the stored parity class"
        );
        self.win.get(local) as i32 + self.notlose.get(local) as i32 - 1
    }
}

/// Layer 0 and layer 1 results keyed by unrotated board.
pub type MidTable = HashMap<Board, MidValue>;

/// Squares empty at the root, as bit indices in ascending order.
fn empty_list(board: &Board) -> Vec<u32> {
    let mut empty = board.empty_squares();
    let mut list = Vec::with_capacity(empty.count_ones() as usize);
    while empty != 0 {
        list.push(empty.trailing_zeros());
        empty &= empty - 1;
    }
    list
}

/// Fixed facts about one layer of a solve.
struct Layer<'a> {
    empty: &'a [u32],
    slice: usize,
    spots: usize,
    n: usize,
    /// Stones the mover has added since the root
    k0: usize,
    /// Stones the other player has added since the root
    k1: usize,
    parity: bool,
    /// Color to place next
    mover: usize,
    root0: Side,
    root1: Side,
}

impl<'a> Layer<'a> {
    fn new(root: &Position, empty: &'a [u32], n: usize) -> Self {
        let slice = root.count() as usize;
        let spots = empty.len();
        let k0 = n / 2;
        let k1 = n - k0;
        let mover = (slice + n) & 1;
        Self {
            empty,
            slice,
            spots,
            n,
            k0,
            k1,
            parity: (n + root.middle as usize) & 1 == 1,
            mover,
            root0: root.board.side(mover),
            root1: root.board.side(1 - mover),
        }
    }

    fn input_grab(&self) -> Grab {
        let width = self.spots - self.k0;
        let ny = if width > 0 { choose(width - 1, self.k1) as usize } else { 0 };
        Grab { end: End::input(self.n), nx: choose(self.spots, self.k0 + 1) as usize, ny }
    }

    fn sweep(&self, workspace: &mut Workspace, results: &mut MidTable) -> Result<(), MidError> {
        let (spots, k0, k1, parity) = (self.spots, self.k0, self.k1, self.parity);
        let width = spots - k0;
        let sets0 = subsets(spots, k0)?;
        let sets1 = subsets(spots, k1)?;
        let sets1p = subsets(width, k1)?;
        let output_grab = Grab {
            end: End::output(self.n),
            nx: sets1.len(),
            ny: Subsets::new(spots - k1, k0)?.size,
        };
        let input_grab = self.input_grab();
        debug!(
            "midsolve slice {} layer {}: k0 {}, k1 {}, input {}x{}, output {}x{}",
            self.slice, self.n, k0, k1, input_grab.nx, input_grab.ny, output_grab.nx, output_grab.ny
        );
        let (input, mut output) = workspace.layers(input_grab, output_grab);

        let all_wins1: Vec<Halfsuper> = sets1
            .iter()
            .map(|&set1| halfsuper_wins(self.root1 | scatter(self.empty, set1, k1), parity))
            .collect();
        let cs1ps = filled_ranks(&sets1p, k1, width);
        // Placing the last stone seeds not-lose: a full board with no five is a tie
        let seed = if self.slice + self.n == 36 {
            Halfsupers { win: Halfsuper::ZERO, notlose: Halfsuper::ALL }
        } else {
            Halfsupers::default()
        };

        let mut empty1 = Vec::with_capacity(width);
        let mut child_wins0 = Vec::with_capacity(width);
        let mut child_s0s = Vec::with_capacity(width);
        let mut offset1 = Vec::with_capacity(k1 * width);
        let mut offset0 = Vec::with_capacity(k1 * width);

        for (s0, &set0) in sets0.iter().enumerate() {
            let side0 = self.root0 | scatter(self.empty, set0, k0);
            let wins0 = halfsuper_wins(side0, parity);
            empty1.clear();
            empty1.extend((0..spots).filter(|&i| side0 >> self.empty[i] & 1 == 0));
            child_wins0.clear();
            child_wins0.extend(
                empty1
                    .iter()
                    .map(|&i| halfsuper_wins(side0 | 1 << self.empty[i], parity)),
            );
            child_ranks(set0, k0, &empty1, &mut child_s0s);
            absolute_offsets(&empty1, k1, &mut offset1);
            relative_offsets(set0, k0, k1, &empty1, &mut offset0);

            for (s1p, &set1p) in sets1p.iter().enumerate() {
                let mut filled1p = 0u32;
                let mut s1 = 0usize;
                let mut s0p = s0 as i64;
                for a in 0..k1 {
                    let q = set_entry(set1p, a);
                    filled1p |= 1 << q;
                    s1 += offset1[a * width + q];
                    s0p += offset0[a * width + q] as i64;
                }

                let children = &cs1ps[s1p * width..(s1p + 1) * width];
                let mut us = seed;
                for i in 0..width {
                    if filled1p >> i & 1 != 0 {
                        continue;
                    }
                    let cwins = child_wins0[i];
                    let child = input[(child_s0s[i], children[i] as usize)];
                    us.win |= cwins | child.win;
                    us.notlose |= cwins | child.notlose;
                }

                let wins1 = all_wins1[s1];
                let inplay = !(wins0 | wins1);
                us.win = (inplay & us.win) | (wins0 & !wins1);
                us.notlose = (inplay & us.notlose) | wins0;

                if self.n <= 1 {
                    let side1 = self.root1 | scatter(self.empty, sets1[s1], k1);
                    let board = if self.mover == 0 {
                        Board::new(side0, side1)
                    } else {
                        Board::new(side1, side0)
                    };
                    results.insert(board, MidValue { win: us.win, notlose: us.notlose, parity });
                }
                // The parent wins wherever we cannot avoid losing after its rotation
                output[(s1, s0p as usize)] = Halfsupers { win: rmax(!us.notlose), notlose: rmax(!us.win) };
            }
        }
        Ok(())
    }
}

/// Solve every position with 0 or 1 more stones than `root`, over all rotations.
///
/// The root must have between 18 and 36 stones and `workspace` must hold at least
/// [`midsolve_workspace_size`](crate::mid::midsolve_workspace_size) pairs for its stone count.
/// Each returned entry is keyed by the board before any rotation is applied.
pub fn midsolve_internal(root: &Position, workspace: &mut [Halfsupers]) -> Result<MidTable, MidError> {
    let _time = ThreadTime::new(TimeKind::Midsolve);
    root.validate()?;
    let slice = root.count() as usize;
    if slice < MIN_SLICE {
        return Err(MidError::TooFewStones(slice));
    }
    let empty = empty_list(&root.board);
    let spots = empty.len();
    let mut workspace = Workspace::new(workspace, spots)?;

    let mut results = MidTable::new();
    for n in (0..=spots).rev() {
        Layer::new(root, &empty, n).sweep(&mut workspace, &mut results)?;
    }
    debug!("midsolve slice {slice}: {} boards", results.len());
    Ok(results)
}
