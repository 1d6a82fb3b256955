use std::collections::HashSet;

use crate::board::{turn_local, Board, Position};
use crate::error::MidError;
use crate::halfsuper::Halfsupers;
use crate::mid::engine::{midsolve_internal, MidTable};

/// Values of `root` and every position within one placement-and-rotation of it.
///
/// A middle root expands through its eight rotations, each of which expands through
/// its placements and their rotations. Each value is for the player to act in that
/// position: 1 win, 0 tie, -1 loss. Every distinct position appears once.
pub fn midsolve(root: &Position, workspace: &mut [Halfsupers]) -> Result<Vec<(Position, i32)>, MidError> {
    let table = midsolve_internal(root, workspace)?;
    let mut traversal = Traversal {
        table: &table,
        stones: root.count(),
        seen: HashSet::new(),
        values: Vec::new(),
    };
    traversal.visit(root.board, 0, root.middle);
    Ok(traversal.values)
}

struct Traversal<'a> {
    table: &'a MidTable,
    stones: u32,
    seen: HashSet<Position>,
    values: Vec<(Position, i32)>,
}

impl Traversal<'_> {
    /// Value of `board` turned by `local`, recording it and everything below it.
    ///
    /// `board` stays in the root's frame so table lookups need no canonicalization.
    fn visit(&mut self, board: Board, local: u8, middle: bool) -> i32 {
        let position = Position::new(board.transform(local), middle);
        let value = if position.done() {
            position.immediate_value()
        } else if middle {
            let mut best = -1;
            for q in 0..4 {
                for d in [1, 3] {
                    best = best.max(-self.visit(board, turn_local(local, q, d), false));
                }
            }
            best
        } else {
            let value = self.lookup(&board, local);
            if board.count() == self.stones {
                let turn = position.turn();
                let mut empty = board.empty_squares();
                let mut best = -1;
                while empty != 0 {
                    let bit = empty.trailing_zeros();
                    empty &= empty - 1;
                    best = best.max(self.visit(board.place(bit, turn), local, true));
                }
                debug_assert_eq!(best, value, "placements disagree with the table at {position}");
            }
            value
        };
        if self.seen.insert(position) {
            self.values.push((position, value));
        }
        value
    }

    fn lookup(&self, board: &Board, local: u8) -> i32 {
        match self.table.get(board) {
            Some(value) => value.value(local),
            None => panic!("midsolve table has no entry for {}", Position::new(*board, false)),
        }
    }
}
