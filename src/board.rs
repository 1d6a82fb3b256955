use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::BoardError;

/// One color's stones: quadrant `q` lives in bits `16q..16q+9`, square `(x, y)`
/// of a quadrant at bit `3x + y`.
pub type Side = u64;

/// Bits that may hold stones.
pub const SIDE_MASK: Side = 0x01ff_01ff_01ff_01ff;

/// Bit index of square `(x, y)`, where `x` is the row and `y` the column.
#[inline(always)]
pub const fn square(x: usize, y: usize) -> u32 {
    (16 * (2 * (x / 3) + y / 3) + 3 * (x % 3) + y % 3) as u32
}

#[inline(always)]
pub const fn quadrant(side: Side, q: usize) -> u16 {
    (side >> (16 * q) & 0x1ff) as u16
}

/// One counterclockwise quarter turn of a 9-bit quadrant.
const fn rotate_quadrant_once(v: u16) -> u16 {
    let mut rotated = 0;
    let mut i = 0;
    while i < 3 {
        let mut j = 0;
        while j < 3 {
            if v >> (3 * i + j) & 1 != 0 {
                rotated |= 1 << (3 * (2 - j) + i);
            }
            j += 1;
        }
        i += 1;
    }
    rotated
}

const fn rotation_table() -> [[u16; 512]; 4] {
    let mut table = [[0; 512]; 4];
    let mut v = 0;
    while v < 512 {
        table[0][v] = v as u16;
        let mut r = 1;
        while r < 4 {
            table[r][v] = rotate_quadrant_once(table[r - 1][v]);
            r += 1;
        }
        v += 1;
    }
    table
}

/// `QUADRANT_ROTATIONS[r][v]` is quadrant contents `v` turned `r` quarter turns counterclockwise.
pub static QUADRANT_ROTATIONS: [[u16; 512]; 4] = rotation_table();

pub(crate) const fn win_lines() -> [Side; 32] {
    let dirs: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];
    let mut lines = [0; 32];
    let mut n = 0;
    let mut d = 0;
    while d < 4 {
        let (dx, dy) = dirs[d];
        let mut x = 0;
        while x < 6 {
            let mut y = 0;
            while y < 6 {
                let ex = x + 4 * dx;
                let ey = y + 4 * dy;
                if ex >= 0 && ex < 6 && ey >= 0 && ey < 6 {
                    let mut line: Side = 0;
                    let mut s = 0;
                    while s < 5 {
                        line |= 1 << square((x + s * dx) as usize, (y + s * dy) as usize);
                        s += 1;
                    }
                    lines[n] = line;
                    n += 1;
                }
                y += 1;
            }
            x += 1;
        }
        d += 1;
    }
    lines
}

/// The 32 five-in-a-row lines of the 6x6 board.
pub static WIN_LINES: [Side; 32] = win_lines();

pub fn won(side: Side) -> bool {
    WIN_LINES.iter().any(|&line| side & line == line)
}

/// Rotate quadrant `q` of `side` by `r` quarter turns counterclockwise.
#[inline]
pub fn rotate_quadrant(side: Side, q: usize, r: usize) -> Side {
    let turned = QUADRANT_ROTATIONS[r & 3][quadrant(side, q) as usize] as Side;
    side & !(0x1ff << (16 * q)) | turned << (16 * q)
}

/// Apply a local rotation state: bits `2q, 2q+1` of `local` turn quadrant `q`.
pub fn rotate_side(side: Side, local: u8) -> Side {
    let mut rotated = 0;
    for q in 0..4 {
        let r = (local >> (2 * q) & 3) as usize;
        rotated |= (QUADRANT_ROTATIONS[r][quadrant(side, q) as usize] as Side) << (16 * q);
    }
    rotated
}

/// Compose a further `d` quarter turns of quadrant `q` onto a local rotation state.
#[inline]
pub fn turn_local(local: u8, q: usize, d: u8) -> u8 {
    let r = ((local >> (2 * q)) + d) & 3;
    local & !(3 << (2 * q)) | r << (2 * q)
}

/// Reflect across the main diagonal.
pub fn transpose_side(side: Side) -> Side {
    let mut t = 0;
    for x in 0..6 {
        for y in 0..6 {
            if side >> square(x, y) & 1 != 0 {
                t |= 1 << square(y, x);
            }
        }
    }
    t
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct Board {
    pub black: Side,
    pub white: Side,
}

impl Board {
    pub fn new(black: Side, white: Side) -> Self {
        Self { black, white }
    }

    pub fn empty() -> Self {
        Self { black: 0, white: 0 }
    }

    /// Stones of `color`, 0 for black and 1 for white.
    #[inline]
    pub fn side(&self, color: usize) -> Side {
        if color == 0 {
            self.black
        } else {
            self.white
        }
    }

    pub fn count(&self) -> u32 {
        self.black.count_ones() + self.white.count_ones()
    }

    pub fn empty_squares(&self) -> Side {
        SIDE_MASK & !(self.black | self.white)
    }

    pub fn place(&self, bit: u32, color: usize) -> Board {
        debug_assert!(self.empty_squares() >> bit & 1 != 0);
        if color == 0 {
            Board::new(self.black | 1 << bit, self.white)
        } else {
            Board::new(self.black, self.white | 1 << bit)
        }
    }

    pub fn transform(&self, local: u8) -> Board {
        Board::new(rotate_side(self.black, local), rotate_side(self.white, local))
    }

    pub fn rotate(&self, q: usize, r: usize) -> Board {
        Board::new(rotate_quadrant(self.black, q, r), rotate_quadrant(self.white, q, r))
    }

    pub fn transpose(&self) -> Board {
        Board::new(transpose_side(self.black), transpose_side(self.white))
    }

    pub fn validate(&self) -> Result<(), BoardError> {
        if self.black & self.white != 0 {
            return Err(BoardError::Overlap);
        }
        if (self.black | self.white) & !SIDE_MASK != 0 {
            return Err(BoardError::OutOfRange);
        }
        let black = self.black.count_ones();
        let white = self.white.count_ones();
        if black != white && black != white + 1 {
            return Err(BoardError::Unbalanced { black, white });
        }
        Ok(())
    }

    pub fn to_string(&self) -> String {
        let mut ans = String::with_capacity(36);
        for x in 0..6 {
            for y in 0..6 {
                ans.push(self.cell(x, y));
            }
        }
        ans
    }

    pub fn show(&self) -> String {
        let mut ans = String::with_capacity(42);
        for x in 0..6 {
            for y in 0..6 {
                ans.push(self.cell(x, y));
            }
            ans.push('\n');
        }
        ans
    }

    fn cell(&self, x: usize, y: usize) -> char {
        let m = 1 << square(x, y);
        if self.black & m != 0 {
            'X'
        } else if self.white & m != 0 {
            'O'
        } else {
            '-'
        }
    }
}

impl PartialOrd for Board {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Board {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.black.cmp(&other.black) {
            Ordering::Equal => self.white.cmp(&other.white),
            ord => ord,
        }
    }
}

/// A board plus whether the player to act still owes a rotation.
///
/// Black moves first, so the player to act is `(count - middle) & 1`.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub board: Board,
    pub middle: bool,
}

impl Position {
    pub fn new(board: Board, middle: bool) -> Self {
        Self { board, middle }
    }

    pub fn count(&self) -> u32 {
        self.board.count()
    }

    /// Color to act: 0 for black, 1 for white.
    pub fn turn(&self) -> usize {
        ((self.count() - self.middle as u32) & 1) as usize
    }

    pub fn validate(&self) -> Result<(), BoardError> {
        self.board.validate()?;
        if self.middle && self.count() == 0 {
            return Err(BoardError::EmptyMiddle);
        }
        Ok(())
    }

    /// Someone has five in a row, or the board is full after the rotation.
    pub fn done(&self) -> bool {
        won(self.board.black)
            || won(self.board.white)
            || (!self.middle && self.board.empty_squares() == 0)
    }

    /// Value of a finished position for the player to act: 1 win, 0 tie, -1 loss.
    pub fn immediate_value(&self) -> i32 {
        debug_assert!(self.done());
        let turn = self.turn();
        let us = won(self.board.side(turn));
        let them = won(self.board.side(1 - turn));
        us as i32 - them as i32
    }

    /// Successors: rotations of a middle position, placements otherwise.
    pub fn moves(&self) -> Vec<Position> {
        if self.middle {
            let mut moves = Vec::with_capacity(8);
            for q in 0..4 {
                for r in [1, 3] {
                    moves.push(Position::new(self.board.rotate(q, r), false));
                }
            }
            moves
        } else {
            let turn = self.turn();
            let mut empty = self.board.empty_squares();
            let mut moves = Vec::with_capacity(empty.count_ones() as usize);
            while empty != 0 {
                let bit = empty.trailing_zeros();
                empty &= empty - 1;
                moves.push(Position::new(self.board.place(bit, turn), true));
            }
            moves
        }
    }

    pub fn transpose(&self) -> Position {
        Position::new(self.board.transpose(), self.middle)
    }

    pub fn show(&self) -> String {
        let mut s = self.board.show();
        if self.middle {
            s.push_str("(middle)\n");
        }
        s
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.board.to_string())?;
        if self.middle {
            write!(f, "*")?;
        }
        Ok(())
    }
}

impl FromStr for Position {
    type Err = BoardError;

    /// 36 cells in row-major order, `X` black, `O` white, `-` empty, optional trailing `*`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (cells, middle) = match s.strip_suffix('*') {
            Some(cells) => (cells, true),
            None => (s, false),
        };
        if cells.chars().count() != 36 {
            return Err(BoardError::Parse(format!(
                "expected 36 cells, got {}",
                cells.chars().count()
            )));
        }
        let mut board = Board::empty();
        for (i, c) in cells.chars().enumerate() {
            let bit = 1 << square(i / 6, i % 6);
            match c {
                'X' | 'x' => board.black |= bit,
                'O' | 'o' => board.white |= bit,
                '-' | '.' => {}
                _ => return Err(BoardError::Parse(format!("invalid cell {c:?}"))),
            }
        }
        let position = Position::new(board, middle);
        position.validate()?;
        Ok(position)
    }
}

/// Random legal-looking position with `stones` stones and nobody holding five in a row.
pub fn random_position<R: Rng + ?Sized>(rng: &mut R, stones: usize, middle: bool) -> Position {
    assert!(stones <= 36 && (stones > 0 || !middle));
    let mut squares: Vec<u32> = (0..36).map(|i| square(i / 6, i % 6)).collect();
    loop {
        squares.shuffle(rng);
        let mut board = Board::empty();
        for (i, &bit) in squares[..stones].iter().enumerate() {
            board = board.place(bit, i & 1);
        }
        if !won(board.black) && !won(board.white) {
            return Position::new(board, middle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn quarter_turns_cycle() {
        for v in 0..512 {
            assert_eq!(rotate_quadrant_once(QUADRANT_ROTATIONS[3][v]), v as u16);
            assert_eq!(QUADRANT_ROTATIONS[2][v].count_ones(), (v as u16).count_ones());
        }
        // top right corner moves to top left
        assert_eq!(rotate_quadrant_once(1 << 2), 1);
        assert_eq!(rotate_quadrant_once(1 << 4), 1 << 4);
    }

    #[test]
    fn win_line_shapes() {
        assert_eq!(WIN_LINES.len(), 32);
        for line in WIN_LINES {
            assert_eq!(line.count_ones(), 5);
            assert_eq!(line & !SIDE_MASK, 0);
        }
        let mut row = 0;
        for y in 0..5 {
            row |= 1 << square(2, y);
        }
        assert!(won(row));
        assert!(!won(row & !(1 << square(2, 4))));
    }

    #[test]
    fn transpose_maps_lines_to_lines() {
        for line in WIN_LINES {
            let t = transpose_side(line);
            assert!(WIN_LINES.contains(&t));
            assert_eq!(transpose_side(t), line);
        }
    }

    #[test]
    fn parse_and_print() {
        let text = "XO----\
                    -X----\
                    ------\
                    ------\
                    ------\
                    ------*";
        let position: Position = text.parse().unwrap();
        assert!(position.middle);
        assert_eq!(position.count(), 3);
        assert_eq!(position.turn(), 0);
        assert_eq!(position.to_string(), text);
        assert_eq!(
            position.show(),
            format!("XO----\n-X----\n{}(middle)\n", "------\n".repeat(4))
        );
        assert_eq!(
            "XX----".repeat(6).parse::<Position>(),
            Err(BoardError::Unbalanced { black: 12, white: 0 })
        );
        assert!(matches!("XO".parse::<Position>(), Err(BoardError::Parse(_))));
        assert_eq!(
            Position::new(Board::empty(), true).validate(),
            Err(BoardError::EmptyMiddle)
        );
    }

    #[test]
    fn move_generation() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let position = random_position(&mut rng, 20, false);
            assert!(position.validate().is_ok());
            let moves = position.moves();
            assert_eq!(moves.len(), 16);
            for child in &moves {
                assert!(child.middle);
                assert_eq!(child.count(), 21);
                assert_eq!(child.turn(), position.turn());
                let rotations = child.moves();
                assert_eq!(rotations.len(), 8);
                assert!(rotations.iter().all(|r| !r.middle && r.count() == 21));
            }
        }
    }

    #[test]
    fn finished_positions() {
        let mut black = 0;
        for x in 0..5 {
            black |= 1 << square(x, 0);
        }
        let mut white = 0;
        for x in 0..5 {
            white |= 1 << square(x, 5);
        }
        // white to act, black has five
        let p = Position::new(Board::new(black, white & !(1 << square(0, 5))), false);
        assert!(p.done());
        assert_eq!(p.turn(), 1);
        assert_eq!(p.immediate_value(), -1);
        let both = Position::new(Board::new(black | 1 << square(5, 3), white), false);
        assert!(both.done());
        assert_eq!(both.immediate_value(), 0);
    }
}
