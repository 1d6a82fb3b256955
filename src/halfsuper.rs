//! Halfsupers: one bit per local rotation state of a board, restricted to one parity class.
//!
//! A local rotation state `x` is a byte whose bits `2q, 2q+1` hold the quarter turns of
//! quadrant `q`. Every quadrant rotation flips the parity of `x0 ^ x2 ^ x4 ^ x6`, so the
//! positions reachable after `n` moves all share a parity and only 128 of the 256 states
//! ever need to be stored. Bit `i` of a halfsuper with parity `p` stands for
//! `x = i << 1 | (p ^ i1 ^ i3 ^ i5)`.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use bytemuck::{Pod, Zeroable};

use crate::board::{quadrant, win_lines, Side, QUADRANT_ROTATIONS};

/// Parity class of a local rotation state.
#[inline(always)]
pub const fn state_parity(local: u8) -> bool {
    (local & 0x55).count_ones() & 1 == 1
}

/// Local rotation state stored at bit `i` of a halfsuper with parity `parity`.
#[inline(always)]
pub const fn local_state(i: usize, parity: bool) -> u8 {
    let i = i as u8;
    let low = parity as u8 ^ (i >> 1 & 1) ^ (i >> 3 & 1) ^ (i >> 5 & 1);
    i << 1 | low
}

#[inline(always)]
pub const fn halfsuper_index(local: u8) -> usize {
    (local >> 1) as usize
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Halfsuper(pub u128);

impl Halfsuper {
    pub const ZERO: Halfsuper = Halfsuper(0);
    pub const ALL: Halfsuper = Halfsuper(!0);

    /// Bit for local rotation state `local`. The caller tracks which parity this halfsuper has.
    #[inline]
    pub fn get(self, local: u8) -> bool {
        self.0 >> halfsuper_index(local) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, local: u8) {
        self.0 |= 1 << halfsuper_index(local);
    }
}

impl fmt::Debug for Halfsuper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Halfsuper({:#034x})", self.0)
    }
}

impl BitAnd for Halfsuper {
    type Output = Halfsuper;
    #[inline(always)]
    fn bitand(self, rhs: Halfsuper) -> Halfsuper {
        Halfsuper(self.0 & rhs.0)
    }
}

impl BitOr for Halfsuper {
    type Output = Halfsuper;
    #[inline(always)]
    fn bitor(self, rhs: Halfsuper) -> Halfsuper {
        Halfsuper(self.0 | rhs.0)
    }
}

impl Not for Halfsuper {
    type Output = Halfsuper;
    #[inline(always)]
    fn not(self) -> Halfsuper {
        Halfsuper(!self.0)
    }
}

impl BitAndAssign for Halfsuper {
    #[inline(always)]
    fn bitand_assign(&mut self, rhs: Halfsuper) {
        self.0 &= rhs.0;
    }
}

impl BitOrAssign for Halfsuper {
    #[inline(always)]
    fn bitor_assign(&mut self, rhs: Halfsuper) {
        self.0 |= rhs.0;
    }
}

/// Win and not-lose halfsupers of one board, from the point of view of the player to act.
///
/// This is the unit of workspace storage, so the layout is fixed at 32 bytes.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Halfsupers {
    pub win: Halfsuper,
    pub notlose: Halfsuper,
}

const fn quadrant_masks() -> [[[u128; 16]; 4]; 2] {
    let mut masks = [[[0; 16]; 4]; 2];
    let mut p = 0;
    while p < 2 {
        let mut q = 0;
        while q < 4 {
            let mut m = 0;
            while m < 16 {
                let mut mask = 0u128;
                let mut i = 0;
                while i < 128 {
                    let r = local_state(i, p == 1) >> (2 * q) & 3;
                    if m >> r & 1 != 0 {
                        mask |= 1 << i;
                    }
                    i += 1;
                }
                masks[p][q][m] = mask;
                m += 1;
            }
            q += 1;
        }
        p += 1;
    }
    masks
}

/// `QUADRANT_MASKS[p][q][m]`: states of parity `p` whose turn of quadrant `q` is in the 4-bit set `m`.
static QUADRANT_MASKS: [[[u128; 16]; 4]; 2] = quadrant_masks();

const fn line_parts() -> [[u16; 4]; 32] {
    let lines = win_lines();
    let mut parts = [[0; 4]; 32];
    let mut l = 0;
    while l < 32 {
        let mut q = 0;
        while q < 4 {
            parts[l][q] = quadrant(lines[l], q);
            q += 1;
        }
        l += 1;
    }
    parts
}

/// Each win line split into its four quadrant pieces.
static LINE_PARTS: [[u16; 4]; 32] = line_parts();

/// Local rotation states in which `side` has five in a row.
pub fn halfsuper_wins(side: Side, parity: bool) -> Halfsuper {
    let masks = &QUADRANT_MASKS[parity as usize];
    let mut rotated = [[0u16; 4]; 4];
    for (q, turns) in rotated.iter_mut().enumerate() {
        let v = quadrant(side, q) as usize;
        for (r, turned) in turns.iter_mut().enumerate() {
            *turned = QUADRANT_ROTATIONS[r][v];
        }
    }

    let mut wins = 0u128;
    for parts in &LINE_PARTS {
        let mut line = !0u128;
        for q in 0..4 {
            let part = parts[q];
            if part == 0 {
                continue;
            }
            let mut fits = 0;
            for r in 0..4 {
                if rotated[q][r] & part == part {
                    fits |= 1 << r;
                }
            }
            line &= masks[q][fits];
            if line == 0 {
                break;
            }
        }
        wins |= line;
    }
    Halfsuper(wins)
}

const fn field_masks() -> [[u128; 4]; 4] {
    let mut masks = [[0; 4]; 4];
    let mut q = 1;
    while q < 4 {
        let b = 2 * q - 1;
        let mut i = 0;
        while i < 128 {
            masks[q][(i >> b) & 3] |= 1 << i;
            i += 1;
        }
        q += 1;
    }
    masks
}

/// `FIELD_MASKS[q][v]` for `q >= 1`: indices whose 2-bit field at bit `2q - 1` equals `v`.
static FIELD_MASKS: [[u128; 4]; 4] = field_masks();

const EVEN: u128 = 0x5555_5555_5555_5555_5555_5555_5555_5555;

/// One rotation step: state `x` of the result is set if some quadrant turned by a single
/// quarter turn either way from `x` lands on a set state of `h`. The result has the opposite parity.
pub fn rmax(h: Halfsuper) -> Halfsuper {
    let g = h.0;
    // Quadrant 0 sits in the parity bit, so both of its neighbours share the index up to bit 0.
    let mut r = g | (g & EVEN) << 1 | (g & !EVEN) >> 1;
    for q in 1..4 {
        let s = 1 << (2 * q - 1);
        let low = FIELD_MASKS[q][0];
        let high = FIELD_MASKS[q][3];
        r |= (g & !high) << s | (g & high) >> (3 * s) | (g & !low) >> s | (g & low) << (3 * s);
    }
    Halfsuper(r)
}
