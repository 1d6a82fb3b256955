//! Workspace sizing and the two-ended layer layout.
//!
//! Layer `n` of a solve reads the layer `n + 1` results from one end of the buffer and
//! writes its own results to the other end. Odd layers read from the back, even layers
//! from the front, so consecutive layers alternate and never overlap.

use std::mem::{align_of, size_of};
use std::ops::{Index, IndexMut};

use crate::error::MidError;
use crate::halfsuper::Halfsupers;
use crate::mid::subsets::{choose, MAX_SPOTS};

/// Fewest stones a mid-game solve accepts.
pub const MIN_SLICE: usize = 36 - MAX_SPOTS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum End {
    Front,
    Back,
}

impl End {
    /// Where layer `n` finds the results of layer `n + 1`.
    pub fn input(n: usize) -> End {
        if n & 1 == 1 {
            End::Back
        } else {
            End::Front
        }
    }

    /// Where layer `n` leaves its results for layer `n - 1`.
    pub fn output(n: usize) -> End {
        Self::input(n).opposite()
    }

    pub fn opposite(self) -> End {
        match self {
            End::Front => End::Back,
            End::Back => End::Front,
        }
    }
}

/// A row-major `nx` by `ny` block anchored at one end of the workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grab {
    pub end: End,
    pub nx: usize,
    pub ny: usize,
}

impl Grab {
    pub fn size(&self) -> usize {
        self.nx * self.ny
    }
}

/// Entries of a layer with `stones` of the `spots` squares filled: every split of the
/// stones between the two colors that a game can produce.
fn count(spots: usize, stones: usize) -> usize {
    (choose(spots, stones) * choose(stones, stones / 2)) as usize
}

/// Largest workspace footprint of any layer of a solve over `spots` empty squares.
pub fn bottleneck(spots: usize) -> usize {
    let mut worst = count(spots, spots);
    for n in 0..spots {
        worst = worst.max(count(spots, n) + count(spots, n + 1));
    }
    worst
}

fn spots_for(min_slice: usize) -> Result<usize, MidError> {
    if min_slice < MIN_SLICE {
        return Err(MidError::TooFewStones(min_slice));
    }
    if min_slice > 36 {
        return Err(MidError::SliceRange(min_slice));
    }
    Ok(36 - min_slice)
}

/// Halfsuper pairs needed to solve any position with at least `min_slice` stones.
pub fn midsolve_workspace_size(min_slice: usize) -> Result<usize, MidError> {
    Ok(bottleneck(spots_for(min_slice)?))
}

/// A zeroed workspace for positions with at least `min_slice` stones.
pub fn midsolve_workspace(min_slice: usize) -> Result<Vec<Halfsupers>, MidError> {
    Ok(vec![Halfsupers::default(); midsolve_workspace_size(min_slice)?])
}

/// Bytes to reserve for a workspace, including room to align a raw byte buffer.
pub fn midsolve_workspace_memory_usage(min_slice: usize) -> Result<u64, MidError> {
    let pairs = midsolve_workspace_size(min_slice)? + 2;
    Ok((size_of::<Halfsupers>() * pairs) as u64)
}

/// View a raw byte buffer as a workspace, skipping at most one pair's worth of leading
/// bytes to reach alignment and dropping any ragged tail.
pub fn workspace_from_bytes(bytes: &mut [u8]) -> Result<&mut [Halfsupers], MidError> {
    let fix = bytes.as_ptr().align_offset(align_of::<Halfsupers>());
    if fix >= size_of::<Halfsupers>() || fix > bytes.len() {
        return Err(MidError::Misaligned);
    }
    let usable = (bytes.len() - fix) / size_of::<Halfsupers>() * size_of::<Halfsupers>();
    bytemuck::try_cast_slice_mut(&mut bytes[fix..fix + usable]).map_err(|_| MidError::Misaligned)
}

/// Read-only block of a layer.
pub struct Slab<'a> {
    data: &'a [Halfsupers],
    ny: usize,
}

impl Index<(usize, usize)> for Slab<'_> {
    type Output = Halfsupers;

    #[inline(always)]
    fn index(&self, (x, y): (usize, usize)) -> &Halfsupers {
        debug_assert!(y < self.ny);
        &self.data[x * self.ny + y]
    }
}

/// Writable block of a layer.
pub struct SlabMut<'a> {
    data: &'a mut [Halfsupers],
    ny: usize,
}

impl Index<(usize, usize)> for SlabMut<'_> {
    type Output = Halfsupers;

    #[inline(always)]
    fn index(&self, (x, y): (usize, usize)) -> &Halfsupers {
        debug_assert!(y < self.ny);
        &self.data[x * self.ny + y]
    }
}

impl IndexMut<(usize, usize)> for SlabMut<'_> {
    #[inline(always)]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Halfsupers {
        debug_assert!(y < self.ny);
        &mut self.data[x * self.ny + y]
    }
}

/// Borrowed workspace for one solve.
pub struct Workspace<'a> {
    buffer: &'a mut [Halfsupers],
}

impl<'a> Workspace<'a> {
    pub fn new(buffer: &'a mut [Halfsupers], spots: usize) -> Result<Self, MidError> {
        let needed = bottleneck(spots);
        if buffer.len() < needed {
            return Err(MidError::WorkspaceTooSmall { needed, actual: buffer.len() });
        }
        Ok(Self { buffer })
    }

    /// Split out the input block of one layer and the output block of the same layer.
    pub fn layers(&mut self, input: Grab, output: Grab) -> (Slab<'_>, SlabMut<'_>) {
        assert_ne!(input.end, output.end, "input and output share an end");
        let len = self.buffer.len();
        assert!(
            input.size() + output.size() <= len,
            "layers of {} and {} overflow a workspace of {len}",
            input.size(),
            output.size()
        );
        match input.end {
            End::Front => {
                let (front, back) = self.buffer.split_at_mut(input.size());
                let start = back.len() - output.size();
                (
                    Slab { data: front, ny: input.ny },
                    SlabMut { data: &mut back[start..], ny: output.ny },
                )
            }
            End::Back => {
                let (front, back) = self.buffer.split_at_mut(len - input.size());
                (
                    Slab { data: back, ny: input.ny },
                    SlabMut { data: &mut front[..output.size()], ny: output.ny },
                )
            }
        }
    }
}
