//! Combinatorial ranking of k-subsets of the empty squares.
//!
//! A set is packed 5 bits per entry, entry `i` in bits `5i..5i+5`, entries strictly
//! increasing with `i`. Its rank is `sum_i C(S[i], i + 1)`, which orders sets by their
//! largest element first and is dense in `0..C(n, k)`.

use crate::error::MidError;

pub type Set = u64;

/// Largest number of empty squares a mid-game solve handles.
pub const MAX_SPOTS: usize = 18;
/// Largest subset size ever ranked.
pub const MAX_SET: usize = 10;

const fn choose_table() -> [[u16; MAX_SET + 1]; MAX_SPOTS + 1] {
    let mut table = [[0; MAX_SET + 1]; MAX_SPOTS + 1];
    let mut n = 0;
    while n <= MAX_SPOTS {
        table[n][0] = 1;
        let mut k = 1;
        while k <= MAX_SET && n > 0 {
            table[n][k] = table[n - 1][k - 1] + table[n - 1][k];
            k += 1;
        }
        n += 1;
    }
    table
}

static FAST_CHOOSE: [[u16; MAX_SET + 1]; MAX_SPOTS + 1] = choose_table();

/// `C(n, k)` from a table, for `n <= 18` and `k <= 10`.
#[inline(always)]
pub fn fast_choose(n: usize, k: usize) -> u16 {
    debug_assert!(n <= MAX_SPOTS && k <= MAX_SET, "fast_choose({n}, {k})");
    FAST_CHOOSE[n][k]
}

/// Exact binomial coefficient, `None` on overflow.
pub fn choose_u128(n: u64, k: u64) -> Option<u128> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut res: u128 = 1;
    for i in 1..=k {
        // res * (n - k + i) is divisible by i since it is i * C(n - k + i, i)
        res = res.checked_mul((n - k + i) as u128)? / i as u128;
    }
    Some(res)
}

/// Binomial coefficient saturating at `u64::MAX`.
pub fn choose(n: usize, k: usize) -> u64 {
    choose_u128(n as u64, k as u64)
        .and_then(|c| u64::try_from(c).ok())
        .unwrap_or(u64::MAX)
}

#[inline(always)]
pub fn set_entry(set: Set, i: usize) -> usize {
    (set >> (5 * i) & 0x1f) as usize
}

fn check_range(n: usize, k: usize) -> Result<(), MidError> {
    if n > MAX_SPOTS || k > MAX_SET {
        return Err(MidError::SubsetRange { n, k });
    }
    Ok(())
}

/// Every k-subset of `0..n`, in rank order.
pub fn subsets(n: usize, k: usize) -> Result<Vec<Set>, MidError> {
    check_range(n, k)?;
    let mut all = Vec::with_capacity(choose(n, k) as usize);
    if k <= n {
        push_subsets(&mut all, k, n, 0);
    }
    debug_assert_eq!(all.len() as u64, choose(n, k));
    Ok(all)
}

/// Append every k-subset of `0..n` whose higher entries are already packed into `high`.
fn push_subsets(all: &mut Vec<Set>, k: usize, n: usize, high: Set) {
    if k == 0 {
        all.push(high);
        return;
    }
    for i in k - 1..n {
        push_subsets(all, k - 1, i, i as Set | high << 5);
    }
}

pub fn rank(set: Set, k: usize) -> usize {
    (0..k)
        .map(|i| fast_choose(set_entry(set, i), i + 1) as usize)
        .sum()
}

/// Inverse of [`rank`]: greedily take the largest entry whose binomial still fits.
pub fn unrank(mut r: usize, k: usize) -> Set {
    let mut set = 0;
    for i in (0..k).rev() {
        let mut v = i;
        while v < MAX_SPOTS && fast_choose(v + 1, i + 1) as usize <= r {
            v += 1;
        }
        r -= fast_choose(v, i + 1) as usize;
        set |= (v as Set) << (5 * i);
    }
    debug_assert_eq!(r, 0);
    set
}

/// Rank-addressed view of the k-subsets of `0..n`, decoded on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subsets {
    pub n: usize,
    pub k: usize,
    pub size: usize,
}

impl Subsets {
    pub fn new(n: usize, k: usize) -> Result<Self, MidError> {
        check_range(n, k)?;
        Ok(Self { n, k, size: choose(n, k) as usize })
    }

    #[inline]
    pub fn get(&self, r: usize) -> Set {
        debug_assert!(r < self.size);
        unrank(r, self.k)
    }

    pub fn iter(&self) -> impl Iterator<Item = Set> + '_ {
        (0..self.size).map(move |r| self.get(r))
    }
}

/// Scatter a set of indices into the empty squares, giving a side bitboard.
#[inline]
pub fn scatter(empty: &[u32], set: Set, k: usize) -> u64 {
    (0..k).fold(0, |side, i| side | 1 << empty[set_entry(set, i)])
}

/// Rank of the mover's set after adding the stone at `empty1[i]`, for each `i`.
///
/// `empty1` lists the indices not in `set0`, ascending. The new element lands at slot
/// `j = empty1[i] - i`, pushing every later entry up one slot.
pub fn child_ranks(set0: Set, k0: usize, empty1: &[usize], out: &mut Vec<usize>) {
    out.clear();
    for (i, &e) in empty1.iter().enumerate() {
        let j = e - i;
        let mut r = fast_choose(e, j + 1) as usize;
        for a in 0..k0 {
            r += fast_choose(set_entry(set0, a), a + (a >= j) as usize + 1) as usize;
        }
        out.push(r);
    }
}

/// `out[a * width + q] = C(empty1[q], a + 1)`: the absolute rank contribution of an
/// opponent stone that is entry `a` of its set and sits at relative index `q`.
pub fn absolute_offsets(empty1: &[usize], k1: usize, out: &mut Vec<usize>) {
    out.clear();
    for a in 0..k1 {
        out.extend(empty1.iter().map(|&e| fast_choose(e, a + 1) as usize));
    }
}

/// Change in the mover's rank relative to the squares the opponent leaves free.
///
/// `out[a * width + q]`: placing opponent entry `a` at relative index `q` removes
/// square `empty1[q]`, shifting down every mover entry above it. Entries below
/// `a` were removed already, so a mover entry `v` currently reads `v - a`.
pub fn relative_offsets(set0: Set, k0: usize, k1: usize, empty1: &[usize], out: &mut Vec<i32>) {
    out.clear();
    for a in 0..k1 {
        for (q, &e) in empty1.iter().enumerate() {
            let mut offset = 0i32;
            for i in e - q..k0 {
                let v = set_entry(set0, i);
                if v > a {
                    offset += fast_choose(v - a - 1, i + 1) as i32 - fast_choose(v - a, i + 1) as i32;
                }
            }
            out.push(offset);
        }
    }
}

/// `out[s1p * width + j]`: rank of opponent set `s1p` after relative index `j` is taken
/// by a new mover stone, so every opponent entry above `j` shifts down one.
pub fn filled_ranks(sets1p: &[Set], k1: usize, width: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(sets1p.len() * width);
    for (s1p, &set) in sets1p.iter().enumerate() {
        for j in 0..width {
            let mut r = s1p as i64;
            for a in 0..k1 {
                let v = set_entry(set, a);
                if j < v {
                    r += fast_choose(v - 1, a + 1) as i64 - fast_choose(v, a + 1) as i64;
                }
            }
            out.push(r as u32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(set: Set, k: usize) -> Vec<usize> {
        (0..k).map(|i| set_entry(set, i)).collect()
    }

    fn pack(entries: &[usize]) -> Set {
        entries
            .iter()
            .enumerate()
            .fold(0, |set, (i, &e)| set | (e as Set) << (5 * i))
    }

    #[test]
    fn table_matches_exact() {
        for n in 0..=MAX_SPOTS {
            for k in 0..=MAX_SET {
                assert_eq!(fast_choose(n, k) as u128, choose_u128(n as u64, k as u64).unwrap());
            }
        }
        assert_eq!(choose(18, 9), 48620);
        assert_eq!(choose(3, 5), 0);
        assert_eq!(choose_u128(100, 50), Some(100891344545564193334812497256));
        assert_eq!(choose_u128(300, 150), None);
        assert_eq!(choose(200, 100), u64::MAX);
    }

    #[test]
    fn ranks_are_dense_and_ordered() {
        for n in 0..=MAX_SPOTS {
            for k in 0..=n.min(MAX_SET) {
                let all = subsets(n, k).unwrap();
                assert_eq!(all.len() as u64, choose(n, k));
                let view = Subsets::new(n, k).unwrap();
                for (r, &set) in all.iter().enumerate() {
                    let e = entries(set, k);
                    assert!(e.windows(2).all(|w| w[0] < w[1]));
                    assert!(e.iter().all(|&v| v < n));
                    assert_eq!(rank(set, k), r);
                    assert_eq!(view.get(r), set);
                }
                assert!(view.iter().eq(all.iter().copied()));
            }
        }
        assert_eq!(subsets(4, 5).unwrap(), Vec::<Set>::new());
        assert_eq!(subsets(19, 2), Err(MidError::SubsetRange { n: 19, k: 2 }));
        assert_eq!(Subsets::new(4, 11), Err(MidError::SubsetRange { n: 4, k: 11 }));
    }

    #[test]
    fn empty_sets() {
        assert_eq!(subsets(7, 0).unwrap(), vec![0]);
        assert_eq!(rank(0, 0), 0);
        assert_eq!(scatter(&[3, 5], 0, 0), 0);
    }

    /// The relative positions of `inner` within the complement of `outer` in `0..n`.
    fn relative(inner: &[usize], outer: &[usize], n: usize) -> Vec<usize> {
        let free: Vec<usize> = (0..n).filter(|v| !outer.contains(v)).collect();
        inner.iter().map(|v| free.iter().position(|f| f == v).unwrap()).collect()
    }

    /// Check every incremental table for movers of `k0` and opponents of `k1` stones on
    /// `n` squares against ranks computed from scratch. `keep` picks which mover sets
    /// to look at.
    fn check_tables(n: usize, k0: usize, k1: usize, keep: &mut impl FnMut() -> bool) {
        let width = n - k0;
        let sets1p = subsets(width, k1).unwrap();
        let cs1ps = filled_ranks(&sets1p, k1, width);
        let (mut child, mut off1, mut off0) = (Vec::new(), Vec::new(), Vec::new());
        for (s0, set0) in subsets(n, k0).unwrap().into_iter().enumerate() {
            if !keep() {
                continue;
            }
            let e0 = entries(set0, k0);
            let empty1: Vec<usize> = (0..n).filter(|v| !e0.contains(v)).collect();
            child_ranks(set0, k0, &empty1, &mut child);
            absolute_offsets(&empty1, k1, &mut off1);
            relative_offsets(set0, k0, k1, &empty1, &mut off0);

            for (i, &e) in empty1.iter().enumerate() {
                let mut grown = e0.clone();
                grown.push(e);
                grown.sort();
                assert_eq!(child[i], rank(pack(&grown), k0 + 1));
            }

            for (s1p, &set1p) in sets1p.iter().enumerate() {
                let p1 = entries(set1p, k1);
                let abs1: Vec<usize> = p1.iter().map(|&q| empty1[q]).collect();
                let mut s1 = 0;
                let mut s0p = s0 as i64;
                for (a, &q) in p1.iter().enumerate() {
                    s1 += off1[a * width + q];
                    s0p += off0[a * width + q] as i64;
                }
                assert_eq!(s1, rank(pack(&abs1), k1));
                let rel0 = relative(&e0, &abs1, n);
                assert_eq!(s0p as usize, rank(pack(&rel0), k0));

                for j in 0..width {
                    if p1.contains(&j) {
                        continue;
                    }
                    let rel1 = relative(&abs1, &[e0.clone(), vec![empty1[j]]].concat(), n);
                    assert_eq!(cs1ps[s1p * width + j] as usize, rank(pack(&rel1), k1));
                }
            }
        }
    }

    #[test]
    fn incremental_tables_match_direct_ranks() {
        let n = 9;
        for k0 in 0..=4 {
            for k1 in 0..=(n - k0).min(4) {
                check_tables(n, k0, k1, &mut || true);
            }
        }
    }

    #[test]
    fn incremental_tables_on_a_full_slice() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // deep layers of an 18-spot sweep, a few mover sets each
        let mut rng = StdRng::seed_from_u64(18);
        for layer in [11, 14, 17, 18] {
            let k0 = layer / 2;
            for (k0, k1) in [(k0, layer - k0), (k0 - 1, layer - k0)] {
                let sets = choose(MAX_SPOTS, k0) as f64;
                check_tables(MAX_SPOTS, k0, k1, &mut || rng.random_bool((4.0 / sets).min(1.0)));
            }
        }
        // largest entries sit at 16 and 17
        let top = [8, 9, 10, 11, 12, 13, 14, 16, 17];
        assert_eq!(unrank(rank(pack(&top), 9), 9), pack(&top));
        assert_eq!(fast_choose(18, 10), 43758);
    }
}
