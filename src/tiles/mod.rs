/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A fixed grid of variable-rate compressed blocks sharing one word arena.
//!
//! Each block slot is either empty (a zero block), cached (the caller holds
//! the uncompressed block elsewhere), or stored at a bit offset inside the
//! arena. Freed ranges are kept in a sorted free list of word ranges;
//! adjacent ranges merge on release, allocation is first-fit with the
//! remainder split back into the list. The arena grows geometrically on
//! demand and never shrinks.
//!
//! The tile stores no per-block length: a stored block's bit count is
//! recovered by walking its stream, which the embedded coder makes possible
//! from the coding parameters alone.
//!
//! A tile is single-owner; all operations take `&mut self`.

use std::marker::PhantomData;

use crate::blocks::{max_block_bits, BlockShape};
use crate::errors::Error;
use crate::params::CodingParams;
use crate::stream::{as_atomic_words, BlockReader, BlockWriter};
use crate::traits::Scalar;

/// Growth numerator/denominator of the arena: 3/2.
const GROWTH_NUM: usize = 3;
const GROWTH_DEN: usize = 2;

/// State of one block slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPos {
    /// No data stored; the block is all zeros.
    Empty,
    /// The caller holds the block uncompressed elsewhere.
    Cached,
    /// Compressed data starts at this bit offset in the arena.
    Stored(u64),
}

/// A contiguous free range of the arena, in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeRange {
    offset: usize,
    words: usize,
}

/// A tile of [`BlockShape::TILE_BLOCKS`] compressed blocks of scalar `S`.
pub struct Tile<S: Scalar, D: BlockShape> {
    /// Word arena holding the compressed blocks.
    data: Vec<u64>,
    /// Per-slot position codes.
    pos: Box<[BlockPos]>,
    /// Free ranges, sorted by offset, never empty or adjacent.
    free: Vec<FreeRange>,
    /// Cap on arena growth, in words.
    limit: usize,
    _marker: PhantomData<(S, D)>,
}

impl<S: Scalar, D: BlockShape> Default for Tile<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scalar, D: BlockShape> Tile<S, D> {
    /// An empty tile with an empty arena.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// An empty tile whose arena starts at `words` words.
    pub fn with_capacity(words: usize) -> Self {
        let mut free = Vec::new();
        if words > 0 {
            free.push(FreeRange { offset: 0, words });
        }
        Self {
            data: vec![0; words],
            pos: vec![BlockPos::Empty; D::TILE_BLOCKS].into_boxed_slice(),
            free,
            limit: usize::MAX,
            _marker: PhantomData,
        }
    }

    /// Cap the arena at `words` words; growth beyond the cap fails with
    /// [`Error::ArenaExhausted`].
    pub fn with_limit(words: usize, limit: usize) -> Self {
        let mut tile = Self::with_capacity(words);
        tile.limit = limit;
        tile
    }

    /// Arena capacity in bits.
    pub fn capacity(&self) -> u64 {
        self.data.len() as u64 * 64
    }

    /// Position code of slot `id`.
    pub fn pos(&self, id: usize) -> BlockPos {
        self.pos[id]
    }

    /// Number of words needed for `bits` bits.
    #[inline]
    pub fn word_size(bits: u64) -> usize {
        crate::stream::words_for_bits(bits)
    }

    /// Total free words of the arena.
    pub fn free_words(&self) -> usize {
        self.free.iter().map(|r| r.words).sum()
    }

    /// Encode `block` and store it in slot `id`, releasing any previously
    /// stored data. Returns the number of bits stored.
    ///
    /// On [`Error::ArenaExhausted`] the slot is left unchanged.
    pub fn store(&mut self, id: usize, block: &[S], params: &CodingParams) -> Result<u64, Error> {
        assert_eq!(block.len(), D::BLOCK_SIZE);

        // encode into scratch sized to the worst-case block
        let mut fblock = [S::default(); 64];
        fblock[..block.len()].copy_from_slice(block);
        let worst = max_block_bits::<S, D>(params);
        let mut scratch = vec![0u64; Self::word_size(worst as u64)];
        let bits = {
            let words = as_atomic_words(&mut scratch);
            let mut writer = BlockWriter::new(words, 0);
            S::encode_block::<D>(&mut fblock[..block.len()], &mut writer, params) as u64
        };

        let words = Self::word_size(bits);

        // release the old range first so a replacement can reuse it
        let old = if let BlockPos::Stored(old) = self.pos[id] {
            let old_bits = self.stored_bits(old, params);
            let range = ((old / 64) as usize, Self::word_size(old_bits));
            self.deallocate(range.0, range.1);
            Some(range)
        } else {
            None
        };

        let offset = match self.allocate(words) {
            Ok(offset) => offset,
            Err(e) => {
                // put the old range back; the slot must be left unchanged
                if let Some((offset, words)) = old {
                    self.reserve(offset, words);
                }
                return Err(e);
            }
        };

        self.data[offset..offset + words].copy_from_slice(&scratch[..words]);
        self.pos[id] = BlockPos::Stored(offset as u64 * 64);
        Ok(bits)
    }

    /// Carve the range `[offset, offset + words)` back out of the free list.
    /// The range must lie entirely within one free range.
    fn reserve(&mut self, offset: usize, words: usize) {
        let i = self
            .free
            .iter()
            .position(|r| r.offset <= offset && offset + words <= r.offset + r.words)
            .expect("reserved range is free");
        let range = self.free[i];
        let before = offset - range.offset;
        let after = range.offset + range.words - (offset + words);
        match (before > 0, after > 0) {
            (false, false) => {
                self.free.remove(i);
            }
            (true, false) => self.free[i].words = before,
            (false, true) => {
                self.free[i].offset = offset + words;
                self.free[i].words = after;
            }
            (true, true) => {
                self.free[i].words = before;
                self.free.insert(
                    i + 1,
                    FreeRange {
                        offset: offset + words,
                        words: after,
                    },
                );
            }
        }
        debug_assert!(self.check_free_list());
    }

    /// Decode slot `id` into `block`. Returns the number of bits read.
    ///
    /// An empty slot yields the zero block; a cached slot yields nothing (the
    /// caller already holds the block). With `cache` set, a stored slot
    /// transitions to cached and its compressed range is released.
    pub fn load(
        &mut self,
        id: usize,
        block: &mut [S],
        params: &CodingParams,
        cache: bool,
    ) -> u64 {
        assert_eq!(block.len(), D::BLOCK_SIZE);
        match self.pos[id] {
            BlockPos::Cached => 0,
            BlockPos::Empty => {
                block.fill(S::default());
                0
            }
            BlockPos::Stored(offset) => {
                let mut reader = BlockReader::new(&self.data, offset);
                let bits = S::decode_block::<D>(block, &mut reader, params) as u64;
                if cache {
                    self.pos[id] = BlockPos::Cached;
                    self.deallocate((offset / 64) as usize, Self::word_size(bits));
                }
                bits
            }
        }
    }

    /// Return slot `id` to the empty state, releasing any stored data.
    pub fn free(&mut self, id: usize, params: &CodingParams) {
        if let BlockPos::Stored(offset) = self.pos[id] {
            let bits = self.stored_bits(offset, params);
            self.deallocate((offset / 64) as usize, Self::word_size(bits));
        }
        self.pos[id] = BlockPos::Empty;
    }

    /// Bit length of the block stored at `offset`, recovered by walking its
    /// stream.
    fn stored_bits(&self, offset: u64, params: &CodingParams) -> u64 {
        let mut scratch = [S::default(); 64];
        let mut reader = BlockReader::new(&self.data, offset);
        S::decode_block::<D>(&mut scratch[..D::BLOCK_SIZE], &mut reader, params) as u64
    }

    /// First-fit allocation of `words` words, growing the arena on demand.
    fn allocate(&mut self, words: usize) -> Result<usize, Error> {
        debug_assert!(words > 0);
        loop {
            if let Some(i) = self.free.iter().position(|r| r.words >= words) {
                let range = &mut self.free[i];
                let offset = range.offset;
                if range.words > words {
                    range.offset += words;
                    range.words -= words;
                } else {
                    self.free.remove(i);
                }
                debug_assert!(self.check_free_list());
                return Ok(offset);
            }
            self.grow(words)?;
        }
    }

    /// Extend the arena by at least `words` words.
    fn grow(&mut self, words: usize) -> Result<(), Error> {
        let old = self.data.len();
        let target = (old + words).max(old * GROWTH_NUM / GROWTH_DEN);
        let target = target.min(self.limit);
        if target < old + words {
            return Err(Error::ArenaExhausted {
                requested: words,
                limit: self.limit,
            });
        }
        log::debug!("growing tile arena from {old} to {target} words");
        self.data.resize(target, 0);
        self.deallocate(old, target - old);
        Ok(())
    }

    /// Insert the range `[offset, offset + words)` into the free list,
    /// merging with its neighbors when adjacent.
    fn deallocate(&mut self, offset: usize, words: usize) {
        debug_assert!(words > 0);
        let i = self.free.partition_point(|r| r.offset < offset);
        // merge with the preceding range
        if i > 0 && self.free[i - 1].offset + self.free[i - 1].words == offset {
            self.free[i - 1].words += words;
            // and with the following one
            if i < self.free.len() && self.free[i].offset == offset + words {
                self.free[i - 1].words += self.free[i].words;
                self.free.remove(i);
            }
        } else if i < self.free.len() && self.free[i].offset == offset + words {
            self.free[i].offset = offset;
            self.free[i].words += words;
        } else {
            self.free.insert(i, FreeRange { offset, words });
        }
        debug_assert!(self.check_free_list());
    }

    /// Free-list canonical form: nonempty ranges, strictly ordered, not
    /// adjacent, inside the arena.
    fn check_free_list(&self) -> bool {
        let mut prev_end = None;
        for r in &self.free {
            if r.words == 0 || r.offset + r.words > self.data.len() {
                return false;
            }
            if let Some(end) = prev_end {
                if r.offset <= end {
                    return false;
                }
            }
            prev_end = Some(r.offset + r.words);
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::{Dim1, Dim2};
    use crate::params::CodingParams;

    type Tile2 = Tile<f64, Dim2>;

    fn ranges(tile: &Tile2) -> Vec<(usize, usize)> {
        tile.free.iter().map(|r| (r.offset, r.words)).collect()
    }

    /// A 4x4 block whose compressed size grows with `scale`.
    fn block(scale: f64) -> [f64; 16] {
        core::array::from_fn(|i| scale * ((i * i) as f64 + 0.37 * i as f64))
    }

    #[test]
    fn test_allocate_split_and_merge() {
        let mut tile = Tile2::with_capacity(256);
        let a = tile.allocate(2).unwrap();
        let b = tile.allocate(5).unwrap();
        let c = tile.allocate(2).unwrap();
        let d = tile.allocate(4).unwrap();
        assert_eq!((a, b, c, d), (0, 2, 7, 9));
        assert_eq!(ranges(&tile), vec![(13, 243)]);

        tile.deallocate(b, 5);
        assert_eq!(ranges(&tile), vec![(2, 5), (13, 243)]);

        // the hole is reused first-fit
        let e = tile.allocate(4).unwrap();
        assert_eq!(e, 2);
        assert_eq!(ranges(&tile), vec![(6, 1), (13, 243)]);

        // freeing everything coalesces into a single range
        tile.deallocate(e, 4);
        tile.deallocate(a, 2);
        tile.deallocate(c, 2);
        tile.deallocate(d, 4);
        assert_eq!(ranges(&tile), vec![(0, 256)]);
        assert_eq!(tile.free_words(), 256);
    }

    #[test]
    fn test_store_free_cycle_preserves_invariants() {
        let params = CodingParams::default();
        let mut tile = Tile2::with_capacity(256);

        let mut bits = [0u64; 4];
        for id in 0..4 {
            bits[id] = tile.store(id, &block((id + 1) as f64), &params).unwrap();
            assert!(bits[id] > 0);
        }
        let live: usize = bits.iter().map(|&b| Tile2::word_size(b)).sum();
        assert_eq!(tile.free_words() + live, tile.data.len());

        tile.free(1, &params);
        assert_eq!(tile.pos(1), BlockPos::Empty);
        let live: usize = [0, 2, 3].iter().map(|&i| Tile2::word_size(bits[i])).sum();
        assert_eq!(tile.free_words() + live, tile.data.len());

        // the freed hole plus the tail satisfies a new allocation
        let bits4 = tile.store(4, &block(2.5), &params).unwrap();
        assert!(bits4 > 0);
        let live = live + Tile2::word_size(bits4);
        assert_eq!(tile.free_words() + live, tile.data.len());
    }

    #[test]
    fn test_load_roundtrip_and_cache() {
        let params = CodingParams::default();
        let mut tile = Tile2::new();
        let input = block(3.0);
        tile.store(7, &input, &params).unwrap();
        assert!(matches!(tile.pos(7), BlockPos::Stored(_)));

        let mut out = [0.0f64; 16];
        let bits = tile.load(7, &mut out, &params, false);
        assert!(bits > 0);
        for (a, b) in out.iter().zip(input.iter()) {
            assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
        }
        // non-caching load leaves the slot stored
        assert!(matches!(tile.pos(7), BlockPos::Stored(_)));

        // caching load frees the compressed range
        let free_before = tile.free_words();
        tile.load(7, &mut out, &params, true);
        assert_eq!(tile.pos(7), BlockPos::Cached);
        assert!(tile.free_words() > free_before);
        assert_eq!(tile.free_words(), tile.data.len());

        // evict: encode the cached block back into the tile
        tile.store(7, &out, &params).unwrap();
        assert!(matches!(tile.pos(7), BlockPos::Stored(_)));
    }

    #[test]
    fn test_store_replaces_in_place() {
        let params = CodingParams::default();
        let mut tile = Tile2::new();
        tile.store(0, &block(1.0), &params).unwrap();
        tile.store(1, &block(2.0), &params).unwrap();
        let cap = tile.data.len();
        for _ in 0..10 {
            tile.store(0, &block(4.0), &params).unwrap();
        }
        // repeated replacement reuses released space instead of growing
        assert!(tile.data.len() <= cap * 2);
        let mut out = [0.0f64; 16];
        tile.load(0, &mut out, &params, false);
        let expect = block(4.0);
        for (a, b) in out.iter().zip(expect.iter()) {
            assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
        }
    }

    #[test]
    fn test_empty_slot_loads_zeros() {
        let params = CodingParams::default();
        let mut tile = Tile::<i32, Dim1>::new();
        let mut out = [5i32; 4];
        assert_eq!(tile.load(0, &mut out, &params, false), 0);
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn test_arena_exhaustion_leaves_slot_unchanged() {
        let params = CodingParams::default();
        let mut tile = Tile2::with_limit(0, 2);
        let err = tile.store(0, &block(1.0), &params).unwrap_err();
        assert!(matches!(err, Error::ArenaExhausted { .. }));
        assert_eq!(tile.pos(0), BlockPos::Empty);

        // an integer block of zeros is small enough to fit two words
        let mut small = Tile::<i32, Dim1>::with_limit(0, 2);
        small.store(0, &[0i32; 4], &params).unwrap();
        assert!(matches!(small.pos(0), BlockPos::Stored(_)));
    }

    #[test]
    fn test_int_tile_roundtrip_exact() {
        let params = CodingParams::default();
        let mut tile = Tile::<i64, Dim1>::new();
        let input = [-3i64, 1, 4, -1];
        tile.store(0, &input, &params).unwrap();
        let mut out = [0i64; 4];
        tile.load(0, &mut out, &params, false);
        assert_eq!(out, input);
    }
}
