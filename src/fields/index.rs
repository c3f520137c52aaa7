/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Chunk offsets for variable-rate streams.
//!
//! In variable-rate modes blocks code to different lengths, so random access
//! needs the bit offset of each chunk of `granularity` blocks. The index is
//! built from the per-chunk lengths with a prefix sum grouped by 32 chunks,
//! and is stored either as absolute 64-bit offsets or in hybrid form: one
//! 64-bit base per 32-chunk group plus a 16-bit length per chunk.

use crate::errors::Error;

/// Chunks per hybrid group: one base offset, then 16-bit deltas.
const GROUP: usize = 32;

/// Representation of a [`BlockIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// An absolute 64-bit bit offset per chunk.
    Offsets,
    /// A 64-bit base per 32-chunk group plus 16-bit per-chunk lengths.
    Hybrid,
}

#[derive(Debug, Clone)]
enum Repr {
    Offsets(Vec<u64>),
    Hybrid { bases: Vec<u64>, lengths: Vec<u16> },
}

/// Bit offsets of the chunks of a variable-rate stream.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    granularity: usize,
    chunks: usize,
    repr: Repr,
}

impl BlockIndex {
    /// Build an index from per-chunk bit lengths.
    ///
    /// Fails with [`Error::IndexOverflow`] if `kind` is
    /// [`IndexKind::Hybrid`] and a chunk length does not fit 16 bits.
    pub fn from_lengths(
        lengths: &[u64],
        granularity: usize,
        kind: IndexKind,
    ) -> Result<Self, Error> {
        let chunks = lengths.len();
        let repr = match kind {
            IndexKind::Offsets => {
                let mut offsets = Vec::with_capacity(chunks);
                let mut offset = 0u64;
                for &len in lengths {
                    offsets.push(offset);
                    offset += len;
                }
                Repr::Offsets(offsets)
            }
            IndexKind::Hybrid => {
                let mut deltas = Vec::with_capacity(chunks);
                for &len in lengths {
                    deltas.push(
                        u16::try_from(len).map_err(|_| Error::IndexOverflow { bits: len })?,
                    );
                }
                // group-wise scan: one absolute base per 32 chunks
                let mut bases = Vec::with_capacity(chunks.div_ceil(GROUP));
                let mut offset = 0u64;
                for group in lengths.chunks(GROUP) {
                    bases.push(offset);
                    offset += group.iter().sum::<u64>();
                }
                Repr::Hybrid {
                    bases,
                    lengths: deltas,
                }
            }
        };
        Ok(Self {
            granularity: granularity.max(1),
            chunks,
            repr,
        })
    }

    /// Blocks per chunk.
    #[inline]
    pub fn granularity(&self) -> usize {
        self.granularity
    }

    /// Number of chunks.
    #[inline]
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Absolute bit offset of chunk `chunk`.
    pub fn chunk_offset(&self, chunk: usize) -> u64 {
        match &self.repr {
            Repr::Offsets(offsets) => offsets[chunk],
            Repr::Hybrid { bases, lengths } => {
                let group = chunk / GROUP;
                let mut offset = bases[group];
                for &len in &lengths[group * GROUP..chunk] {
                    offset += len as u64;
                }
                offset
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_offsets_and_hybrid_agree() {
        let lengths: Vec<u64> = (0..100).map(|i| (i * 37 % 512) + 1).collect();
        let a = BlockIndex::from_lengths(&lengths, 1, IndexKind::Offsets).unwrap();
        let b = BlockIndex::from_lengths(&lengths, 1, IndexKind::Hybrid).unwrap();
        assert_eq!(a.chunks(), 100);
        let mut expect = 0;
        for c in 0..100 {
            assert_eq!(a.chunk_offset(c), expect);
            assert_eq!(b.chunk_offset(c), expect);
            expect += lengths[c];
        }
    }

    #[test]
    fn test_hybrid_overflow() {
        let err = BlockIndex::from_lengths(&[1 << 16], 1, IndexKind::Hybrid).unwrap_err();
        assert_eq!(err, Error::IndexOverflow { bits: 1 << 16 });
        assert!(BlockIndex::from_lengths(&[u16::MAX as u64], 1, IndexKind::Hybrid).is_ok());
    }
}
