/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Serial and parallel per-block drivers.
//!
//! Blocks are visited in row-major order of the padded field. In fixed-rate
//! mode block `b` owns the bit range `[b·maxbits, (b+1)·maxbits)`, so blocks
//! are independent and the parallel drivers produce byte-identical streams in
//! any scheduling order. In variable-rate mode the parallel encoder first
//! measures per-chunk lengths, builds the offset index (the only barrier),
//! and then deposits bits at the indexed offsets.

use std::sync::atomic::{AtomicU64, Ordering};

use dsi_progress_logger::prelude::*;
use rayon::prelude::*;
use sync_cell_slice::SyncSlice;

use super::index::{BlockIndex, IndexKind};
use super::FieldLayout;
use crate::blocks::{self, max_block_bits, BlockShape};
use crate::errors::Error;
use crate::params::CodingParams;
use crate::stream::{as_atomic_words, words_for_bits, BlockReader, BlockWriter};
use crate::traits::Scalar;

/// Geometry of the block decomposition of a field.
pub(crate) struct BlockGrid {
    size: [usize; 3],
    stride: [isize; 3],
    origin: usize,
    nblocks: [usize; 3],
}

impl BlockGrid {
    pub(crate) fn new<D: BlockShape>(layout: &FieldLayout) -> Self {
        let mut nblocks = [1; 3];
        for d in 0..D::DIMS as usize {
            nblocks[d] = layout.size[d].div_ceil(4);
        }
        Self {
            size: layout.size,
            stride: layout.stride,
            origin: layout.origin,
            nblocks,
        }
    }

    pub(crate) fn blocks(&self) -> usize {
        self.nblocks.iter().product()
    }

    /// Scalar coordinates of the first sample of block `b`.
    #[inline]
    fn coords(&self, b: usize) -> [usize; 3] {
        [
            (b % self.nblocks[0]) * 4,
            (b / self.nblocks[0] % self.nblocks[1]) * 4,
            (b / (self.nblocks[0] * self.nblocks[1])) * 4,
        ]
    }

    #[inline]
    fn origin_of(&self, c: [usize; 3]) -> usize {
        (self.origin as isize
            + c[0] as isize * self.stride[0]
            + c[1] as isize * self.stride[1]
            + c[2] as isize * self.stride[2]) as usize
    }

    /// Valid extent of block `b` along dimension `d`.
    #[inline]
    fn valid(&self, c: [usize; 3], d: usize) -> usize {
        (self.size[d] - c[d]).min(4)
    }

    /// Copy block `b` from the strided field into `fblock`, padding partial
    /// blocks.
    pub(crate) fn gather<S: Scalar, D: BlockShape>(&self, data: &[S], b: usize, fblock: &mut [S]) {
        let c = self.coords(b);
        let o = self.origin_of(c);
        let [sx, sy, sz] = self.stride;
        match D::DIMS {
            1 => {
                let nx = self.valid(c, 0);
                if nx < 4 {
                    blocks::gather_partial1(fblock, data, o, nx, sx);
                } else {
                    blocks::gather1(fblock, data, o, sx);
                }
            }
            2 => {
                let (nx, ny) = (self.valid(c, 0), self.valid(c, 1));
                if nx < 4 || ny < 4 {
                    blocks::gather_partial2(fblock, data, o, nx, ny, sx, sy);
                } else {
                    blocks::gather2(fblock, data, o, sx, sy);
                }
            }
            _ => {
                let (nx, ny, nz) = (self.valid(c, 0), self.valid(c, 1), self.valid(c, 2));
                if nx < 4 || ny < 4 || nz < 4 {
                    blocks::gather_partial3(fblock, data, o, nx, ny, nz, sx, sy, sz);
                } else {
                    blocks::gather3(fblock, data, o, sx, sy, sz);
                }
            }
        }
    }

    /// Copy `fblock` back into the strided field through `write(index,
    /// value)`, honoring the valid extents of block `b`.
    pub(crate) fn scatter<S: Scalar, D: BlockShape>(
        &self,
        fblock: &[S],
        b: usize,
        write: impl FnMut(usize, S),
    ) {
        let c = self.coords(b);
        let o = self.origin_of(c);
        let [sx, sy, sz] = self.stride;
        match D::DIMS {
            1 => {
                let nx = self.valid(c, 0);
                if nx < 4 {
                    blocks::scatter_partial1(fblock, write, o, nx, sx);
                } else {
                    blocks::scatter1(fblock, write, o, sx);
                }
            }
            2 => {
                let (nx, ny) = (self.valid(c, 0), self.valid(c, 1));
                if nx < 4 || ny < 4 {
                    blocks::scatter_partial2(fblock, write, o, nx, ny, sx, sy);
                } else {
                    blocks::scatter2(fblock, write, o, sx, sy);
                }
            }
            _ => {
                let (nx, ny, nz) = (self.valid(c, 0), self.valid(c, 1), self.valid(c, 2));
                if nx < 4 || ny < 4 || nz < 4 {
                    blocks::scatter_partial3(fblock, write, o, nx, ny, nz, sx, sy, sz);
                } else {
                    blocks::scatter3(fblock, write, o, sx, sy, sz);
                }
            }
        }
    }
}

/// Zero the prefix of `stream` that an encode pass will deposit into.
fn prepare_stream(stream: &mut [u64], bits: u64) -> Result<usize, Error> {
    let required = words_for_bits(bits);
    if stream.len() < required {
        return Err(Error::StreamTooSmall {
            required,
            len: stream.len(),
        });
    }
    stream[..required].fill(0);
    Ok(required)
}

pub(crate) fn serial_encode_fixed<S: Scalar, D: BlockShape>(
    data: &[S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &mut [u64],
) -> Result<u64, Error> {
    let grid = BlockGrid::new::<D>(layout);
    let blocks = grid.blocks();
    let maxbits = params.maxbits as u64;
    prepare_stream(stream, blocks as u64 * maxbits)?;
    let words = as_atomic_words(stream);

    let mut pl = progress_logger![item_name = "block", expected_updates = Some(blocks)];
    pl.start("Encoding blocks...");
    let mut fblock = [S::default(); 64];
    for b in 0..blocks {
        let fblock = &mut fblock[..D::BLOCK_SIZE];
        grid.gather::<S, D>(data, b, fblock);
        let mut writer = BlockWriter::new(words, b as u64 * maxbits);
        S::encode_block::<D>(fblock, &mut writer, params);
        pl.light_update();
    }
    pl.done();
    log::info!("Encoded {blocks} blocks at {maxbits} bits per block");
    Ok(blocks as u64 * maxbits)
}

pub(crate) fn par_encode_fixed<S: Scalar, D: BlockShape>(
    data: &[S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &mut [u64],
) -> Result<u64, Error> {
    let grid = BlockGrid::new::<D>(layout);
    let blocks = grid.blocks();
    let maxbits = params.maxbits as u64;
    prepare_stream(stream, blocks as u64 * maxbits)?;
    let words = as_atomic_words(stream);

    (0..blocks).into_par_iter().for_each(|b| {
        let mut fblock = [S::default(); 64];
        let fblock = &mut fblock[..D::BLOCK_SIZE];
        grid.gather::<S, D>(data, b, fblock);
        let mut writer = BlockWriter::new(words, b as u64 * maxbits);
        S::encode_block::<D>(fblock, &mut writer, params);
    });
    log::info!("Encoded {blocks} blocks in parallel at {maxbits} bits per block");
    Ok(blocks as u64 * maxbits)
}

pub(crate) fn serial_decode_fixed<S: Scalar, D: BlockShape>(
    out: &mut [S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &[u64],
) -> Result<u64, Error> {
    let grid = BlockGrid::new::<D>(layout);
    let blocks = grid.blocks();
    let maxbits = params.maxbits as u64;

    let mut pl = progress_logger![item_name = "block", expected_updates = Some(blocks)];
    pl.start("Decoding blocks...");
    let mut max_offset = 0;
    let mut fblock = [S::default(); 64];
    for b in 0..blocks {
        let fblock = &mut fblock[..D::BLOCK_SIZE];
        let mut reader = BlockReader::new(stream, b as u64 * maxbits);
        S::decode_block::<D>(fblock, &mut reader, params);
        max_offset = max_offset.max(reader.rtell());
        grid.scatter::<S, D>(fblock, b, |i, v| out[i] = v);
        pl.light_update();
    }
    pl.done();
    log::info!("Decoded {blocks} blocks; highest bit offset read is {max_offset}");
    Ok(max_offset)
}

pub(crate) fn par_decode_fixed<S: Scalar, D: BlockShape>(
    out: &mut [S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &[u64],
) -> Result<u64, Error> {
    let grid = BlockGrid::new::<D>(layout);
    let blocks = grid.blocks();
    let maxbits = params.maxbits as u64;
    let out_sync = out.as_sync_slice();
    let max_offset = AtomicU64::new(0);

    (0..blocks).into_par_iter().for_each(|b| {
        let mut fblock = [S::default(); 64];
        let fblock = &mut fblock[..D::BLOCK_SIZE];
        let mut reader = BlockReader::new(stream, b as u64 * maxbits);
        S::decode_block::<D>(fblock, &mut reader, params);
        max_offset.fetch_max(reader.rtell(), Ordering::Relaxed);
        // SAFETY: blocks cover disjoint regions of the output array, so no
        // two workers ever write the same element
        grid.scatter::<S, D>(fblock, b, |i, v| unsafe { out_sync[i].set(v) });
    });
    let max_offset = max_offset.into_inner();
    log::info!("Decoded {blocks} blocks in parallel; highest bit offset read is {max_offset}");
    Ok(max_offset)
}

/// Blocks `[chunk · granularity, …)` of chunk `chunk`.
#[inline]
fn chunk_blocks(chunk: usize, granularity: usize, blocks: usize) -> core::ops::Range<usize> {
    let start = chunk * granularity;
    start..(start + granularity).min(blocks)
}

pub(crate) fn serial_encode_var<S: Scalar, D: BlockShape>(
    data: &[S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &mut [u64],
    granularity: usize,
    kind: IndexKind,
) -> Result<(u64, BlockIndex), Error> {
    let grid = BlockGrid::new::<D>(layout);
    let blocks = grid.blocks();
    let granularity = granularity.max(1);
    let chunks = blocks.div_ceil(granularity);
    let worst = max_block_bits::<S, D>(params) as u64;
    prepare_stream(stream, blocks as u64 * worst)?;
    let words = as_atomic_words(stream);

    let mut pl = progress_logger![item_name = "block", expected_updates = Some(blocks)];
    pl.start("Encoding blocks...");
    let mut lengths = vec![0u64; chunks];
    let mut offset = 0u64;
    let mut fblock = [S::default(); 64];
    for (chunk, len) in lengths.iter_mut().enumerate() {
        let start = offset;
        for b in chunk_blocks(chunk, granularity, blocks) {
            let fblock = &mut fblock[..D::BLOCK_SIZE];
            grid.gather::<S, D>(data, b, fblock);
            let mut writer = BlockWriter::new(words, offset);
            offset += S::encode_block::<D>(fblock, &mut writer, params) as u64;
            pl.light_update();
        }
        *len = offset - start;
    }
    pl.done();
    let index = BlockIndex::from_lengths(&lengths, granularity, kind)?;
    log::info!("Encoded {blocks} blocks in {chunks} chunks, {offset} bits total");
    Ok((offset, index))
}

pub(crate) fn par_encode_var<S: Scalar, D: BlockShape>(
    data: &[S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &mut [u64],
    granularity: usize,
    kind: IndexKind,
) -> Result<(u64, BlockIndex), Error> {
    let grid = BlockGrid::new::<D>(layout);
    let blocks = grid.blocks();
    let granularity = granularity.max(1);
    let chunks = blocks.div_ceil(granularity);
    let worst = max_block_bits::<S, D>(params) as u64;

    // phase 1: measure per-chunk lengths into worker-local scratch
    let mut lengths = vec![0u64; chunks];
    lengths.par_iter_mut().enumerate().for_each(|(chunk, len)| {
        let mut scratch = vec![0u64; words_for_bits(granularity as u64 * worst)];
        let words = as_atomic_words(&mut scratch);
        let mut offset = 0u64;
        let mut fblock = [S::default(); 64];
        for b in chunk_blocks(chunk, granularity, blocks) {
            let fblock = &mut fblock[..D::BLOCK_SIZE];
            grid.gather::<S, D>(data, b, fblock);
            let mut writer = BlockWriter::new(words, offset);
            offset += S::encode_block::<D>(fblock, &mut writer, params) as u64;
        }
        *len = offset;
    });

    log::debug!("measured {chunks} chunk lengths");
    // the index build is the barrier between length computation and deposit
    let index = BlockIndex::from_lengths(&lengths, granularity, kind)?;
    let total: u64 = lengths.iter().sum();
    prepare_stream(stream, total)?;
    let words = as_atomic_words(stream);

    // phase 2: re-encode each chunk at its final offset
    (0..chunks).into_par_iter().for_each(|chunk| {
        let mut offset = index.chunk_offset(chunk);
        let mut fblock = [S::default(); 64];
        for b in chunk_blocks(chunk, granularity, blocks) {
            let fblock = &mut fblock[..D::BLOCK_SIZE];
            grid.gather::<S, D>(data, b, fblock);
            let mut writer = BlockWriter::new(words, offset);
            offset += S::encode_block::<D>(fblock, &mut writer, params) as u64;
        }
    });
    log::info!("Encoded {blocks} blocks in {chunks} chunks in parallel, {total} bits total");
    Ok((total, index))
}

pub(crate) fn serial_decode_var<S: Scalar, D: BlockShape>(
    out: &mut [S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &[u64],
    index: &BlockIndex,
) -> Result<u64, Error> {
    let grid = BlockGrid::new::<D>(layout);
    let blocks = grid.blocks();
    let granularity = index.granularity();

    let mut pl = progress_logger![item_name = "block", expected_updates = Some(blocks)];
    pl.start("Decoding blocks...");
    let mut max_offset = 0;
    let mut fblock = [S::default(); 64];
    for chunk in 0..index.chunks() {
        let mut reader = BlockReader::new(stream, index.chunk_offset(chunk));
        for b in chunk_blocks(chunk, granularity, blocks) {
            let fblock = &mut fblock[..D::BLOCK_SIZE];
            S::decode_block::<D>(fblock, &mut reader, params);
            grid.scatter::<S, D>(fblock, b, |i, v| out[i] = v);
            pl.light_update();
        }
        max_offset = max_offset.max(reader.rtell());
    }
    pl.done();
    log::info!("Decoded {blocks} blocks; highest bit offset read is {max_offset}");
    Ok(max_offset)
}

pub(crate) fn par_decode_var<S: Scalar, D: BlockShape>(
    out: &mut [S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &[u64],
    index: &BlockIndex,
) -> Result<u64, Error> {
    let grid = BlockGrid::new::<D>(layout);
    let blocks = grid.blocks();
    let granularity = index.granularity();
    let out_sync = out.as_sync_slice();
    let max_offset = AtomicU64::new(0);

    (0..index.chunks()).into_par_iter().for_each(|chunk| {
        let mut reader = BlockReader::new(stream, index.chunk_offset(chunk));
        let mut fblock = [S::default(); 64];
        for b in chunk_blocks(chunk, granularity, blocks) {
            let fblock = &mut fblock[..D::BLOCK_SIZE];
            S::decode_block::<D>(fblock, &mut reader, params);
            // SAFETY: blocks cover disjoint regions of the output array, so
            // no two workers ever write the same element
            grid.scatter::<S, D>(fblock, b, |i, v| unsafe { out_sync[i].set(v) });
        }
        max_offset.fetch_max(reader.rtell(), Ordering::Relaxed);
    });
    let max_offset = max_offset.into_inner();
    log::info!("Decoded {blocks} blocks in parallel; highest bit offset read is {max_offset}");
    Ok(max_offset)
}
