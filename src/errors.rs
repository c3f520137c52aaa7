/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Error types shared by the field drivers and the tile allocator.

use thiserror::Error;

/// Errors reported by the codec drivers and the tile allocator.
///
/// An undersized per-block bit budget is *not* an error: a block whose budget
/// cannot fit its exponent field codes as a single zero bit (see
/// [`crate::blocks`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The field extents describe no valid dimensionality: either all extents
    /// are zero, or a zero extent precedes a nonzero one.
    #[error("invalid field dimensions {size:?}")]
    BadDimensions { size: [usize; 3] },

    /// The layout addresses an element outside the scalar buffer.
    #[error("field layout addresses element {index} of a buffer of length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// The word arena is smaller than the worst case for the requested
    /// parameters.
    #[error("stream of {len} words is smaller than the {required} words required")]
    StreamTooSmall { required: usize, len: usize },

    /// The tile arena cannot grow enough to satisfy an allocation. The store
    /// operation that triggered the growth leaves the block table unchanged.
    #[error("tile arena limited to {limit} words cannot fit {requested} more words")]
    ArenaExhausted { requested: usize, limit: usize },

    /// A variable-rate operation was requested without a block index.
    #[error("variable-rate coding requires a block index")]
    MissingIndex,

    /// A chunk is too long for the 16-bit deltas of the hybrid index.
    #[error("chunk of {bits} bits does not fit a 16-bit hybrid index delta")]
    IndexOverflow { bits: u64 },
}
