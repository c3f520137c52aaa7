/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Whole-field compression drivers over strided 1-, 2- and 3-dimensional
//! arrays.
//!
//! A [`FieldLayout`] describes the extents and signed element strides of the
//! field; the drivers pad it to whole 4-wide blocks, visit blocks in
//! row-major order and compose gather → encode (resp. decode → scatter) per
//! block. Fixed-rate streams are indexed by block arithmetic; variable-rate
//! streams carry a [`BlockIndex`] of chunk offsets. Each driver exists in a
//! serial and a rayon-parallel variant producing byte-identical streams.

mod drivers;
mod index;

pub use index::{BlockIndex, IndexKind};

use drivers::{
    par_decode_fixed, par_decode_var, par_encode_fixed, par_encode_var, serial_decode_fixed,
    serial_decode_var, serial_encode_fixed, serial_encode_var,
};

use crate::blocks::{max_block_bits, BlockShape, Dim1, Dim2, Dim3};
use crate::errors::Error;
use crate::params::CodingParams;
use crate::stream::words_for_bits;
use crate::traits::Scalar;

/// Extents, strides and origin of a strided field of scalars.
///
/// Dimensionality is implied by the extents: a zero extent ends the list, so
/// `[nx, 0, 0]` is 1-D and `[nx, ny, 0]` is 2-D. Strides are signed and in
/// elements; `origin` is the element index of the logical first sample,
/// which with negative strides must point inside the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// Field extents; a zero extent ends the dimension list.
    pub size: [usize; 3],
    /// Signed element stride along each axis.
    pub stride: [isize; 3],
    /// Element index of the sample at logical coordinate zero.
    pub origin: usize,
}

impl FieldLayout {
    /// A contiguous row-major layout of the given extents.
    pub fn contiguous(size: [usize; 3]) -> Self {
        let stride = [
            1,
            if size[1] > 0 { size[0] as isize } else { 0 },
            if size[2] > 0 { (size[0] * size[1]) as isize } else { 0 },
        ];
        Self {
            size,
            stride,
            origin: 0,
        }
    }

    /// A custom strided layout.
    pub fn strided(size: [usize; 3], stride: [isize; 3], origin: usize) -> Self {
        Self {
            size,
            stride,
            origin,
        }
    }

    /// The dimensionality implied by the extents.
    ///
    /// Fails with [`Error::BadDimensions`] when all extents are zero or a
    /// zero extent precedes a nonzero one.
    pub fn dims(&self) -> Result<u32, Error> {
        let [x, y, z] = self.size;
        match (x > 0, y > 0, z > 0) {
            (true, false, false) => Ok(1),
            (true, true, false) => Ok(2),
            (true, true, true) => Ok(3),
            _ => Err(Error::BadDimensions { size: self.size }),
        }
    }

    /// Number of 4-wide blocks covering the padded field.
    pub fn blocks(&self) -> Result<usize, Error> {
        let dims = self.dims()?;
        Ok((0..dims as usize)
            .map(|d| self.size[d].div_ceil(4))
            .product())
    }

    /// Validate the layout against a buffer of `len` scalars: every
    /// addressable sample must fall inside the buffer.
    pub fn check(&self, len: usize) -> Result<(), Error> {
        let dims = self.dims()?;
        let mut min = self.origin as i128;
        let mut max = self.origin as i128;
        for d in 0..dims as usize {
            let span = (self.size[d] as i128 - 1) * self.stride[d] as i128;
            if span < 0 {
                min += span;
            } else {
                max += span;
            }
        }
        if min < 0 {
            return Err(Error::OutOfBounds {
                index: 0,
                len,
            });
        }
        if max >= len as i128 {
            return Err(Error::OutOfBounds {
                index: max as usize,
                len,
            });
        }
        Ok(())
    }
}

macro_rules! with_shape {
    ($dims:expr, $f:ident::<$s:ty>($($arg:expr),* $(,)?)) => {
        match $dims {
            1 => $f::<$s, Dim1>($($arg),*),
            2 => $f::<$s, Dim2>($($arg),*),
            _ => $f::<$s, Dim3>($($arg),*),
        }
    };
}

fn capacity_inner<S: Scalar, D: BlockShape>(
    blocks: usize,
    params: &CodingParams,
) -> usize {
    let per_block = if params.is_fixed_rate() {
        params.maxbits
    } else {
        max_block_bits::<S, D>(params)
    };
    words_for_bits(blocks as u64 * per_block as u64)
}

/// Number of stream words sufficient for any encoding of `layout` under
/// `params`.
pub fn stream_capacity<S: Scalar>(
    layout: &FieldLayout,
    params: &CodingParams,
) -> Result<usize, Error> {
    let dims = layout.dims()?;
    let blocks = layout.blocks()?;
    Ok(with_shape!(dims, capacity_inner::<S>(blocks, params)))
}

/// Encode a fixed-rate field serially. Returns the number of bits written.
///
/// Requires fixed-rate parameters; use [`encode_field_indexed`] for the
/// variable-rate modes.
pub fn encode_field<S: Scalar>(
    data: &[S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &mut [u64],
) -> Result<u64, Error> {
    layout.check(data.len())?;
    if !params.is_fixed_rate() {
        return Err(Error::MissingIndex);
    }
    let dims = layout.dims()?;
    with_shape!(
        dims,
        serial_encode_fixed::<S>(data, layout, params, stream)
    )
}

/// Parallel variant of [`encode_field`], producing the same bytes.
pub fn par_encode_field<S: Scalar>(
    data: &[S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &mut [u64],
) -> Result<u64, Error> {
    layout.check(data.len())?;
    if !params.is_fixed_rate() {
        return Err(Error::MissingIndex);
    }
    let dims = layout.dims()?;
    with_shape!(dims, par_encode_fixed::<S>(data, layout, params, stream))
}

/// Decode a fixed-rate field serially. Returns the highest bit offset read.
pub fn decode_field<S: Scalar>(
    out: &mut [S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &[u64],
) -> Result<u64, Error> {
    layout.check(out.len())?;
    if !params.is_fixed_rate() {
        return Err(Error::MissingIndex);
    }
    let dims = layout.dims()?;
    with_shape!(dims, serial_decode_fixed::<S>(out, layout, params, stream))
}

/// Parallel variant of [`decode_field`].
pub fn par_decode_field<S: Scalar>(
    out: &mut [S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &[u64],
) -> Result<u64, Error> {
    layout.check(out.len())?;
    if !params.is_fixed_rate() {
        return Err(Error::MissingIndex);
    }
    let dims = layout.dims()?;
    with_shape!(dims, par_decode_fixed::<S>(out, layout, params, stream))
}

/// Encode a variable-rate field serially, producing the stream and the
/// [`BlockIndex`] needed to decode it. Returns the total bits written.
pub fn encode_field_indexed<S: Scalar>(
    data: &[S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &mut [u64],
    granularity: usize,
    kind: IndexKind,
) -> Result<(u64, BlockIndex), Error> {
    layout.check(data.len())?;
    let dims = layout.dims()?;
    with_shape!(
        dims,
        serial_encode_var::<S>(data, layout, params, stream, granularity, kind)
    )
}

/// Parallel variant of [`encode_field_indexed`], producing the same bytes.
pub fn par_encode_field_indexed<S: Scalar>(
    data: &[S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &mut [u64],
    granularity: usize,
    kind: IndexKind,
) -> Result<(u64, BlockIndex), Error> {
    layout.check(data.len())?;
    let dims = layout.dims()?;
    with_shape!(
        dims,
        par_encode_var::<S>(data, layout, params, stream, granularity, kind)
    )
}

/// Decode a variable-rate field serially through its [`BlockIndex`].
/// Returns the highest bit offset read.
pub fn decode_field_indexed<S: Scalar>(
    out: &mut [S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &[u64],
    index: &BlockIndex,
) -> Result<u64, Error> {
    layout.check(out.len())?;
    let dims = layout.dims()?;
    with_shape!(
        dims,
        serial_decode_var::<S>(out, layout, params, stream, index)
    )
}

/// Parallel variant of [`decode_field_indexed`].
pub fn par_decode_field_indexed<S: Scalar>(
    out: &mut [S],
    layout: &FieldLayout,
    params: &CodingParams,
    stream: &[u64],
    index: &BlockIndex,
) -> Result<u64, Error> {
    layout.check(out.len())?;
    let dims = layout.dims()?;
    with_shape!(
        dims,
        par_decode_var::<S>(out, layout, params, stream, index)
    )
}
