/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Block transforms and the embedded bit-plane codec.
//!
//! A block is a `4^d` cuboid of scalars, `d ∈ {1, 2, 3}`. Encoding casts the
//! block to integers (block-floating-point, floating-point types only),
//! decorrelates it with a lifting transform along each axis, reorders the
//! coefficients by spatial frequency, maps them to unsigned negabinary, and
//! codes bit planes from most to least significant under a bit budget.
//! Truncating the resulting stream at any point yields a valid
//! lower-precision encoding.
//!
//! Floating-point blocks use the non-orthogonal lifting transform; integer
//! blocks use a reversible difference-based variant so that a full-precision
//! round trip is bit-exact (the non-orthogonal lifting drops low-order bits
//! and cannot be inverted exactly).

mod coder;
mod gather;
mod lifting;
mod perm;

pub use coder::{
    decode_float_block, decode_int_block, encode_float_block, encode_int_block, max_block_bits,
    precision,
};
pub(crate) use gather::*;
pub use perm::{PERM_1, PERM_2, PERM_3};

use lifting::{fwd_lift, inv_lift, rev_fwd_lift, rev_inv_lift};

use crate::traits::{IntCoeff, UIntCoeff};

/// Spatial shape of a block: dimensionality, size, tile geometry,
/// coefficient order and the decorrelating transforms.
///
/// The three implementations [`Dim1`], [`Dim2`] and [`Dim3`] are zero-sized
/// markers; all codec entry points are monomorphized over them.
pub trait BlockShape: Send + Sync + 'static {
    /// Spatial dimensionality, in `{1, 2, 3}`.
    const DIMS: u32;
    /// Scalars per block, `4^DIMS`.
    const BLOCK_SIZE: usize;
    /// Blocks per tile.
    const TILE_BLOCKS: usize;
    /// Coefficient order by increasing spatial frequency.
    const PERM: &'static [u8];

    /// Forward decorrelating transform (floating-point path).
    fn fwd_xform<I: IntCoeff>(p: &mut [I]);
    /// Inverse of [`fwd_xform`](BlockShape::fwd_xform).
    fn inv_xform<I: IntCoeff>(p: &mut [I]);
    /// Reversible forward decorrelating transform (integer path).
    fn rev_fwd_xform<I: IntCoeff>(p: &mut [I]);
    /// Inverse of [`rev_fwd_xform`](BlockShape::rev_fwd_xform).
    fn rev_inv_xform<I: IntCoeff>(p: &mut [I]);
}

/// 1-D blocks of 4 scalars.
pub struct Dim1;

/// 2-D blocks of 4×4 scalars.
pub struct Dim2;

/// 3-D blocks of 4×4×4 scalars.
pub struct Dim3;

impl BlockShape for Dim1 {
    const DIMS: u32 = 1;
    const BLOCK_SIZE: usize = 4;
    const TILE_BLOCKS: usize = 256;
    const PERM: &'static [u8] = &PERM_1;

    #[inline]
    fn fwd_xform<I: IntCoeff>(p: &mut [I]) {
        fwd_lift(p, 0, 1);
    }

    #[inline]
    fn inv_xform<I: IntCoeff>(p: &mut [I]) {
        inv_lift(p, 0, 1);
    }

    #[inline]
    fn rev_fwd_xform<I: IntCoeff>(p: &mut [I]) {
        rev_fwd_lift(p, 0, 1);
    }

    #[inline]
    fn rev_inv_xform<I: IntCoeff>(p: &mut [I]) {
        rev_inv_lift(p, 0, 1);
    }
}

macro_rules! xform_2d {
    ($p:expr, $lift:ident) => {
        // transform along x
        for y in 0..4 {
            $lift($p, 4 * y, 1);
        }
        // transform along y
        for x in 0..4 {
            $lift($p, x, 4);
        }
    };
}

macro_rules! inv_xform_2d {
    ($p:expr, $lift:ident) => {
        // transform along y
        for x in 0..4 {
            $lift($p, x, 4);
        }
        // transform along x
        for y in 0..4 {
            $lift($p, 4 * y, 1);
        }
    };
}

impl BlockShape for Dim2 {
    const DIMS: u32 = 2;
    const BLOCK_SIZE: usize = 16;
    const TILE_BLOCKS: usize = 64 * 64;
    const PERM: &'static [u8] = &PERM_2;

    #[inline]
    fn fwd_xform<I: IntCoeff>(p: &mut [I]) {
        xform_2d!(p, fwd_lift);
    }

    #[inline]
    fn inv_xform<I: IntCoeff>(p: &mut [I]) {
        inv_xform_2d!(p, inv_lift);
    }

    #[inline]
    fn rev_fwd_xform<I: IntCoeff>(p: &mut [I]) {
        xform_2d!(p, rev_fwd_lift);
    }

    #[inline]
    fn rev_inv_xform<I: IntCoeff>(p: &mut [I]) {
        inv_xform_2d!(p, rev_inv_lift);
    }
}

macro_rules! xform_3d {
    ($p:expr, $lift:ident) => {
        // transform along x
        for z in 0..4 {
            for y in 0..4 {
                $lift($p, 4 * y + 16 * z, 1);
            }
        }
        // transform along y
        for x in 0..4 {
            for z in 0..4 {
                $lift($p, 16 * z + x, 4);
            }
        }
        // transform along z
        for y in 0..4 {
            for x in 0..4 {
                $lift($p, x + 4 * y, 16);
            }
        }
    };
}

macro_rules! inv_xform_3d {
    ($p:expr, $lift:ident) => {
        // transform along z
        for y in 0..4 {
            for x in 0..4 {
                $lift($p, x + 4 * y, 16);
            }
        }
        // transform along y
        for x in 0..4 {
            for z in 0..4 {
                $lift($p, 16 * z + x, 4);
            }
        }
        // transform along x
        for z in 0..4 {
            for y in 0..4 {
                $lift($p, 4 * y + 16 * z, 1);
            }
        }
    };
}

impl BlockShape for Dim3 {
    const DIMS: u32 = 3;
    const BLOCK_SIZE: usize = 64;
    const TILE_BLOCKS: usize = 16 * 16 * 16;
    const PERM: &'static [u8] = &PERM_3;

    #[inline]
    fn fwd_xform<I: IntCoeff>(p: &mut [I]) {
        xform_3d!(p, fwd_lift);
    }

    #[inline]
    fn inv_xform<I: IntCoeff>(p: &mut [I]) {
        inv_xform_3d!(p, inv_lift);
    }

    #[inline]
    fn rev_fwd_xform<I: IntCoeff>(p: &mut [I]) {
        xform_3d!(p, rev_fwd_lift);
    }

    #[inline]
    fn rev_inv_xform<I: IntCoeff>(p: &mut [I]) {
        inv_xform_3d!(p, rev_inv_lift);
    }
}

/// Map a two's complement signed integer to negabinary unsigned, so that
/// small magnitudes of either sign stay small.
#[inline(always)]
pub fn int2uint<U: UIntCoeff>(x: U::Int) -> U {
    (x.as_uint().wrapping_add(&U::NBMASK)) ^ U::NBMASK
}

/// Inverse of [`int2uint`].
#[inline(always)]
pub fn uint2int<U: UIntCoeff>(u: U) -> U::Int {
    (u ^ U::NBMASK).wrapping_sub(&U::NBMASK).as_int()
}

/// Reorder signed coefficients by spatial frequency and map them to
/// negabinary unsigned.
#[inline]
pub(crate) fn fwd_order<I: IntCoeff, D: BlockShape>(ublock: &mut [I::UInt], iblock: &[I]) {
    for (i, u) in ublock.iter_mut().enumerate() {
        *u = int2uint(iblock[D::PERM[i] as usize]);
    }
}

/// Inverse of [`fwd_order`].
#[inline]
pub(crate) fn inv_order<I: IntCoeff, D: BlockShape>(iblock: &mut [I], ublock: &[I::UInt]) {
    for (i, &u) in ublock.iter().enumerate() {
        iblock[D::PERM[i] as usize] = uint2int(u);
    }
}
