/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Copies between strided arrays and contiguous block buffers.
//!
//! Partial blocks are padded by replicating valid samples in a fixed pattern
//! that keeps the decorrelating transform well conditioned; scatter honors
//! the valid extents and never writes outside them. Strides are signed and
//! expressed in elements; `origin` is the element index of the block's
//! (0,0,0) corner.

use crate::traits::Scalar;

/// Index of sample `(x, y, z)` of a block anchored at `origin`.
#[inline(always)]
fn at(origin: usize, x: usize, sx: isize, y: usize, sy: isize, z: usize, sz: isize) -> usize {
    (origin as isize + x as isize * sx + y as isize * sy + z as isize * sz) as usize
}

/// Pad the 4-vector at `p[base + i * s]` of which the first `n` values are
/// valid.
///
/// One value replicates forward; two and three values replicate their last
/// neighbor, except that the fourth slot wraps back to the first value.
#[inline]
pub(crate) fn pad_block<S: Scalar>(p: &mut [S], base: usize, n: usize, s: usize) {
    if n == 0 {
        p[base] = S::default();
    }
    if n <= 1 {
        p[base + s] = p[base];
    }
    if n <= 2 {
        p[base + 2 * s] = p[base + s];
    }
    if n <= 3 {
        p[base + 3 * s] = p[base];
    }
}

pub(crate) fn gather1<S: Scalar>(q: &mut [S], p: &[S], origin: usize, sx: isize) {
    for x in 0..4 {
        q[x] = p[at(origin, x, sx, 0, 0, 0, 0)];
    }
}

pub(crate) fn gather_partial1<S: Scalar>(q: &mut [S], p: &[S], origin: usize, nx: usize, sx: isize) {
    for x in 0..nx {
        q[x] = p[at(origin, x, sx, 0, 0, 0, 0)];
    }
    pad_block(q, 0, nx, 1);
}

pub(crate) fn gather2<S: Scalar>(q: &mut [S], p: &[S], origin: usize, sx: isize, sy: isize) {
    for y in 0..4 {
        for x in 0..4 {
            q[4 * y + x] = p[at(origin, x, sx, y, sy, 0, 0)];
        }
    }
}

pub(crate) fn gather_partial2<S: Scalar>(
    q: &mut [S],
    p: &[S],
    origin: usize,
    nx: usize,
    ny: usize,
    sx: isize,
    sy: isize,
) {
    for y in 0..ny {
        for x in 0..nx {
            q[4 * y + x] = p[at(origin, x, sx, y, sy, 0, 0)];
        }
        pad_block(q, 4 * y, nx, 1);
    }
    for x in 0..4 {
        pad_block(q, x, ny, 4);
    }
}

pub(crate) fn gather3<S: Scalar>(
    q: &mut [S],
    p: &[S],
    origin: usize,
    sx: isize,
    sy: isize,
    sz: isize,
) {
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..4 {
                q[16 * z + 4 * y + x] = p[at(origin, x, sx, y, sy, z, sz)];
            }
        }
    }
}

pub(crate) fn gather_partial3<S: Scalar>(
    q: &mut [S],
    p: &[S],
    origin: usize,
    nx: usize,
    ny: usize,
    nz: usize,
    sx: isize,
    sy: isize,
    sz: isize,
) {
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                q[16 * z + 4 * y + x] = p[at(origin, x, sx, y, sy, z, sz)];
            }
            pad_block(q, 16 * z + 4 * y, nx, 1);
        }
        for x in 0..4 {
            pad_block(q, 16 * z + x, ny, 4);
        }
    }
    for y in 0..4 {
        for x in 0..4 {
            pad_block(q, 4 * y + x, nz, 16);
        }
    }
}

/// Scatter a full 1-D block through `write(index, value)`.
pub(crate) fn scatter1<S: Scalar>(q: &[S], mut write: impl FnMut(usize, S), origin: usize, sx: isize) {
    for x in 0..4 {
        write(at(origin, x, sx, 0, 0, 0, 0), q[x]);
    }
}

pub(crate) fn scatter_partial1<S: Scalar>(
    q: &[S],
    mut write: impl FnMut(usize, S),
    origin: usize,
    nx: usize,
    sx: isize,
) {
    for x in 0..nx {
        write(at(origin, x, sx, 0, 0, 0, 0), q[x]);
    }
}

pub(crate) fn scatter2<S: Scalar>(
    q: &[S],
    mut write: impl FnMut(usize, S),
    origin: usize,
    sx: isize,
    sy: isize,
) {
    for y in 0..4 {
        for x in 0..4 {
            write(at(origin, x, sx, y, sy, 0, 0), q[4 * y + x]);
        }
    }
}

pub(crate) fn scatter_partial2<S: Scalar>(
    q: &[S],
    mut write: impl FnMut(usize, S),
    origin: usize,
    nx: usize,
    ny: usize,
    sx: isize,
    sy: isize,
) {
    for y in 0..ny {
        for x in 0..nx {
            write(at(origin, x, sx, y, sy, 0, 0), q[4 * y + x]);
        }
    }
}

pub(crate) fn scatter3<S: Scalar>(
    q: &[S],
    mut write: impl FnMut(usize, S),
    origin: usize,
    sx: isize,
    sy: isize,
    sz: isize,
) {
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..4 {
                write(at(origin, x, sx, y, sy, z, sz), q[16 * z + 4 * y + x]);
            }
        }
    }
}

pub(crate) fn scatter_partial3<S: Scalar>(
    q: &[S],
    mut write: impl FnMut(usize, S),
    origin: usize,
    nx: usize,
    ny: usize,
    nz: usize,
    sx: isize,
    sy: isize,
    sz: isize,
) {
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                write(at(origin, x, sx, y, sy, z, sz), q[16 * z + 4 * y + x]);
            }
        }
    }
}
