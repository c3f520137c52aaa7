/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The embedded bit-plane coder and the per-block encode/decode entry points.
//!
//! Bit planes are visited from most to least significant. For each plane the
//! coder first emits verbatim the bits of the coefficients already known to
//! be significant, then run-length codes the positions at which new
//! coefficients become significant. Every emitted bit decrements the budget;
//! when the budget runs out mid-plane both directions stop at the same spot,
//! which is what makes any truncation of the stream decodable.

use num_traits::{One, Zero};

use crate::blocks::{fwd_order, inv_order, BlockShape};
use crate::params::CodingParams;
use crate::stream::{BlockReader, BlockWriter};
use crate::traits::{IntCoeff, Scalar, UIntCoeff};

/// Number of bit planes to code for a block of exponent `emax`.
///
/// This caps `maxprec` by the number of planes above the `minexp` cutoff,
/// widened by `2·(d+1)` planes to absorb the dynamic-range growth of the
/// decorrelating transform.
#[inline]
pub fn precision<D: BlockShape>(emax: i32, maxprec: u32, minexp: i32) -> u32 {
    let planes = emax as i64 - minexp as i64 + 2 * (D::DIMS as i64 + 1);
    planes.clamp(0, maxprec as i64) as u32
}

/// Worst-case number of bits a single block can code to under `params`.
pub fn max_block_bits<S: Scalar, D: BlockShape>(params: &CodingParams) -> u32 {
    let maxprec = params.maxprec.min(S::UInt::PRECISION);
    let body = (maxprec + 1) * (D::BLOCK_SIZE as u32 + 1);
    params.maxbits.min(S::EBITS + 1 + body)
}

/// Exponent of the largest-magnitude scalar of the block.
#[inline]
pub(crate) fn max_exponent<S: Scalar>(block: &[S]) -> i32 {
    let mut max = S::default();
    for &v in block {
        let a = v.abs();
        if a > max {
            max = a;
        }
    }
    max.exponent()
}

/// Block-floating-point cast of a scalar block to integers.
#[inline]
fn fwd_cast<S: Scalar>(iblock: &mut [S::Int], fblock: &[S], emax: i32) {
    for (i, &f) in fblock.iter().enumerate() {
        iblock[i] = f.quantize(emax);
    }
}

/// Inverse of [`fwd_cast`].
#[inline]
fn inv_cast<S: Scalar>(fblock: &mut [S], iblock: &[S::Int], emax: i32) {
    for (f, &i) in fblock.iter_mut().zip(iblock.iter()) {
        *f = S::dequantize(i, emax);
    }
}

/// Bias coefficients by ±`(nbmask >> 2) >> maxprec` so that plain truncation
/// at decode time approximates round-to-nearest.
#[cfg(feature = "round_first")]
fn fwd_round<I: IntCoeff>(iblock: &mut [I], maxprec: u32) {
    if maxprec < I::UInt::PRECISION {
        let bias = ((I::UInt::NBMASK >> 2usize) >> maxprec as usize).as_int();
        if maxprec & 1 != 0 {
            for v in iblock.iter_mut() {
                *v = v.wrapping_add(&bias);
            }
        } else {
            for v in iblock.iter_mut() {
                *v = v.wrapping_sub(&bias);
            }
        }
    }
}

/// Code the unsigned coefficients of `ublock` plane by plane, emitting at
/// most `maxbits` bits and at most `maxprec` planes. Returns the number of
/// bits written.
pub(crate) fn encode_ints<U: UIntCoeff>(
    ublock: &[U],
    writer: &mut BlockWriter<'_>,
    maxbits: u32,
    maxprec: u32,
) -> u32 {
    let size = ublock.len();
    let intprec = U::PRECISION;
    let kmin = intprec.saturating_sub(maxprec);
    let mut bits = maxbits;
    let mut n: u32 = 0;
    let mut k = intprec;

    while bits > 0 && k > kmin {
        k -= 1;
        // step 1: extract bit plane k
        let mut x: u64 = 0;
        for (i, &u) in ublock.iter().enumerate() {
            x |= ((((u >> k as usize) & U::one()) == U::one()) as u64) << i;
        }
        // step 2: emit the first n bits of the plane verbatim
        let m = n.min(bits);
        bits -= m;
        x = writer.write_bits(x, m);
        // step 3: unary run-length code the remainder of the plane
        while (n as usize) < size && bits > 0 {
            bits -= 1;
            if !writer.write_bit(x != 0) {
                break;
            }
            while (n as usize) < size - 1 && bits > 0 {
                bits -= 1;
                if writer.write_bit(x & 1 != 0) {
                    break;
                }
                x >>= 1;
                n += 1;
            }
            x >>= 1;
            n += 1;
        }
    }

    maxbits - bits
}

/// Mirror image of [`encode_ints`]: reconstruct `ublock` from at most
/// `maxbits` bits and at most `maxprec` planes. Returns the number of bits
/// read. Coefficient bits below the last coded plane are zero.
pub(crate) fn decode_ints<U: UIntCoeff>(
    ublock: &mut [U],
    reader: &mut BlockReader<'_>,
    maxbits: u32,
    maxprec: u32,
) -> u32 {
    let size = ublock.len();
    for u in ublock.iter_mut() {
        *u = U::zero();
    }
    let intprec = U::PRECISION;
    let kmin = intprec.saturating_sub(maxprec);
    let mut bits = maxbits;
    let mut n: u32 = 0;
    let mut k = intprec;

    while bits > 0 && k > kmin {
        k -= 1;
        // read the verbatim bits of the plane
        let m = n.min(bits);
        bits -= m;
        let mut x = reader.read_bits(m);
        // unary-decode the new significance positions
        while (n as usize) < size && bits > 0 {
            bits -= 1;
            if !reader.read_bit() {
                break;
            }
            while (n as usize) < size - 1 && bits > 0 {
                bits -= 1;
                if reader.read_bit() {
                    break;
                }
                n += 1;
            }
            x += 1u64 << n;
            n += 1;
        }
        // deposit bit plane k
        let mut i = 0;
        while x != 0 {
            if x & 1 != 0 {
                ublock[i] = ublock[i] | (U::one() << k as usize);
            }
            x >>= 1;
            i += 1;
        }
    }

    maxbits - bits
}

/// Transform, reorder and bit-plane code a block of signed integers.
///
/// `REVERSIBLE` selects the exactly invertible decorrelating transform used
/// for integer scalar types; the floating-point path keeps the
/// non-orthogonal lifting. Returns the number of bits accounted, at least
/// `minbits`.
pub(crate) fn code_int_block<I: IntCoeff, D: BlockShape, const REVERSIBLE: bool>(
    iblock: &mut [I],
    writer: &mut BlockWriter<'_>,
    minbits: u32,
    maxbits: u32,
    maxprec: u32,
) -> u32 {
    if REVERSIBLE {
        D::rev_fwd_xform(iblock);
    } else {
        D::fwd_xform(iblock);
    }

    #[cfg(feature = "round_first")]
    fwd_round(iblock, maxprec);

    let mut ublock = [I::UInt::zero(); 64];
    let ublock = &mut ublock[..iblock.len()];
    fwd_order::<I, D>(ublock, iblock);

    let bits = encode_ints(ublock, writer, maxbits, maxprec);
    bits.max(minbits)
}

/// Mirror image of [`code_int_block`].
pub(crate) fn uncode_int_block<I: IntCoeff, D: BlockShape, const REVERSIBLE: bool>(
    iblock: &mut [I],
    reader: &mut BlockReader<'_>,
    minbits: u32,
    maxbits: u32,
    maxprec: u32,
) -> u32 {
    let start = reader.rtell();
    let mut ublock = [I::UInt::zero(); 64];
    let ublock = &mut ublock[..iblock.len()];
    let bits = decode_ints(ublock, reader, maxbits, maxprec);

    inv_order::<I, D>(iblock, ublock);
    if REVERSIBLE {
        D::rev_inv_xform(iblock);
    } else {
        D::inv_xform(iblock);
    }

    // skip any padding up to the per-block minimum
    if bits < minbits {
        reader.seek(start + minbits as u64);
        return minbits;
    }
    bits
}

/// Encode a block of an integer scalar type. The whole budget goes to bit
/// planes; with `maxprec` at full width the round trip is bit-exact.
pub fn encode_int_block<I, D: BlockShape>(
    iblock: &mut [I],
    writer: &mut BlockWriter<'_>,
    minbits: u32,
    maxbits: u32,
    maxprec: u32,
) -> u32
where
    I: IntCoeff + Scalar,
{
    if maxbits == 0 {
        return 0;
    }
    code_int_block::<I, D, true>(iblock, writer, minbits, maxbits, maxprec)
}

/// Decode a block of an integer scalar type.
pub fn decode_int_block<I, D: BlockShape>(
    iblock: &mut [I],
    reader: &mut BlockReader<'_>,
    minbits: u32,
    maxbits: u32,
    maxprec: u32,
) -> u32
where
    I: IntCoeff + Scalar,
{
    if maxbits == 0 {
        for v in iblock.iter_mut() {
            *v = I::zero();
        }
        return 0;
    }
    uncode_int_block::<I, D, true>(iblock, reader, minbits, maxbits, maxprec)
}

/// Encode a block of a floating-point scalar type.
///
/// The block exponent is coded as `2·(emax + ebias) + 1` on `ebits + 1` bits
/// so that the leading bit separates nonzero from zero blocks; a block whose
/// precision is zero — or whose budget cannot fit the exponent field — codes
/// as a single zero bit.
pub fn encode_float_block<S: Scalar, D: BlockShape>(
    fblock: &[S],
    writer: &mut BlockWriter<'_>,
    params: &CodingParams,
) -> u32 {
    if params.maxbits == 0 {
        return 0;
    }
    let emax = max_exponent(fblock);
    let maxprec = precision::<D>(emax, params.maxprec.min(S::UInt::PRECISION), params.minexp);
    let e = if maxprec != 0 {
        (emax + S::EBIAS) as u32
    } else {
        0
    };

    if e == 0 || params.maxbits <= S::EBITS {
        // empty block: a single zero bit
        writer.write_bit(false);
        return 1.max(params.minbits);
    }

    let mut bits = 1 + S::EBITS;
    writer.write_bits((2 * e + 1) as u64, bits);

    let mut iblock = [S::Int::zero(); 64];
    let iblock = &mut iblock[..fblock.len()];
    fwd_cast(iblock, fblock, emax);

    bits += code_int_block::<S::Int, D, false>(
        iblock,
        writer,
        params.minbits.max(bits) - bits,
        params.maxbits.max(bits) - bits,
        maxprec,
    );
    bits.max(params.minbits)
}

/// Mirror image of [`encode_float_block`].
pub fn decode_float_block<S: Scalar, D: BlockShape>(
    fblock: &mut [S],
    reader: &mut BlockReader<'_>,
    params: &CodingParams,
) -> u32 {
    if params.maxbits == 0 {
        for v in fblock.iter_mut() {
            *v = S::default();
        }
        return 0;
    }
    let start = reader.rtell();
    if !reader.read_bit() {
        // empty block
        for v in fblock.iter_mut() {
            *v = S::default();
        }
        if params.minbits > 1 {
            reader.seek(start + params.minbits as u64);
            return params.minbits;
        }
        return 1;
    }

    let mut bits = 1 + S::EBITS;
    let e = reader.read_bits(S::EBITS) as u32;
    let emax = e as i32 - S::EBIAS;
    let maxprec = precision::<D>(emax, params.maxprec.min(S::UInt::PRECISION), params.minexp);

    let mut iblock = [S::Int::zero(); 64];
    let iblock = &mut iblock[..fblock.len()];
    bits += uncode_int_block::<S::Int, D, false>(
        iblock,
        reader,
        params.minbits.max(bits) - bits,
        params.maxbits.max(bits) - bits,
        maxprec,
    );
    inv_cast(fblock, iblock, emax);
    bits.max(params.minbits)
}
