/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Per-scalar-type constants and conversions.
//!
//! Each compressible scalar type carries an integer alias of the same width
//! used for the decorrelating transform, an unsigned alias used by the
//! bit-plane coder, and the constants of its binary representation (exponent
//! width and bias, coded precision, negabinary mask). The block coders are
//! monomorphized over these traits; there is no dynamic dispatch.

use core::fmt::Debug;

use num_traits::{PrimInt, WrappingAdd, WrappingSub};

use crate::blocks::BlockShape;
use crate::params::CodingParams;
use crate::stream::{BlockReader, BlockWriter};

/// Signed coefficient type of the decorrelating transform.
///
/// The lifting steps use wrapping arithmetic and arithmetic right shifts;
/// both are supplied by the [`PrimInt`] operator set.
pub trait IntCoeff:
    PrimInt + WrappingAdd + WrappingSub + Default + Debug + Send + Sync + 'static
{
    /// The unsigned type of the same width.
    type UInt: UIntCoeff<Int = Self>;

    /// Reinterpret the two's complement bits as unsigned.
    fn as_uint(self) -> Self::UInt;
}

/// Unsigned coefficient type consumed by the bit-plane coder.
pub trait UIntCoeff:
    PrimInt + WrappingAdd + WrappingSub + Default + Debug + Send + Sync + 'static
{
    /// The signed type of the same width.
    type Int: IntCoeff<UInt = Self>;

    /// The repeating `0b10…10` bit pattern of the negabinary map.
    const NBMASK: Self;
    /// Width in bits.
    const PRECISION: u32;

    /// Reinterpret the bits as two's complement.
    fn as_int(self) -> Self::Int;
}

macro_rules! impl_coeff {
    ($int:ty, $uint:ty) => {
        impl IntCoeff for $int {
            type UInt = $uint;

            #[inline(always)]
            fn as_uint(self) -> $uint {
                self as $uint
            }
        }

        impl UIntCoeff for $uint {
            type Int = $int;

            const NBMASK: $uint = 0xaaaa_aaaa_aaaa_aaaa_u64 as $uint;
            const PRECISION: u32 = <$uint>::BITS;

            #[inline(always)]
            fn as_int(self) -> $int {
                self as $int
            }
        }
    };
}

impl_coeff!(i32, u32);
impl_coeff!(i64, u64);

/// A scalar type compressible by the block codec.
///
/// Floating-point types go through a block-floating-point cast to
/// [`Scalar::Int`] before the transform; integer types are their own
/// coefficient type and skip the cast and the common exponent.
pub trait Scalar: Copy + Default + PartialOrd + Debug + Send + Sync + 'static {
    /// Signed integer alias of equal width.
    type Int: IntCoeff<UInt = Self::UInt>;
    /// Unsigned integer alias of equal width.
    type UInt: UIntCoeff<Int = Self::Int>;

    /// Width in bits of the biased exponent field; zero for integer types.
    const EBITS: u32;
    /// IEEE-754 exponent bias; zero for integer types.
    const EBIAS: i32;
    /// Number of value bits coded per coefficient.
    const PRECISION: u32;
    /// Smallest positive normal value; the threshold below which values are
    /// treated as zero under the `daz` feature.
    const SCALAR_MIN: Self;

    /// Magnitude of `self`.
    fn abs(self) -> Self;

    /// The `frexp` exponent of `self`, clamped from below so that subnormal
    /// values report the least normal exponent. Nonpositive values report
    /// `-EBIAS`.
    fn exponent(self) -> i32;

    /// Block-floating-point cast to the integer alias given the block
    /// exponent `emax`.
    fn quantize(self, emax: i32) -> Self::Int;

    /// Inverse of [`quantize`](Scalar::quantize).
    fn dequantize(x: Self::Int, emax: i32) -> Self;

    /// Code one block of `Self` through `writer`, returning the number of
    /// bits accounted (at least `params.minbits` unless `params.maxbits` is
    /// zero).
    fn encode_block<D: BlockShape>(
        block: &mut [Self],
        writer: &mut BlockWriter<'_>,
        params: &CodingParams,
    ) -> u32;

    /// Decode one block of `Self` from `reader`, returning the number of
    /// bits consumed.
    fn decode_block<D: BlockShape>(
        block: &mut [Self],
        reader: &mut BlockReader<'_>,
        params: &CodingParams,
    ) -> u32;
}

macro_rules! impl_float_scalar {
    ($fp:ty, $int:ty, $uint:ty, $ebits:expr, $frexp:path, $ldexp:path) => {
        impl Scalar for $fp {
            type Int = $int;
            type UInt = $uint;

            const EBITS: u32 = $ebits;
            const EBIAS: i32 = (1 << ($ebits - 1)) - 1;
            const PRECISION: u32 = <$uint>::BITS - 1;
            const SCALAR_MIN: $fp = <$fp>::MIN_POSITIVE;

            #[inline(always)]
            fn abs(self) -> $fp {
                <$fp>::abs(self)
            }

            #[cfg(not(feature = "daz"))]
            #[inline]
            fn exponent(self) -> i32 {
                if self > 0.0 {
                    let (_, e) = $frexp(self);
                    // clamp in case the value is subnormal
                    return e.max(1 - Self::EBIAS);
                }
                -Self::EBIAS
            }

            #[cfg(feature = "daz")]
            #[inline]
            fn exponent(self) -> i32 {
                if self >= Self::SCALAR_MIN {
                    let (_, e) = $frexp(self);
                    return e;
                }
                -Self::EBIAS
            }

            #[inline]
            fn quantize(self, emax: i32) -> $int {
                let scale = $ldexp(1.0, Self::PRECISION as i32 - 2 - emax);
                (scale * self) as $int
            }

            #[inline]
            fn dequantize(x: $int, emax: i32) -> $fp {
                $ldexp(x as $fp, emax - (Self::PRECISION as i32 - 2))
            }

            #[inline]
            fn encode_block<D: BlockShape>(
                block: &mut [Self],
                writer: &mut BlockWriter<'_>,
                params: &CodingParams,
            ) -> u32 {
                crate::blocks::encode_float_block::<Self, D>(block, writer, params)
            }

            #[inline]
            fn decode_block<D: BlockShape>(
                block: &mut [Self],
                reader: &mut BlockReader<'_>,
                params: &CodingParams,
            ) -> u32 {
                crate::blocks::decode_float_block::<Self, D>(block, reader, params)
            }
        }
    };
}

impl_float_scalar!(f32, i32, u32, 8, libm::frexpf, libm::ldexpf);
impl_float_scalar!(f64, i64, u64, 11, libm::frexp, libm::ldexp);

macro_rules! impl_int_scalar {
    ($int:ty, $uint:ty) => {
        impl Scalar for $int {
            type Int = $int;
            type UInt = $uint;

            const EBITS: u32 = 0;
            const EBIAS: i32 = 0;
            const PRECISION: u32 = <$uint>::BITS;
            const SCALAR_MIN: $int = 0;

            #[inline(always)]
            fn abs(self) -> $int {
                self.wrapping_abs()
            }

            #[inline(always)]
            fn exponent(self) -> i32 {
                0
            }

            #[inline(always)]
            fn quantize(self, _emax: i32) -> $int {
                self
            }

            #[inline(always)]
            fn dequantize(x: $int, _emax: i32) -> $int {
                x
            }

            #[inline]
            fn encode_block<D: BlockShape>(
                block: &mut [Self],
                writer: &mut BlockWriter<'_>,
                params: &CodingParams,
            ) -> u32 {
                crate::blocks::encode_int_block::<Self, D>(
                    block,
                    writer,
                    params.minbits,
                    params.maxbits,
                    params.maxprec,
                )
            }

            #[inline]
            fn decode_block<D: BlockShape>(
                block: &mut [Self],
                reader: &mut BlockReader<'_>,
                params: &CodingParams,
            ) -> u32 {
                crate::blocks::decode_int_block::<Self, D>(
                    block,
                    reader,
                    params.minbits,
                    params.maxbits,
                    params.maxprec,
                )
            }
        }
    };
}

impl_int_scalar!(i32, u32);
impl_int_scalar!(i64, u64);
