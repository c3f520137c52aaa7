/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]

pub mod blocks;
pub mod errors;
pub mod fields;
pub mod params;
pub mod stream;
pub mod tiles;
pub mod traits;

pub use errors::Error;

pub mod prelude {
    pub use crate::blocks::{BlockShape, Dim1, Dim2, Dim3};
    pub use crate::errors::Error;
    pub use crate::fields::{
        decode_field, decode_field_indexed, encode_field, encode_field_indexed, par_decode_field,
        par_decode_field_indexed, par_encode_field, par_encode_field_indexed, stream_capacity,
        BlockIndex, FieldLayout, IndexKind,
    };
    pub use crate::params::CodingParams;
    pub use crate::stream::{BlockReader, BlockWriter};
    pub use crate::tiles::{BlockPos, Tile};
    pub use crate::traits::Scalar;
}
