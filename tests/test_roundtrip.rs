/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use cubepack::blocks::{decode_float_block, encode_float_block, Dim3};
use cubepack::prelude::*;
use cubepack::stream::{as_atomic_words, BlockReader, BlockWriter};
use rand::{rngs::SmallRng, Rng, SeedableRng};

#[test]
fn test_zero_block_codes_to_one_bit() {
    // 3-D f64 zero block: one zero bit, decoded back to zeros
    let block = [0.0f64; 64];
    let mut arena = vec![0u64; 64];
    let params = CodingParams::expert(1, 4096, 64, -1074);
    let words = as_atomic_words(&mut arena);
    let mut writer = BlockWriter::new(words, 0);
    assert_eq!(encode_float_block::<f64, Dim3>(&block, &mut writer, &params), 1);

    let mut out = [f64::NAN; 64];
    let mut reader = BlockReader::new(&arena, 0);
    assert_eq!(decode_float_block::<f64, Dim3>(&mut out, &mut reader, &params), 1);
    assert!(out.iter().all(|&v| v == 0.0));
}

#[test]
fn test_embedded_truncation_mse_is_monotone() {
    // coding a sinusoid once and decoding ever longer prefixes must not
    // increase the error
    let block: Vec<f64> = (0..64)
        .map(|i| {
            let (x, y, z) = (i % 4, i / 4 % 4, i / 16);
            (0.9 * x as f64 + 0.4 * y as f64 + 0.2 * z as f64).sin()
        })
        .collect();
    let mut arena = vec![0u64; 64];
    let full = CodingParams::expert(1, 4096, 64, -1074);
    let words = as_atomic_words(&mut arena);
    let mut writer = BlockWriter::new(words, 0);
    let written = encode_float_block::<f64, Dim3>(&block, &mut writer, &full);
    assert!(written <= 4096);

    let mut last_mse = f64::INFINITY;
    for budget in [64, 1024, 2048, 3072, 4096] {
        let params = CodingParams::expert(1, budget, 64, -1074);
        let mut out = [0.0f64; 64];
        let mut reader = BlockReader::new(&arena, 0);
        decode_float_block::<f64, Dim3>(&mut out, &mut reader, &params);
        let mse: f64 = out
            .iter()
            .zip(block.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            / 64.0;
        assert!(mse <= last_mse, "mse {mse} at {budget} bits");
        last_mse = mse;
    }
    assert!(last_mse <= 1e-20);
}

#[test]
fn test_int32_1d_exact() -> Result<()> {
    let data = vec![-3i32, 1, 4, -1];
    let layout = FieldLayout::contiguous([4, 0, 0]);
    let params = CodingParams::fixed_rate(32.0, 1);
    let mut stream = vec![0u64; stream_capacity::<i32>(&layout, &params)?];
    let written = encode_field(&data, &layout, &params, &mut stream)?;
    assert!(written <= 4 * 32);

    let mut out = vec![0i32; 4];
    decode_field(&mut out, &layout, &params, &stream)?;
    assert_eq!(out, data);
    Ok(())
}

#[test]
fn test_partial_block_leaves_outside_untouched() -> Result<()> {
    // a 2x3x4 corner; everything outside it must stay as it was
    let layout = FieldLayout::contiguous([2, 3, 4]);
    let data: Vec<f64> = (0..24).map(|i| i as f64 * 1.5 - 7.0).collect();
    let params = CodingParams::fixed_rate(200.0, 3);
    let mut stream = vec![0u64; stream_capacity::<f64>(&layout, &params)?];
    encode_field(&data, &layout, &params, &mut stream)?;

    let mut out = vec![f64::NAN; 24];
    decode_field(&mut out, &layout, &params, &stream)?;
    for (a, b) in out.iter().zip(data.iter()) {
        assert!((a - b).abs() < 1e-9, "{a} vs {b}");
    }

    // destination larger than the field: the tail stays untouched
    let strided = FieldLayout::strided([2, 3, 4], [1, 2, 6], 0);
    let mut out = vec![f64::NAN; 32];
    decode_field(&mut out, &strided, &params, &stream)?;
    for (a, b) in out[..24].iter().zip(data.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
    assert!(out[24..].iter().all(|v| v.is_nan()));
    Ok(())
}

#[test]
fn test_zero_budget_writes_nothing() -> Result<()> {
    let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
    let layout = FieldLayout::contiguous([8, 8, 0]);
    let params = CodingParams::expert(0, 0, 32, -1074);
    let mut stream = vec![0u64; 4];
    assert_eq!(encode_field(&data, &layout, &params, &mut stream)?, 0);
    assert!(stream.iter().all(|&w| w == 0));

    let mut out = vec![1.0f32; 64];
    assert_eq!(decode_field(&mut out, &layout, &params, &stream)?, 0);
    assert!(out.iter().all(|&v| v == 0.0));
    Ok(())
}

#[test]
fn test_bad_dimensions_and_bounds() {
    let params = CodingParams::fixed_rate(8.0, 2);
    let mut stream = vec![0u64; 16];
    let data = vec![0.0f64; 16];

    let holey = FieldLayout::contiguous([4, 0, 4]);
    assert!(matches!(
        encode_field(&data, &holey, &params, &mut stream),
        Err(Error::BadDimensions { .. })
    ));

    let oversized = FieldLayout::contiguous([8, 8, 0]);
    assert!(matches!(
        encode_field(&data, &oversized, &params, &mut stream),
        Err(Error::OutOfBounds { .. })
    ));

    // a variable-rate stream cannot be decoded without its index
    let var = CodingParams::fixed_precision(16);
    let layout = FieldLayout::contiguous([4, 4, 0]);
    let mut out = vec![0.0f64; 16];
    assert!(matches!(
        decode_field(&mut out, &layout, &var, &stream),
        Err(Error::MissingIndex)
    ));
}

#[test]
fn test_stream_too_small() {
    let data = vec![0.0f64; 64];
    let layout = FieldLayout::contiguous([8, 8, 0]);
    let params = CodingParams::fixed_rate(16.0, 2);
    let mut stream = vec![0u64; 3];
    assert!(matches!(
        encode_field(&data, &layout, &params, &mut stream),
        Err(Error::StreamTooSmall { .. })
    ));
}

fn lossless_int_rate(dims: u32, bits: u32) -> f64 {
    // enough budget for every plane of every coefficient plus the coder's
    // per-plane overhead
    let block = 1u32 << (2 * dims);
    ((bits + 1) * (block + 1)) as f64 / block as f64
}

#[test]
fn test_random_int_fields_are_lossless() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    for &(size, dims) in &[
        ([9usize, 0, 0], 1u32),
        ([7, 5, 0], 2),
        ([6, 5, 9], 3),
    ] {
        let len = size.iter().filter(|&&s| s > 0).product::<usize>();
        let layout = FieldLayout::contiguous(size);

        let data: Vec<i32> = (0..len).map(|_| rng.random()).collect();
        let params = CodingParams::fixed_rate(lossless_int_rate(dims, 32), dims);
        let mut stream = vec![0u64; stream_capacity::<i32>(&layout, &params)?];
        encode_field(&data, &layout, &params, &mut stream)?;
        let mut out = vec![0i32; len];
        decode_field(&mut out, &layout, &params, &stream)?;
        assert_eq!(out, data, "i32 {size:?}");

        let data: Vec<i64> = (0..len).map(|_| rng.random()).collect();
        let params = CodingParams::fixed_rate(lossless_int_rate(dims, 64), dims);
        let mut stream = vec![0u64; stream_capacity::<i64>(&layout, &params)?];
        encode_field(&data, &layout, &params, &mut stream)?;
        let mut out = vec![0i64; len];
        decode_field(&mut out, &layout, &params, &stream)?;
        assert_eq!(out, data, "i64 {size:?}");
    }
    Ok(())
}

#[test]
fn test_random_float_fields_high_rate() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(42);
    for &size in &[[17usize, 0, 0], [9, 6, 0], [5, 5, 5]] {
        let dims = size.iter().filter(|&&s| s > 0).count() as u32;
        let len = size.iter().filter(|&&s| s > 0).product::<usize>();
        let layout = FieldLayout::contiguous(size);

        let data: Vec<f64> = (0..len).map(|_| rng.random::<f64>() * 2.0 - 1.0).collect();
        let params = CodingParams::fixed_rate(72.0, dims);
        let mut stream = vec![0u64; stream_capacity::<f64>(&layout, &params)?];
        encode_field(&data, &layout, &params, &mut stream)?;
        let mut out = vec![0.0f64; len];
        decode_field(&mut out, &layout, &params, &stream)?;
        for (a, b) in out.iter().zip(data.iter()) {
            assert!((a - b).abs() < 1e-12, "{a} vs {b} in {size:?}");
        }
    }
    Ok(())
}

#[test]
fn test_variable_rate_roundtrip_with_both_index_kinds() -> Result<()> {
    let layout = FieldLayout::contiguous([13, 11, 0]);
    let len = 13 * 11;
    let data: Vec<f32> = (0..len)
        .map(|i| {
            let (x, y) = (i % 13, i / 13);
            (0.3 * x as f32).sin() * (0.2 * y as f32).cos()
        })
        .collect();
    let params = CodingParams::fixed_precision(24);
    let capacity = stream_capacity::<f32>(&layout, &params)?;

    for kind in [IndexKind::Offsets, IndexKind::Hybrid] {
        for granularity in [1, 3] {
            let mut stream = vec![0u64; capacity];
            let (written, index) =
                encode_field_indexed(&data, &layout, &params, &mut stream, granularity, kind)?;
            assert!(written > 0);
            assert_eq!(index.granularity(), granularity);

            let mut out = vec![0.0f32; len];
            let read = decode_field_indexed(&mut out, &layout, &params, &stream, &index)?;
            assert_eq!(read, written);
            for (a, b) in out.iter().zip(data.iter()) {
                assert!((a - b).abs() < 1e-4, "{a} vs {b}");
            }
        }
    }
    Ok(())
}

#[test]
fn test_variable_rate_int_lossless() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(7);
    let layout = FieldLayout::contiguous([10, 6, 3]);
    let len = 10 * 6 * 3;
    let data: Vec<i64> = (0..len).map(|_| rng.random_range(-1_000_000..1_000_000)).collect();
    let params = CodingParams::default();
    let mut stream = vec![0u64; stream_capacity::<i64>(&layout, &params)?];
    let (written, index) = encode_field_indexed(
        &data,
        &layout,
        &params,
        &mut stream,
        2,
        IndexKind::Offsets,
    )?;
    let mut out = vec![0i64; len];
    let read = decode_field_indexed(&mut out, &layout, &params, &stream, &index)?;
    assert_eq!(read, written);
    assert_eq!(out, data);
    Ok(())
}

#[test]
fn test_fixed_accuracy_respects_tolerance() -> Result<()> {
    let layout = FieldLayout::contiguous([16, 16, 0]);
    let data: Vec<f64> = (0..256)
        .map(|i| {
            let (x, y) = (i % 16, i / 16);
            (0.2 * x as f64).cos() + (0.1 * y as f64).sin()
        })
        .collect();
    let tolerance = 1e-6;
    let params = CodingParams::fixed_accuracy(tolerance);
    let mut stream = vec![0u64; stream_capacity::<f64>(&layout, &params)?];
    let (_, index) =
        encode_field_indexed(&data, &layout, &params, &mut stream, 1, IndexKind::Offsets)?;
    let mut out = vec![0.0f64; 256];
    decode_field_indexed(&mut out, &layout, &params, &stream, &index)?;
    // the dropped bit planes are bounded by the tolerance up to the gain of
    // the inverse transform
    for (a, b) in out.iter().zip(data.iter()) {
        assert!((a - b).abs() < 4.0 * tolerance, "{a} vs {b}");
    }

    // a tighter tolerance must not code to a larger error
    let tight = CodingParams::fixed_accuracy(tolerance / 1024.0);
    let mut stream = vec![0u64; stream_capacity::<f64>(&layout, &tight)?];
    let (_, index) =
        encode_field_indexed(&data, &layout, &tight, &mut stream, 1, IndexKind::Offsets)?;
    let mut tighter = vec![0.0f64; 256];
    decode_field_indexed(&mut tighter, &layout, &tight, &stream, &index)?;
    for (a, b) in tighter.iter().zip(data.iter()) {
        assert!((a - b).abs() < 4.0 * tolerance / 1024.0, "{a} vs {b}");
    }
    Ok(())
}
