//! Distributed equilibration on in-process 2-D grids.

use approx::assert_relative_eq;
use strata_comm::{run_grid, GridTopology, SelfComm};
use strata_core::{block_partition, equilibrate, RealScalar, RowBlockMatrix, ScalingError};

/// A badly scaled matrix: row `i` is multiplied by `10^(i % 7 - 3)`.
fn badly_scaled(n: usize) -> RowBlockMatrix<f64> {
    let mut triplets = Vec::new();
    for i in 0..n {
        let s = 10f64.powi(i as i32 % 7 - 3);
        triplets.push((i, i, 3.0 * s));
        triplets.push((i, (i * 5 + 1) % n, -0.7 * s));
        if i + 2 < n {
            triplets.push((i, i + 2, 11.0 * s));
        }
    }
    RowBlockMatrix::from_triplets(n, n, &triplets).unwrap()
}

fn is_power_of_two(v: f64) -> bool {
    v > 0.0 && v.is_finite() && v.round_down_to_power(2.0) == v
}

#[test]
fn test_distributed_matches_single_process() {
    let n = 21;
    let a = badly_scaled(n);
    let serial = equilibrate(&a, 2.0, &SelfComm).unwrap();

    let out = run_grid(2, 2, 1, |grid| {
        let rows = block_partition(n, grid.procs2d())[grid.grid2d_rank()].clone();
        let local = a.row_block(rows).unwrap();
        equilibrate(&local, 2.0, grid.grid2d()).unwrap()
    })
    .unwrap();

    for eq in &out {
        assert_eq!(eq, &serial);
    }
    assert!(serial
        .row_scale
        .iter()
        .chain(&serial.col_scale)
        .all(|&v| is_power_of_two(v)));
    assert!(is_power_of_two(serial.amax));
}

#[test]
fn test_scaled_matrix_is_balanced() {
    let n = 14;
    let a = badly_scaled(n);
    let eq = equilibrate(&a, <f64 as RealScalar>::RADIX, &SelfComm).unwrap();
    let scaled = eq.scale_block(&a).unwrap();

    // Column factors cover their maxima, so every scaled row and column
    // reaches at least 1/radix and no entry exceeds one.
    let mut col_max = vec![0.0f64; n];
    for i in 0..n {
        let (cols, vals) = scaled.row(i);
        let row_max = vals.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!((0.5..=1.0).contains(&row_max), "row {i}: {row_max}");
        for (&j, v) in cols.iter().zip(vals) {
            col_max[j] = col_max[j].max(v.abs());
        }
    }
    for (j, m) in col_max.iter().enumerate() {
        assert!(*m > 0.5 && *m <= 1.0, "column {j}: {m}");
    }

    // Scaling by powers of two is exact.
    for (i, global) in a.global_rows().enumerate() {
        let (cols, vals) = a.row(i);
        let (_, scaled_vals) = scaled.row(i);
        for ((&j, &v), &s) in cols.iter().zip(vals).zip(scaled_vals) {
            assert_eq!(s / eq.row_scale[global] / eq.col_scale[j], v);
        }
    }
}

#[test]
fn test_zero_row_is_reported_everywhere() {
    // Global row 2 is empty; it lives on the second of four processes.
    let n = 8;
    let triplets: Vec<_> = (0..n).filter(|&i| i != 2).map(|i| (i, i, 1.0 + i as f64)).collect();
    let a = RowBlockMatrix::from_triplets(n, n, &triplets).unwrap();

    let out = run_grid(1, 4, 1, |grid| {
        let rows = block_partition(n, 4)[grid.grid2d_rank()].clone();
        let local = a.row_block(rows).unwrap();
        equilibrate(&local, 2.0, grid.grid2d())
    })
    .unwrap();

    for result in out {
        match result {
            Err(ScalingError::StructuralSingularity { index, nrow }) => {
                assert_eq!(index, 3);
                assert_eq!(nrow, n);
            }
            other => panic!("expected a singularity, got {other:?}"),
        }
    }
}

#[test]
fn test_zero_column_is_reported_everywhere() {
    let n = 6;
    let triplets: Vec<_> = (0..n).map(|i| (i, if i == 4 { 0 } else { i }, 2.0)).collect();
    let a = RowBlockMatrix::from_triplets(n, n, &triplets).unwrap();

    let out = run_grid(3, 1, 1, |grid| {
        let rows = block_partition(n, 3)[grid.grid2d_rank()].clone();
        let local = a.row_block(rows).unwrap();
        equilibrate(&local, 2.0, grid.grid2d())
    })
    .unwrap();

    for result in out {
        assert!(matches!(
            result,
            Err(ScalingError::StructuralSingularity { index: 11, nrow: 6 })
        ));
    }
}

#[test]
fn test_processes_without_rows() {
    // Three rows over four processes leaves the last one empty.
    let a = RowBlockMatrix::from_triplets(3, 3, &[(0, 0, 8.0), (1, 1, 0.5), (2, 2, 3.0)]).unwrap();
    let out = run_grid(2, 2, 1, |grid| {
        let rows = block_partition(3, 4)[grid.grid2d_rank()].clone();
        let local = a.row_block(rows).unwrap();
        equilibrate(&local, 2.0, grid.grid2d()).unwrap()
    })
    .unwrap();

    for eq in &out {
        assert_eq!(eq.row_scale, vec![0.125, 2.0, 0.5]);
        // Column 2 holds 3 / 2 after row scaling, which rounds up to 2.
        assert_eq!(eq.col_scale, vec![1.0, 1.0, 0.5]);
        assert_eq!(eq.amax, 8.0);
        assert_relative_eq!(eq.rowcnd, 0.5 / 8.0);
        assert_relative_eq!(eq.colcnd, 0.5);
    }
}

#[test]
fn test_single_precision() {
    let a = RowBlockMatrix::from_triplets(2, 2, &[(0, 0, 1.0e20f32), (1, 1, 1.0e-20f32)]).unwrap();
    let eq = equilibrate(&a, 2.0, &SelfComm).unwrap();
    for &r in &eq.row_scale {
        assert_eq!(r.round_down_to_power(2.0), r);
    }
    let scaled = eq.row_scale[0] * 1.0e20f32;
    assert!((1.0..2.0).contains(&scaled), "{scaled}");
    // Row factors span 2^-67 to 2^66, so the ratio is the subnormal 2^-133.
    assert_eq!(eq.amax, 2f32.powi(66));
    assert_eq!(eq.rowcnd, f32::from_bits(1 << 16));
    assert!(eq.rowcnd > 0.0 && !eq.rowcnd.is_normal());
}

#[test]
fn test_single_precision_condition_clamps_at_safe_min() {
    // The smallest row max lies below the safe minimum, so the ratio uses
    // 2^-126 in its place.
    let tiny = f32::from_bits(1 << 10);
    let a = RowBlockMatrix::from_triplets(2, 2, &[(0, 0, 1.0f32), (1, 1, tiny)]).unwrap();
    let eq = equilibrate(&a, 2.0, &SelfComm).unwrap();
    assert_eq!(eq.rowcnd, f32::MIN_POSITIVE);
    assert_eq!(eq.row_scale[1], f32::safe_max());
}
