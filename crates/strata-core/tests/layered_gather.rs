//! Layered redistribution on in-process thread grids.
//!
//! Each test builds a global matrix, hands every process a contiguous row
//! block (2-D rank major, depth minor), and checks what the coordinating
//! layer receives and what comes back after a scatter.

use num_complex::Complex64;
use strata_comm::{run_grid, Grid3d, GridTopology, LocalComm};
use strata_core::{
    block_partition, gather_matrix, gather_rhs, gather_system, scatter_rhs, tiles_exactly,
    DenseBlock, RowBlockMatrix,
};

/// 1-D Laplacian-like test matrix with a distinctive value in every entry.
fn banded(n: usize) -> RowBlockMatrix<f64> {
    let mut triplets = Vec::new();
    for i in 0..n {
        if i > 0 {
            triplets.push((i, i - 1, -(i as f64) - 0.25));
        }
        triplets.push((i, i, 4.0 + i as f64));
        if i + 1 < n {
            triplets.push((i, i + 1, -(i as f64) - 0.5));
        }
    }
    RowBlockMatrix::from_triplets(n, n, &triplets).unwrap()
}

/// Rows owned by world rank `p * npdep + z`.
fn rows_of<G: GridTopology>(grid: &G, n: usize) -> std::ops::Range<usize> {
    let by_p = &block_partition(n, grid.procs2d())[grid.grid2d_rank()];
    let by_z = &block_partition(by_p.len(), grid.npdep())[grid.depth_rank()];
    by_p.start + by_z.start..by_p.start + by_z.end
}

fn rhs_for(rows: std::ops::Range<usize>, nrhs: usize, ld: usize) -> DenseBlock<f64> {
    DenseBlock::from_fn_with_stride(rows.len(), nrhs, ld, |i, j| {
        (rows.start + i) as f64 + 1000.0 * j as f64
    })
    .unwrap()
}

#[test]
fn test_two_layer_example() {
    // Layer 0 owns 2 rows / 3 non-zeros, layer 1 owns 3 rows / 5 non-zeros.
    let a = RowBlockMatrix::from_triplets(
        5,
        5,
        &[
            (0, 0, 1.0),
            (0, 3, 2.0),
            (1, 1, 3.0),
            (2, 2, 4.0),
            (2, 0, 5.0),
            (3, 3, 6.0),
            (3, 4, 7.0),
            (4, 4, 8.0),
        ],
    )
    .unwrap();

    let out = run_grid(1, 1, 2, |grid| {
        let rows = if grid.depth_rank() == 0 { 0..2 } else { 2..5 };
        let local = a.row_block(rows.clone()).unwrap();
        let b = rhs_for(rows, 2, 6);
        let gathered = gather_system(&local, &b, &grid).unwrap();
        (local.nnz_loc(), gathered)
    })
    .unwrap();

    assert_eq!(out[0].0, 3);
    assert_eq!(out[1].0, 5);
    assert!(out[1].1.is_none());

    let (a2d, b2d) = out[0].1.as_ref().unwrap();
    assert_eq!(a2d.m_loc(), 5);
    assert_eq!(a2d.nnz_loc(), 8);
    assert_eq!(a2d.rowptr().len(), 6);
    assert_eq!(a2d.rowptr()[5], 8);
    assert_eq!(a2d.fst_row(), 0);
    assert_eq!(a2d, &a);

    assert_eq!((b2d.nrows(), b2d.ncols(), b2d.ld()), (5, 2, 5));
    assert_eq!(b2d.column(0), &[0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(b2d.column(1), &[1000.0, 1001.0, 1002.0, 1003.0, 1004.0]);
}

#[test]
fn test_gather_conserves_counts_and_tiles_rows() {
    let n = 23;
    let a = banded(n);
    let out = run_grid(2, 2, 2, |grid| {
        let rows = rows_of(&grid, n);
        let local = a.row_block(rows.clone()).unwrap();
        let a2d = gather_matrix(&local, &grid).unwrap();
        (grid.grid2d_rank(), rows, local.nnz_loc(), a2d)
    })
    .unwrap();

    let mut consolidated = Vec::new();
    for p in 0..4 {
        let layers: Vec<_> = out.iter().filter(|(q, ..)| *q == p).collect();
        assert_eq!(layers.len(), 2);
        let a2d = layers[0].3.as_ref().expect("layer 0 holds the consolidated block");
        assert!(layers[1].3.is_none());

        let rows: usize = layers.iter().map(|(_, r, ..)| r.len()).sum();
        let nnz: usize = layers.iter().map(|(_, _, nnz, _)| nnz).sum();
        assert_eq!(a2d.m_loc(), rows);
        assert_eq!(a2d.nnz_loc(), nnz);
        consolidated.push(a2d.clone());
    }

    let ranges: Vec<_> = consolidated.iter().map(|m| m.global_rows()).collect();
    assert!(tiles_exactly(&ranges, n));
    for block in &consolidated {
        assert_eq!(block, &a.row_block(block.global_rows()).unwrap());
    }
}

#[test]
fn test_round_trip_restores_caller_stride() {
    let n = 17;
    let nrhs = 3;
    let a = banded(n);
    let out = run_grid(1, 2, 3, |grid| {
        let rows = rows_of(&grid, n);
        let local = a.row_block(rows.clone()).unwrap();
        let ld = rows.len() + 2 + grid.depth_rank();
        let b = rhs_for(rows, nrhs, ld);

        let b2d = gather_rhs(&local, &b, &grid).unwrap();
        let a2d = gather_matrix(&local, &grid).unwrap();

        let mut back = DenseBlock::new(b.nrows(), nrhs, ld, vec![f64::NAN; b.as_slice().len()])
            .unwrap();
        let consolidated = a2d.as_ref().zip(b2d.as_ref());
        scatter_rhs(consolidated, &local, &mut back, &grid).unwrap();
        (b, back)
    })
    .unwrap();

    for (b, back) in &out {
        assert_eq!(back.ld(), b.ld());
        assert!(back.same_entries(b));
        // Bit-for-bit, including the sign of zero.
        for (x, y) in b.to_compact().iter().zip(back.to_compact()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }
}

#[test]
fn test_scatter_of_modified_solution() {
    let n = 9;
    let a = banded(n);
    let out = run_grid(1, 1, 3, |grid: Grid3d<LocalComm>| {
        let rows = rows_of(&grid, n);
        let local = a.row_block(rows.clone()).unwrap();
        let b = rhs_for(rows.clone(), 1, rows.len().max(1));
        let system = gather_system(&local, &b, &grid).unwrap();

        let solved = system.map(|(a2d, b2d)| {
            let x = DenseBlock::from_fn(b2d.nrows(), 1, |i, _| -2.0 * b2d.get(i, 0));
            (a2d, x)
        });
        let mut x_local = DenseBlock::from_fn(b.nrows(), 1, |_, _| 0.0);
        let consolidated = solved.as_ref().map(|(a2d, x)| (a2d, x));
        scatter_rhs(consolidated, &local, &mut x_local, &grid).unwrap();
        (rows, x_local)
    })
    .unwrap();

    for (rows, x) in out {
        for (i, global) in rows.enumerate() {
            assert_eq!(x.get(i, 0), -2.0 * global as f64);
        }
    }
}

#[test]
fn test_depth_one_is_identity() {
    let n = 10;
    let a = banded(n);
    let out = run_grid(2, 1, 1, |grid| {
        let rows = rows_of(&grid, n);
        let local = a.row_block(rows.clone()).unwrap();
        let b = rhs_for(rows, 2, 8);
        let (a2d, b2d) = gather_system(&local, &b, &grid).unwrap().unwrap();
        (local == a2d, b2d.same_entries(&b), b2d.ld() == b.nrows().max(1))
    })
    .unwrap();
    assert!(out.iter().all(|&(same_a, same_b, tight)| same_a && same_b && tight));
}

#[test]
fn test_empty_layer_keeps_prefix_sums() {
    // Four rows over three layers: the middle layer owns nothing.
    let a = banded(4);
    let out = run_grid(1, 1, 3, |grid| {
        let rows = match grid.depth_rank() {
            0 => 0..1,
            1 => 1..1,
            _ => 1..4,
        };
        let local = a.row_block(rows.clone()).unwrap();
        let b = rhs_for(rows, 2, 4);
        let system = gather_system(&local, &b, &grid).unwrap();

        let mut back = DenseBlock::new(b.nrows(), 2, 4, vec![0.0; 8]).unwrap();
        let consolidated = system.as_ref().map(|(a2d, b2d)| (a2d, b2d));
        scatter_rhs(consolidated, &local, &mut back, &grid).unwrap();
        (system, back.same_entries(&b))
    })
    .unwrap();

    let (a2d, b2d) = out[0].0.as_ref().unwrap();
    assert_eq!(a2d, &a);
    assert_eq!(b2d.column(1), &[1000.0, 1001.0, 1002.0, 1003.0]);
    assert!(out.iter().all(|(_, restored)| *restored));
}

#[test]
fn test_complex_entries_move_unchanged() {
    let a = RowBlockMatrix::from_triplets(
        3,
        3,
        &[
            (0, 0, Complex64::new(1.0, -1.0)),
            (1, 2, Complex64::new(0.0, 2.5)),
            (2, 1, Complex64::new(-3.0, 0.0)),
        ],
    )
    .unwrap();
    let out = run_grid(1, 1, 2, |grid| {
        let rows = if grid.depth_rank() == 0 { 0..1 } else { 1..3 };
        let local = a.row_block(rows).unwrap();
        gather_matrix(&local, &grid).unwrap()
    })
    .unwrap();
    assert_eq!(out[0].as_ref(), Some(&a));
}
