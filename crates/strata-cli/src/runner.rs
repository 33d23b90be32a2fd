//! Job runner: distributes a matrix over a thread grid, consolidates it onto
//! the coordinating layer, equilibrates it there and scatters the right-hand
//! sides back.

use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use ndarray::Array2;
use serde::Serialize;

use strata_comm::{run_grid, Grid3d, GridTopology, LocalComm};
use strata_core::{
    block_partition, equilibrate, gather_system_planned, scatter_rhs, tiles_exactly, DenseBlock,
    Equilibration, LayerCounts, LayerPlan, RowBlockMatrix, ScalingError,
};

use crate::config::{GridConfig, JobConfig};
use crate::matrices::build_matrix;

/// What one depth column (one 2-D grid position) consolidated on layer 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnReport {
    pub grid2d_rank: usize,
    pub fst_row: usize,
    pub m_loc: usize,
    pub nnz_loc: usize,
    /// Counts contributed by each depth layer.
    pub layers: Vec<LayerCounts>,
}

/// Outcome of equilibrating the consolidated matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScalingReport {
    Equilibrated {
        rowcnd: f64,
        colcnd: f64,
        amax: f64,
        row_scale_range: [f64; 2],
        col_scale_range: [f64; 2],
    },
    /// 1-based index of the first empty row (`<= nrow`) or column.
    Singular { index: usize },
}

impl ScalingReport {
    fn from_equilibration(eq: &Equilibration<f64>) -> Self {
        ScalingReport::Equilibrated {
            rowcnd: eq.rowcnd,
            colcnd: eq.colcnd,
            amax: eq.amax,
            row_scale_range: value_range(&eq.row_scale),
            col_scale_range: value_range(&eq.col_scale),
        }
    }
}

/// Summary of a completed job.
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub grid: GridConfig,
    pub nrow: usize,
    pub ncol: usize,
    pub nnz: usize,
    pub nrhs: usize,
    pub columns: Vec<ColumnReport>,
    pub scaling: Option<ScalingReport>,
    /// Whether every process got its right-hand side back bit for bit.
    pub round_trip: bool,
}

/// Per-rank result collected after the grid finishes.
struct RankOutcome {
    column: Option<ColumnReport>,
    scaling: Option<ScalingReport>,
    round_trip: bool,
}

/// Build the configured matrix and run the job.
pub fn run_job(job: &JobConfig) -> Result<JobReport> {
    let a = build_matrix(&job.matrix)?;
    run_with_matrix(&a, job)
}

/// Run the job on an already assembled matrix.
pub fn run_with_matrix(a: &RowBlockMatrix<f64>, job: &JobConfig) -> Result<JobReport> {
    let g = job.grid;
    info!(
        "running {} x {} matrix ({} non-zeros) on a {} x {} x {} grid",
        a.nrow(),
        a.ncol(),
        a.nnz_loc(),
        g.nprow,
        g.npcol,
        g.npdep
    );

    let outcomes = run_grid(g.nprow, g.npcol, g.npdep, |grid| run_rank(a, job, grid))?;
    let outcomes = outcomes.into_iter().collect::<Result<Vec<_>>>()?;

    let columns: Vec<ColumnReport> = outcomes.iter().filter_map(|o| o.column.clone()).collect();
    check_consolidation(a, &columns, g.nprow * g.npcol)?;

    let mut scalings = outcomes.iter().filter_map(|o| o.scaling.clone());
    let scaling = scalings.next();
    if scalings.any(|s| Some(&s) != scaling.as_ref()) {
        anyhow::bail!("Coordinating processes disagree on the equilibration result");
    }

    Ok(JobReport {
        grid: g,
        nrow: a.nrow(),
        ncol: a.ncol(),
        nnz: a.nnz_loc(),
        nrhs: job.rhs.nrhs,
        columns,
        scaling,
        round_trip: outcomes.iter().all(|o| o.round_trip),
    })
}

fn run_rank(
    a: &RowBlockMatrix<f64>,
    job: &JobConfig,
    grid: Grid3d<LocalComm>,
) -> Result<RankOutcome> {
    let rows = owned_rows(a.nrow(), &grid);
    let local = a.row_block(rows.clone())?;
    let b = build_rhs(rows, job.rhs.nrhs, job.rhs.padding)?;

    let system = gather_system_planned(&local, &b, &grid)?;

    // A failed equilibration is raised only after the scatter, which the
    // other layers are already waiting in.
    let scaling = match &system {
        Some((_, a2d, _)) if job.scaling.enabled => {
            match equilibrate(a2d, job.scaling.radix, grid.grid2d()) {
                Ok(eq) => Ok(Some(ScalingReport::from_equilibration(&eq))),
                Err(ScalingError::StructuralSingularity { index, .. }) => {
                    Ok(Some(ScalingReport::Singular { index }))
                }
                Err(e) => Err(e),
            }
        }
        _ => Ok(None),
    };

    // The consolidated right-hand side stands in for a solution.
    let poison = vec![f64::NAN; b.as_slice().len()];
    let mut back = DenseBlock::new(b.nrows(), b.ncols(), b.ld(), poison)?;
    let consolidated = system.as_ref().map(|(_, a2d, b2d)| (a2d, b2d));
    scatter_rhs(consolidated, &local, &mut back, &grid)?;
    let scaling = scaling?;
    let round_trip = back.same_entries(&b);
    debug!(
        "world rank {}: {} rows, round trip {}",
        grid.world_rank(),
        local.m_loc(),
        if round_trip { "ok" } else { "FAILED" }
    );

    let column = system.map(|(plan, a2d, _)| ColumnReport {
        grid2d_rank: grid.grid2d_rank(),
        fst_row: a2d.fst_row(),
        m_loc: a2d.m_loc(),
        nnz_loc: a2d.nnz_loc(),
        layers: (0..plan.layers()).map(|z| plan.layer(z)).collect(),
    });

    Ok(RankOutcome {
        column,
        scaling,
        round_trip,
    })
}

/// Global rows owned by the process at 2-D rank `p`, depth `z`: rows are
/// split across 2-D ranks first, then each share across its depth column.
pub fn partition_rows(n: usize, procs2d: usize, npdep: usize, p: usize, z: usize) -> Range<usize> {
    let by_p = block_partition(n, procs2d)[p].clone();
    let by_z = block_partition(by_p.len(), npdep)[z].clone();
    by_p.start + by_z.start..by_p.start + by_z.end
}

fn owned_rows<G: GridTopology>(n: usize, grid: &G) -> Range<usize> {
    partition_rows(n, grid.procs2d(), grid.npdep(), grid.grid2d_rank(), grid.depth_rank())
}

/// Right-hand sides for the given global rows, stored with `padding` extra
/// rows of stride.
fn build_rhs(rows: Range<usize>, nrhs: usize, padding: usize) -> Result<DenseBlock<f64>> {
    let first = rows.start;
    let values = Array2::from_shape_fn((rows.len(), nrhs), |(i, j)| {
        1.0 + (first + i) as f64 * 0.5 - j as f64
    });
    let ld = rows.len().max(1) + padding;
    Ok(DenseBlock::from_array(&values, ld)?)
}

/// The per-layer counts each depth column would consolidate, computed without
/// running the grid.
pub fn plan_job(job: &JobConfig) -> Result<Vec<ColumnReport>> {
    let a = build_matrix(&job.matrix)?;
    Ok(plan_columns(&a, job.grid))
}

fn plan_columns(a: &RowBlockMatrix<f64>, g: GridConfig) -> Vec<ColumnReport> {
    let procs2d = g.nprow * g.npcol;
    let rowptr = a.rowptr();
    (0..procs2d)
        .map(|p| {
            let layers: Vec<LayerCounts> = (0..g.npdep)
                .map(|z| {
                    let r = partition_rows(a.nrow(), procs2d, g.npdep, p, z);
                    LayerCounts {
                        nnz: rowptr[r.end] - rowptr[r.start],
                        rows: r.len(),
                    }
                })
                .collect();
            let plan = LayerPlan::from_counts(&layers);
            ColumnReport {
                grid2d_rank: p,
                fst_row: partition_rows(a.nrow(), procs2d, 1, p, 0).start,
                m_loc: plan.total_rows(),
                nnz_loc: plan.total_nnz(),
                layers,
            }
        })
        .collect()
}

/// Check the row-partition and conservation invariants of the consolidated
/// blocks.
fn check_consolidation(
    a: &RowBlockMatrix<f64>,
    columns: &[ColumnReport],
    procs2d: usize,
) -> Result<()> {
    if columns.len() != procs2d {
        anyhow::bail!("Expected {procs2d} consolidated blocks, found {}", columns.len());
    }
    let ranges: Vec<Range<usize>> = columns
        .iter()
        .map(|c| c.fst_row..c.fst_row + c.m_loc)
        .collect();
    if !tiles_exactly(&ranges, a.nrow()) {
        anyhow::bail!("Consolidated row ranges {ranges:?} do not tile 0..{}", a.nrow());
    }
    for c in columns {
        let rows: usize = c.layers.iter().map(|l| l.rows).sum();
        let nnz: usize = c.layers.iter().map(|l| l.nnz).sum();
        if rows != c.m_loc || nnz != c.nnz_loc {
            anyhow::bail!(
                "2-D rank {} consolidated {} rows / {} non-zeros, layers hold {rows} / {nnz}",
                c.grid2d_rank,
                c.m_loc,
                c.nnz_loc
            );
        }
    }
    let total: usize = columns.iter().map(|c| c.nnz_loc).sum();
    if total != a.nnz_loc() {
        anyhow::bail!("Consolidated {total} non-zeros, matrix has {}", a.nnz_loc());
    }
    Ok(())
}

fn value_range(values: &[f64]) -> [f64; 2] {
    values
        .iter()
        .fold([f64::INFINITY, f64::NEG_INFINITY], |[lo, hi], &v| [lo.min(v), hi.max(v)])
}

/// Print a human-readable summary of a finished job.
pub fn print_summary(report: &JobReport) {
    println!(
        "Matrix: {} x {}, {} non-zeros, {} right-hand side(s)",
        report.nrow, report.ncol, report.nnz, report.nrhs
    );
    println!(
        "Grid: {} x {} x {} ({} processes)",
        report.grid.nprow,
        report.grid.npcol,
        report.grid.npdep,
        report.grid.nprocs()
    );
    print_columns(&report.columns);
    match &report.scaling {
        Some(ScalingReport::Equilibrated {
            rowcnd,
            colcnd,
            amax,
            ..
        }) => println!(
            "Equilibration: rowcnd = {rowcnd:.3e}, colcnd = {colcnd:.3e}, amax = {amax:.3e}"
        ),
        Some(ScalingReport::Singular { index }) => {
            let kind = if *index <= report.nrow { "row" } else { "column" };
            println!("Equilibration: structurally singular ({kind}, index {index})");
        }
        None => println!("Equilibration: skipped"),
    }
    println!(
        "Right-hand side round trip: {}",
        if report.round_trip { "exact" } else { "MISMATCH" }
    );
}

/// Print the per-layer counts of each depth column.
pub fn print_columns(columns: &[ColumnReport]) {
    println!(
        "{:>6} {:>9} {:>8} {:>10}  layers (rows/nnz)",
        "2-D", "fst_row", "m_loc", "nnz_loc"
    );
    for c in columns {
        let layers: Vec<String> = c
            .layers
            .iter()
            .map(|l| format!("{}/{}", l.rows, l.nnz))
            .collect();
        println!(
            "{:>6} {:>9} {:>8} {:>10}  {}",
            c.grid2d_rank,
            c.fst_row,
            c.m_loc,
            c.nnz_loc,
            layers.join(" ")
        );
    }
}

/// Write the job report as pretty-printed JSON.
pub fn write_report(report: &JobReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report).context("JSON serialisation error")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Report written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrices::laplacian2d;

    fn job(toml_src: &str) -> JobConfig {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_partition_rows_is_depth_minor() {
        let ranges: Vec<_> = (0..2)
            .flat_map(|p| (0..3).map(move |z| partition_rows(11, 2, 3, p, z)))
            .collect();
        assert_eq!(ranges, vec![0..2, 2..4, 4..6, 6..8, 8..10, 10..11]);
        assert!(tiles_exactly(&ranges, 11));
    }

    #[test]
    fn test_laplacian_job_round_trips() {
        let job = job(
            r#"
            [grid]
            nprow = 2
            npdep = 2

            [matrix]
            kind = "laplacian2d"
            nx = 4
            ny = 4

            [rhs]
            nrhs = 2
            padding = 1
            "#,
        );
        let report = run_job(&job).unwrap();
        assert!(report.round_trip);
        assert_eq!(report.columns.len(), 2);
        assert_eq!(report.columns[1].fst_row, 8);
        assert_eq!(report.columns[0].layers.len(), 2);
        assert_eq!(
            report.scaling,
            Some(ScalingReport::Equilibrated {
                rowcnd: 1.0,
                colcnd: 1.0,
                amax: 4.0,
                row_scale_range: [0.25, 0.25],
                col_scale_range: [1.0, 1.0],
            })
        );
    }

    #[test]
    fn test_singular_matrix_is_reported() {
        let a = RowBlockMatrix::from_triplets(4, 4, &[(0, 0, 1.0), (1, 1, 1.0), (3, 3, 1.0)])
            .unwrap();
        let job = job(
            r#"
            [grid]
            npcol = 2
            npdep = 2

            [matrix]
            kind = "graded_band"
            n = 4
            "#,
        );
        let report = run_with_matrix(&a, &job).unwrap();
        assert_eq!(report.scaling, Some(ScalingReport::Singular { index: 3 }));
        assert!(report.round_trip);
    }

    #[test]
    fn test_scaling_failure_releases_other_layers() {
        // An invalid radix fails on layer 0 only; the other layers must still
        // get their right-hand sides back so the grid can finish.
        let job = job(
            r#"
            [grid]
            nprow = 2
            npdep = 3

            [matrix]
            kind = "laplacian2d"
            nx = 3
            ny = 3

            [scaling]
            radix = 1.0
            "#,
        );
        let a = laplacian2d(3, 3).unwrap();
        let err = run_with_matrix(&a, &job).unwrap_err();
        assert!(err.to_string().contains("radix"), "{err}");
    }

    #[test]
    fn test_demo_jobs_load() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        for name in ["layered_laplacian.toml", "graded_band.toml", "matrix_market.toml"] {
            let job = crate::config::load_config(&demos.join(name)).unwrap();
            let columns = plan_job(&job).unwrap();
            assert_eq!(columns.len(), job.grid.nprow * job.grid.npcol, "{name}");
        }
    }

    #[test]
    fn test_matrix_market_demo_runs() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        let job = crate::config::load_config(&demos.join("matrix_market.toml")).unwrap();
        let report = run_job(&job).unwrap();
        assert_eq!((report.nrow, report.nnz), (5, 12));
        assert!(report.round_trip);
        assert!(matches!(
            report.scaling,
            Some(ScalingReport::Equilibrated { .. })
        ));
    }

    #[test]
    fn test_plan_matches_run() {
        let job = job(
            r#"
            [grid]
            nprow = 3
            npdep = 2

            [matrix]
            kind = "laplacian2d"
            nx = 5
            ny = 3

            [scaling]
            enabled = false
            "#,
        );
        let a = laplacian2d(5, 3).unwrap();
        let planned = plan_columns(&a, job.grid);
        let report = run_with_matrix(&a, &job).unwrap();
        assert_eq!(planned, report.columns);
        assert!(report.scaling.is_none());
    }
}
