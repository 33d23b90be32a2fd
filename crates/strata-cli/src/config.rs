//! TOML configuration deserialisation for layered redistribution jobs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub grid: GridConfig,
    pub matrix: MatrixSpec,
    #[serde(default)]
    pub rhs: RhsConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Shape of the layered process grid.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct GridConfig {
    #[serde(default = "default_one")]
    pub nprow: usize,
    #[serde(default = "default_one")]
    pub npcol: usize,
    /// Number of depth layers.
    #[serde(default = "default_one")]
    pub npdep: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            nprow: 1,
            npcol: 1,
            npdep: 1,
        }
    }
}

impl GridConfig {
    pub fn nprocs(&self) -> usize {
        self.nprow * self.npcol * self.npdep
    }
}

/// Where the test matrix comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatrixSpec {
    /// 5-point Laplacian on an `nx x ny` grid.
    Laplacian2d { nx: usize, ny: usize },
    /// Banded matrix whose row magnitudes span `decades` powers of ten.
    GradedBand {
        n: usize,
        #[serde(default = "default_bandwidth")]
        bandwidth: usize,
        #[serde(default = "default_decades")]
        decades: u32,
    },
    /// Matrix Market coordinate file, resolved relative to the job file.
    MatrixMarket { path: PathBuf },
}

/// Right-hand side generation.
#[derive(Debug, Clone, Deserialize)]
pub struct RhsConfig {
    #[serde(default = "default_one")]
    pub nrhs: usize,
    /// Extra rows of padding in each process's leading dimension.
    #[serde(default)]
    pub padding: usize,
}

impl Default for RhsConfig {
    fn default() -> Self {
        Self {
            nrhs: 1,
            padding: 0,
        }
    }
}

/// Equilibration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Radix of the scale factors (default: the floating-point radix, 2).
    #[serde(default = "default_radix")]
    pub radix: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radix: default_radix(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Path of the JSON report (default: none, summary only).
    #[serde(default)]
    pub report: Option<PathBuf>,
}

fn default_one() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_bandwidth() -> usize {
    2
}
fn default_decades() -> u32 {
    6
}
fn default_radix() -> f64 {
    2.0
}

impl JobConfig {
    /// Check the settings that TOML types alone cannot express.
    pub fn validate(&self) -> Result<()> {
        let g = &self.grid;
        if g.nprow == 0 || g.npcol == 0 || g.npdep == 0 {
            anyhow::bail!(
                "Grid dimensions must be positive, got {} x {} x {}",
                g.nprow,
                g.npcol,
                g.npdep
            );
        }
        if self.rhs.nrhs == 0 {
            anyhow::bail!("rhs.nrhs must be at least 1");
        }
        if !(self.scaling.radix.is_finite() && self.scaling.radix > 1.0) {
            anyhow::bail!(
                "scaling.radix must be a finite value above 1, got {}",
                self.scaling.radix
            );
        }
        match &self.matrix {
            MatrixSpec::Laplacian2d { nx, ny } if *nx == 0 || *ny == 0 => {
                anyhow::bail!("laplacian2d needs positive nx and ny, got {nx} x {ny}")
            }
            MatrixSpec::GradedBand { n: 0, .. } => anyhow::bail!("graded_band needs n > 0"),
            _ => Ok(()),
        }
    }
}

/// Load, parse and validate a TOML job configuration file.
///
/// A relative Matrix Market path is resolved against the job file's directory.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let mut config: JobConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse job file {}", path.display()))?;
    if let MatrixSpec::MatrixMarket { path: mtx } = &mut config.matrix {
        if mtx.is_relative() {
            if let Some(dir) = path.parent() {
                *mtx = dir.join(&*mtx);
            }
        }
    }
    config.validate()?;
    Ok(config)
}
