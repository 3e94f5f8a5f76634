use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use clap::{value_parser, Parser, ValueEnum};
use mcsas::{BinScale, HistogramSpec, McConfig, Weighting};
use sas_data::{Float, MaskOptions, RawCurve};
use serde::Serialize;

#[derive(Debug, ValueEnum, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Sphere,
    Cylinder,
    GaussianChain,
}

#[derive(Parser, Serialize)]
#[clap(author, about = "Monte-Carlo size-distribution inversion of a SAS curve")]
pub struct Cli {
    /// 2- or 3-column ASCII/CSV curve: q, I [, sigma]. '#' starts a comment;
    /// unparseable lines (headers) are skipped.
    #[clap(value_parser = value_parser!(PathBuf))]
    pub input: PathBuf,

    #[clap(long, value_enum, default_value_t = ModelKind::Sphere)]
    pub model: ModelKind,

    /// Lower bound for the model's size parameter (model default otherwise).
    #[clap(long)]
    pub pmin: Option<Float>,
    /// Upper bound for the model's size parameter.
    #[clap(long)]
    pub pmax: Option<Float>,
    /// Fixed aspect ratio L/(2R) for the cylinder model.
    #[clap(long, default_value_t = 10.)]
    pub aspect: Float,

    /// Contributions per Monte-Carlo run.
    #[clap(short = 'n', long, default_value_t = 200)]
    pub contributions: usize,
    /// Independent repetitions.
    #[clap(short = 'r', long, default_value_t = 10)]
    pub repetitions: usize,
    #[clap(long, default_value_t = 100_000)]
    pub max_iterations: usize,
    /// Reduced-χ² convergence target.
    #[clap(long, default_value_t = 1.0)]
    pub target: Float,
    /// Extra attempts per repetition before discarding it.
    #[clap(long, default_value_t = 5)]
    pub retries: usize,
    /// Volume compensation exponent.
    #[clap(long, default_value_t = 0.5)]
    pub compensation: Float,
    /// Scattering contrast Δρ².
    #[clap(long, default_value_t = 1.0)]
    pub delta_rho_sq: Float,

    /// Fit the scale factor only, background pinned to zero.
    #[clap(long = "no-background", action = clap::ArgAction::SetFalse)]
    pub find_background: bool,
    /// Recompute per-contribution intensities instead of caching them.
    #[clap(long)]
    pub memsave: bool,
    #[clap(long)]
    pub start_from_minimum: bool,

    #[clap(long, default_value_t = 50)]
    pub bins: usize,
    #[clap(long, value_enum, default_value_t = BinScale::Linear)]
    pub bin_scale: BinScale,
    #[clap(long, value_enum, default_value_t = Weighting::Volume)]
    pub weighting: Weighting,

    /// Minimum fractional uncertainty on I.
    #[clap(long, default_value_t = 0.01)]
    pub e_min: Float,
    /// Drop points with I == 0.
    #[clap(long)]
    pub mask_zero: bool,
    /// Drop points with I <= 0.
    #[clap(long)]
    pub mask_negative: bool,
    #[clap(long)]
    pub qmin: Option<Float>,
    #[clap(long)]
    pub qmax: Option<Float>,

    #[clap(long, default_value_t = 0)]
    pub seed: u64,

    /// JSON contribution tables (from --dump-contribs) used as priors.
    #[clap(long, value_parser = value_parser!(PathBuf))]
    pub prior: Option<PathBuf>,

    /// Write the histogram as CSV.
    #[clap(short, long, value_parser = value_parser!(PathBuf))]
    pub output: Option<PathBuf>,
    /// Write the effective settings as JSON.
    #[clap(long, value_parser = value_parser!(PathBuf))]
    pub dump_settings: Option<PathBuf>,
    /// Write the contribution tables as JSON, re-loadable via --prior.
    #[clap(long, value_parser = value_parser!(PathBuf))]
    pub dump_contribs: Option<PathBuf>,

    /// Print less. Pass twice to keep only the summary line.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub silent: u8,
}

impl Cli {
    pub fn config(&self) -> McConfig {
        McConfig {
            num_contribs: self.contributions,
            num_reps: self.repetitions,
            max_iterations: self.max_iterations,
            convergence_target: self.target,
            max_retries: self.retries,
            compensation_exponent: self.compensation,
            delta_rho_sq: self.delta_rho_sq,
            start_from_minimum: self.start_from_minimum,
            find_background: self.find_background,
            memsave: self.memsave,
            mask: MaskOptions {
                e_min: self.e_min,
                mask_zero_i: self.mask_zero,
                mask_negative_i: self.mask_negative,
                q_bounds: match (self.qmin, self.qmax) {
                    (None, None) => None,
                    (lo, hi) => Some([lo.unwrap_or(0.), hi.unwrap_or(Float::INFINITY)]),
                },
                psi_bounds: None,
            },
            histogram: vec![HistogramSpec {
                bins: self.bins,
                scale: self.bin_scale,
                weighting: self.weighting,
            }],
            ranges: Vec::new(),
            seed: self.seed,
        }
    }
}

/// Read a whitespace- or comma-separated q/I[/σ] curve.
pub fn load_curve(path: &Path) -> std::io::Result<RawCurve> {
    let reader = BufReader::new(File::open(path)?);
    let mut q = Vec::new();
    let mut i = Vec::new();
    let mut sigma = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let cols: Vec<Float> = line
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map_while(|t| t.parse().ok())
            .collect();
        // Header or otherwise unparseable line.
        if cols.len() < 2 {
            continue;
        }
        q.push(cols[0]);
        i.push(cols[1]);
        if cols.len() > 2 {
            sigma.push(cols[2]);
        }
    }
    let sigma = (sigma.len() == q.len()).then_some(sigma);
    Ok(RawCurve {
        q,
        i,
        sigma,
        psi: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn curve_parsing_skips_headers_and_comments() {
        use std::io::Write;
        let path = std::env::temp_dir().join("sas-bin-curve-test.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "# generated curve").unwrap();
        writeln!(f, "q,I,sigma").unwrap();
        writeln!(f, "1e7, 4.0, 0.04").unwrap();
        writeln!(f, "2e7\t3.0\t0.03 # inline comment").unwrap();
        writeln!(f, "3e7; 2.0; 0.02").unwrap();
        drop(f);
        let curve = load_curve(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(curve.q, vec![1e7, 2e7, 3e7]);
        assert_eq!(curve.i, vec![4., 3., 2.]);
        assert_eq!(curve.sigma, Some(vec![0.04, 0.03, 0.02]));
    }
}
