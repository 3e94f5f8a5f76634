mod cli;

use std::fs;

use clap::Parser;
use itertools::Itertools;
use log::info;
use mcsas::{McResults, McSas, NoProgress, Progress, ProgressUpdate, StopFlag};
use sas_data::{Dataset, Float};
use sas_model::{CylinderIsotropic, GaussianChain, ScatteringModel, Sphere};

use cli::{load_curve, Cli, ModelKind};

struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn repetition(&self, u: &ProgressUpdate) {
        eprintln!(
            "repetition {:>3} ({}/{} done){} chi2 {:<10.4} elapsed {:>6.1}s, ~{:.1}s remaining",
            u.rep + 1,
            u.completed,
            u.total,
            if u.converged { "" } else { " [discarded]" },
            u.chi_sq,
            u.elapsed_s,
            u.remaining_s,
        );
    }
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let raw = load_curve(&args.input)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", args.input.display()));
    let config = args.config();
    let data = Dataset::prepare(&raw, &config.mask).unwrap_or_else(|e| panic!("bad input data: {e}"));
    info!(
        "{} of {} points kept after masking",
        data.len(),
        raw.q.len()
    );

    match args.model {
        ModelKind::Sphere => {
            let mut model = Sphere::default();
            if let (Some(lo), Some(hi)) = (args.pmin, args.pmax) {
                model = Sphere::new(lo, hi);
            }
            run(&args, &data, &model);
        }
        ModelKind::Cylinder => {
            let mut model = CylinderIsotropic::default();
            if let (Some(lo), Some(hi)) = (args.pmin, args.pmax) {
                model = CylinderIsotropic::new(lo, hi, args.aspect);
            }
            run(&args, &data, &model);
        }
        ModelKind::GaussianChain => {
            let mut model = GaussianChain::default();
            if let (Some(lo), Some(hi)) = (args.pmin, args.pmax) {
                model = GaussianChain::new(lo, hi);
            }
            run(&args, &data, &model);
        }
    }
}

fn run<M: ScatteringModel>(args: &Cli, data: &Dataset, model: &M) {
    let config = args.config();
    let priors: Option<Vec<Vec<Vec<Float>>>> = args.prior.as_ref().map(|p| {
        let text = fs::read_to_string(p)
            .unwrap_or_else(|e| panic!("cannot read prior {}: {e}", p.display()));
        serde_json::from_str(&text).unwrap_or_else(|e| panic!("bad prior file: {e}"))
    });

    let mc = McSas {
        data,
        model,
        config: &config,
        priors: priors.as_deref(),
    };
    let stop = StopFlag::new();
    let results = if args.silent == 0 {
        mc.analyse(&stop, &ConsoleProgress)
    } else {
        mc.analyse(&stop, &NoProgress)
    }
    .unwrap_or_else(|e| panic!("analysis failed: {e}"));

    if args.silent <= 1 {
        results.stats.print();
    }

    if let Some(path) = &args.output {
        fs::write(path, histogram_csv(&results)).unwrap();
    }
    if let Some(path) = &args.dump_settings {
        fs::write(path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    }
    if let Some(path) = &args.dump_contribs {
        fs::write(path, serde_json::to_string(&results.contribs).unwrap()).unwrap();
    }
}

/// Column-wise CSV with one block per histogrammed parameter.
fn histogram_csv(results: &McResults) -> String {
    let mut out = String::new();
    for h in &results.histograms {
        out += &format!("# parameter: {} ({:?} bins, {:?} weighting)\n", h.param, h.scale, h.weighting);
        out += "edge_low,center,width,vol_mean,vol_std,num_mean,num_std,vol_min_required,num_min_required\n";
        for b in 0..h.centers.len() {
            out += &[
                h.edges[b],
                h.centers[b],
                h.widths[b],
                h.vol_mean[b],
                h.vol_std[b],
                h.num_mean[b],
                h.num_std[b],
                h.vol_min_required[b],
                h.num_min_required[b],
            ]
            .iter()
            .map(|v| format!("{v:e}"))
            .join(",");
            out += "\n";
        }
        out += "\n";
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcsas::{BinScale, ParamHistogram, RunStats, Weighting};

    #[test]
    fn csv_has_one_row_per_bin() {
        let h = ParamHistogram {
            param: "radius".into(),
            scale: BinScale::Linear,
            weighting: Weighting::Volume,
            edges: vec![0., 1., 2.],
            centers: vec![0.5, 1.5],
            widths: vec![1., 1.],
            vol_reps: vec![vec![1.], vec![2.]],
            num_reps: vec![vec![1.], vec![2.]],
            vol_mean: vec![1., 2.],
            vol_std: vec![0., 0.],
            num_mean: vec![1., 2.],
            num_std: vec![0., 0.],
            vol_min_required: vec![0., 0.],
            num_min_required: vec![0., 0.],
        };
        let results = McResults {
            q: vec![],
            fit_mean: vec![],
            fit_std: vec![],
            scales: vec![],
            contribs: vec![],
            mean_iterations: 0.,
            discarded: 0,
            cancelled: false,
            stats: RunStats::default(),
            histograms: vec![h],
            moments: vec![],
        };
        let csv = histogram_csv(&results);
        let rows: Vec<&str> = csv.lines().filter(|l| !l.is_empty() && !l.starts_with(['#', 'e'])).collect();
        assert_eq!(rows.len(), 2);
        assert!(csv.starts_with("# parameter: radius"));
    }
}
