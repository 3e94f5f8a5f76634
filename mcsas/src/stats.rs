use std::fmt::Display;

use derive_more::AddAssign;
use num_traits::AsPrimitive;
use serde::Serialize;

use crate::prelude::*;

/// Aggregated counters over one or more repetitions. Scalar columns are
/// printed as per-repetition means.
#[derive(Debug, Default, Clone, Copy, AddAssign, Serialize)]
pub struct RunStats {
    /// Converged repetitions aggregated into this value.
    pub sample_size: usize,
    pub iterations: usize,
    pub moves: usize,
    /// Optimization attempts, including retries.
    pub attempts: usize,
    pub discarded: usize,
    /// Summed final reduced χ²; printed as the mean.
    pub chi_sq: Float,
    pub elapsed: f32,
}

impl RunStats {
    fn format_scl<T: Display + AsPrimitive<f64>>(
        &self,
        width: usize,
        title: &str,
        val: T,
    ) -> (String, String) {
        let mean = val.as_() / self.sample_size.max(1) as f64;
        (
            format!("{:>width$}", title),
            format!("{:>width$.3}", mean),
        )
    }

    fn format_raw<T: Display>(&self, width: usize, title: &str, val: T) -> (String, String) {
        (format!("{:>width$}", title), format!("{:>width$}", val))
    }

    pub fn values(&self) -> (Vec<String>, Vec<String>) {
        [
            self.format_raw(5, "reps", self.sample_size),
            self.format_raw(5, "disc", self.discarded),
            self.format_scl(10, "iters", self.iterations),
            self.format_scl(9, "moves", self.moves),
            self.format_scl(9, "attempts", self.attempts),
            self.format_scl(10, "chi2", self.chi_sq),
            self.format_raw(8, "t[s]", format!("{:.2}", self.elapsed)),
        ]
        .into_iter()
        .unzip()
    }

    pub fn print(&self) {
        let (header, values) = self.values();
        eprintln!("{}", header.join(" "));
        eprintln!("{}", values.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assign_accumulates() {
        let mut total = RunStats::default();
        total += RunStats {
            sample_size: 1,
            iterations: 10,
            moves: 4,
            attempts: 1,
            discarded: 0,
            chi_sq: 2.,
            elapsed: 0.5,
        };
        total += RunStats {
            sample_size: 1,
            iterations: 30,
            moves: 6,
            attempts: 2,
            discarded: 1,
            chi_sq: 4.,
            elapsed: 1.5,
        };
        assert_eq!(total.sample_size, 2);
        assert_eq!(total.iterations, 40);
        assert_eq!(total.discarded, 1);
        assert_eq!(total.chi_sq, 6.);
    }

    #[test]
    fn header_and_values_align() {
        let (header, values) = RunStats::default().values();
        assert_eq!(header.len(), values.len());
    }
}
