//! Threshold-plus-stochastic failure model for synthetic scans.

use crate::store::types::{Scan, YieldStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Source of the random draws behind a synthetic scan.
///
/// Production code uses [`RandSampler`]; tests can plug in a
/// [`ScriptedSampler`] to pin exact outcomes.
pub trait ScanSampler: Send {
    /// Uniform draw from `[low, high]`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;

    /// Uniform draw from `[0, 1)`.
    fn unit(&mut self) -> f64;
}

/// [`ScanSampler`] backed by a `rand` generator.
pub struct RandSampler<R = StdRng> {
    rng: R,
}

impl RandSampler<StdRng> {
    /// Sampler seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sampler.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> RandSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> ScanSampler for RandSampler<R> {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed list of draws, cycling when exhausted.
///
/// Each scan consumes three values in order: temperature, pressure and the
/// failure roll. Uniform draws are clamped into the requested range.
#[derive(Debug, Clone)]
pub struct ScriptedSampler {
    values: Vec<f64>,
    next: usize,
}

impl ScriptedSampler {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, next: 0 }
    }

    /// Script for scans given as `(temp_c, pressure_psi, roll)`.
    pub fn from_scans(scans: &[(f64, f64, f64)]) -> Self {
        Self::new(scans.iter().flat_map(|&(t, p, r)| [t, p, r]).collect())
    }

    fn take(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}

impl ScanSampler for ScriptedSampler {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.take().clamp(low, high.max(low))
    }

    fn unit(&mut self) -> f64 {
        self.take()
    }
}

/// Parameters of the synthetic scan generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanModel {
    /// Temperature draw range, degrees Celsius
    pub temp_range_c: [f64; 2],
    /// Pressure draw range, PSI
    pub pressure_range_psi: [f64; 2],
    /// Scans hotter than this always fail
    pub fail_threshold_c: f64,
    /// Probability that a scan under the threshold fails anyway
    pub random_fail_rate: f64,
}

impl Default for ScanModel {
    fn default() -> Self {
        Self {
            temp_range_c: [195.0, 210.0],
            pressure_range_psi: [28.0, 32.0],
            fail_threshold_c: 208.0,
            random_fail_rate: 0.05,
        }
    }
}

impl ScanModel {
    /// Draw one scan. Readings are rounded to two decimals before the
    /// threshold check, so the stored value is the one that was judged.
    pub fn sample(&self, sampler: &mut dyn ScanSampler) -> Scan {
        let temp_c = round2(sampler.uniform(self.temp_range_c[0], self.temp_range_c[1]));
        let pressure_psi = round2(
            sampler.uniform(self.pressure_range_psi[0], self.pressure_range_psi[1]),
        );
        let roll = sampler.unit();

        Scan {
            status: self.classify(temp_c, roll),
            temp_c,
            pressure_psi,
        }
    }

    /// Outcome for a temperature and a `[0, 1)` failure roll.
    pub fn classify(&self, temp_c: f64, roll: f64) -> YieldStatus {
        if temp_c > self.fail_threshold_c || roll < self.random_fail_rate {
            YieldStatus::Fail
        } else {
            YieldStatus::Pass
        }
    }

    /// Check the ranges and the failure rate.
    pub fn validate(&self) -> Result<(), String> {
        for (name, [low, high]) in [
            ("temp_range_c", self.temp_range_c),
            ("pressure_range_psi", self.pressure_range_psi),
        ] {
            if !(low.is_finite() && high.is_finite()) || low > high {
                return Err(format!("{name} must be a finite [low, high] pair, got [{low}, {high}]"));
            }
        }
        if !(0.0..=1.0).contains(&self.random_fail_rate) {
            return Err(format!(
                "random_fail_rate must be within [0, 1], got {}",
                self.random_fail_rate
            ));
        }
        Ok(())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
