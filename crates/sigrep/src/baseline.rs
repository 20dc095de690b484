//! Noise baseline estimation
//!
//! During warm-up, the monitor feeds the RF power (and, when
//! gating on a sub-audible tone, the tone power) of every
//! chunk to a [`BaselineEstimator`]. When the warm-up period
//! has elapsed, the estimator produces a [`Baseline`] with the
//! squelch threshold. The baseline never changes after that.

#[cfg(not(test))]
use log::{info, warn};

#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use serde::Serialize;

/// Measured channel noise and the derived squelch threshold
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Baseline {
    /// Mean RF power during warm-up (linear)
    pub mean_rf_power: f32,

    /// Standard deviation of RF power during warm-up
    pub std_rf_power: f32,

    /// RF noise floor used as the SNR noise reference
    pub noise_floor_power: f32,

    /// Strongest sub-audible tone power seen during warm-up
    ///
    /// Always zero when gating on RF power.
    pub tone_reference_power: f32,

    /// Squelch threshold
    ///
    /// Compared against RF power or tone power, depending on
    /// the squelch mode. Never below the configured floor.
    pub threshold: f32,

    /// True if no samples were available and the fixed
    /// fallback threshold was used
    pub fallback: bool,
}

impl Baseline {
    /// Noise floor, if it is usable as an SNR reference
    pub fn noise_floor(&self) -> Option<f32> {
        if self.noise_floor_power.is_finite() && self.noise_floor_power > 0.0 {
            Some(self.noise_floor_power)
        } else {
            None
        }
    }
}

/// Thresholding policy for the [`BaselineEstimator`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaselineParams {
    /// RF power threshold is `mean + std_multiplier * std`
    pub std_multiplier: f32,

    /// RF power threshold is at least `mean_floor_ratio * mean`
    pub mean_floor_ratio: f32,

    /// RF power threshold is never below this value
    pub min_power_threshold: f32,

    /// RF power threshold when warm-up collected nothing
    pub fallback_power_threshold: f32,

    /// Tone threshold is `tone_multiplier * max tone power`
    pub tone_multiplier: f32,

    /// Tone threshold is never below this value
    pub min_tone_threshold: f32,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            std_multiplier: 3.5,
            mean_floor_ratio: 1.2,
            min_power_threshold: 1.0e-9,
            fallback_power_threshold: 1.0e-7,
            tone_multiplier: 2.0,
            min_tone_threshold: 1.0e-4,
        }
    }
}

/// Accumulates warm-up statistics
///
/// Running mean and variance use Welford's method, so the
/// estimator runs in constant memory no matter how long the
/// warm-up period is.
#[derive(Clone, Debug)]
pub struct BaselineEstimator {
    params: BaselineParams,
    tone_gated: bool,
    duration_samples: u64,
    elapsed_samples: u64,
    count: u64,
    mean: f64,
    m2: f64,
    tone_max: f32,
}

impl BaselineEstimator {
    /// New estimator
    ///
    /// The warm-up lasts `duration_samples` audio samples. If
    /// `tone_gated` is set, the threshold is derived from tone
    /// power instead of RF power.
    pub fn new(params: BaselineParams, tone_gated: bool, duration_samples: u64) -> Self {
        Self {
            params,
            tone_gated,
            duration_samples,
            elapsed_samples: 0,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            tone_max: 0.0,
        }
    }

    /// Accumulate one chunk
    ///
    /// `rf_power` is the chunk's RF power, `tone_power` the
    /// tone power measured through this chunk (if any), and
    /// `samples` the number of audio samples in the chunk.
    ///
    /// Returns the finished `Baseline` once the warm-up
    /// duration has elapsed, including this chunk.
    pub fn input(&mut self, rf_power: f32, tone_power: Option<f32>, samples: usize) -> Option<Baseline> {
        self.count += 1;
        let x = rf_power as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);

        if let Some(tp) = tone_power {
            self.tone_max = f32::max(self.tone_max, tp);
        }

        self.elapsed_samples = self.elapsed_samples.saturating_add(samples as u64);
        if self.is_complete() {
            Some(self.finish())
        } else {
            None
        }
    }

    /// True once the warm-up duration has elapsed
    pub fn is_complete(&self) -> bool {
        self.elapsed_samples >= self.duration_samples
    }

    /// Number of chunks accumulated so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Compute the baseline from what has been collected
    ///
    /// If nothing was collected, the fixed fallback threshold
    /// is used and a warning is logged.
    pub fn finish(&self) -> Baseline {
        if self.count == 0 {
            let threshold = if self.tone_gated {
                self.params.min_tone_threshold
            } else {
                f32::max(
                    self.params.fallback_power_threshold,
                    self.params.min_power_threshold,
                )
            };
            warn!(
                "baseline: no samples collected during warm-up; using fallback threshold {:.3e}",
                threshold
            );
            return Baseline {
                mean_rf_power: 0.0,
                std_rf_power: 0.0,
                noise_floor_power: 0.0,
                tone_reference_power: 0.0,
                threshold,
                fallback: true,
            };
        }

        let mean = self.mean as f32;
        let std = (self.m2 / self.count as f64).sqrt() as f32;

        let threshold = if self.tone_gated {
            f32::max(
                self.params.tone_multiplier * self.tone_max,
                self.params.min_tone_threshold,
            )
        } else {
            let mut thresh = mean + self.params.std_multiplier * std;
            thresh = f32::max(thresh, self.params.mean_floor_ratio * mean);
            f32::max(thresh, self.params.min_power_threshold)
        };

        info!(
            "baseline: complete after {} chunks: mean {:.3e}, std {:.3e}, tone {:.3e}, threshold {:.3e}",
            self.count, mean, std, self.tone_max, threshold
        );

        Baseline {
            mean_rf_power: mean,
            std_rf_power: std,
            noise_floor_power: mean,
            tone_reference_power: if self.tone_gated { self.tone_max } else { 0.0 },
            threshold,
            fallback: false,
        }
    }
}
