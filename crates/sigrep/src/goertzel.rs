//! Single-bin tone power estimation
//!
//! The [`ToneDetector`] measures the power of one frequency
//! within a window of samples using the Goertzel recurrence.
//! This is far cheaper than a full spectral transform when
//! only a handful of frequencies are of interest, as is the
//! case for CTCSS and DTMF detection.

/// Goertzel single-frequency power detector
///
/// The detector is tuned to one `frequency` at a given
/// `sample_rate` when it is created. Each call to
/// [`power()`](#method.power) runs the recurrence
///
/// ```txt
/// s[n] = x[n] + 2 cos(ω) s[n-1] - s[n-2]
/// ```
///
/// over the window and reports |X(ω)|². This is the
/// generalized form of the algorithm: ω is taken from the
/// exact frequency rather than rounded to the nearest DFT
/// bin. For a frequency which falls on a bin centre, the
/// output equals the magnitude-squared of that DFT bin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneDetector {
    frequency: f32,
    coeff: f64,
}

impl ToneDetector {
    /// Tune a detector to `frequency` Hz at `sample_rate` Hz
    pub fn new(frequency: f32, sample_rate: u32) -> Self {
        let omega = 2.0f64 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;
        Self {
            frequency,
            coeff: 2.0f64 * omega.cos(),
        }
    }

    /// Target frequency (Hz)
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Power of the target frequency in `window`
    ///
    /// Returns the magnitude-squared of the window's
    /// transform at the target frequency. The result
    /// scales with the square of the window length.
    /// An empty window has zero power.
    pub fn power(&self, window: &[f32]) -> f32 {
        // accumulate in f64; long CTCSS windows lose precision in f32
        let coeff = self.coeff;
        let mut s_prev = 0.0f64;
        let mut s_prev2 = 0.0f64;
        for &x in window {
            let s = x as f64 + coeff * s_prev - s_prev2;
            s_prev2 = s_prev;
            s_prev = s;
        }
        let pwr = s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2;
        f64::max(pwr, 0.0) as f32
    }

    /// Normalized power of the target frequency in `window`
    ///
    /// Scales [`power()`](#method.power) by `(N/2)²`, so that
    /// a sinusoid of amplitude `A` at the target frequency
    /// reads as approximately `A²` regardless of the window
    /// length `N`. Thresholds expressed in normalized power do
    /// not need to change when the chunk size does.
    pub fn normalized_power(&self, window: &[f32]) -> f32 {
        if window.is_empty() {
            return 0.0;
        }
        let half = window.len() as f32 / 2.0f32;
        self.power(window) / (half * half)
    }
}

/// Normalized power of every detector in `bank`
///
/// Writes one output per detector into `out`, which must be
/// the same length as `bank`.
pub fn measure_bank(bank: &[ToneDetector], window: &[f32], out: &mut [f32]) {
    debug_assert_eq!(bank.len(), out.len());
    for (det, o) in bank.iter().zip(out.iter_mut()) {
        *o = det.normalized_power(window);
    }
}
