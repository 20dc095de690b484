//! Signal strength and signal-to-noise estimates
//!
//! Objective quality metrics for a finished transmission,
//! computed from the complex baseband samples retained
//! during capture.

use std::fmt;

use num_complex::Complex32;
use serde::Serialize;

/// S9 reference level used when none is configured (dBFS)
pub const DEFAULT_S9_REFERENCE_DBFS: f32 = -62.0;

// Smallest linear SNR reported, to keep log10() in its domain
const SNR_LINEAR_FLOOR: f32 = 1.0e-10;

// Segments below this mean power read as S0
const MIN_SEGMENT_POWER: f32 = 1.0e-12;

// S-unit steps, ascending (dBFS → S-unit)
const S_UNIT_TABLE: &[(f32, u8)] = &[
    (-120.0, 0),
    (-110.0, 1),
    (-104.0, 2),
    (-98.0, 3),
    (-92.0, 4),
    (-86.0, 5),
    (-80.0, 6),
    (-74.0, 7),
    (-68.0, 8),
    (-62.0, 9),
];

/// An S-meter reading
///
/// Readings display the way an operator would say them
/// on the air:
///
/// ```
/// use sigrep::SMeter;
///
/// assert_eq!("S9", SMeter::from_dbfs(-62.0, -62.0).to_string());
/// assert_eq!("S9 plus 6 dB", SMeter::from_dbfs(-56.0, -62.0).to_string());
/// assert_eq!("S0", SMeter::from_dbfs(-120.0, -62.0).to_string());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SMeter {
    /// No measurement is possible
    Unknown,

    /// S0 through S9
    Units(u8),

    /// Above S9 by the given number of dB
    Over(u32),
}

impl SMeter {
    /// Classify a power level in dBFS
    ///
    /// Walks the S-unit table and returns the highest unit
    /// whose threshold does not exceed `power_dbfs`. Inputs
    /// above `s9_reference_dbfs` are reported as "S9 plus N dB,"
    /// where N is the rounded excess. An excess which rounds
    /// to zero is plain S9.
    pub fn from_dbfs(power_dbfs: f32, s9_reference_dbfs: f32) -> Self {
        if !power_dbfs.is_finite() {
            return SMeter::Unknown;
        }

        let mut out = SMeter::Units(0);
        for &(level, unit) in S_UNIT_TABLE {
            if power_dbfs >= level {
                out = SMeter::Units(unit);
            } else {
                break;
            }
        }

        if power_dbfs > s9_reference_dbfs {
            let over = (power_dbfs - s9_reference_dbfs).round() as i64;
            out = if over > 0 {
                SMeter::Over(over as u32)
            } else {
                SMeter::Units(9)
            };
        }
        out
    }

    /// Classify the mean power of a complex segment
    ///
    /// Segments which are empty read as `Unknown`. Segments
    /// with effectively zero power read as S0.
    pub fn from_segment(iq: &[Complex32], s9_reference_dbfs: f32) -> Self {
        match mean_power(iq) {
            None => SMeter::Unknown,
            Some(pwr) if pwr < MIN_SEGMENT_POWER => SMeter::Units(0),
            Some(pwr) => SMeter::from_dbfs(power_to_dbfs(pwr), s9_reference_dbfs),
        }
    }
}

impl fmt::Display for SMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SMeter::Unknown => write!(f, "Unknown"),
            SMeter::Units(s) => write!(f, "S{}", s),
            SMeter::Over(db) => write!(f, "S9 plus {} dB", db),
        }
    }
}

/// Linear power to dBFS
#[inline]
pub fn power_to_dbfs(power: f32) -> f32 {
    10.0f32 * power.log10()
}

/// Mean squared magnitude of a complex segment
///
/// Returns `None` for an empty segment.
pub fn mean_power(iq: &[Complex32]) -> Option<f32> {
    if iq.is_empty() {
        return None;
    }
    let sum: f64 = iq.iter().map(|z| z.norm_sqr() as f64).sum();
    Some((sum / iq.len() as f64) as f32)
}

/// Estimate the signal-to-noise ratio of a segment (dB)
///
/// The signal-plus-noise power is the mean power of
/// `segment_iq`. The noise reference is `baseline_noise_power`
/// when it is valid (finite and positive). Otherwise it is
/// estimated from the median sample power over the leading
/// and trailing 10% of the segment, where the transmitter is
/// keying up or dropping off.
///
/// The linear ratio is floored before conversion to dB, and
/// the result is clamped to zero or more if `clamp_negative`
/// is set. Returns `None` for an empty segment.
pub fn snr_db(
    segment_iq: &[Complex32],
    baseline_noise_power: Option<f32>,
    clamp_negative: bool,
) -> Option<f32> {
    let signal = mean_power(segment_iq)?;

    let noise = match baseline_noise_power {
        Some(n) if n.is_finite() && n > 0.0 => n,
        _ => edge_noise_power(segment_iq)?,
    };

    let snr_linear = if noise > 0.0 {
        (signal - noise) / noise
    } else if signal > 0.0 {
        f32::MAX
    } else {
        0.0
    };

    let snr = 10.0f32 * f32::max(snr_linear, SNR_LINEAR_FLOOR).log10();
    if clamp_negative {
        Some(f32::max(snr, 0.0))
    } else {
        Some(snr)
    }
}

// Median power of the leading and trailing 10% of a segment
fn edge_noise_power(iq: &[Complex32]) -> Option<f32> {
    if iq.is_empty() {
        return None;
    }

    let edge = usize::max(iq.len() / 10, 1);
    let mut powers: Vec<f32> = iq[..edge]
        .iter()
        .chain(iq[iq.len() - edge..].iter())
        .map(|z| z.norm_sqr())
        .collect();
    powers.sort_by(|a, b| a.total_cmp(b));

    let mid = powers.len() / 2;
    if powers.len() % 2 == 0 {
        Some(0.5f32 * (powers[mid - 1] + powers[mid]))
    } else {
        Some(powers[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_s_meter_table() {
        const REF: f32 = DEFAULT_S9_REFERENCE_DBFS;
        assert_eq!(SMeter::Units(9), SMeter::from_dbfs(-62.0, REF));
        assert_eq!(SMeter::Over(6), SMeter::from_dbfs(-56.0, REF));
        assert_eq!(SMeter::Units(0), SMeter::from_dbfs(-120.0, REF));
        assert_eq!(SMeter::Units(0), SMeter::from_dbfs(-150.0, REF));
        assert_eq!(SMeter::Units(3), SMeter::from_dbfs(-97.5, REF));
        assert_eq!(SMeter::Units(8), SMeter::from_dbfs(-62.01, REF));
        assert_eq!(SMeter::Over(40), SMeter::from_dbfs(-22.0, REF));
        assert_eq!(SMeter::Unknown, SMeter::from_dbfs(f32::NEG_INFINITY, REF));
    }

    #[test]
    fn test_s_meter_rounds_to_s9() {
        // excess rounds to zero → plain S9
        assert_eq!(SMeter::Units(9), SMeter::from_dbfs(-61.7, -62.0));
        assert_eq!(SMeter::Over(1), SMeter::from_dbfs(-61.4, -62.0));

        // a moved reference still caps the table
        assert_eq!(SMeter::Over(2), SMeter::from_dbfs(-68.0, -70.0));
    }

    #[test]
    fn test_s_meter_display() {
        assert_eq!("S0", SMeter::Units(0).to_string());
        assert_eq!("S9 plus 12 dB", SMeter::Over(12).to_string());
        assert_eq!("Unknown", SMeter::Unknown.to_string());
    }

    #[test]
    fn test_s_meter_from_segment() {
        assert_eq!(SMeter::Unknown, SMeter::from_segment(&[], -62.0));
        assert_eq!(
            SMeter::Units(0),
            SMeter::from_segment(&[Complex32::new(0.0, 0.0); 8], -62.0)
        );

        // |z|² = 1e-5 → -50 dBFS → S9 plus 12 dB
        let amp = (1.0e-5f32).sqrt();
        let seg = vec![Complex32::new(amp, 0.0); 16];
        assert_eq!(SMeter::Over(12), SMeter::from_segment(&seg, -62.0));
    }

    #[test]
    fn test_snr_with_baseline() {
        // signal power 1.0, noise 0.01 → 99 → 19.96 dB
        let seg = vec![Complex32::new(0.0, 1.0); 100];
        let snr = snr_db(&seg, Some(0.01), true).expect("no snr");
        assert_approx_eq!(snr, 19.956, 1.0e-2);

        // weaker than the noise floor: clamped
        let snr = snr_db(&seg, Some(4.0), true).expect("no snr");
        assert_eq!(0.0, snr);

        // unclamped: floored at 1e-10 → -100 dB
        let snr = snr_db(&seg, Some(4.0), false).expect("no snr");
        assert_approx_eq!(snr, -100.0, 1.0e-3);

        assert!(snr_db(&[], Some(1.0), true).is_none());
    }

    #[test]
    fn test_snr_edge_estimate() {
        // quiet edges, loud core
        let mut seg = vec![Complex32::new(0.1, 0.0); 10];
        seg.extend(std::iter::repeat(Complex32::new(1.0, 0.0)).take(80));
        seg.extend(std::iter::repeat(Complex32::new(0.1, 0.0)).take(10));

        // mean = (20 * 0.01 + 80 * 1.0) / 100 = 0.802
        // noise = 0.01 → (0.802 - 0.01) / 0.01 = 79.2 → 18.99 dB
        let snr = snr_db(&seg, None, true).expect("no snr");
        assert_approx_eq!(snr, 18.987, 1.0e-2);

        // an invalid baseline falls back to the edge estimate
        let snr_nan = snr_db(&seg, Some(f32::NAN), true).expect("no snr");
        assert_approx_eq!(snr, snr_nan);
        let snr_zero = snr_db(&seg, Some(0.0), true).expect("no snr");
        assert_approx_eq!(snr, snr_zero);
    }

    #[test]
    fn test_edge_noise_short_segment() {
        let seg = [Complex32::new(2.0, 0.0)];
        assert_approx_eq!(edge_noise_power(&seg).expect("no noise"), 4.0);
        assert!(edge_noise_power(&[]).is_none());
    }
}
