//! Audio chunks: the unit of work for the monitor

use num_complex::Complex32;
use thiserror::Error;

use crate::metrics::mean_power;

/// One interval of received signal
///
/// An `AudioChunk` is produced once per hardware read. It
/// contains
///
/// * demodulated audio, normalized to `[-1.0, 1.0]`;
/// * the RF power of the interval: the mean squared
///   magnitude of the raw complex samples; and
/// * optionally, the raw complex samples themselves,
///   which are retained for signal-to-noise estimates.
///
/// Chunks are immutable once built. The monitor either
/// discards them after processing or moves their contents
/// into a capture buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    audio: Vec<f32>,
    rf_power: f32,
    iq: Option<Vec<Complex32>>,
}

/// Error validating an [`AudioChunk`]
///
/// A chunk which fails validation is skipped without
/// touching any detector state.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ChunkError {
    /// The chunk has no audio samples
    #[error("invalid chunk: no audio samples")]
    Empty,

    /// An audio sample is NaN or infinite
    #[error("invalid chunk: audio sample {0} is not finite")]
    NonFiniteAudio(usize),

    /// RF power is negative, NaN, or infinite
    #[error("invalid chunk: RF power {0} is not a finite non-negative value")]
    BadPower(f32),
}

impl AudioChunk {
    /// Chunk from audio and a pre-computed RF power
    pub fn new(audio: Vec<f32>, rf_power: f32) -> Self {
        Self {
            audio,
            rf_power,
            iq: None,
        }
    }

    /// Chunk from audio and its raw complex samples
    ///
    /// The RF power is computed from `iq`. The complex
    /// samples are retained.
    pub fn with_iq(audio: Vec<f32>, iq: Vec<Complex32>) -> Self {
        let rf_power = mean_power(&iq).unwrap_or(0.0);
        Self {
            audio,
            rf_power,
            iq: Some(iq),
        }
    }

    /// Normalized audio samples
    pub fn audio(&self) -> &[f32] {
        &self.audio
    }

    /// RF power of the interval (linear, amplitude²)
    pub fn rf_power(&self) -> f32 {
        self.rf_power
    }

    /// Raw complex samples, if retained
    pub fn iq(&self) -> Option<&[Complex32]> {
        self.iq.as_deref()
    }

    /// Number of audio samples
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    /// True if there are no audio samples
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    /// Check that the chunk is usable
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.audio.is_empty() {
            return Err(ChunkError::Empty);
        }
        if !self.rf_power.is_finite() || self.rf_power < 0.0 {
            return Err(ChunkError::BadPower(self.rf_power));
        }
        if let Some(idx) = self.audio.iter().position(|sa| !sa.is_finite()) {
            return Err(ChunkError::NonFiniteAudio(idx));
        }
        Ok(())
    }

    /// Consume, returning audio and complex samples
    pub fn into_parts(self) -> (Vec<f32>, Option<Vec<Complex32>>) {
        (self.audio, self.iq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_with_iq_power() {
        let iq = vec![Complex32::new(0.5, 0.5), Complex32::new(0.0, 1.0)];
        let chunk = AudioChunk::with_iq(vec![0.0; 4], iq);
        // (0.5 + 1.0) / 2
        assert_approx_eq!(chunk.rf_power(), 0.75);
        assert_eq!(2, chunk.iq().expect("iq missing").len());
        assert_eq!(4, chunk.len());
    }

    #[test]
    fn test_validate() {
        assert_eq!(Ok(()), AudioChunk::new(vec![0.1, -0.1], 1.0e-6).validate());
        assert_eq!(Err(ChunkError::Empty), AudioChunk::new(vec![], 1.0).validate());
        assert_eq!(
            Err(ChunkError::NonFiniteAudio(1)),
            AudioChunk::new(vec![0.0, f32::NAN], 1.0).validate()
        );
        assert_eq!(
            Err(ChunkError::BadPower(-1.0)),
            AudioChunk::new(vec![0.0], -1.0).validate()
        );
        assert!(AudioChunk::new(vec![0.0], f32::INFINITY).validate().is_err());
    }
}
