//! Squelch strategies
//!
//! Two mutually-exclusive ways of deciding that the channel
//! is in use:
//!
//! 1. **Power**: the RF power of the chunk meets or exceeds
//!    a threshold derived from the measured noise floor.
//!
//! 2. **Tone**: a sub-audible continuous tone (CTCSS) is
//!    present in the demodulated audio. Tone power is measured
//!    by a [`ToneMeter`] over a rolling window which is longer
//!    than one chunk, since CTCSS tones are closely spaced.
//!
//! The [`SquelchMode`] is chosen by configuration. Once the
//! baseline is known, it becomes a [`Gate`] which drives the
//! [`CaptureStateMachine`](crate::CaptureStateMachine).

use std::collections::VecDeque;
use std::fmt;

use crate::goertzel::ToneDetector;

/// Squelch mode selection
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SquelchMode {
    /// Open on RF power
    Power,

    /// Open on a sub-audible tone of the given frequency (Hz)
    Tone {
        /// CTCSS tone frequency (Hz)
        frequency: f32,
    },
}

impl SquelchMode {
    /// True if gating on a sub-audible tone
    pub fn is_tone(&self) -> bool {
        matches!(self, SquelchMode::Tone { .. })
    }
}

impl Default for SquelchMode {
    fn default() -> Self {
        SquelchMode::Power
    }
}

impl fmt::Display for SquelchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SquelchMode::Power => write!(f, "RF power"),
            SquelchMode::Tone { frequency } => write!(f, "{:.1} Hz tone", frequency),
        }
    }
}

/// A squelch strategy with its threshold
///
/// The `level` compared against the threshold is RF power
/// for `Power` gates and normalized tone power for `Tone`
/// gates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gate {
    /// RF power squelch with silence hangover
    Power {
        /// RF power threshold (linear)
        threshold: f32,

        /// Consecutive sub-threshold chunks which end a transmission
        silence_chunks_for_end: u32,
    },

    /// Tone squelch with hold time
    Tone {
        /// Tone power threshold (normalized)
        threshold: f32,

        /// Samples without tone which end a transmission
        hold_samples: u64,
    },
}

impl Gate {
    /// Threshold for the squelch level
    pub fn threshold(&self) -> f32 {
        match self {
            Gate::Power { threshold, .. } => *threshold,
            Gate::Tone { threshold, .. } => *threshold,
        }
    }

    /// True if `level` opens the squelch
    #[inline]
    pub fn is_open(&self, level: f32) -> bool {
        level >= self.threshold()
    }
}

/// Rolling-window tone power meter
///
/// Keeps the most recent `window_len` audio samples and
/// measures the normalized power of one tone over them.
/// Until the window fills, the measurement covers the
/// samples received so far.
#[derive(Clone, Debug)]
pub struct ToneMeter {
    detector: ToneDetector,
    window: VecDeque<f32>,
    window_len: usize,
}

impl ToneMeter {
    /// Meter for `frequency` Hz at `sample_rate`
    ///
    /// The window is at least one sample long.
    pub fn new(frequency: f32, sample_rate: u32, window_len: usize) -> Self {
        let window_len = usize::max(window_len, 1);
        Self {
            detector: ToneDetector::new(frequency, sample_rate),
            window: VecDeque::with_capacity(window_len),
            window_len,
        }
    }

    /// Push `audio` and measure tone power over the window
    pub fn input(&mut self, audio: &[f32]) -> f32 {
        let keep = &audio[audio.len().saturating_sub(self.window_len)..];
        let overflow = (self.window.len() + keep.len()).saturating_sub(self.window_len);
        self.window.drain(..overflow);
        self.window.extend(keep.iter().copied());
        self.detector.normalized_power(self.window.make_contiguous())
    }

    /// Tone frequency (Hz)
    pub fn frequency(&self) -> f32 {
        self.detector.frequency()
    }

    /// Clear the window
    pub fn reset(&mut self) {
        self.window.clear();
    }
}
