//! Narrowband FM demodulation
//!
//! The [`Preprocessor`] turns blocks of raw complex baseband
//! samples into [`AudioChunk`]s:
//!
//! 1. RF power: mean squared magnitude of the block
//! 2. FM discrimination: the phase difference between
//!    successive samples
//! 3. Decimation to the audio rate by integrate-and-dump
//! 4. DC removal
//! 5. Peak normalization
//!
//! All filter state carries over from one block to the next,
//! so blocks of any size may be used.

use std::collections::VecDeque;

use num_complex::Complex32;

use crate::chunk::AudioChunk;
use crate::metrics::mean_power;

/// Peak amplitude of normalized audio
pub const NORMALIZED_PEAK: f32 = 0.8;

// Blocks quieter than this are not normalized
const MIN_NORMALIZE_PEAK: f32 = 1.0e-9;

// DC blocker length (seconds); long enough to pass CTCSS tones
const DC_BLOCK_SECS: f32 = 0.064;

/// Complex baseband to audio chunks
#[derive(Clone, Debug)]
pub struct Preprocessor {
    decimation: usize,
    audio_rate: u32,
    retain_iq: bool,
    last_sample: Complex32,
    accumulator: f32,
    accumulated: usize,
    dcblock: DCBlocker,
}

impl Preprocessor {
    /// New preprocessor
    ///
    /// Complex samples arrive at `iq_rate` and are decimated
    /// by an integer factor to approximately `audio_rate`. If
    /// `retain_iq` is set, the complex samples are kept in
    /// each chunk for signal-to-noise estimates.
    pub fn new(iq_rate: u32, audio_rate: u32, retain_iq: bool) -> Self {
        let decimation = usize::max((iq_rate / u32::max(audio_rate, 1)) as usize, 1);
        let audio_rate = iq_rate / decimation as u32;
        let dc_len = usize::max((DC_BLOCK_SECS * audio_rate as f32) as usize, 1);
        Self {
            decimation,
            audio_rate,
            retain_iq,
            last_sample: Complex32::new(0.0, 0.0),
            accumulator: 0.0,
            accumulated: 0,
            dcblock: DCBlocker::new(dc_len),
        }
    }

    /// Demodulate one block of complex samples
    ///
    /// Returns `None` if the block was too short to produce
    /// any audio. Leftover samples are kept for the next block.
    pub fn process(&mut self, iq: Vec<Complex32>) -> Option<AudioChunk> {
        let mut audio = Vec::with_capacity(iq.len() / self.decimation + 1);
        for &sa in &iq {
            let freq = (sa * self.last_sample.conj()).arg() / std::f32::consts::PI;
            self.last_sample = sa;

            self.accumulator += freq;
            self.accumulated += 1;
            if self.accumulated >= self.decimation {
                let avg = self.accumulator / self.accumulated as f32;
                audio.push(self.dcblock.filter(avg));
                self.accumulator = 0.0;
                self.accumulated = 0;
            }
        }

        if audio.is_empty() {
            return None;
        }

        normalize(&mut audio);

        if self.retain_iq {
            Some(AudioChunk::with_iq(audio, iq))
        } else {
            Some(AudioChunk::new(audio, mean_power(&iq).unwrap_or(0.0)))
        }
    }

    /// Audio sampling rate of the output (Hz)
    pub fn audio_rate(&self) -> u32 {
        self.audio_rate
    }

    /// Decimation factor
    pub fn decimation(&self) -> usize {
        self.decimation
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.last_sample = Complex32::new(0.0, 0.0);
        self.accumulator = 0.0;
        self.accumulated = 0;
        self.dcblock.reset();
    }
}

// Scale so that the peak is NORMALIZED_PEAK
fn normalize(audio: &mut [f32]) {
    let peak = audio.iter().fold(0.0f32, |acc, sa| f32::max(acc, sa.abs()));
    if peak > MIN_NORMALIZE_PEAK {
        let gain = NORMALIZED_PEAK / peak;
        audio.iter_mut().for_each(|sa| *sa *= gain);
    }
}

/// DC-Blocking Filter
///
/// Removes DC offsets, such as those caused by a mistuned
/// receiver, while preserving the higher-frequency
/// components. Uses two cascaded moving averages of `len`
/// samples to estimate the DC offset.
///
/// This is the dual moving-average implementation from
/// * R. Yates, "DC Blocker Algorithms," IEEE Sig. Proc. Mag.,
///   March 2008: pp 132-134
///
/// The output is delayed by `len - 1` samples. A DC blocker
/// with a length of `1` is a no-op.
#[derive(Clone, Debug)]
struct DCBlocker {
    ff: MovingAverage,
    fb: MovingAverage,
}

impl DCBlocker {
    fn new(len: usize) -> Self {
        Self {
            ff: MovingAverage::new(len),
            fb: MovingAverage::new(len),
        }
    }

    fn reset(&mut self) {
        self.ff.reset();
        self.fb.reset();
    }

    fn filter(&mut self, input: f32) -> f32 {
        let (ma0, sig) = self.ff.filter(input);
        let (ma1, _) = self.fb.filter(ma0);
        sig - ((self.ff.len() > 1) as u8 as f32) * ma1
    }
}

// Moving average over a fixed window of zero-initialized
// samples. Also returns the input delayed by `len - 1`.
#[derive(Clone, Debug)]
struct MovingAverage {
    window: VecDeque<f32>,
    inv_len: f32,
    moving_sum: f64,
}

impl MovingAverage {
    fn new(len: usize) -> Self {
        let len = usize::max(len, 1);
        Self {
            window: std::iter::repeat(0.0f32).take(len).collect(),
            inv_len: 1.0f32 / len as f32,
            moving_sum: 0.0,
        }
    }

    fn reset(&mut self) {
        self.window.iter_mut().for_each(|sa| *sa = 0.0);
        self.moving_sum = 0.0;
    }

    fn len(&self) -> usize {
        self.window.len()
    }

    #[inline]
    fn filter(&mut self, input: f32) -> (f32, f32) {
        let aged = self.window.pop_front().unwrap_or(0.0);
        self.window.push_back(input);
        self.moving_sum += input as f64 - aged as f64;
        let delayed = self.window.front().copied().unwrap_or(input);
        (self.moving_sum as f32 * self.inv_len, delayed)
    }
}
