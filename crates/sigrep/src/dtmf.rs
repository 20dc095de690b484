//! DTMF digit decoder
//!
//! Each chunk of audio is measured at the eight DTMF
//! frequencies. A digit is present when exactly one "row"
//! tone and one "column" tone stand well above the others:
//!
//! 1. Both tones exceed a minimum power.
//! 2. Each tone is stronger than the runner-up in its group
//!    by at least the dominance ratio.
//! 3. The two tones are roughly balanced in power.
//!
//! A held key produces the same digit on every chunk, so
//! repeats are suppressed for a debounce interval. Emitted
//! digits are buffered and matched against command codes.

#[cfg(not(test))]
use log::{debug, info, trace};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as trace;

use arraydeque::{ArrayDeque, Wrapping};

use crate::command::{CommandMatcher, DtmfCommand};
use crate::goertzel::{measure_bank, ToneDetector};

/// Row frequencies (Hz)
pub const DTMF_LOW_FREQS: [f32; 4] = [697.0, 770.0, 852.0, 941.0];

/// Column frequencies (Hz)
pub const DTMF_HIGH_FREQS: [f32; 4] = [1209.0, 1336.0, 1477.0, 1633.0];

/// Digits buffered for command matching
pub const DIGIT_BUFFER_LEN: usize = 32;

// Standard keypad, [row][column]
const KEYPAD: [[char; 4]; 4] = [
    ['1', '2', '3', 'A'],
    ['4', '5', '6', 'B'],
    ['7', '8', '9', 'C'],
    ['*', '0', '#', 'D'],
];

/// Detection thresholds for the [`DtmfDecoder`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DtmfParams {
    /// Minimum normalized power of each tone
    pub min_power: f32,

    /// Strongest tone must exceed the runner-up by this ratio
    pub dominance_ratio: f32,

    /// Weaker/stronger tone power must be above this ratio
    pub balance_ratio: f32,

    /// A repeated digit is suppressed for this many samples
    pub debounce_samples: u64,
}

impl DtmfParams {
    /// Defaults for the given sampling rate
    pub fn for_rate(sample_rate: u32) -> Self {
        Self {
            min_power: 1.0e-3,
            dominance_ratio: 10.0,
            balance_ratio: 0.2,
            debounce_samples: sample_rate as u64 / 2,
        }
    }
}

/// A decoded digit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigitEvent {
    /// The digit: `0`–`9`, `A`–`D`, `*`, or `#`
    pub digit: char,

    /// Command completed by this digit, if any
    pub command: Option<DtmfCommand>,
}

// Debounce and command buffer state
#[derive(Clone, Debug, Default)]
struct DtmfState {
    last_digit: Option<char>,
    last_digit_time: u64,
    digit_buffer: ArrayDeque<char, DIGIT_BUFFER_LEN, Wrapping>,
}

/// DTMF decoder with command recognition
#[derive(Clone, Debug)]
pub struct DtmfDecoder {
    low: [ToneDetector; 4],
    high: [ToneDetector; 4],
    params: DtmfParams,
    matcher: CommandMatcher,
    state: DtmfState,
}

impl DtmfDecoder {
    /// New decoder
    pub fn new(sample_rate: u32, params: DtmfParams, matcher: CommandMatcher) -> Self {
        Self {
            low: DTMF_LOW_FREQS.map(|f| ToneDetector::new(f, sample_rate)),
            high: DTMF_HIGH_FREQS.map(|f| ToneDetector::new(f, sample_rate)),
            params,
            matcher,
            state: DtmfState::default(),
        }
    }

    /// Process one chunk of audio
    ///
    /// `now` is the sample clock after the chunk. Returns the
    /// digit if a new one was decoded, along with any command
    /// it completes. When a command matches, the digit buffer
    /// is cleared.
    pub fn input(&mut self, audio: &[f32], now: u64) -> Option<DigitEvent> {
        let digit = self.detect(audio)?;

        let repeat = self.state.last_digit == Some(digit)
            && now.saturating_sub(self.state.last_digit_time) < self.params.debounce_samples;
        if repeat {
            return None;
        }

        self.state.last_digit = Some(digit);
        self.state.last_digit_time = now;
        self.state.digit_buffer.push_back(digit);

        let command = self.matcher.find(&self.buffer());
        match &command {
            Some(cmd) => {
                info!("dtmf: command {} from \"{}\"", cmd, self.buffer());
                self.state.digit_buffer.clear();
            }
            None => debug!("dtmf: digit '{}'", digit),
        }

        Some(DigitEvent { digit, command })
    }

    /// Detect a digit in `audio`, without debounce
    pub fn detect(&self, audio: &[f32]) -> Option<char> {
        if audio.is_empty() {
            return None;
        }

        let mut low = [0.0f32; 4];
        let mut high = [0.0f32; 4];
        measure_bank(&self.low, audio, &mut low);
        measure_bank(&self.high, audio, &mut high);

        let (row, row_pwr) = self.dominant(&low)?;
        let (col, col_pwr) = self.dominant(&high)?;

        let balance = f32::min(row_pwr, col_pwr) / f32::max(row_pwr, col_pwr);
        if balance <= self.params.balance_ratio {
            trace!(
                "dtmf: rejected unbalanced pair {} Hz / {} Hz ({:.3})",
                DTMF_LOW_FREQS[row],
                DTMF_HIGH_FREQS[col],
                balance
            );
            return None;
        }

        Some(KEYPAD[row][col])
    }

    /// Digits buffered since the last command
    pub fn buffer(&self) -> String {
        self.state.digit_buffer.iter().collect()
    }

    /// Command matcher in use
    pub fn matcher(&self) -> &CommandMatcher {
        &self.matcher
    }

    /// Clear the buffer and debounce state
    pub fn reset(&mut self) {
        self.state = DtmfState::default();
    }

    // Index and power of the dominant tone in a group
    fn dominant(&self, powers: &[f32; 4]) -> Option<(usize, f32)> {
        let mut best = 0;
        for (i, &p) in powers.iter().enumerate() {
            if p > powers[best] {
                best = i;
            }
        }

        let strongest = powers[best];
        let runner_up = powers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != best)
            .map(|(_, &p)| p)
            .fold(0.0f32, f32::max);

        if strongest < self.params.min_power {
            return None;
        }
        if strongest < self.params.dominance_ratio * runner_up {
            return None;
        }
        Some((best, strongest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::distributions::{Distribution, Uniform};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::goertzel::tests::sinusoid;

    const RATE: u32 = 16000;
    const CHUNK: usize = 256;

    fn keypress(low: f32, high: f32, len: usize) -> Vec<f32> {
        let a = sinusoid(low, 0.4, RATE, len);
        let b = sinusoid(high, 0.4, RATE, len);
        a.iter().zip(b.iter()).map(|(x, y)| x + y).collect()
    }

    fn decoder() -> DtmfDecoder {
        DtmfDecoder::new(RATE, DtmfParams::for_rate(RATE), CommandMatcher::default())
    }

    #[test]
    fn test_detect_keypad() {
        let dec = decoder();
        for (r, &lo) in DTMF_LOW_FREQS.iter().enumerate() {
            for (c, &hi) in DTMF_HIGH_FREQS.iter().enumerate() {
                let audio = keypress(lo, hi, CHUNK);
                assert_eq!(Some(KEYPAD[r][c]), dec.detect(&audio), "{} + {}", lo, hi);
            }
        }
    }

    #[test]
    fn test_reject_noise() {
        let dec = decoder();
        let mut rng = StdRng::seed_from_u64(0x5167_0001);
        let dist = Uniform::new_inclusive(-0.8f32, 0.8f32);
        for _ in 0..20 {
            let noise: Vec<f32> = (0..CHUNK).map(|_| dist.sample(&mut rng)).collect();
            assert_eq!(None, dec.detect(&noise));
        }
    }

    #[test]
    fn test_reject_single_tone_and_silence() {
        let dec = decoder();
        assert_eq!(None, dec.detect(&sinusoid(697.0, 0.8, RATE, CHUNK)));
        assert_eq!(None, dec.detect(&[0.0f32; CHUNK]));
        assert_eq!(None, dec.detect(&[]));
    }

    #[test]
    fn test_reject_unbalanced() {
        let dec = decoder();
        let a = sinusoid(697.0, 0.8, RATE, CHUNK);
        let b = sinusoid(1209.0, 0.2, RATE, CHUNK);
        let audio: Vec<f32> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();

        // power ratio (0.2 / 0.8)² = 0.0625
        assert_eq!(None, dec.detect(&audio));
    }

    #[test]
    fn test_debounce() {
        let mut dec = decoder();
        let one = keypress(697.0, 1209.0, CHUNK);
        let two = keypress(697.0, 1336.0, CHUNK);

        let mut clock = CHUNK as u64;
        assert_eq!(Some('1'), dec.input(&one, clock).map(|d| d.digit));

        // held key: suppressed until 8000 samples elapse
        // 31 × 256 = 7936
        for _ in 0..31 {
            clock += CHUNK as u64;
            assert!(dec.input(&one, clock).is_none());
        }
        clock += CHUNK as u64;
        assert_eq!(Some('1'), dec.input(&one, clock).map(|d| d.digit));

        // a different digit is not debounced
        clock += CHUNK as u64;
        assert_eq!(Some('2'), dec.input(&two, clock).map(|d| d.digit));
        clock += CHUNK as u64;
        assert_eq!(Some('1'), dec.input(&one, clock).map(|d| d.digit));
        assert_eq!("1121", dec.buffer());
    }

    #[test]
    fn test_command_clears_buffer() {
        let mut dec = decoder();
        let pound = keypress(941.0, 1477.0, CHUNK);
        let nine = keypress(852.0, 1477.0, CHUNK);
        let one = keypress(697.0, 1209.0, CHUNK);

        let mut clock = 0;
        let mut last = None;
        for key in [&pound, &nine, &one] {
            clock += CHUNK as u64;
            last = dec.input(key, clock);
        }
        assert_eq!(
            Some(DigitEvent {
                digit: '1',
                command: Some(DtmfCommand::Time)
            }),
            last
        );
        assert_eq!("", dec.buffer());
    }

    #[test]
    fn test_buffer_drops_oldest() {
        let mut dec = decoder();
        let keys = [
            keypress(697.0, 1209.0, CHUNK),
            keypress(770.0, 1209.0, CHUNK),
        ];
        let mut clock = 0;
        for i in 0..40 {
            clock += CHUNK as u64;
            assert!(dec.input(&keys[i % 2], clock).is_some());
        }
        let buf = dec.buffer();
        assert_eq!(DIGIT_BUFFER_LEN, buf.len());
        assert!(buf.starts_with("14"));
        assert!(buf.ends_with("14"));
    }
}
