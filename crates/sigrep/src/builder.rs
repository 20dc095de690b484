use crate::baseline::BaselineParams;
use crate::command::CommandCodes;
use crate::dtmf::DtmfParams;
use crate::monitor::Monitor;
use crate::squelch::SquelchMode;

/// Builds a transmission [`Monitor`]
///
/// The builder comes with a sensible set of default options.
/// All you really need to provide is the audio sampling rate.
/// The monitor was designed for 16000 Hz audio delivered in
/// chunks of 256 samples, and you may wish to tweak some of
/// these values for other sources.
///
/// ```
/// use sigrep::{MonitorBuilder, SquelchMode};
///
/// let monitor = MonitorBuilder::new(16000)
///     .with_squelch(SquelchMode::Tone { frequency: 100.0 })
///     .with_warmup_duration(2.0)
///     .build();
/// assert_eq!(monitor.sample_rate(), 16000);
/// assert!(monitor.is_baselining());
/// ```
///
/// Times are given in seconds and converted to audio samples
/// when the monitor is built.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorBuilder {
    sample_rate: u32,
    chunk_len: usize,
    squelch: SquelchMode,
    warmup_secs: f32,
    baseline: BaselineParams,
    consecutive_required: Option<u32>,
    silence_secs: f32,
    tone_hold_secs: f32,
    tone_window_len: usize,
    min_duration_secs: f32,
    max_duration_secs: f32,
    dtmf_min_power: f32,
    dtmf_dominance_ratio: f32,
    dtmf_balance_ratio: f32,
    dtmf_debounce_secs: f32,
    command_codes: CommandCodes,
}

impl MonitorBuilder {
    /// New monitor with "sensible" defaults
    ///
    /// The only mandatory parameter is the audio sampling
    /// rate, in Hz.
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = u32::max(sample_rate, 1);
        let dtmf = DtmfParams::for_rate(sample_rate);
        Self {
            sample_rate,
            chunk_len: 256,
            squelch: SquelchMode::Power,
            warmup_secs: 3.0,
            baseline: BaselineParams::default(),
            consecutive_required: None,
            silence_secs: 1.0,
            tone_hold_secs: 0.5,
            tone_window_len: 2048,
            min_duration_secs: 0.75,
            max_duration_secs: 10.0,
            dtmf_min_power: dtmf.min_power,
            dtmf_dominance_ratio: dtmf.dominance_ratio,
            dtmf_balance_ratio: dtmf.balance_ratio,
            dtmf_debounce_secs: 0.5,
            command_codes: CommandCodes::default(),
        }
    }

    /// Build a monitor
    ///
    /// The monitor begins in its warm-up period.
    pub fn build(&self) -> Monitor {
        Monitor::from(self)
    }

    /// Nominal audio samples per chunk
    ///
    /// Used to express the power squelch hangover as a count
    /// of chunks. Should match what the source delivers.
    pub fn with_chunk_len(&mut self, len: usize) -> &mut Self {
        self.chunk_len = usize::max(len, 1);
        self
    }

    /// Squelch mode
    pub fn with_squelch(&mut self, mode: SquelchMode) -> &mut Self {
        self.squelch = match mode {
            SquelchMode::Tone { frequency } => SquelchMode::Tone {
                frequency: f32::clamp(frequency, 1.0, self.sample_rate as f32 / 2.0),
            },
            SquelchMode::Power => SquelchMode::Power,
        };
        self
    }

    /// Warm-up duration (seconds)
    ///
    /// The noise baseline is measured over this interval.
    /// No transmissions are captured until it ends. A value
    /// of zero skips the warm-up and uses the fallback
    /// threshold.
    pub fn with_warmup_duration(&mut self, secs: f32) -> &mut Self {
        self.warmup_secs = f32::max(secs, 0.0);
        self
    }

    /// Baseline thresholding policy
    pub fn with_baseline_params(&mut self, params: BaselineParams) -> &mut Self {
        self.baseline = params;
        self
    }

    /// Consecutive open chunks required to start a capture
    ///
    /// Defaults to 1 for the power squelch and 3 for the
    /// tone squelch.
    pub fn with_consecutive_required(&mut self, count: u32) -> &mut Self {
        self.consecutive_required = Some(u32::max(count, 1));
        self
    }

    /// Power squelch hangover (seconds)
    ///
    /// A transmission ends after RF power has been below the
    /// threshold for this long. The hangover is always at
    /// least one chunk.
    pub fn with_silence_duration(&mut self, secs: f32) -> &mut Self {
        self.silence_secs = f32::max(secs, 0.0);
        self
    }

    /// Tone squelch hold time (seconds)
    ///
    /// A transmission ends once the tone has been absent for
    /// longer than this.
    pub fn with_tone_hold(&mut self, secs: f32) -> &mut Self {
        self.tone_hold_secs = f32::max(secs, 0.0);
        self
    }

    /// Tone squelch measurement window (samples)
    ///
    /// Longer windows separate closely-spaced tones better
    /// but respond more slowly.
    pub fn with_tone_window(&mut self, len: usize) -> &mut Self {
        self.tone_window_len = usize::max(len, 1);
        self
    }

    /// Transmission length limits (seconds)
    ///
    /// Captures shorter than `min` are discarded. Captures
    /// are cut off at `max`. `max` is never less than `min`.
    pub fn with_duration_limits(&mut self, min: f32, max: f32) -> &mut Self {
        self.min_duration_secs = f32::max(min, 0.0);
        self.max_duration_secs = f32::max(max, self.min_duration_secs);
        self
    }

    /// DTMF detection thresholds
    ///
    /// * `min_power`: minimum normalized power of each tone
    /// * `dominance`: each tone must exceed the others in its
    ///   group by this ratio; at least 1.0
    /// * `balance`: the weaker tone must be at least this
    ///   fraction of the stronger; within `[0.0, 1.0]`
    pub fn with_dtmf_thresholds(&mut self, min_power: f32, dominance: f32, balance: f32) -> &mut Self {
        self.dtmf_min_power = f32::max(min_power, 0.0);
        self.dtmf_dominance_ratio = f32::max(dominance, 1.0);
        self.dtmf_balance_ratio = f32::clamp(balance, 0.0, 1.0);
        self
    }

    /// DTMF repeat suppression interval (seconds)
    pub fn with_dtmf_debounce(&mut self, secs: f32) -> &mut Self {
        self.dtmf_debounce_secs = f32::max(secs, 0.0);
        self
    }

    /// DTMF command codes
    pub fn with_command_codes(&mut self, codes: CommandCodes) -> &mut Self {
        self.command_codes = codes;
        self
    }

    /// Audio sampling rate (Hz)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Nominal audio samples per chunk
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Squelch mode
    pub fn squelch(&self) -> SquelchMode {
        self.squelch
    }

    /// Warm-up duration (samples)
    pub fn warmup_samples(&self) -> u64 {
        self.secs_to_samples(self.warmup_secs)
    }

    /// Baseline thresholding policy
    pub fn baseline_params(&self) -> &BaselineParams {
        &self.baseline
    }

    /// Consecutive open chunks required to start a capture
    pub fn consecutive_required(&self) -> u32 {
        match (self.consecutive_required, self.squelch) {
            (Some(count), _) => count,
            (None, SquelchMode::Power) => 1,
            (None, SquelchMode::Tone { .. }) => 3,
        }
    }

    /// Power squelch hangover (chunks)
    pub fn silence_chunks_for_end(&self) -> u32 {
        let chunks = self.secs_to_samples(self.silence_secs) / self.chunk_len as u64;
        u64::clamp(chunks, 1, u32::MAX as u64) as u32
    }

    /// Tone squelch hold time (samples)
    pub fn tone_hold_samples(&self) -> u64 {
        self.secs_to_samples(self.tone_hold_secs)
    }

    /// Tone squelch measurement window (samples)
    pub fn tone_window_len(&self) -> usize {
        self.tone_window_len
    }

    /// Transmission length limits (samples)
    ///
    /// Returns (`min`, `max`).
    pub fn duration_limits(&self) -> (u64, u64) {
        (
            self.secs_to_samples(self.min_duration_secs),
            self.secs_to_samples(self.max_duration_secs),
        )
    }

    /// DTMF detection parameters
    pub fn dtmf_params(&self) -> DtmfParams {
        DtmfParams {
            min_power: self.dtmf_min_power,
            dominance_ratio: self.dtmf_dominance_ratio,
            balance_ratio: self.dtmf_balance_ratio,
            debounce_samples: self.secs_to_samples(self.dtmf_debounce_secs),
        }
    }

    /// DTMF command codes
    pub fn command_codes(&self) -> &CommandCodes {
        &self.command_codes
    }

    fn secs_to_samples(&self, secs: f32) -> u64 {
        (secs as f64 * self.sample_rate as f64).round() as u64
    }
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new(16000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let b = MonitorBuilder::default();
        assert_eq!(16000, b.sample_rate());
        assert_eq!(48000, b.warmup_samples());
        assert_eq!(1, b.consecutive_required());
        assert_eq!(62, b.silence_chunks_for_end());
        assert_eq!(8000, b.tone_hold_samples());
        assert_eq!((12000, 160000), b.duration_limits());
        assert_eq!(DtmfParams::for_rate(16000), b.dtmf_params());
    }

    #[test]
    fn test_tone_mode_defaults() {
        let mut b = MonitorBuilder::new(16000);
        b.with_squelch(SquelchMode::Tone { frequency: 100.0 });
        assert_eq!(3, b.consecutive_required());
        b.with_consecutive_required(0);
        assert_eq!(1, b.consecutive_required());
    }

    #[test]
    fn test_clamping() {
        let mut b = MonitorBuilder::new(8000);
        b.with_squelch(SquelchMode::Tone { frequency: 9000.0 })
            .with_duration_limits(2.0, 1.0)
            .with_silence_duration(0.0)
            .with_dtmf_thresholds(-1.0, 0.5, 3.0)
            .with_warmup_duration(-4.0);
        assert_eq!(SquelchMode::Tone { frequency: 4000.0 }, b.squelch());
        assert_eq!((16000, 16000), b.duration_limits());
        assert_eq!(1, b.silence_chunks_for_end());
        assert_eq!(0, b.warmup_samples());

        let dtmf = b.dtmf_params();
        assert_eq!(0.0, dtmf.min_power);
        assert_eq!(1.0, dtmf.dominance_ratio);
        assert_eq!(1.0, dtmf.balance_ratio);
    }
}
