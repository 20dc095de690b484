//! Outputs for the client

use std::fmt;

use chrono::{DateTime, Utc};
use num_complex::Complex32;
use uuid::Uuid;

use crate::baseline::Baseline;
use crate::command::DtmfCommand;
use crate::metrics::SMeter;

/// A complete, validated transmission
///
/// Built by the [`CaptureStateMachine`](crate::CaptureStateMachine)
/// when a capture ends and is long enough to keep. Ownership
/// passes to the client, typically a
/// [`Dispatcher`](crate::Dispatcher), which fills in the
/// signal metrics and the transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionEvent {
    uid: String,
    audio: Vec<f32>,
    iq: Vec<Complex32>,
    sample_rate: u32,
    end: EndReason,
    s_meter: SMeter,
    snr_db: Option<f32>,
    recognized_text: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TransmissionEvent {
    /// Create from captured samples
    ///
    /// A fresh unique identifier and the current time are
    /// assigned. Metrics are `Unknown` until
    /// [`set_metrics()`](#method.set_metrics) is called.
    pub fn new(audio: Vec<f32>, iq: Vec<Complex32>, sample_rate: u32, end: EndReason) -> Self {
        Self {
            uid: new_uid(),
            audio,
            iq,
            sample_rate,
            end,
            s_meter: SMeter::Unknown,
            snr_db: None,
            recognized_text: None,
            timestamp: Utc::now(),
        }
    }

    /// Unique identifier
    ///
    /// Sixteen lowercase hexadecimal characters.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Captured audio, normalized to `[-1.0, 1.0]`
    pub fn audio(&self) -> &[f32] {
        &self.audio
    }

    /// Captured complex samples
    ///
    /// Empty if the source did not retain them.
    pub fn iq(&self) -> &[Complex32] {
        &self.iq
    }

    /// Audio sampling rate (Hz)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration (seconds)
    pub fn duration(&self) -> f32 {
        self.audio.len() as f32 / self.sample_rate as f32
    }

    /// Why the capture ended
    pub fn end_reason(&self) -> EndReason {
        self.end
    }

    /// S-meter reading
    pub fn s_meter(&self) -> SMeter {
        self.s_meter
    }

    /// Signal-to-noise ratio (dB), if measured
    pub fn snr_db(&self) -> Option<f32> {
        self.snr_db
    }

    /// Transcript, if speech recognition has run
    pub fn recognized_text(&self) -> Option<&str> {
        self.recognized_text.as_deref()
    }

    /// Time of capture completion
    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    /// Record signal metrics
    pub fn set_metrics(&mut self, s_meter: SMeter, snr_db: Option<f32>) {
        self.s_meter = s_meter;
        self.snr_db = snr_db;
    }

    /// Record the transcript
    pub fn set_recognized_text<S>(&mut self, text: S)
    where
        S: Into<String>,
    {
        self.recognized_text = Some(text.into());
    }

    /// Audio as signed 16-bit PCM
    ///
    /// Samples are clamped to `[-1.0, 1.0]` and scaled by
    /// `i16::MAX`.
    pub fn to_pcm(&self) -> Vec<i16> {
        self.audio
            .iter()
            .map(|&sa| (f32::clamp(sa, -1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }
}

impl fmt::Display for TransmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transmission {}: {:.2} s ({}), {}",
            self.uid,
            self.duration(),
            self.end,
            self.s_meter
        )?;
        if let Some(snr) = self.snr_db {
            write!(f, ", SNR {:.1} dB", snr)?;
        }
        Ok(())
    }
}

/// Why a capture ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndReason {
    /// RF power stayed below threshold for the hangover period
    Silence,

    /// Sub-audible tone was absent for longer than the hold time
    ToneLost,

    /// Capture reached the maximum duration
    MaxDuration,

    /// The input ended during the capture
    EndOfStream,
}

impl AsRef<str> for EndReason {
    fn as_ref(&self) -> &str {
        match self {
            EndReason::Silence => "silence",
            EndReason::ToneLost => "tone lost",
            EndReason::MaxDuration => "maximum duration",
            EndReason::EndOfStream => "end of stream",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Monitor status
///
/// Reported by [`Monitor::process()`](crate::Monitor::process)
/// for every state change.
#[derive(Clone, Debug, PartialEq)]
pub enum MonitorEvent {
    /// Warm-up finished; the squelch is armed
    BaselineReady(Baseline),

    /// The squelch opened and a capture began
    CaptureStarted {
        /// Sample clock at the start of the triggering chunk
        at: u64,
    },

    /// A capture ended and was long enough to keep
    Transmission(TransmissionEvent),

    /// A capture ended but was too short to keep
    Discarded {
        /// Length of the discarded capture (seconds)
        duration: f32,

        /// Why the capture ended
        reason: EndReason,
    },

    /// A DTMF digit was decoded
    Digit(char),

    /// A DTMF command was recognized
    Command(DtmfCommand),
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorEvent::BaselineReady(bl) => {
                write!(f, "baseline ready: threshold {:.3e}", bl.threshold)
            }
            MonitorEvent::CaptureStarted { at } => write!(f, "capture started at sample {}", at),
            MonitorEvent::Transmission(evt) => write!(f, "{}", evt),
            MonitorEvent::Discarded { duration, reason } => {
                write!(f, "discarded {:.2} s capture ({})", duration, reason)
            }
            MonitorEvent::Digit(d) => write!(f, "DTMF digit '{}'", d),
            MonitorEvent::Command(cmd) => write!(f, "DTMF command: {}", cmd),
        }
    }
}

// 16 hex characters from a random UUID
fn new_uid() -> String {
    let mut uid = Uuid::new_v4().simple().to_string();
    uid.truncate(16);
    uid
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_new_event() {
        let evt = TransmissionEvent::new(vec![0.0; 8000], vec![], 16000, EndReason::Silence);
        assert_eq!(16, evt.uid().len());
        assert!(evt.uid().chars().all(|c| c.is_ascii_hexdigit()));
        assert_approx_eq!(evt.duration(), 0.5);
        assert_eq!(SMeter::Unknown, evt.s_meter());
        assert!(evt.recognized_text().is_none());

        let other = TransmissionEvent::new(vec![], vec![], 16000, EndReason::Silence);
        assert_ne!(evt.uid(), other.uid());
    }

    #[test]
    fn test_to_pcm() {
        let evt = TransmissionEvent::new(vec![0.0, 1.0, -1.0, 2.0, 0.5], vec![], 16000, EndReason::MaxDuration);
        assert_eq!(vec![0, 32767, -32767, 32767, 16383], evt.to_pcm());
    }

    #[test]
    fn test_display() {
        let mut evt = TransmissionEvent::new(vec![0.0; 16000], vec![], 16000, EndReason::Silence);
        evt.set_metrics(SMeter::Units(7), Some(12.34));
        let s = evt.to_string();
        assert!(s.ends_with("1.00 s (silence), S7, SNR 12.3 dB"), "{}", s);
    }
}
