//! Transmission capture state machine
//!
//! The [`CaptureStateMachine`] decides when a transmission
//! starts and ends. It is driven once per chunk with the
//! chunk itself, the squelch level for that chunk, and the
//! sample clock. The meaning of the level depends on the
//! [`Gate`]:
//!
//! * **Power** gates compare RF power against the threshold.
//!   A transmission ends after a run of consecutive quiet
//!   chunks (the "hangover").
//!
//! * **Tone** gates compare sub-audible tone power against
//!   the threshold. A transmission ends when no tone has
//!   been heard for longer than the hold time.
//!
//! In either mode, a transmission which reaches the maximum
//! duration is ended immediately. Finished captures which
//! are shorter than the minimum duration are discarded.

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use num_complex::Complex32;

use crate::chunk::AudioChunk;
use crate::event::{EndReason, TransmissionEvent};
use crate::squelch::Gate;

/// Capture state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    /// Waiting for the squelch to open
    Idle,

    /// Accumulating a transmission
    Active,
}

/// Timing limits for the [`CaptureStateMachine`]
///
/// All durations are in audio samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureLimits {
    /// Audio sampling rate (Hz)
    pub sample_rate: u32,

    /// Consecutive open chunks which start a transmission
    pub consecutive_required: u32,

    /// Shortest transmission which is kept
    pub min_samples: u64,

    /// Longest transmission; captures are cut here
    pub max_samples: u64,
}

/// State machine output
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    /// A capture began
    Started {
        /// Sample clock at the start of the triggering chunk
        at: u64,
    },

    /// A capture ended and is long enough to keep
    Finished(TransmissionEvent),

    /// A capture ended but was too short
    Discarded {
        /// Length of the capture (seconds)
        duration: f32,

        /// Why it ended
        reason: EndReason,
    },
}

// The session in progress
#[derive(Clone, Debug)]
struct CaptureSession {
    audio: Vec<f32>,
    iq: Vec<Complex32>,
    state: CaptureState,
    consecutive_active_count: u32,
    consecutive_idle_count: u32,
    last_active_time: u64,
    start_time: u64,
}

impl CaptureSession {
    fn new() -> Self {
        Self {
            audio: Vec::new(),
            iq: Vec::new(),
            state: CaptureState::Idle,
            consecutive_active_count: 0,
            consecutive_idle_count: 0,
            last_active_time: 0,
            start_time: 0,
        }
    }

    fn append(&mut self, chunk: &AudioChunk) {
        self.audio.extend_from_slice(chunk.audio());
        if let Some(iq) = chunk.iq() {
            self.iq.extend_from_slice(iq);
        }
    }
}

/// Decides the start and end of transmissions
///
/// Owns the capture buffers. Only one capture is in
/// progress at a time.
#[derive(Clone, Debug)]
pub struct CaptureStateMachine {
    gate: Gate,
    limits: CaptureLimits,
    session: CaptureSession,
}

impl CaptureStateMachine {
    /// New state machine, initially idle
    pub fn new(gate: Gate, limits: CaptureLimits) -> Self {
        Self {
            gate,
            limits,
            session: CaptureSession::new(),
        }
    }

    /// Process one chunk
    ///
    /// `level` is the squelch level of the chunk: RF power
    /// or tone power, depending on the gate. `now` is the
    /// sample clock *after* the chunk, i.e., the total count
    /// of audio samples received including this chunk.
    ///
    /// Returns an event if the capture started or ended.
    pub fn input(&mut self, chunk: &AudioChunk, level: f32, now: u64) -> Option<CaptureEvent> {
        let open = self.gate.is_open(level);
        match self.session.state {
            CaptureState::Idle => self.input_idle(chunk, open, now),
            CaptureState::Active => self.input_active(chunk, open, now),
        }
    }

    /// Current state
    pub fn state(&self) -> CaptureState {
        self.session.state
    }

    /// True if a capture is in progress
    pub fn is_active(&self) -> bool {
        self.session.state == CaptureState::Active
    }

    /// Audio samples captured so far
    pub fn captured_samples(&self) -> usize {
        self.session.audio.len()
    }

    /// Squelch strategy in use
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Timing limits in use
    pub fn limits(&self) -> &CaptureLimits {
        &self.limits
    }

    /// End any capture in progress
    ///
    /// Call when the input is exhausted. A capture in progress
    /// is finished (or discarded, if too short) as though the
    /// transmission had ended.
    pub fn flush(&mut self) -> Option<CaptureEvent> {
        if self.is_active() {
            Some(self.finalize(EndReason::EndOfStream))
        } else {
            self.session = CaptureSession::new();
            None
        }
    }

    /// Abandon any capture in progress and return to idle
    pub fn reset(&mut self) {
        self.session = CaptureSession::new();
    }

    fn input_idle(&mut self, chunk: &AudioChunk, open: bool, now: u64) -> Option<CaptureEvent> {
        if !open {
            self.session.consecutive_active_count = 0;
            return None;
        }

        self.session.consecutive_active_count += 1;
        if self.session.consecutive_active_count < self.limits.consecutive_required {
            return None;
        }

        let start_time = now.saturating_sub(chunk.len() as u64);
        self.session = CaptureSession::new();
        self.session.state = CaptureState::Active;
        self.session.start_time = start_time;
        self.session.last_active_time = now;
        self.session.append(chunk);

        debug!("capture: started at sample {}", start_time);
        Some(CaptureEvent::Started { at: start_time })
    }

    fn input_active(&mut self, chunk: &AudioChunk, open: bool, now: u64) -> Option<CaptureEvent> {
        self.session.append(chunk);

        if open {
            self.session.consecutive_idle_count = 0;
            self.session.last_active_time = now;
        } else {
            self.session.consecutive_idle_count += 1;
        }

        let quiet = match self.gate {
            Gate::Power {
                silence_chunks_for_end,
                ..
            } => {
                if self.session.consecutive_idle_count >= silence_chunks_for_end {
                    Some(EndReason::Silence)
                } else {
                    None
                }
            }
            Gate::Tone { hold_samples, .. } => {
                if now.saturating_sub(self.session.last_active_time) > hold_samples {
                    Some(EndReason::ToneLost)
                } else {
                    None
                }
            }
        };

        let reason = quiet.or_else(|| {
            if self.session.audio.len() as u64 >= self.limits.max_samples {
                Some(EndReason::MaxDuration)
            } else {
                None
            }
        })?;

        Some(self.finalize(reason))
    }

    // End the capture, returning to idle
    fn finalize(&mut self, reason: EndReason) -> CaptureEvent {
        let session = std::mem::replace(&mut self.session, CaptureSession::new());
        let samples = session.audio.len() as u64;
        let duration = samples as f32 / self.limits.sample_rate as f32;

        if samples >= self.limits.min_samples {
            debug!(
                "capture: finished at sample {} after {:.2} s ({})",
                session.start_time + samples,
                duration,
                reason
            );
            CaptureEvent::Finished(TransmissionEvent::new(
                session.audio,
                session.iq,
                self.limits.sample_rate,
                reason,
            ))
        } else {
            debug!(
                "capture: discarded {:.2} s capture started at sample {} ({})",
                duration, session.start_time, reason
            );
            CaptureEvent::Discarded { duration, reason }
        }
    }
}
