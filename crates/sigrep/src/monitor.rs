//! Channel monitor

#[cfg(not(test))]
use log::{info, trace, warn};

#[cfg(test)]
use std::println as trace;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use arrayvec::ArrayVec;

use crate::baseline::{Baseline, BaselineEstimator};
use crate::builder::MonitorBuilder;
use crate::capture::{CaptureEvent, CaptureLimits, CaptureState, CaptureStateMachine};
use crate::chunk::{AudioChunk, ChunkError};
use crate::command::CommandMatcher;
use crate::dtmf::DtmfDecoder;
use crate::event::MonitorEvent;
use crate::squelch::{Gate, SquelchMode, ToneMeter};

/// Events from one chunk
///
/// A single chunk can produce, at most, a digit, a command,
/// and a capture event.
pub type MonitorEvents = ArrayVec<MonitorEvent, 4>;

/// A transmission monitor for one channel
///
/// The monitor takes [`AudioChunk`]s from a narrowband FM
/// receiver and performs the following operations on each:
///
/// 1. DTMF decoding and command recognition
/// 2. Sub-audible tone measurement, if the tone squelch
///    is in use
/// 3. During the warm-up period: noise baseline estimation
/// 4. After the warm-up period: squelch and capture of
///    complete transmissions
///
/// The monitor keeps a sample clock, which counts the total
/// number of audio samples received. All timing uses this
/// clock, so results do not depend on how quickly chunks
/// are delivered.
///
/// To create the monitor, first create its Builder:
///
/// ```
/// use sigrep::MonitorBuilder;
///
/// let monitor = MonitorBuilder::default().build();
/// assert_eq!(monitor.sample_rate(), 16000);
/// ```
#[derive(Clone, Debug)]
pub struct Monitor {
    sample_rate: u32,
    squelch: SquelchMode,
    gate_params: GateParams,
    limits: CaptureLimits,
    warmup: Warmup,
    tone_meter: Option<ToneMeter>,
    dtmf: DtmfDecoder,
    sample_clock: u64,
    chunk_counter: u64,
    builder: MonitorBuilder,
}

// Baseline lifecycle: warm-up, then frozen
#[derive(Clone, Debug)]
enum Warmup {
    Estimating(BaselineEstimator),
    Ready {
        baseline: Baseline,
        capture: CaptureStateMachine,
    },
}

// Gate settings which do not depend on the baseline
#[derive(Clone, Copy, Debug)]
struct GateParams {
    silence_chunks_for_end: u32,
    hold_samples: u64,
}

impl Monitor {
    /// Process one chunk
    ///
    /// The chunk is validated first. An invalid chunk is
    /// rejected with an error and does not change the state
    /// of the monitor, so the caller may log it and continue.
    ///
    /// Returns every event which the chunk produced, in order.
    pub fn process(&mut self, chunk: &AudioChunk) -> Result<MonitorEvents, ChunkError> {
        chunk.validate()?;

        let mut out = MonitorEvents::new();
        self.sample_clock = self.sample_clock.wrapping_add(chunk.len() as u64);
        self.chunk_counter = self.chunk_counter.wrapping_add(1);
        let now = self.sample_clock;

        // 1. DTMF
        if let Some(dig) = self.dtmf.input(chunk.audio(), now) {
            out.push(MonitorEvent::Digit(dig.digit));
            if let Some(cmd) = dig.command {
                out.push(MonitorEvent::Command(cmd));
            }
        }

        // 2. tone measurement
        let tone_power = self.tone_meter.as_mut().map(|m| m.input(chunk.audio()));

        if self.chunk_counter % Self::TRACE_LOG_INTERVAL_CHUNKS == 0 {
            trace!(
                "monitor [{:<14}]: rf power {:.3e}, tone power {:.3e}",
                now,
                chunk.rf_power(),
                tone_power.unwrap_or(0.0)
            );
        }

        // 3. baseline or 4. capture
        let ready = match &mut self.warmup {
            Warmup::Estimating(est) => est.input(chunk.rf_power(), tone_power, chunk.len()),
            Warmup::Ready { capture, .. } => {
                let level = tone_power.unwrap_or_else(|| chunk.rf_power());
                if let Some(evt) = capture.input(chunk, level, now) {
                    out.push(Self::capture_event(evt));
                }
                None
            }
        };

        if let Some(baseline) = ready {
            self.arm(baseline);
            out.push(MonitorEvent::BaselineReady(baseline));
        }

        Ok(out)
    }

    /// Monitor a source of chunks
    ///
    /// Bind an iterator which will consume the `input` and
    /// produce [`MonitorEvent`]s. Invalid chunks are logged
    /// and skipped.
    ///
    /// The iterator will consume as many chunks as are
    /// required to produce the next event. It will return
    /// `None` if the input is exhausted and there are no new
    /// events. A capture which is still in progress is not
    /// finished; see [`flush()`](#method.flush).
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn iter<'mon, I, T>(&'mon mut self, input: I) -> ChunkIter<'mon, T>
    where
        I: IntoIterator<Item = AudioChunk> + IntoIterator<IntoIter = T>,
        T: Iterator<Item = AudioChunk>,
    {
        ChunkIter {
            source: input.into_iter(),
            monitor: self,
            pending: MonitorEvents::new().into_iter(),
        }
    }

    /// End any capture in progress
    ///
    /// Call when the input is exhausted. Returns the finished
    /// (or discarded) capture, if there was one.
    pub fn flush(&mut self) -> Option<MonitorEvent> {
        match &mut self.warmup {
            Warmup::Ready { capture, .. } => capture.flush().map(Self::capture_event),
            Warmup::Estimating(_) => None,
        }
    }

    /// Restart from the beginning of the warm-up period
    ///
    /// Discards the baseline, any capture in progress, and
    /// all detector state. The sample clock is reset.
    pub fn reset(&mut self) {
        *self = Self::from(&self.builder);
    }

    /// Audio sampling rate (Hz)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Lifetime total of audio samples processed
    pub fn sample_clock(&self) -> u64 {
        self.sample_clock
    }

    /// Squelch mode
    pub fn squelch(&self) -> SquelchMode {
        self.squelch
    }

    /// True during the warm-up period
    pub fn is_baselining(&self) -> bool {
        matches!(self.warmup, Warmup::Estimating(_))
    }

    /// Noise baseline, once the warm-up is complete
    pub fn baseline(&self) -> Option<&Baseline> {
        match &self.warmup {
            Warmup::Ready { baseline, .. } => Some(baseline),
            Warmup::Estimating(_) => None,
        }
    }

    /// Capture state
    ///
    /// Always `Idle` during the warm-up period.
    pub fn capture_state(&self) -> CaptureState {
        match &self.warmup {
            Warmup::Ready { capture, .. } => capture.state(),
            Warmup::Estimating(_) => CaptureState::Idle,
        }
    }

    /// DTMF command matcher
    pub fn command_matcher(&self) -> &CommandMatcher {
        self.dtmf.matcher()
    }

    // Freeze the baseline and arm the squelch
    fn arm(&mut self, baseline: Baseline) {
        let gate = match self.squelch {
            SquelchMode::Power => Gate::Power {
                threshold: baseline.threshold,
                silence_chunks_for_end: self.gate_params.silence_chunks_for_end,
            },
            SquelchMode::Tone { .. } => Gate::Tone {
                threshold: baseline.threshold,
                hold_samples: self.gate_params.hold_samples,
            },
        };
        info!(
            "monitor [{:<14}]: squelch armed: {:?}",
            self.sample_clock, gate
        );
        self.warmup = Warmup::Ready {
            baseline,
            capture: CaptureStateMachine::new(gate, self.limits),
        };
    }

    fn capture_event(evt: CaptureEvent) -> MonitorEvent {
        match evt {
            CaptureEvent::Started { at } => MonitorEvent::CaptureStarted { at },
            CaptureEvent::Finished(evt) => MonitorEvent::Transmission(evt),
            CaptureEvent::Discarded { duration, reason } => {
                MonitorEvent::Discarded { duration, reason }
            }
        }
    }

    // Print trace-level messages about once per second at 16 kHz
    const TRACE_LOG_INTERVAL_CHUNKS: u64 = 64;
}

impl From<&MonitorBuilder> for Monitor {
    /// Create the Monitor from its Builder
    fn from(cfg: &MonitorBuilder) -> Self {
        let squelch = cfg.squelch();
        let (min_samples, max_samples) = cfg.duration_limits();
        let limits = CaptureLimits {
            sample_rate: cfg.sample_rate(),
            consecutive_required: cfg.consecutive_required(),
            min_samples,
            max_samples,
        };
        let gate_params = GateParams {
            silence_chunks_for_end: cfg.silence_chunks_for_end(),
            hold_samples: cfg.tone_hold_samples(),
        };
        let tone_meter = match squelch {
            SquelchMode::Tone { frequency } => Some(ToneMeter::new(
                frequency,
                cfg.sample_rate(),
                cfg.tone_window_len(),
            )),
            SquelchMode::Power => None,
        };
        let dtmf = DtmfDecoder::new(
            cfg.sample_rate(),
            cfg.dtmf_params(),
            CommandMatcher::new(cfg.command_codes().clone()),
        );
        let estimator =
            BaselineEstimator::new(*cfg.baseline_params(), squelch.is_tone(), cfg.warmup_samples());

        let mut out = Self {
            sample_rate: cfg.sample_rate(),
            squelch,
            gate_params,
            limits,
            warmup: Warmup::Estimating(estimator.clone()),
            tone_meter,
            dtmf,
            sample_clock: 0,
            chunk_counter: 0,
            builder: cfg.clone(),
        };

        if estimator.is_complete() {
            // no warm-up
            out.arm(estimator.finish());
        }
        out
    }
}

/// Chunk source iterator
///
/// This iterator is bound to a source of [`AudioChunk`].
/// Calling the `next()` method will return the next
/// [`MonitorEvent`] or `None` if the available chunks have
/// been consumed without any new events.
#[derive(Debug)]
pub struct ChunkIter<'mon, I>
where
    I: Iterator<Item = AudioChunk>,
{
    source: I,
    monitor: &'mon mut Monitor,
    pending: arrayvec::IntoIter<MonitorEvent, 4>,
}

impl<'mon, I> Iterator for ChunkIter<'mon, I>
where
    I: Iterator<Item = AudioChunk>,
{
    type Item = MonitorEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(evt) = self.pending.next() {
                return Some(evt);
            }

            let chunk = self.source.next()?;
            match self.monitor.process(&chunk) {
                Ok(evts) => {
                    for evt in &evts {
                        info!(
                            "monitor [{:<14}]: {}",
                            self.monitor.sample_clock(),
                            evt
                        );
                    }
                    self.pending = evts.into_iter();
                }
                Err(e) => warn!(
                    "monitor [{:<14}]: skipping chunk: {}",
                    self.monitor.sample_clock(),
                    e
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use num_complex::Complex32;

    use crate::command::DtmfCommand;
    use crate::event::EndReason;
    use crate::goertzel::tests::sinusoid;

    const RATE: u32 = 16000;
    const CHUNK: usize = 256;

    fn quiet() -> AudioChunk {
        AudioChunk::new(vec![0.0f32; CHUNK], 1.0e-6)
    }

    fn loud() -> AudioChunk {
        AudioChunk::new(vec![0.0f32; CHUNK], 1.0e-3)
    }

    fn keypress(low: f32, high: f32) -> AudioChunk {
        let a = sinusoid(low, 0.4, RATE, CHUNK);
        let b = sinusoid(high, 0.4, RATE, CHUNK);
        AudioChunk::new(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect(), 1.0e-6)
    }

    fn monitor() -> Monitor {
        let mut b = MonitorBuilder::new(RATE);
        b.with_warmup_duration(0.16).with_duration_limits(0.1, 10.0);
        b.build()
    }

    #[test]
    fn test_warmup_then_capture() {
        let mut mon = monitor();
        assert!(mon.is_baselining());
        assert!(mon.baseline().is_none());

        // warm-up is 2560 samples: ten chunks
        for _ in 0..9 {
            assert!(mon.process(&quiet()).expect("bad chunk").is_empty());
        }
        assert_eq!(CaptureState::Idle, mon.capture_state());

        let evts = mon.process(&quiet()).expect("bad chunk");
        assert_eq!(1, evts.len());
        let bl = match &evts[0] {
            MonitorEvent::BaselineReady(bl) => *bl,
            e => panic!("unexpected event {:?}", e),
        };
        assert!(!mon.is_baselining());
        assert_eq!(Some(&bl), mon.baseline());
        assert!(bl.threshold > 1.0e-6 && bl.threshold < 1.0e-3);
        assert!(!bl.fallback);

        let evts = mon.process(&loud()).expect("bad chunk");
        assert_eq!(
            MonitorEvent::CaptureStarted {
                at: 10 * CHUNK as u64
            },
            evts[0]
        );
        assert_eq!(CaptureState::Active, mon.capture_state());

        let mut found = None;
        for _ in 0..62 {
            for evt in mon.process(&quiet()).expect("bad chunk") {
                if let MonitorEvent::Transmission(t) = evt {
                    found = Some(t);
                }
            }
        }
        let evt = found.expect("no transmission");
        assert_eq!(63 * CHUNK, evt.audio().len());
        assert_eq!(EndReason::Silence, evt.end_reason());
        assert_eq!(CaptureState::Idle, mon.capture_state());
    }

    #[test]
    fn test_invalid_chunk_leaves_state() {
        let mut mon = monitor();
        let bad = AudioChunk::new(vec![0.0, f32::NAN], 1.0);
        assert_eq!(Err(ChunkError::NonFiniteAudio(1)), mon.process(&bad));
        assert_eq!(0, mon.sample_clock());

        let bad = AudioChunk::new(vec![], 1.0);
        assert!(mon.process(&bad).is_err());
        assert_eq!(0, mon.sample_clock());
    }

    #[test]
    fn test_no_warmup_uses_fallback() {
        let mut b = MonitorBuilder::new(RATE);
        b.with_warmup_duration(0.0);
        let mut mon = b.build();
        assert!(!mon.is_baselining());
        let bl = *mon.baseline().expect("no baseline");
        assert!(bl.fallback);
        assert_eq!(1.0e-7, bl.threshold);

        let evts = mon.process(&loud()).expect("bad chunk");
        assert_eq!(MonitorEvent::CaptureStarted { at: 0 }, evts[0]);
    }

    #[test]
    fn test_dtmf_during_warmup() {
        let mut mon = monitor();
        let keys = [
            keypress(941.0, 1477.0),
            keypress(852.0, 1477.0),
            keypress(697.0, 1336.0),
        ];
        let mut evts = vec![];
        for key in keys.iter() {
            evts.extend(mon.process(key).expect("bad chunk"));
        }
        assert_eq!(
            vec![
                MonitorEvent::Digit('#'),
                MonitorEvent::Digit('9'),
                MonitorEvent::Digit('2'),
                MonitorEvent::Command(DtmfCommand::Date),
            ],
            evts
        );
        assert!(mon.is_baselining());
    }

    #[test]
    fn test_tone_squelch() {
        let mut b = MonitorBuilder::new(RATE);
        b.with_squelch(SquelchMode::Tone { frequency: 100.0 })
            .with_warmup_duration(0.16)
            .with_duration_limits(0.1, 10.0);
        let mut mon = b.build();

        // strong carrier, but no tone
        let tone = sinusoid(100.0, 0.1, RATE, CHUNK * 200);
        for _ in 0..10 {
            mon.process(&loud()).expect("bad chunk");
        }
        let bl = *mon.baseline().expect("no baseline");
        assert_eq!(1.0e-4, bl.threshold);
        for _ in 0..20 {
            assert!(mon.process(&loud()).expect("bad chunk").is_empty());
        }

        // tone on
        let mut started = None;
        for (i, chunk) in tone.chunks(CHUNK).enumerate() {
            let chunk = AudioChunk::with_iq(chunk.to_vec(), vec![Complex32::new(0.01, 0.0); 64]);
            for evt in mon.process(&chunk).expect("bad chunk") {
                if let MonitorEvent::CaptureStarted { .. } = evt {
                    started = Some(i);
                }
            }
        }
        // opens within the first few chunks of tone
        let started = started.expect("never opened");
        assert!(started >= 2 && started < 8, "opened on chunk {}", started);
        assert_eq!(CaptureState::Active, mon.capture_state());

        // tone off: closes after the hold time
        let mut finished = None;
        for i in 0..100 {
            for evt in mon.process(&loud()).expect("bad chunk") {
                if let MonitorEvent::Transmission(t) = evt {
                    assert_eq!(EndReason::ToneLost, t.end_reason());
                    assert!(!t.iq().is_empty());
                    finished = Some(i);
                }
            }
        }
        let finished = finished.expect("never closed");
        assert!(finished >= 31 && finished < 45, "closed on chunk {}", finished);
    }

    #[test]
    fn test_iter_and_flush() {
        let mut mon = monitor();
        let mut chunks = vec![quiet(); 10];
        chunks.push(AudioChunk::new(vec![], 1.0));
        chunks.extend(vec![loud(); 20]);

        let evts: Vec<MonitorEvent> = mon.iter(chunks).collect();
        assert_eq!(2, evts.len());
        assert!(matches!(evts[0], MonitorEvent::BaselineReady(_)));
        assert!(matches!(evts[1], MonitorEvent::CaptureStarted { .. }));

        match mon.flush() {
            Some(MonitorEvent::Transmission(t)) => {
                assert_eq!(20 * CHUNK, t.audio().len());
                assert_eq!(EndReason::EndOfStream, t.end_reason());
            }
            e => panic!("unexpected event {:?}", e),
        }
        assert!(mon.flush().is_none());
    }

    #[test]
    fn test_reset() {
        let mut mon = monitor();
        for _ in 0..12 {
            mon.process(&loud()).expect("bad chunk");
        }
        assert!(!mon.is_baselining());
        mon.reset();
        assert!(mon.is_baselining());
        assert_eq!(0, mon.sample_clock());
    }
}
