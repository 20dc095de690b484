//! Transmission dispatch
//!
//! The [`Dispatcher`] takes each finished
//! [`TransmissionEvent`] through the response pipeline:
//!
//! 1. Measure the S-meter reading and SNR.
//! 2. Transcribe the audio with a [`Transcriber`].
//! 3. If the operator asked for a signal report, and has not
//!    had one very recently, speak it with a [`Speaker`].
//! 4. Persist a [`SignalReport`] with a [`ReportLog`].
//!
//! Collaborator failures are logged and never stop the
//! pipeline.

#[cfg(not(test))]
use log::{debug, error, info, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as error;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::baseline::Baseline;
use crate::callsign::{grammar, parse_signal_report_request, CallsignError, DEFAULT_TRIGGER_PHRASE};
use crate::event::TransmissionEvent;
use crate::metrics::{snr_db, SMeter, DEFAULT_S9_REFERENCE_DBFS};

/// Error from an external collaborator
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// The collaborator is not configured
    #[error("not configured")]
    Unavailable,

    /// I/O error talking to the collaborator
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The collaborator did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The collaborator reported failure
    #[error("failed: {0}")]
    Failed(String),
}

/// Speech-to-text engine
pub trait Transcriber {
    /// Transcribe mono 16-bit PCM audio
    ///
    /// Recognition should be constrained to the words in
    /// `grammar`.
    fn transcribe(
        &mut self,
        pcm: &[i16],
        sample_rate: u32,
        grammar: &[String],
    ) -> Result<String, CollaboratorError>;
}

/// Text-to-speech output
pub trait Speaker {
    /// Speak `text` on the air
    fn speak(&mut self, text: &str) -> Result<(), CollaboratorError>;
}

/// Persistent store of signal reports
pub trait ReportLog {
    /// Append one report
    fn append(&mut self, report: &SignalReport) -> Result<(), CollaboratorError>;
}

impl<T: Transcriber> Transcriber for Option<T> {
    fn transcribe(
        &mut self,
        pcm: &[i16],
        sample_rate: u32,
        grammar: &[String],
    ) -> Result<String, CollaboratorError> {
        match self {
            Some(t) => t.transcribe(pcm, sample_rate, grammar),
            None => Err(CollaboratorError::Unavailable),
        }
    }
}

impl<L: ReportLog> ReportLog for Option<L> {
    fn append(&mut self, report: &SignalReport) -> Result<(), CollaboratorError> {
        match self {
            Some(l) => l.append(report),
            None => Err(CollaboratorError::Unavailable),
        }
    }
}

/// A persisted record of one transmission
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalReport {
    /// Transmission identifier
    pub uid: String,

    /// Time the transmission ended
    pub timestamp: DateTime<Utc>,

    /// Callsign which requested a report, if any
    pub callsign: Option<String>,

    /// S-meter reading, as spoken
    pub s_meter: String,

    /// Signal-to-noise ratio (dB)
    pub snr_db: Option<f32>,

    /// Transmission duration (seconds)
    pub duration_sec: f32,

    /// Squelch threshold in effect
    pub vad_trigger_threshold: Option<f32>,

    /// Transcript
    pub recognized_text: Option<String>,
}

/// Suppresses repeated reports to the same station
///
/// Remembers only the most recent callsign. A request from
/// that callsign within the debounce window is suppressed.
/// Suppressed requests do not extend the window.
#[derive(Clone, Debug)]
pub struct RecentCallCache {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl RecentCallCache {
    /// Empty cache with the given debounce window
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Check and record a request from `callsign`
    ///
    /// Returns `true` if a response is allowed. Allowed
    /// requests are remembered as of `now`.
    pub fn check(&mut self, callsign: &str, now: Instant) -> bool {
        if let Some((last_call, last_time)) = &self.last {
            if last_call == callsign && now.saturating_duration_since(*last_time) < self.window {
                return false;
            }
        }
        self.last = Some((callsign.to_owned(), now));
        true
    }

    /// Debounce window
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Dispatcher settings
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchConfig {
    /// Phrase which ends a signal report request
    pub trigger_phrase: String,

    /// Repeat requests from one callsign are ignored for this long
    pub debounce: Duration,

    /// Power which reads S9 (dBFS)
    pub s9_reference_dbfs: f32,

    /// Report negative SNRs as zero
    pub clamp_snr: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            trigger_phrase: DEFAULT_TRIGGER_PHRASE.to_owned(),
            debounce: Duration::from_secs(10),
            s9_reference_dbfs: DEFAULT_S9_REFERENCE_DBFS,
            clamp_snr: true,
        }
    }
}

/// Result of dispatching one transmission
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOutcome {
    /// The event, with metrics and transcript filled in
    pub event: TransmissionEvent,

    /// The persisted record
    pub report: SignalReport,

    /// The spoken response, if one was sent
    pub response: Option<String>,

    /// True if a valid request was suppressed as a repeat
    pub suppressed: bool,
}

/// Runs the response pipeline for finished transmissions
#[derive(Debug)]
pub struct Dispatcher<T, S, L>
where
    T: Transcriber,
    S: Speaker,
    L: ReportLog,
{
    config: DispatchConfig,
    grammar: Vec<String>,
    recent: RecentCallCache,
    last_report: Option<String>,
    transcriber: T,
    speaker: S,
    log: L,
}

impl<T, S, L> Dispatcher<T, S, L>
where
    T: Transcriber,
    S: Speaker,
    L: ReportLog,
{
    /// New dispatcher with the given collaborators
    pub fn new(config: DispatchConfig, transcriber: T, speaker: S, log: L) -> Self {
        Self {
            grammar: grammar(&config.trigger_phrase),
            recent: RecentCallCache::new(config.debounce),
            config,
            last_report: None,
            transcriber,
            speaker,
            log,
        }
    }

    /// Dispatch a finished transmission
    ///
    /// `baseline`, if known, supplies the SNR noise
    /// reference and the squelch threshold for the record.
    /// `now` is used for repeat suppression.
    pub fn dispatch(
        &mut self,
        mut event: TransmissionEvent,
        baseline: Option<&Baseline>,
        now: Instant,
    ) -> DispatchOutcome {
        // 1. metrics
        let (s_meter, snr) = if event.iq().is_empty() {
            (SMeter::Unknown, None)
        } else {
            (
                SMeter::from_segment(event.iq(), self.config.s9_reference_dbfs),
                snr_db(
                    event.iq(),
                    baseline.and_then(Baseline::noise_floor),
                    self.config.clamp_snr,
                ),
            )
        };
        event.set_metrics(s_meter, snr);

        // 2. speech recognition
        let pcm = event.to_pcm();
        match self
            .transcriber
            .transcribe(&pcm, event.sample_rate(), &self.grammar)
        {
            Ok(text) => {
                let text = text.trim().to_lowercase();
                info!("dispatch [{}]: recognized \"{}\"", event.uid(), text);
                event.set_recognized_text(text);
            }
            Err(CollaboratorError::Unavailable) => {}
            Err(e) => error!("dispatch [{}]: speech recognition: {}", event.uid(), e),
        }

        // 3. signal report request
        let callsign = event.recognized_text().and_then(|text| {
            match parse_signal_report_request(text, &self.config.trigger_phrase) {
                Ok(call) => Some(call),
                Err(CallsignError::NoTrigger) => None,
                Err(e) => {
                    warn!("dispatch [{}]: {}", event.uid(), e);
                    None
                }
            }
        });

        // 4. response
        let mut response = None;
        let mut suppressed = false;
        if let Some(call) = &callsign {
            if self.recent.check(call, now) {
                let text = format!(
                    "{}, Your signal is {} with an SNR of {:.1} dB.",
                    call,
                    s_meter,
                    snr.unwrap_or(0.0)
                );
                info!("dispatch [{}]: responding: {}", event.uid(), text);
                self.last_report = Some(text.clone());
                if let Err(e) = self.speaker.speak(&text) {
                    error!("dispatch [{}]: text to speech: {}", event.uid(), e);
                }
                response = Some(text);
            } else {
                info!(
                    "dispatch [{}]: {} was answered within the last {:?}; not responding",
                    event.uid(),
                    call,
                    self.recent.window()
                );
                suppressed = true;
            }
        }

        // 5. persist
        let report = SignalReport {
            uid: event.uid().to_owned(),
            timestamp: *event.timestamp(),
            callsign,
            s_meter: s_meter.to_string(),
            snr_db: snr,
            duration_sec: event.duration(),
            vad_trigger_threshold: baseline.map(|bl| bl.threshold),
            recognized_text: event.recognized_text().map(str::to_owned),
        };
        match self.log.append(&report) {
            Ok(()) => debug!("dispatch [{}]: report saved", event.uid()),
            Err(CollaboratorError::Unavailable) => {}
            Err(e) => error!("dispatch [{}]: saving report: {}", event.uid(), e),
        }

        DispatchOutcome {
            event,
            report,
            response,
            suppressed,
        }
    }

    /// Most recent spoken signal report
    pub fn last_report(&self) -> Option<&str> {
        self.last_report.as_deref()
    }

    /// Speech recognition vocabulary
    pub fn grammar(&self) -> &[String] {
        &self.grammar
    }

    /// Settings in use
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Text-to-speech collaborator
    ///
    /// Clients may use this to speak responses to other
    /// requests, such as DTMF commands.
    pub fn speaker(&mut self) -> &mut S {
        &mut self.speaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use num_complex::Complex32;

    use crate::event::EndReason;

    struct FixedTranscriber(Option<String>);

    impl Transcriber for FixedTranscriber {
        fn transcribe(
            &mut self,
            pcm: &[i16],
            _sample_rate: u32,
            grammar: &[String],
        ) -> Result<String, CollaboratorError> {
            assert!(!pcm.is_empty());
            assert!(grammar.contains(&"kilo".to_owned()));
            self.0
                .clone()
                .ok_or_else(|| CollaboratorError::Failed("no result".to_owned()))
        }
    }

    #[derive(Default)]
    struct RecordingSpeaker {
        spoken: Vec<String>,
        fail: bool,
    }

    impl Speaker for RecordingSpeaker {
        fn speak(&mut self, text: &str) -> Result<(), CollaboratorError> {
            self.spoken.push(text.to_owned());
            if self.fail {
                Err(CollaboratorError::Timeout(Duration::from_secs(20)))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct MemoryLog(Vec<SignalReport>);

    impl ReportLog for MemoryLog {
        fn append(&mut self, report: &SignalReport) -> Result<(), CollaboratorError> {
            self.0.push(report.clone());
            Ok(())
        }
    }

    fn dispatcher(text: Option<&str>) -> Dispatcher<FixedTranscriber, RecordingSpeaker, MemoryLog> {
        Dispatcher::new(
            DispatchConfig::default(),
            FixedTranscriber(text.map(str::to_owned)),
            RecordingSpeaker::default(),
            MemoryLog::default(),
        )
    }

    // 1 s transmission at -50 dBFS
    fn event() -> TransmissionEvent {
        let amp = (1.0e-5f32).sqrt();
        TransmissionEvent::new(
            vec![0.1; 16000],
            vec![Complex32::new(amp, 0.0); 1024],
            16000,
            EndReason::Silence,
        )
    }

    fn baseline() -> Baseline {
        Baseline {
            mean_rf_power: 1.0e-7,
            std_rf_power: 1.0e-8,
            noise_floor_power: 1.0e-7,
            tone_reference_power: 0.0,
            threshold: 1.2e-7,
            fallback: false,
        }
    }

    #[test]
    fn test_recent_call_cache() {
        let t0 = Instant::now();
        let mut cache = RecentCallCache::new(Duration::from_secs(10));
        assert!(cache.check("K1ABC", t0));
        assert!(!cache.check("K1ABC", t0 + Duration::from_secs(5)));

        // suppressed requests do not extend the window
        assert!(cache.check("K1ABC", t0 + Duration::from_secs(10)));

        assert!(cache.check("W1AW", t0 + Duration::from_secs(11)));
        assert!(cache.check("K1ABC", t0 + Duration::from_secs(12)));
    }

    #[test]
    fn test_dispatch_report() {
        let mut disp = dispatcher(Some(" Kilo One Alfa Bravo Charlie Signal Report\n"));
        let bl = baseline();
        let out = disp.dispatch(event(), Some(&bl), Instant::now());

        // -50 dBFS; 1e-5 / 1e-7 - 1 = 99 → 19.96 dB
        assert_eq!(SMeter::Over(12), out.event.s_meter());
        let snr = out.event.snr_db().expect("no snr");
        assert!((snr - 19.956).abs() < 0.01, "snr {}", snr);
        assert_eq!(
            Some("kilo one alfa bravo charlie signal report"),
            out.event.recognized_text()
        );

        let expect = "K1ABC, Your signal is S9 plus 12 dB with an SNR of 20.0 dB.";
        assert_eq!(Some(expect), out.response.as_deref());
        assert_eq!(vec![expect.to_owned()], disp.speaker().spoken);
        assert_eq!(Some(expect), disp.last_report());
        assert!(!out.suppressed);

        assert_eq!(1, disp.log.0.len());
        let rec = &disp.log.0[0];
        assert_eq!(Some("K1ABC".to_owned()), rec.callsign);
        assert_eq!("S9 plus 12 dB", rec.s_meter);
        assert_eq!(Some(1.2e-7), rec.vad_trigger_threshold);
        assert_eq!(1.0, rec.duration_sec);
        assert_eq!(out.event.uid(), rec.uid);
    }

    #[test]
    fn test_dispatch_debounce() {
        let mut disp = dispatcher(Some("kilo one alfa bravo charlie signal report"));
        let t0 = Instant::now();

        let first = disp.dispatch(event(), None, t0);
        assert!(first.response.is_some());
        let second = disp.dispatch(event(), None, t0 + Duration::from_secs(3));
        assert!(second.response.is_none());
        assert!(second.suppressed);
        assert_eq!(1, disp.speaker().spoken.len());

        // both are still logged
        assert_eq!(2, disp.log.0.len());
        assert_eq!(Some("K1ABC".to_owned()), disp.log.0[1].callsign);
    }

    #[test]
    fn test_dispatch_no_request() {
        let mut disp = dispatcher(Some("hello there"));
        let out = disp.dispatch(event(), None, Instant::now());
        assert!(out.response.is_none());
        assert!(!out.suppressed);
        assert!(disp.speaker().spoken.is_empty());
        assert_eq!(None, disp.log.0[0].callsign);
        assert_eq!(Some("hello there".to_owned()), disp.log.0[0].recognized_text);
        assert_eq!(None, disp.log.0[0].vad_trigger_threshold);
        assert!(disp.last_report().is_none());

        // invalid callsign
        let mut disp = dispatcher(Some("alfa bravo signal report"));
        let out = disp.dispatch(event(), None, Instant::now());
        assert!(out.response.is_none());
        assert_eq!(1, disp.log.0.len());
    }

    #[test]
    fn test_dispatch_collaborator_failures() {
        // transcription fails: still logged
        let mut disp = dispatcher(None);
        let out = disp.dispatch(event(), None, Instant::now());
        assert!(out.event.recognized_text().is_none());
        assert_eq!(1, disp.log.0.len());

        // speaker fails: not fatal, report still remembered
        let mut disp = dispatcher(Some("kilo one alfa bravo charlie signal report"));
        disp.speaker().fail = true;
        let out = disp.dispatch(event(), None, Instant::now());
        assert!(out.response.is_some());
        assert!(disp.last_report().is_some());
        assert_eq!(1, disp.log.0.len());
    }

    #[test]
    fn test_dispatch_without_iq() {
        let mut disp = dispatcher(Some("kilo one alfa bravo charlie signal report"));
        let evt = TransmissionEvent::new(vec![0.0; 16000], vec![], 16000, EndReason::Silence);
        let out = disp.dispatch(evt, None, Instant::now());
        assert_eq!(SMeter::Unknown, out.event.s_meter());
        assert_eq!(None, out.report.snr_db);
        assert_eq!(
            Some("K1ABC, Your signal is Unknown with an SNR of 0.0 dB."),
            out.response.as_deref()
        );
    }
}
