//! # sigrep: Narrowband FM Signal Reports
//!
//! This crate watches a single narrowband FM channel for voice
//! transmissions. Each complete transmission is measured for
//! signal strength and quality. A station that asks for a
//! "signal report" by voice is answered with its
//! [S-meter](https://en.wikipedia.org/wiki/S_meter) reading and
//! signal-to-noise ratio. Listeners may also request canned
//! announcements with DTMF touch-tone commands.
//!
//! ## Disclaimer
//!
//! This crate is dual-licensed MIT and Apache 2.0. Read these licenses
//! carefully as they may affect your rights.
//!
//! Signal strength readings are *uncalibrated*. They are relative to
//! a configurable full-scale reference and depend on your receiver's
//! gain settings. Operators are responsible for the lawful
//! identification of any station which transmits automated replies.
//!
//! ## Example
//!
//! You will need a source of complex baseband samples from a
//! software-defined radio, tuned to the channel of interest.
//! The [`Preprocessor`] demodulates these into
//! [`AudioChunk`]s. If you already have demodulated audio, you
//! may build chunks yourself.
//!
//! ```
//! use sigrep::{MonitorBuilder, MonitorEvent, Preprocessor, SquelchMode};
//! # use num_complex::Complex32;
//! # let some_iq_block_iterator = || std::iter::once(vec![Complex32::new(0.0, 0.0); 16384]);
//!
//! // complex samples at 1.024 MHz, audio at 16 kHz
//! let mut pre = Preprocessor::new(1_024_000, 16000, true);
//!
//! let mut monitor = MonitorBuilder::new(pre.audio_rate())
//!     .with_squelch(SquelchMode::Power)  // or SquelchMode::Tone for CTCSS
//!     .with_warmup_duration(3.0)         // seconds of noise baseline
//!     .with_duration_limits(0.75, 10.0)  // transmission length, seconds
//!     .build();
//!
//! let chunks = some_iq_block_iterator().filter_map(|iq| pre.process(iq));
//! for evt in monitor.iter(chunks) {
//!     match evt {
//!         MonitorEvent::Transmission(tx) => {
//!             println!("heard {:.1} s of audio", tx.duration());
//!         }
//!         MonitorEvent::Command(cmd) => {
//!             println!("requested: {}", cmd.description());
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! The [`Monitor`] is created via a [builder](MonitorBuilder).
//! It first spends a few seconds measuring the channel's noise
//! baseline. Transmissions which open the squelch afterwards are
//! captured in full and reported as a [`TransmissionEvent`].
//!
//! Captured transmissions are handed to a [`Dispatcher`], which
//! measures them, transcribes them with a speech recognizer of
//! your choosing, and speaks the reply. Speech recognition,
//! speech synthesis, and report storage are all supplied by the
//! caller via the [`Transcriber`], [`Speaker`], and [`ReportLog`]
//! traits.
//!
//! ```
//! use sigrep::{parse_signal_report_request, is_valid_callsign};
//!
//! let call = parse_signal_report_request(
//!     "kilo alpha one bravo charlie delta signal report",
//!     "signal report",
//! ).expect("not a request");
//! assert_eq!(call, "KA1BCD");
//! assert!(is_valid_callsign(&call));
//! ```
//!
//! ## Background
//!
//! Amateur and land-mobile FM repeaters often carry a
//! sub-audible [CTCSS](https://en.wikipedia.org/wiki/Continuous_Tone-Coded_Squelch_System)
//! tone for the duration of each transmission. When a tone
//! frequency is configured, the monitor uses its presence instead
//! of RF power to decide when a transmission begins and ends.
//! Both the CTCSS and DTMF detectors use the
//! [Goertzel algorithm](https://en.wikipedia.org/wiki/Goertzel_algorithm).

mod baseline;
mod builder;
mod callsign;
mod capture;
mod chunk;
mod command;
mod demod;
mod dispatch;
mod dtmf;
mod event;
mod goertzel;
mod metrics;
mod monitor;
mod squelch;

pub use baseline::{Baseline, BaselineEstimator, BaselineParams};
pub use builder::MonitorBuilder;
pub use callsign::{
    grammar, is_valid_callsign, parse_signal_report_request, phonetic_to_char,
    words_to_callsign, CallsignError, DEFAULT_TRIGGER_PHRASE,
};
pub use capture::{CaptureEvent, CaptureLimits, CaptureState, CaptureStateMachine};
pub use chunk::{AudioChunk, ChunkError};
pub use command::{CommandCodes, CommandMatcher, DtmfCommand};
pub use demod::{Preprocessor, NORMALIZED_PEAK};
pub use dispatch::{
    CollaboratorError, DispatchConfig, DispatchOutcome, Dispatcher, RecentCallCache, ReportLog,
    SignalReport, Speaker, Transcriber,
};
pub use dtmf::{DigitEvent, DtmfDecoder, DtmfParams, DIGIT_BUFFER_LEN};
pub use event::{EndReason, MonitorEvent, TransmissionEvent};
pub use goertzel::{measure_bank, ToneDetector};
pub use metrics::{mean_power, power_to_dbfs, snr_db, SMeter, DEFAULT_S9_REFERENCE_DBFS};
pub use monitor::{ChunkIter, Monitor, MonitorEvents};
pub use squelch::{Gate, SquelchMode, ToneMeter};
