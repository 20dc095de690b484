//! Consumer loop
//!
//! The consumer owns the [`Monitor`] and [`Dispatcher`]. It
//! receives [`AudioChunk`]s in order from the producer and
//! acts on every [`MonitorEvent`]:
//!
//! * transmissions are dispatched for signal reports, and
//!   played back in parrot mode;
//! * DTMF commands are answered by voice;
//! * baseline changes are written to the status file.
//!
//! When no chunk arrives for a short while, the consumer
//! performs housekeeping such as station identification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};

use sigrep::{
    AudioChunk, DispatchOutcome, Dispatcher, DtmfCommand, Monitor, MonitorEvent, ReportLog,
    Speaker, Transcriber,
};

use crate::spawner::{self, ChildCommand, Query};
use crate::store::{Status, StatusFile};

/// Idle time before housekeeping
pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(100);

/// Consumer settings
#[derive(Clone, Debug)]
pub struct Config {
    /// Print transmission summaries to stdout
    pub quiet: bool,

    /// Our callsign
    pub station_id: Option<String>,

    /// Station identification interval
    pub id_interval: Duration,

    /// Parrot mode playback
    pub play_cmd: Option<ChildCommand>,

    /// Weather and band conditions
    pub query_cmd: Option<ChildCommand>,

    /// Status file
    pub status_file: Option<StatusFile>,
}

/// Run the consumer until the producer hangs up
///
/// Returns early if `shutdown` is set.
pub fn run<T, S, L>(
    cfg: &Config,
    monitor: &mut Monitor,
    dispatcher: &mut Dispatcher<T, S, L>,
    input: Receiver<AudioChunk>,
    shutdown: &AtomicBool,
) where
    T: Transcriber,
    S: Speaker,
    L: ReportLog,
{
    let mut app = App {
        cfg,
        responder: Responder::new(monitor.command_matcher().help_text()),
        station_id: cfg
            .station_id
            .as_ref()
            .map(|call| StationIdTimer::new(call, cfg.id_interval)),
    };
    app.write_status(&Status::Baselining);
    if let Some(bl) = monitor.baseline() {
        app.write_status(&Status::from(bl));
    }

    while !shutdown.load(Ordering::Relaxed) {
        match input.recv_timeout(HOUSEKEEPING_INTERVAL) {
            Ok(chunk) => match monitor.process(&chunk) {
                Ok(evts) => {
                    for evt in evts {
                        app.handle(evt, monitor, dispatcher);
                    }
                }
                Err(e) => warn!("skipping chunk: {}", e),
            },
            Err(RecvTimeoutError::Timeout) => app.housekeeping(dispatcher),
            Err(RecvTimeoutError::Disconnected) => {
                debug!("input exhausted");
                if let Some(evt) = monitor.flush() {
                    app.handle(evt, monitor, dispatcher);
                }
                app.housekeeping(dispatcher);
                break;
            }
        }
    }
}

struct App<'cfg> {
    cfg: &'cfg Config,
    responder: Responder,
    station_id: Option<StationIdTimer>,
}

impl<'cfg> App<'cfg> {
    fn handle<T, S, L>(
        &mut self,
        evt: MonitorEvent,
        monitor: &Monitor,
        dispatcher: &mut Dispatcher<T, S, L>,
    ) where
        T: Transcriber,
        S: Speaker,
        L: ReportLog,
    {
        match &evt {
            MonitorEvent::Digit(_) | MonitorEvent::CaptureStarted { .. } => debug!("{}", evt),
            _ => info!("{}", evt),
        }

        match evt {
            MonitorEvent::BaselineReady(bl) => self.write_status(&Status::from(&bl)),
            MonitorEvent::Transmission(tx) => {
                if self.responder.parrot {
                    self.parrot(tx.to_pcm(), tx.sample_rate());
                }
                let outcome = dispatcher.dispatch(tx, monitor.baseline(), Instant::now());
                self.report(&outcome);
                if outcome.response.is_some() {
                    self.transmitted();
                }
            }
            MonitorEvent::Command(cmd) => {
                let text = self.respond(&cmd, dispatcher.last_report());
                speak(dispatcher.speaker(), &text);
                if cmd == DtmfCommand::StationId {
                    if let Some(timer) = self.station_id.as_mut() {
                        timer.identified(Instant::now());
                    }
                } else {
                    self.transmitted();
                }
            }
            _ => {}
        }
    }

    fn housekeeping<T, S, L>(&mut self, dispatcher: &mut Dispatcher<T, S, L>)
    where
        T: Transcriber,
        S: Speaker,
        L: ReportLog,
    {
        let now = Instant::now();
        if let Some(timer) = self.station_id.as_mut() {
            if timer.due(now) {
                info!("station identification");
                let text = timer.announcement();
                timer.identified(now);
                speak(dispatcher.speaker(), &text);
            }
        }
    }

    fn respond(&mut self, cmd: &DtmfCommand, last_report: Option<&str>) -> String {
        let query_cmd = self.cfg.query_cmd.as_ref();
        self.responder.respond(
            cmd,
            &Local::now(),
            self.cfg.station_id.as_deref(),
            last_report,
            |q| match spawner::query(query_cmd?, q) {
                Ok(text) => Some(text),
                Err(e) => {
                    error!("query: {}", e);
                    None
                }
            },
        )
    }

    fn parrot(&self, pcm: Vec<i16>, sample_rate: u32) {
        match &self.cfg.play_cmd {
            Some(cmd) => {
                if let Err(e) = spawner::play(cmd, &pcm, sample_rate) {
                    error!("parrot playback: {}", e);
                }
            }
            None => warn!("parrot mode is on, but there is no --play-cmd"),
        }
    }

    fn report(&self, outcome: &DispatchOutcome) {
        if self.cfg.quiet {
            return;
        }
        match &outcome.response {
            Some(text) => println!("{} [{}]", outcome.event, text),
            None => println!("{}", outcome.event),
        }
    }

    fn transmitted(&mut self) {
        if let Some(timer) = self.station_id.as_mut() {
            timer.transmitted();
        }
    }

    fn write_status(&self, status: &Status) {
        if let Some(file) = &self.cfg.status_file {
            if let Err(e) = file.write(status) {
                error!("unable to write status file: {}", e);
            }
        }
    }
}

fn speak<S: Speaker>(speaker: &mut S, text: &str) {
    info!("speaking: {}", text);
    if let Err(e) = speaker.speak(text) {
        error!("text to speech: {}", e);
    }
}

/// Answers DTMF commands
#[derive(Clone, Debug)]
struct Responder {
    help: String,
    parrot: bool,
}

impl Responder {
    fn new(help: String) -> Self {
        Self {
            help,
            parrot: false,
        }
    }

    // text to speak in reply to `cmd`
    //
    // `query` fetches weather and band conditions.
    fn respond<F>(
        &mut self,
        cmd: &DtmfCommand,
        now: &DateTime<Local>,
        station_id: Option<&str>,
        last_report: Option<&str>,
        query: F,
    ) -> String
    where
        F: FnOnce(Query<'_>) -> Option<String>,
    {
        match cmd {
            DtmfCommand::StationId => match station_id {
                Some(call) => format!("This is {}", call),
                None => "This station has no callsign configured".to_owned(),
            },
            DtmfCommand::Time => format!("The time is {}", now.format("%H:%M")),
            DtmfCommand::Date => format!("Today is {}", now.format("%A, %B %-d")),
            DtmfCommand::Weather { zip } => query(Query::Weather(zip))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("Weather for {} is not available", zip)),
            DtmfCommand::BandConditions => query(Query::Bands)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Band conditions are not available".to_owned()),
            DtmfCommand::LastReport => last_report
                .map(str::to_owned)
                .unwrap_or_else(|| "No signal reports yet".to_owned()),
            DtmfCommand::Parrot => {
                self.parrot = !self.parrot;
                if self.parrot {
                    "Parrot mode on".to_owned()
                } else {
                    "Parrot mode off".to_owned()
                }
            }
            DtmfCommand::Help => self.help.clone(),
        }
    }
}

/// Periodic station identification
///
/// An identification is due once we have transmitted and
/// the interval has elapsed since the last identification.
#[derive(Clone, Debug)]
struct StationIdTimer {
    callsign: String,
    interval: Duration,
    last_id: Option<Instant>,
    pending: bool,
}

impl StationIdTimer {
    fn new(callsign: &str, interval: Duration) -> Self {
        Self {
            callsign: callsign.to_owned(),
            interval,
            last_id: None,
            pending: false,
        }
    }

    fn transmitted(&mut self) {
        self.pending = true;
    }

    fn identified(&mut self, now: Instant) {
        self.last_id = Some(now);
        self.pending = false;
    }

    fn due(&self, now: Instant) -> bool {
        self.pending
            && match self.last_id {
                Some(last) => now.saturating_duration_since(last) >= self.interval,
                None => true,
            }
    }

    fn announcement(&self) -> String {
        format!("This is {}", self.callsign)
    }
}
