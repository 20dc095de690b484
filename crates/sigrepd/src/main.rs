use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use crossbeam_channel::Sender;
use log::{debug, error, info, warn, LevelFilter};

use sigrep::{
    AudioChunk, DispatchConfig, Dispatcher, Monitor, MonitorBuilder, Preprocessor, SquelchMode,
};

mod app;
mod cli;
mod source;
mod spawner;
mod store;

use cli::{Args, CliError};
use source::IqReader;
use spawner::{ChildCommand, SttProcess, TtsProcess};
use store::{JsonLinesLog, StatusFile};

/// How often the main thread checks on its workers
const WATCHDOG_INTERVAL: Duration = Duration::from_millis(250);

/// Exit code when a worker thread dies
const EXIT_WORKER_DIED: i32 = 2;

fn main() {
    match sigrepd() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn sigrepd() -> Result<(), CliError> {
    // Parse options and start logging
    let args = Args::try_parse()?;
    log_setup(&args);

    // demodulator and monitor
    let pre = Preprocessor::new(args.iq_rate, args.rate, true);
    if pre.audio_rate() != args.rate {
        warn!(
            "audio rate is {} Hz: --iq-rate is not a multiple of --rate",
            pre.audio_rate()
        );
    }
    let monitor = monitor_setup(&args, &pre);

    // collaborators
    let dispatcher = dispatcher_setup(&args)?;
    let cfg = app::Config {
        quiet: args.quiet,
        station_id: args.station_id.as_ref().map(|s| s.to_ascii_uppercase()),
        id_interval: secs(args.id_interval * 60.0),
        play_cmd: args.play_cmd.as_deref().and_then(ChildCommand::parse),
        query_cmd: args.query_cmd.as_deref().and_then(ChildCommand::parse),
        status_file: args.status_file.as_ref().map(StatusFile::new),
    };

    // input
    let reader = IqReader::new(file_setup(&args)?, args.format, args.block_len as usize);
    debug!(
        "reading {:?} in blocks of {} samples",
        args.format,
        reader.block_len()
    );

    // producer → consumer
    let (tx, rx) = crossbeam_channel::bounded(args.queue_depth as usize);
    let shutdown = Arc::new(AtomicBool::new(false));

    let producer = {
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("producer".to_owned())
            .spawn(move || produce(reader, pre, tx, &shutdown))
            .context("unable to start producer thread")?
    };

    let consumer = {
        let shutdown = shutdown.clone();
        let mut monitor = monitor;
        let mut dispatcher = dispatcher;
        thread::Builder::new()
            .name("consumer".to_owned())
            .spawn(move || app::run(&cfg, &mut monitor, &mut dispatcher, rx, &shutdown))
            .context("unable to start consumer thread")?
    };

    // watchdog: the consumer only exits on its own once the
    // producer hangs up
    while !consumer.is_finished() {
        thread::sleep(WATCHDOG_INTERVAL);
    }
    if consumer.join().is_err() {
        shutdown.store(true, Ordering::Relaxed);
        return Err(CliError::new(
            anyhow!("processing thread died unexpectedly"),
            EXIT_WORKER_DIED,
        ));
    }
    if producer.join().is_err() {
        return Err(CliError::new(
            anyhow!("input thread died unexpectedly"),
            EXIT_WORKER_DIED,
        ));
    }

    debug!("exiting normally");
    Ok(())
}

// read, demodulate, and queue chunks until the input ends
fn produce<R>(
    mut reader: IqReader<R>,
    mut pre: Preprocessor,
    output: Sender<AudioChunk>,
    shutdown: &AtomicBool,
) where
    R: io::Read,
{
    while !shutdown.load(Ordering::Relaxed) {
        let iq = match reader.read_block() {
            Ok(Some(iq)) => iq,
            Ok(None) => {
                info!("end of input");
                break;
            }
            Err(e) => {
                error!("unable to read input: {}", e);
                break;
            }
        };

        if let Some(chunk) = pre.process(iq) {
            if output.send(chunk).is_err() {
                debug!("consumer hung up");
                break;
            }
        }
    }
}

fn monitor_setup(args: &Args, pre: &Preprocessor) -> Monitor {
    let squelch = match args.ctcss {
        Some(frequency) => SquelchMode::Tone { frequency },
        None => SquelchMode::Power,
    };

    let mut builder = MonitorBuilder::new(pre.audio_rate());
    builder
        .with_chunk_len(args.block_len as usize / pre.decimation())
        .with_squelch(squelch)
        .with_warmup_duration(args.warmup)
        .with_baseline_params(args.baseline_params())
        .with_silence_duration(args.silence)
        .with_tone_hold(args.tone_hold)
        .with_duration_limits(args.min_duration, args.max_duration)
        .with_dtmf_thresholds(args.dtmf_min_power, args.dtmf_dominance, args.dtmf_balance)
        .with_command_codes(args.command_codes());
    if let Some(count) = args.consecutive {
        builder.with_consecutive_required(count);
    }

    info!(
        "monitoring at {} Hz audio, {} squelch, {:.1} s warm-up",
        builder.sample_rate(),
        builder.squelch(),
        args.warmup
    );
    builder.build()
}

fn dispatcher_setup(
    args: &Args,
) -> Result<Dispatcher<Option<SttProcess>, TtsProcess, Option<JsonLinesLog>>, anyhow::Error> {
    let config = DispatchConfig {
        trigger_phrase: args.trigger.clone(),
        debounce: secs(args.debounce),
        s9_reference_dbfs: args.s9_reference,
        clamp_snr: !args.no_snr_clamp,
    };

    let stt = args
        .stt_cmd
        .as_deref()
        .and_then(ChildCommand::parse)
        .map(SttProcess::new);
    if stt.is_none() {
        warn!("no --stt-cmd: spoken requests will not be answered");
    }

    let tts = TtsProcess::new(
        args.tts_cmd
            .as_deref()
            .and_then(ChildCommand::parse)
            .unwrap_or_else(ChildCommand::default_tts),
        secs(args.tts_timeout),
    );

    let log = match &args.log_file {
        Some(path) => {
            let log = JsonLinesLog::open(path)
                .with_context(|| format!("Unable to open --log-file \"{}\"", path))?;
            info!("saving signal reports to \"{}\"", log.path().display());
            Some(log)
        }
        None => None,
    };

    Ok(Dispatcher::new(config, stt, tts, log))
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("sigrep", log_filter)
            .filter_module("sigrepd", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}

fn file_setup(args: &Args) -> Result<Box<dyn io::Read + Send>, anyhow::Error> {
    if args.input_is_stdin() {
        info!("reading standard input");
        if !is_terminal(&std::io::stdin()) {
            Ok(Box::new(io::BufReader::new(io::stdin())))
        } else {
            Err(anyhow!(
                "cowardly refusing to read IQ samples from a terminal.

Pipe a source of raw IQ samples from rtl_sdr, hackrf_transfer,
or similar into this program."
            ))
        }
    } else {
        info!("reading file: \"{}\"", &args.file);
        Ok(Box::new(io::BufReader::new(
            std::fs::File::open(&args.file)
                .with_context(|| format!("Unable to open --file \"{}\"", args.file))?,
        )))
    }
}

// seconds to Duration; invalid values become zero
fn secs(val: f32) -> Duration {
    Duration::try_from_secs_f32(val).unwrap_or(Duration::ZERO)
}

#[cfg(not(target_os = "windows"))]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::fd::AsRawFd,
{
    terminal_size::terminal_size_using_fd(stream.as_raw_fd()).is_some()
}

#[cfg(target_os = "windows")]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::windows::io::AsRawHandle,
{
    terminal_size::terminal_size_using_handle(stream.as_raw_handle()).is_some()
}
