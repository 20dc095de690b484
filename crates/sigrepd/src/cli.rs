use std::fmt::Display;

use clap::{error::ErrorKind, value_parser, CommandFactory, Parser};

use crate::source::SampleFormat;

/// Standard input filename
const STDIN_FILE: &str = "-";

const USAGE_SHORT: &str = r#"
This program accepts raw complex (IQ) samples from a software-defined radio tuned to a narrowband FM channel. It captures each transmission, measures its signal strength, and answers spoken "signal report" requests and DTMF commands.

See --help for more details.

ALWAYS IDENTIFY YOUR STATION AS REQUIRED BY LAW!
"#;

const USAGE_LONG: &str = r#"
This program accepts raw complex (IQ) samples from a software-defined radio tuned to a narrowband FM channel. It captures each transmission, measures its signal strength, and answers spoken "signal report" requests and DTMF commands.

You can pipe in samples with rtl_sdr

    rtl_sdr -f 146.52M -s 1024000 - \
        | sigrepd --station-id N0CALL \
            --stt-cmd "my-recognizer --model en" \
            --log-file reports.jsonl

The first few seconds of input are used to measure the channel noise. Keep the channel clear while sigrepd starts.

Speech recognition is performed by the --stt-cmd child process. It receives each transmission as signed 16-bit native-endian mono PCM on its standard input and must print its transcript to standard output. The child receives these environment variables:

  SIGREP_RATE="16000" (audio sampling rate)
  SIGREP_GRAMMAR='["alfa","bravo",...]' (JSON array of words)

Replies are spoken with --tts-cmd, which receives the text to speak as its final argument.

The --query-cmd child answers weather and band-condition requests. It receives:

  SIGREP_QUERY="weather" (or "bands")
  SIGREP_ZIP="12345" (weather only)

and must print the text to speak on standard output.

Child commands are split on whitespace, without shell interpretation.

ALWAYS IDENTIFY YOUR STATION AS REQUIRED BY LAW!
"#;

const ADVANCED: &str = "Advanced Squelch Options";
const COMMANDS: &str = "DTMF Command Codes";

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print NOTHING, not even transmission summaries
    #[arg(short, long)]
    pub quiet: bool,

    /// Input file (or "-" for stdin)
    ///
    /// The input must be interleaved complex samples in the
    /// given --format at --iq-rate.
    #[arg(long, default_value_t = STDIN_FILE.to_string())]
    pub file: String,

    /// Input sample format
    #[arg(long, value_enum, default_value_t = SampleFormat::Cu8)]
    pub format: SampleFormat,

    /// Complex sampling rate of the input (Hz)
    #[arg(long, default_value_t = 1_024_000)]
    pub iq_rate: u32,

    /// Audio sampling rate (Hz)
    ///
    /// The input is demodulated and decimated by a whole number
    /// to approximately this rate.
    #[arg(short, long, default_value_t = 16000)]
    pub rate: u32,

    /// Complex samples per processing block
    #[arg(long, default_value_t = 16384)]
    #[arg(value_parser = value_parser!(u32).range(64..))]
    pub block_len: u32,

    /// Gate on a sub-audible CTCSS tone (Hz)
    ///
    /// If omitted, transmissions are detected by RF power.
    #[arg(long, value_name = "HZ")]
    pub ctcss: Option<f32>,

    /// Noise measurement at startup (s)
    #[arg(long, default_value_t = 3.0)]
    pub warmup: f32,

    /// Your callsign, for station identification
    #[arg(long, value_name = "CALL")]
    pub station_id: Option<String>,

    /// Station identification interval (minutes)
    ///
    /// After sigrepd transmits, it identifies itself if it has
    /// not done so within this interval. Requires --station-id.
    #[arg(long, default_value_t = 10.0)]
    pub id_interval: f32,

    /// Phrase which ends a spoken request
    #[arg(long, default_value_t = sigrep::DEFAULT_TRIGGER_PHRASE.to_string())]
    pub trigger: String,

    /// Ignore repeat requests from the same callsign (s)
    #[arg(long, default_value_t = 10.0)]
    pub debounce: f32,

    /// Speech recognition command. Optional.
    #[arg(long, value_name = "CMD")]
    pub stt_cmd: Option<String>,

    /// Text-to-speech command
    ///
    /// Defaults to `say` on macOS and `espeak` elsewhere.
    #[arg(long, value_name = "CMD")]
    pub tts_cmd: Option<String>,

    /// Text-to-speech time limit (s)
    #[arg(long, default_value_t = 20.0)]
    pub tts_timeout: f32,

    /// Audio playback command, for parrot mode. Optional.
    ///
    /// Receives 16-bit native-endian mono PCM at --rate.
    #[arg(long, value_name = "CMD")]
    pub play_cmd: Option<String>,

    /// Weather and band conditions command. Optional.
    #[arg(long, value_name = "CMD")]
    pub query_cmd: Option<String>,

    /// Append signal reports to this file (JSON lines)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<String>,

    /// Write monitor status to this file (JSON)
    #[arg(long, value_name = "PATH")]
    pub status_file: Option<String>,

    /// Power which reads as S9 (dBFS)
    #[arg(long, default_value_t = sigrep::DEFAULT_S9_REFERENCE_DBFS)]
    #[arg(allow_negative_numbers = true)]
    pub s9_reference: f32,

    /// Report negative SNRs as they are, not as zero
    #[arg(long)]
    pub no_snr_clamp: bool,

    /// Threshold is mean + K × std. dev. of noise power
    #[arg(long, default_value_t = 3.5)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub threshold_k: f32,

    /// Minimum RF power threshold
    #[arg(long, default_value_t = 1.0e-9)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub min_threshold: f32,

    /// RF power threshold if the noise was not measured
    #[arg(long, default_value_t = 1.0e-7)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub fallback_threshold: f32,

    /// Tone threshold is this × strongest tone in noise
    #[arg(long, default_value_t = 2.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub tone_multiplier: f32,

    /// Minimum tone threshold (0.0 ≤ PWR ≤ 1.0)
    #[arg(long, default_value_t = 1.0e-4)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub tone_floor: f32,

    /// Open chunks required to start a capture
    #[arg(long)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub consecutive: Option<u32>,

    /// RF power squelch hangover (s)
    #[arg(long, default_value_t = 1.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub silence: f32,

    /// Tone squelch hold time (s)
    #[arg(long, default_value_t = 0.5)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub tone_hold: f32,

    /// Shortest transmission kept (s)
    #[arg(long, default_value_t = 0.75)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub min_duration: f32,

    /// Longest transmission captured (s)
    #[arg(long, default_value_t = 10.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub max_duration: f32,

    /// Minimum DTMF tone power (0.0 ≤ PWR ≤ 1.0)
    #[arg(long, default_value_t = 1.0e-3)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub dtmf_min_power: f32,

    /// DTMF tone must exceed others in its group by this ratio
    #[arg(long, default_value_t = 10.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub dtmf_dominance: f32,

    /// Weaker DTMF tone must be this fraction of the stronger
    #[arg(long, default_value_t = 0.2)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub dtmf_balance: f32,

    /// Processing queue depth (blocks)
    #[arg(long, default_value_t = 64)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub queue_depth: u32,

    /// Station identification
    #[arg(long, default_value = "#90")]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = COMMANDS)]
    pub code_station_id: String,

    /// Time
    #[arg(long, default_value = "#91")]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = COMMANDS)]
    pub code_time: String,

    /// Date
    #[arg(long, default_value = "#92")]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = COMMANDS)]
    pub code_date: String,

    /// Weather, followed by a five-digit zip code
    #[arg(long, default_value = "#93")]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = COMMANDS)]
    pub code_weather: String,

    /// Band conditions
    #[arg(long, default_value = "#94")]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = COMMANDS)]
    pub code_bands: String,

    /// Last signal report
    #[arg(long, default_value = "#95")]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = COMMANDS)]
    pub code_last_report: String,

    /// Parrot mode on/off
    #[arg(long, default_value = "#96")]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = COMMANDS)]
    pub code_parrot: String,

    /// Help
    #[arg(long, default_value = "#99")]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = COMMANDS)]
    pub code_help: String,
}

impl Args {
    /// Return true if the user requests input from stdin
    pub fn input_is_stdin(&self) -> bool {
        self.file == STDIN_FILE
    }

    /// DTMF command codes
    pub fn command_codes(&self) -> sigrep::CommandCodes {
        sigrep::CommandCodes {
            station_id: self.code_station_id.clone(),
            time: self.code_time.clone(),
            date: self.code_date.clone(),
            weather: self.code_weather.clone(),
            bands: self.code_bands.clone(),
            last_report: self.code_last_report.clone(),
            parrot: self.code_parrot.clone(),
            help: self.code_help.clone(),
        }
    }

    /// Squelch threshold policy
    pub fn baseline_params(&self) -> sigrep::BaselineParams {
        sigrep::BaselineParams {
            std_multiplier: self.threshold_k,
            min_power_threshold: self.min_threshold,
            fallback_power_threshold: self.fallback_threshold,
            tone_multiplier: self.tone_multiplier,
            min_tone_threshold: self.tone_floor,
            ..sigrep::BaselineParams::default()
        }
    }
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors
    /// are printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}
