//! Spawns collaborator child processes
//!
//! Speech recognition, speech synthesis, audio playback, and
//! information queries are all performed by external programs.
//! Each is given as a command line which is split on whitespace
//! and run without shell interpretation.

use std::ffi::OsStr;
use std::io::{self, Write};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{NativeEndian, WriteBytesExt};
use log::{debug, warn};

use sigrep::{CollaboratorError, Speaker, Transcriber};

/// How often to check on a child with a time limit
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A program and its arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildCommand {
    program: String,
    args: Vec<String>,
}

impl ChildCommand {
    /// Split a command line on whitespace
    ///
    /// Returns `None` if `cmdline` is blank.
    pub fn parse(cmdline: &str) -> Option<Self> {
        let mut words = cmdline.split_whitespace().map(str::to_owned);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    /// Default text-to-speech program for this OS
    pub fn default_tts() -> Self {
        let program = if cfg!(target_os = "macos") {
            "say"
        } else {
            "espeak"
        };
        Self {
            program: program.to_owned(),
            args: vec![],
        }
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    // Prepare to run, with extra arguments at the end
    fn command<A, B>(&self, extra: A) -> Command
    where
        B: AsRef<OsStr>,
        A: IntoIterator<Item = B>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).args(extra);
        cmd
    }
}

/// Speech recognition by child process
///
/// The child receives 16-bit native-endian PCM on its
/// standard input and prints its transcript.
#[derive(Clone, Debug)]
pub struct SttProcess {
    cmd: ChildCommand,
}

impl SttProcess {
    pub fn new(cmd: ChildCommand) -> Self {
        Self { cmd }
    }
}

impl Transcriber for SttProcess {
    fn transcribe(
        &mut self,
        pcm: &[i16],
        sample_rate: u32,
        grammar: &[String],
    ) -> Result<String, CollaboratorError> {
        let grammar = serde_json::to_string(grammar)
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        let child = self
            .cmd
            .command(std::iter::empty::<&str>())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .env(childenv::SIGREP_RATE, sample_rate.to_string())
            .env(childenv::SIGREP_GRAMMAR, grammar)
            .spawn()?;
        debug!("spawned speech recognizer PID {}", child.id());

        let output = pipe_pcm_and_wait(child, pcm)?;
        success_stdout(self.cmd.program(), output)
    }
}

/// Speech synthesis by child process
///
/// The text to speak is the child's final argument. Children
/// which run longer than the timeout are killed.
#[derive(Clone, Debug)]
pub struct TtsProcess {
    cmd: ChildCommand,
    timeout: Duration,
}

impl TtsProcess {
    pub fn new(cmd: ChildCommand, timeout: Duration) -> Self {
        Self { cmd, timeout }
    }
}

impl Speaker for TtsProcess {
    fn speak(&mut self, text: &str) -> Result<(), CollaboratorError> {
        let mut child = self
            .cmd
            .command([text])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;
        debug!("spawned text to speech PID {}", child.id());

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return if status.success() {
                    Ok(())
                } else {
                    Err(CollaboratorError::Failed(format!(
                        "{} exited with status {}",
                        self.cmd.program(),
                        status.code().unwrap_or(1)
                    )))
                };
            }

            if started.elapsed() >= self.timeout {
                warn!("{} did not finish; killing it", self.cmd.program());
                drop(child.kill());
                drop(child.wait());
                return Err(CollaboratorError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Play 16-bit PCM audio with a child process
pub fn play(cmd: &ChildCommand, pcm: &[i16], sample_rate: u32) -> Result<(), CollaboratorError> {
    let child = cmd
        .command(std::iter::empty::<&str>())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .env(childenv::SIGREP_RATE, sample_rate.to_string())
        .spawn()?;
    debug!("spawned playback PID {}", child.id());

    let output = pipe_pcm_and_wait(child, pcm)?;
    success_stdout(cmd.program(), output).map(|_| ())
}

/// Kind of information query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query<'a> {
    /// Weather for a zip code
    Weather(&'a str),

    /// HF band conditions
    Bands,
}

/// Ask a child process for text to speak
pub fn query(cmd: &ChildCommand, query: Query<'_>) -> Result<String, CollaboratorError> {
    let (kind, zip) = match query {
        Query::Weather(zip) => ("weather", zip),
        Query::Bands => ("bands", ""),
    };

    let output = cmd
        .command(std::iter::empty::<&str>())
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .env(childenv::SIGREP_QUERY, kind)
        .env(childenv::SIGREP_ZIP, zip)
        .output()?;
    success_stdout(cmd.program(), output)
}

mod childenv {
    /// Audio sampling rate
    ///
    /// The rate of the 16-bit PCM audio on the child's
    /// standard input, in Hz.
    pub const SIGREP_RATE: &str = "SIGREP_RATE";

    /// Speech recognition vocabulary
    ///
    /// A JSON array of lowercase words. Recognizers should
    /// constrain their output to these words:
    ///
    /// ```txt
    /// ["0","1",…,"alfa","alpha","bravo",…,"report","signal",…]
    /// ```
    pub const SIGREP_GRAMMAR: &str = "SIGREP_GRAMMAR";

    /// Information requested
    ///
    /// |             |                     |
    /// |-------------|---------------------|
    /// | "`weather`" | Weather forecast    |
    /// | "`bands`"   | HF band conditions  |
    pub const SIGREP_QUERY: &str = "SIGREP_QUERY";

    /// Five-digit zip code for weather
    ///
    /// Empty for other queries.
    pub const SIGREP_ZIP: &str = "SIGREP_ZIP";
}

// write all of `pcm` to the child, close its stdin, and wait
fn pipe_pcm_and_wait(mut child: Child, pcm: &[i16]) -> io::Result<Output> {
    if let Some(mut pipe) = child.stdin.take() {
        let mut bytes = Vec::with_capacity(pcm.len() * 2);
        for sa in pcm {
            bytes.write_i16::<NativeEndian>(*sa)?;
        }
        if let Err(e) = pipe.write_all(&bytes) {
            warn!("child process closed its input early: {}", e);
        }
        // pipe is dropped here, closing stdin
    }
    child.wait_with_output()
}

// trimmed stdout of a successful child
fn success_stdout(program: &str, output: Output) -> Result<String, CollaboratorError> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    } else {
        Err(CollaboratorError::Failed(format!(
            "{} exited with status {}",
            program,
            output.status.code().unwrap_or(1)
        )))
    }
}
