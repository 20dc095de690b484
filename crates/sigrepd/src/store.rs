//! Report log and status file

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use sigrep::{Baseline, CollaboratorError, ReportLog, SignalReport};

/// Appends signal reports to a file, one JSON object per line
#[derive(Debug)]
pub struct JsonLinesLog {
    path: PathBuf,
    file: File,
}

impl JsonLinesLog {
    /// Open `path` for appending, creating it if needed
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Path of the log
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportLog for JsonLinesLog {
    fn append(&mut self, report: &SignalReport) -> Result<(), CollaboratorError> {
        let mut line =
            serde_json::to_vec(report).map_err(|e| CollaboratorError::Failed(e.to_string()))?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Monitor status, as written to the status file
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    /// Measuring channel noise
    Baselining,

    /// Squelch armed
    Ready {
        /// Squelch threshold
        threshold: f32,

        /// True if the noise could not be measured
        fallback: bool,
    },
}

impl From<&Baseline> for Status {
    fn from(bl: &Baseline) -> Self {
        Status::Ready {
            threshold: bl.threshold,
            fallback: bl.fallback,
        }
    }
}

/// Status file for control panels
///
/// The whole file is replaced on every update.
#[derive(Clone, Debug)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Replace the file with `status`
    pub fn write(&self, status: &Status) -> anyhow::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut out, status)?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    // unique scratch file, removed on drop
    struct Scratch(PathBuf);

    impl Scratch {
        fn new(name: &str) -> Self {
            let mut path = std::env::temp_dir();
            path.push(format!("sigrepd-{}-{}", std::process::id(), name));
            drop(fs::remove_file(&path));
            Self(path)
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            drop(fs::remove_file(&self.0));
        }
    }

    fn report(uid: &str, callsign: Option<&str>) -> SignalReport {
        SignalReport {
            uid: uid.to_owned(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            callsign: callsign.map(str::to_owned),
            s_meter: "S9".to_owned(),
            snr_db: Some(20.5),
            duration_sec: 1.5,
            vad_trigger_threshold: Some(1.0e-6),
            recognized_text: Some("kilo one alfa bravo charlie signal report".to_owned()),
        }
    }

    #[test]
    fn test_json_lines() {
        let scratch = Scratch::new("reports.jsonl");
        {
            let mut log = JsonLinesLog::open(&scratch.0).expect("open");
            log.append(&report("0123456789abcdef", Some("K1ABC")))
                .expect("append");
        }
        {
            // reopening appends
            let mut log = JsonLinesLog::open(&scratch.0).expect("open");
            assert_eq!(scratch.0.as_path(), log.path());
            log.append(&report("fedcba9876543210", None))
                .expect("append");
        }

        let text = fs::read_to_string(&scratch.0).expect("read");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("bad json"))
            .collect();
        assert_eq!(2, lines.len());
        assert_eq!("0123456789abcdef", lines[0]["uid"]);
        assert_eq!("K1ABC", lines[0]["callsign"]);
        assert_eq!("S9", lines[0]["s_meter"]);
        assert!(lines[1]["callsign"].is_null());
        assert_eq!("2024-03-01T12:00:00Z", lines[1]["timestamp"]);
    }

    #[test]
    fn test_status_file() {
        let scratch = Scratch::new("status.json");
        let status = StatusFile::new(&scratch.0);

        status.write(&Status::Baselining).expect("write");
        let text = fs::read_to_string(&scratch.0).expect("read");
        assert_eq!("{\"state\":\"baselining\"}\n", text);

        status
            .write(&Status::Ready {
                threshold: 0.5,
                fallback: false,
            })
            .expect("write");
        let val: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&scratch.0).expect("read")).expect("json");
        assert_eq!("ready", val["state"]);
        assert_eq!(0.5, val["threshold"]);
        assert_eq!(false, val["fallback"]);
    }
}
