//! DTMF command codes
//!
//! Operators request services by keying a short DTMF code,
//! such as `#91` for the time. Decoded digits accumulate in
//! a buffer, and the [`CommandMatcher`] checks whether the
//! buffer *ends with* a command code. Codes are tested in a
//! fixed priority order, and the first match wins.

use std::fmt;

#[cfg(not(test))]
use log::warn;

#[cfg(test)]
use std::println as warn;

use regex::Regex;
use strum::EnumMessage;

/// A recognized DTMF command
///
/// Each command has a human-readable description, which is
/// suitable for reading aloud as help text:
///
/// ```
/// use sigrep::DtmfCommand;
///
/// assert_eq!("the current time", DtmfCommand::Time.description());
/// ```
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::EnumMessage,
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
pub enum DtmfCommand {
    /// Identify the station
    #[strum(serialize = "station_id", detailed_message = "station identification")]
    StationId,

    /// Speak the time
    #[strum(serialize = "time", detailed_message = "the current time")]
    Time,

    /// Speak the date
    #[strum(serialize = "date", detailed_message = "today's date")]
    Date,

    /// Weather for a five-digit ZIP code
    #[strum(serialize = "weather", detailed_message = "weather, followed by a zip code")]
    Weather {
        /// ZIP code
        zip: String,
    },

    /// Speak HF band conditions
    #[strum(serialize = "bands", detailed_message = "band conditions")]
    BandConditions,

    /// Repeat the last signal report
    #[strum(serialize = "last_report", detailed_message = "the last signal report")]
    LastReport,

    /// Toggle loop-back of the next transmissions
    #[strum(serialize = "parrot", detailed_message = "parrot mode on or off")]
    Parrot,

    /// List the available commands
    #[strum(serialize = "help", detailed_message = "this help")]
    Help,
}

impl DtmfCommand {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        self.get_detailed_message().unwrap_or("")
    }

    /// Short machine-readable name, like `weather`
    pub fn as_name_str(&self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for DtmfCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DtmfCommand::Weather { zip } => write!(f, "{} {}", self.as_name_str(), zip),
            _ => f.write_str(self.as_name_str()),
        }
    }
}

/// DTMF command code strings
///
/// The weather code is a prefix: it must be followed by
/// exactly five digits. An empty code disables its command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandCodes {
    /// Station identification
    pub station_id: String,

    /// Time
    pub time: String,

    /// Date
    pub date: String,

    /// Weather prefix
    pub weather: String,

    /// Band conditions
    pub bands: String,

    /// Last signal report
    pub last_report: String,

    /// Parrot toggle
    pub parrot: String,

    /// Help
    pub help: String,
}

impl CommandCodes {
    /// Code which invokes `cmd`
    ///
    /// For weather, this is the prefix only.
    pub fn code_for(&self, cmd: &DtmfCommand) -> &str {
        match cmd {
            DtmfCommand::StationId => &self.station_id,
            DtmfCommand::Time => &self.time,
            DtmfCommand::Date => &self.date,
            DtmfCommand::Weather { .. } => &self.weather,
            DtmfCommand::BandConditions => &self.bands,
            DtmfCommand::LastReport => &self.last_report,
            DtmfCommand::Parrot => &self.parrot,
            DtmfCommand::Help => &self.help,
        }
    }
}

impl Default for CommandCodes {
    fn default() -> Self {
        Self {
            station_id: "#90".to_owned(),
            time: "#91".to_owned(),
            date: "#92".to_owned(),
            weather: "#93".to_owned(),
            bands: "#94".to_owned(),
            last_report: "#95".to_owned(),
            parrot: "#96".to_owned(),
            help: "#99".to_owned(),
        }
    }
}

/// Matches a digit buffer against the command codes
#[derive(Clone, Debug)]
pub struct CommandMatcher {
    codes: CommandCodes,
    weather: Option<Regex>,
}

impl CommandMatcher {
    /// Matcher for the given codes
    pub fn new(codes: CommandCodes) -> Self {
        let weather = if codes.weather.is_empty() {
            None
        } else {
            let pattern = format!("{}([0-9]{{5}})$", regex::escape(&codes.weather));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("dtmf: weather command disabled: {}", e);
                    None
                }
            }
        };
        Self { codes, weather }
    }

    /// Command codes in use
    pub fn codes(&self) -> &CommandCodes {
        &self.codes
    }

    /// Find the command which ends `buffer`, if any
    ///
    /// Codes are tested in priority order: station ID, time,
    /// date, weather, band conditions, last report, parrot,
    /// help.
    pub fn find(&self, buffer: &str) -> Option<DtmfCommand> {
        let ends = |code: &str| !code.is_empty() && buffer.ends_with(code);

        if ends(&self.codes.station_id) {
            return Some(DtmfCommand::StationId);
        }
        if ends(&self.codes.time) {
            return Some(DtmfCommand::Time);
        }
        if ends(&self.codes.date) {
            return Some(DtmfCommand::Date);
        }
        if let Some(caps) = self.weather.as_ref().and_then(|re| re.captures(buffer)) {
            return Some(DtmfCommand::Weather {
                zip: caps[1].to_owned(),
            });
        }
        if ends(&self.codes.bands) {
            return Some(DtmfCommand::BandConditions);
        }
        if ends(&self.codes.last_report) {
            return Some(DtmfCommand::LastReport);
        }
        if ends(&self.codes.parrot) {
            return Some(DtmfCommand::Parrot);
        }
        if ends(&self.codes.help) {
            return Some(DtmfCommand::Help);
        }
        None
    }

    /// Help text listing each enabled command and its code
    pub fn help_text(&self) -> String {
        use strum::IntoEnumIterator;

        let mut out = String::from("Available commands:");
        for cmd in DtmfCommand::iter() {
            let code = self.codes.code_for(&cmd);
            if code.is_empty() {
                continue;
            }
            out.push_str(&format!(" {}, {}.", spell_code(code), cmd.description()));
        }
        out
    }
}

impl Default for CommandMatcher {
    fn default() -> Self {
        Self::new(CommandCodes::default())
    }
}

// Spell out a code for speech: "#91" → "pound 9 1"
fn spell_code(code: &str) -> String {
    code.chars()
        .map(|c| match c {
            '#' => "pound".to_owned(),
            '*' => "star".to_owned(),
            c => c.to_string(),
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_each() {
        let m = CommandMatcher::default();
        assert_eq!(Some(DtmfCommand::StationId), m.find("#90"));
        assert_eq!(Some(DtmfCommand::Time), m.find("12#91"));
        assert_eq!(Some(DtmfCommand::Date), m.find("#92"));
        assert_eq!(Some(DtmfCommand::BandConditions), m.find("#94"));
        assert_eq!(Some(DtmfCommand::LastReport), m.find("#95"));
        assert_eq!(Some(DtmfCommand::Parrot), m.find("**#96"));
        assert_eq!(Some(DtmfCommand::Help), m.find("#99"));
        assert_eq!(None, m.find("#9"));
        assert_eq!(None, m.find("#91 "));
        assert_eq!(None, m.find(""));
    }

    #[test]
    fn test_find_weather() {
        let m = CommandMatcher::default();
        assert_eq!(
            Some(DtmfCommand::Weather {
                zip: "20500".to_owned()
            }),
            m.find("#9320500")
        );

        // too few digits
        assert_eq!(None, m.find("#932050"));

        // too many digits
        assert_eq!(None, m.find("#93205001"));
    }

    #[test]
    fn test_find_priority() {
        // ZIP code ending in a command code
        let m = CommandMatcher::default();
        assert_eq!(Some(DtmfCommand::Time), m.find("#931#91"));
        assert_eq!(Some(DtmfCommand::Help), m.find("#93#99"));

        // overlapping codes: the earlier command wins
        let mut codes = CommandCodes::default();
        codes.help = "1".to_owned();
        codes.time = "01".to_owned();
        let m = CommandMatcher::new(codes);
        assert_eq!(Some(DtmfCommand::Time), m.find("001"));
        assert_eq!(Some(DtmfCommand::Help), m.find("11"));
    }

    #[test]
    fn test_disabled_code() {
        let mut codes = CommandCodes::default();
        codes.weather.clear();
        codes.station_id.clear();
        let m = CommandMatcher::new(codes);
        assert_eq!(None, m.find("#9320500"));
        assert_eq!(Some(DtmfCommand::Time), m.find("#91"));
        assert!(!m.help_text().contains("station identification"));
    }

    #[test]
    fn test_regex_metacharacters() {
        let mut codes = CommandCodes::default();
        codes.weather = "*3".to_owned();
        let m = CommandMatcher::new(codes);
        assert_eq!(
            Some(DtmfCommand::Weather {
                zip: "12345".to_owned()
            }),
            m.find("*312345")
        );
    }

    #[test]
    fn test_help_text() {
        let m = CommandMatcher::default();
        let help = m.help_text();
        assert!(help.starts_with("Available commands: pound 9 0, station identification."));
        assert!(help.contains("pound 9 3, weather, followed by a zip code."));
        assert!(help.ends_with("pound 9 9, this help."));
    }

    #[test]
    fn test_display() {
        assert_eq!("time", DtmfCommand::Time.to_string());
        assert_eq!(
            "weather 20500",
            DtmfCommand::Weather {
                zip: "20500".to_owned()
            }
            .to_string()
        );
    }
}
