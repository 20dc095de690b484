//! Spoken callsigns
//!
//! Operators request a signal report by speaking their
//! callsign phonetically, followed by a trigger phrase:
//!
//! ```txt
//! kilo one alfa bravo charlie signal report
//! ```
//!
//! The speech recognizer is constrained to a small
//! [vocabulary](grammar) of phonetic words, digits, and the
//! trigger words. Recognized phonetic words are converted to
//! characters and checked against the amateur callsign format.

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;
use thiserror::Error;

/// Trigger phrase which requests a signal report
pub const DEFAULT_TRIGGER_PHRASE: &str = "signal report";

// ITU phonetic alphabet and digit words, with common variant spellings
static PHONETIC: phf::Map<&'static str, char> = phf_map! {
    "alfa" => 'A',
    "alpha" => 'A',
    "bravo" => 'B',
    "charlie" => 'C',
    "delta" => 'D',
    "echo" => 'E',
    "foxtrot" => 'F',
    "golf" => 'G',
    "hotel" => 'H',
    "india" => 'I',
    "juliett" => 'J',
    "juliet" => 'J',
    "kilo" => 'K',
    "lima" => 'L',
    "mike" => 'M',
    "november" => 'N',
    "oscar" => 'O',
    "papa" => 'P',
    "quebec" => 'Q',
    "romeo" => 'R',
    "sierra" => 'S',
    "tango" => 'T',
    "uniform" => 'U',
    "victor" => 'V',
    "whiskey" => 'W',
    "x-ray" => 'X',
    "xray" => 'X',
    "yankee" => 'Y',
    "zulu" => 'Z',
    "zero" => '0',
    "one" => '1',
    "two" => '2',
    "three" => '3',
    "four" => '4',
    "five" => '5',
    "six" => '6',
    "seven" => '7',
    "eight" => '8',
    "nine" => '9',
};

/// Error extracting a callsign from a transcript
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CallsignError {
    /// The transcript does not end with the trigger phrase
    #[error("no signal report requested")]
    NoTrigger,

    /// Nothing precedes the trigger phrase
    #[error("no callsign given before the trigger phrase")]
    Missing,

    /// The spoken characters do not form a callsign
    #[error("\"{0}\" is not a valid callsign")]
    Invalid(String),
}

/// Character for a phonetic word, like `"kilo"` → `'K'`
///
/// Matching is case-insensitive. Single digits are accepted
/// as themselves.
pub fn phonetic_to_char(word: &str) -> Option<char> {
    let word = word.to_ascii_lowercase();
    if let Some(c) = PHONETIC.get(word.as_str()) {
        return Some(*c);
    }

    let mut chars = word.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_digit() => Some(c),
        _ => None,
    }
}

/// Convert phonetic words to an uppercase string
///
/// Words which are not phonetic words or digits are skipped.
pub fn words_to_callsign<'a, I>(words: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    words.into_iter().filter_map(phonetic_to_char).collect()
}

/// True if `callsign` has the form of an amateur callsign
///
/// The comparison is made on the uppercased input.
///
/// ```
/// use sigrep::is_valid_callsign;
///
/// assert!(is_valid_callsign("K1ABC"));
/// assert!(is_valid_callsign("w1aw"));
/// assert!(!is_valid_callsign("ABCDEF"));
/// ```
pub fn is_valid_callsign(callsign: &str) -> bool {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^[A-Z0-9]{1,3}[0-9][A-Z0-9]{1,4}[A-Z]$|^[A-Z]{2}[0-9]{1,4}[A-Z]$")
                .expect("bad callsign regexp");
    }

    RE.is_match(&callsign.to_ascii_uppercase())
}

/// Extract the callsign from a signal report request
///
/// The `transcript` must end with the `trigger` phrase. The
/// words before it are converted to a callsign, which must be
/// valid. Comparisons ignore case and surrounding whitespace.
pub fn parse_signal_report_request(transcript: &str, trigger: &str) -> Result<String, CallsignError> {
    let text = transcript.trim().to_ascii_lowercase();
    let trigger = trigger.trim().to_ascii_lowercase();

    let spoken = text
        .strip_suffix(trigger.as_str())
        .ok_or(CallsignError::NoTrigger)?;
    if spoken.trim().is_empty() {
        return Err(CallsignError::Missing);
    }

    let callsign = words_to_callsign(spoken.split_whitespace());
    if is_valid_callsign(&callsign) {
        Ok(callsign)
    } else {
        Err(CallsignError::Invalid(callsign))
    }
}

/// Vocabulary for the speech recognizer
///
/// Every phonetic word, the digits, and the words of the
/// `trigger` phrase. Sorted with no duplicates.
pub fn grammar(trigger: &str) -> Vec<String> {
    let mut out: Vec<String> = PHONETIC.keys().map(|k| k.to_string()).collect();
    out.extend(('0'..='9').map(|c| c.to_string()));
    out.extend(trigger.split_whitespace().map(|w| w.to_ascii_lowercase()));
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phonetic_to_char() {
        assert_eq!(Some('K'), phonetic_to_char("kilo"));
        assert_eq!(Some('X'), phonetic_to_char("X-Ray"));
        assert_eq!(Some('7'), phonetic_to_char("seven"));
        assert_eq!(Some('7'), phonetic_to_char("7"));
        assert_eq!(None, phonetic_to_char("77"));
        assert_eq!(None, phonetic_to_char("signal"));
        assert_eq!(None, phonetic_to_char(""));
    }

    #[test]
    fn test_valid_callsigns() {
        for call in &["K1ABC", "W1AW", "VE3XYZ", "2E0ABC", "KA1B", "JA1ABC"] {
            assert!(is_valid_callsign(call), "{}", call);
        }
        for call in &["", "K", "ABC", "K1", "1234", "K1ABCDEFG", "K1AB5"] {
            assert!(!is_valid_callsign(call), "{}", call);
        }
    }

    #[test]
    fn test_parse_request() {
        assert_eq!(
            Ok("K1ABC".to_owned()),
            parse_signal_report_request(
                "  Kilo One Alfa Bravo Charlie signal report ",
                DEFAULT_TRIGGER_PHRASE
            )
        );
        assert_eq!(
            Ok("W1AW".to_owned()),
            parse_signal_report_request("whiskey 1 alpha whiskey signal report", "Signal Report")
        );
    }

    #[test]
    fn test_parse_request_errors() {
        assert_eq!(
            Err(CallsignError::NoTrigger),
            parse_signal_report_request("kilo one alfa bravo", DEFAULT_TRIGGER_PHRASE)
        );
        assert_eq!(
            Err(CallsignError::NoTrigger),
            parse_signal_report_request("signal report kilo", DEFAULT_TRIGGER_PHRASE)
        );
        assert_eq!(
            Err(CallsignError::Missing),
            parse_signal_report_request("signal report", DEFAULT_TRIGGER_PHRASE)
        );
        assert_eq!(
            Err(CallsignError::Invalid("ABC".to_owned())),
            parse_signal_report_request("alfa bravo charlie signal report", DEFAULT_TRIGGER_PHRASE)
        );
    }

    #[test]
    fn test_grammar() {
        let words = grammar(DEFAULT_TRIGGER_PHRASE);
        assert!(words.contains(&"signal".to_owned()));
        assert!(words.contains(&"report".to_owned()));
        assert!(words.contains(&"x-ray".to_owned()));
        assert!(words.contains(&"0".to_owned()));
        assert!(words.contains(&"nine".to_owned()));

        let mut sorted = words.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, words);
    }
}
