//! Line predicates over the streaming client's `pair` transcript.
//!
//! The external client reports pairing progress only as free-form text on
//! stdout/stderr.  The three recognised line shapes are isolated here so
//! they can be tested against captured transcripts without spawning
//! anything:
//!
//! ```text
//! Please enter the following PIN on the target PC: 482910    -> PinShown("482910")
//! Successfully paired                                        -> Paired
//! Already paired                                             -> Paired
//! Executing request ...                                      -> Other
//! ```

/// What one transcript line tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptSignal {
    /// The client displayed a PIN intended for the target machine.
    PinShown(String),
    /// Pairing is complete (fresh or pre-existing).
    Paired,
    /// Anything else.
    Other,
}

/// Returns `true` for the "enter this PIN on the target machine" line.
pub fn is_pin_prompt(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    line.contains("PIN") && lower.contains("target")
}

/// Extracts the digits of the last whitespace-delimited token.
///
/// Returns `None` when that token carries no digits at all.
pub fn extract_pin(line: &str) -> Option<String> {
    let last = line.split_whitespace().last()?;
    let digits: String = last.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Returns `true` when the line reports a completed pairing.
///
/// Matched case-insensitively.  The misspelt "succesfully" is accepted too:
/// some client builds print it that way.
pub fn is_pairing_success(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("successfully paired")
        || lower.contains("succesfully paired")
        || lower.contains("already paired")
}

/// Classifies one transcript line.  Success wins over a PIN prompt.
pub fn classify_line(line: &str) -> TranscriptSignal {
    if is_pairing_success(line) {
        return TranscriptSignal::Paired;
    }
    if is_pin_prompt(line) {
        if let Some(pin) = extract_pin(line) {
            return TranscriptSignal::PinShown(pin);
        }
    }
    TranscriptSignal::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_prompt_line_yields_pin() {
        let line = "Please enter the following PIN on the target PC: 482910";
        assert_eq!(classify_line(line), TranscriptSignal::PinShown("482910".into()));
    }

    #[test]
    fn test_extract_pin_strips_punctuation() {
        assert_eq!(extract_pin("PIN for target PC: [1234]."), Some("1234".into()));
        assert_eq!(extract_pin("PIN for target PC: none"), None);
        assert_eq!(extract_pin(""), None);
    }

    #[test]
    fn test_pin_prompt_requires_target_mention() {
        assert!(!is_pin_prompt("Your PIN is 123456"));
        assert!(is_pin_prompt("Enter PIN on TARGET host: 123456"));
        assert!(!is_pin_prompt("please enter the pin on the target: 1"));
    }

    #[test]
    fn test_success_phrases_case_insensitive() {
        assert!(is_pairing_success("Successfully paired"));
        assert!(is_pairing_success("SUCCESSFULLY PAIRED with host"));
        assert!(is_pairing_success("Succesfully paired"));
        assert!(is_pairing_success("Host reports: already paired"));
        assert!(!is_pairing_success("Pairing failed"));
    }

    #[test]
    fn test_generic_lines_are_other() {
        for line in [
            "Executing request https://10.0.0.2:47984/pair",
            "Connecting to host...",
            "",
        ] {
            assert_eq!(classify_line(line), TranscriptSignal::Other, "line: {line:?}");
        }
    }

    #[test]
    fn test_full_transcript_signals_in_order() {
        // Captured output of a successful first-time pairing.
        let transcript = "\
Searching for host 192.168.1.40...
Please enter the following PIN on the target PC: 738291
Executing request
Successfully paired";

        let signals: Vec<_> = transcript
            .lines()
            .map(classify_line)
            .filter(|s| *s != TranscriptSignal::Other)
            .collect();

        assert_eq!(
            signals,
            vec![
                TranscriptSignal::PinShown("738291".into()),
                TranscriptSignal::Paired
            ]
        );
    }
}
