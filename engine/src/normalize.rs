//! Output normalization
//!
//! Raw probe output is decoded as UTF-8 with replacement and then scrubbed of
//! terminal control sequences with one precompiled pattern. The pattern is
//! applied until the text stops changing, so a second pass is always a no-op.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::warn;

static CONTROL_SEQUENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
          \x1b\[[0-?]*[\x20-/]*[@-~]          # CSI: colors, cursor movement, erase
        | \x1b\][^\x07\x1b]*(?:\x07|\x1b\\)    # OSC: window titles, hyperlinks
        | \x1b[@-_]                             # two-byte escapes
        | [^\n\r]*\r                            # carriage-return overwrite (spinners)
        | [^\x08\n]\x08                         # backspace erasing one character
        | (?m:^)\x08+                           # backspace with nothing left to erase
        | [\x00-\x07\x0b\x0c\x0e-\x1a\x1c-\x1f\x7f]
        | \x1b
        ",
    )
    .expect("control sequence pattern is valid")
});

/// Decode raw bytes, replacing invalid UTF-8 instead of failing
pub fn decode_lossy(raw: &[u8]) -> (String, bool) {
    match String::from_utf8_lossy(raw) {
        Cow::Borrowed(s) => (s.to_string(), false),
        Cow::Owned(s) => (s, true),
    }
}

/// Strip control sequences from already-decoded text
pub fn strip_control_sequences(text: &str) -> String {
    let mut current = text.replace("\r\n", "\n");
    loop {
        let next = CONTROL_SEQUENCES.replace_all(&current, "");
        if let Cow::Owned(next) = next {
            current = next;
        } else {
            return current;
        }
    }
}

/// Full normalization pipeline applied to every probe's output
pub fn normalize_output(tool_id: &str, raw: &[u8]) -> String {
    let (text, recovered) = decode_lossy(raw);
    if recovered {
        warn!("Recovered invalid UTF-8 in output of {tool_id}");
    }
    strip_control_sequences(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_color_codes() {
        let input = "\x1b[1;32mOK\x1b[0m disk healthy";
        assert_eq!(strip_control_sequences(input), "OK disk healthy");
    }

    #[test]
    fn test_strips_cursor_and_erase_sequences() {
        let input = "\x1b[2K\x1b[1Gline\x1b[?25l";
        assert_eq!(strip_control_sequences(input), "line");
    }

    #[test]
    fn test_strips_osc_title() {
        let input = "\x1b]0;diagnostix\x07report";
        assert_eq!(strip_control_sequences(input), "report");
    }

    #[test]
    fn test_carriage_return_spinner_keeps_last_frame() {
        let input = "Scanning |\rScanning /\rScanning -\rdone\nnext line";
        assert_eq!(strip_control_sequences(input), "done\nnext line");
    }

    #[test]
    fn test_crlf_is_a_plain_newline() {
        assert_eq!(strip_control_sequences("a\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn test_backspace_erases_previous_characters() {
        assert_eq!(strip_control_sequences("50%\x08\x08\x0875%"), "75%");
        assert_eq!(strip_control_sequences("ab\x08\x08"), "");
        assert_eq!(strip_control_sequences("\x08\x08start"), "start");
    }

    #[test]
    fn test_keeps_tabs_newlines_and_unicode() {
        let input = "Temp:\t45°C\n✓ Memory usage is normal\n";
        assert_eq!(strip_control_sequences(input), input);
    }

    #[test]
    fn test_lone_escape_and_bell_removed() {
        assert_eq!(strip_control_sequences("a\x1bb\x07c"), "abc");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let samples = [
            "\x1b[31mred\x1b[0m",
            "50%\r100%\n",
            "x\x08\x08y",
            "\x1b[\x1b[31m31m",
            "plain text",
            "\x1b]8;;http://x\x1b\\link\x1b]8;;\x1b\\",
            "mixed\r\n\x1b[1m\rbold\x08D",
            "",
        ];
        for sample in samples {
            let once = strip_control_sequences(sample);
            let twice = strip_control_sequences(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_decode_lossy_replaces_invalid_bytes() {
        let (text, recovered) = decode_lossy(b"ok \xff\xfe done");
        assert!(recovered);
        assert!(text.starts_with("ok "));
        assert!(text.ends_with(" done"));
        assert!(text.contains('\u{FFFD}'));

        let (text, recovered) = decode_lossy("clean".as_bytes());
        assert!(!recovered);
        assert_eq!(text, "clean");
    }

    #[test]
    fn test_normalize_output_pipeline() {
        let raw = b"\x1b[33mWARN\x1b[0m \xff\n";
        let out = normalize_output("disk_diagnostics", raw);
        assert_eq!(out, "WARN \u{FFFD}\n");
    }
}
