use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::browser::{scripts, BrowserResult, BrowserSession};

use super::target::InjectionTarget;

const PROBE_CHARS: usize = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SurfaceReading {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub contains: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct InjectionVerifier {
    ratio: f64,
}

impl InjectionVerifier {
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    /// `ceil(len × ratio)`, never below 1.
    pub fn threshold(&self, payload_len: usize) -> usize {
        ((payload_len as f64 * self.ratio).ceil() as usize).max(1)
    }

    /// Reads the target surface. The caller has already entered the target's
    /// document.
    pub async fn read(
        &self,
        session: &mut dyn BrowserSession,
        target: &InjectionTarget,
        probe: &str,
    ) -> BrowserResult<SurfaceReading> {
        let value = session
            .run_script(
                &scripts::READ_SURFACE,
                json!({
                    "selector": target.selector,
                    "kind": target.kind.as_str(),
                    "probe": probe,
                }),
            )
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    pub fn sufficient(&self, reading: &SurfaceReading, payload_len: usize) -> bool {
        reading.found && reading.length >= self.threshold(payload_len)
    }

    /// Content already in place: long enough and carrying the payload probe.
    pub fn already_present(&self, reading: &SurfaceReading, payload_len: usize, probe: &str) -> bool {
        self.sufficient(reading, payload_len) && !probe.is_empty() && reading.contains
    }
}

/// Length as the page measures it (UTF-16 code units).
pub fn payload_length(content: &str) -> usize {
    content.encode_utf16().count()
}

/// Leading plain-text fragment of the payload used to recognise it on the
/// page.
pub fn probe_snippet(content: &str) -> String {
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").ok());
    let plain = match tags {
        Some(regex) => regex.replace_all(content, " ").into_owned(),
        None => content.to_string(),
    };
    let words: Vec<&str> = plain.split_whitespace().collect();
    words.join(" ").chars().take(PROBE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_rounds_up_and_is_at_least_one() {
        let verifier = InjectionVerifier::new(0.9);
        assert_eq!(verifier.threshold(5000), 4500);
        assert_eq!(verifier.threshold(11), 10);
        assert_eq!(verifier.threshold(1), 1);
        assert_eq!(verifier.threshold(0), 1);
    }

    #[test]
    fn short_reading_is_insufficient() {
        let verifier = InjectionVerifier::new(0.9);
        let reading = SurfaceReading {
            found: true,
            length: 4499,
            contains: true,
        };
        assert!(!verifier.sufficient(&reading, 5000));
        let missing = SurfaceReading {
            found: false,
            length: 9999,
            contains: true,
        };
        assert!(!verifier.sufficient(&missing, 5000));
    }

    #[test]
    fn probe_strips_markup() {
        assert_eq!(
            probe_snippet("<p><b>Hello</b>   world</p><p>and more text after that</p>"),
            "Hello world and more tex"
        );
        assert_eq!(probe_snippet("<img src=\"x\">"), "");
    }

    #[test]
    fn payload_length_counts_utf16_units() {
        assert_eq!(payload_length("abc"), 3);
        assert_eq!(payload_length("가나"), 2);
        assert_eq!(payload_length("😀"), 2);
    }
}
