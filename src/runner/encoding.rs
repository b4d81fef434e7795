//! Output decoding with a configurable fallback encoding
//!
//! Git passes file contents through byte-for-byte, so output from repositories
//! holding legacy-encoded files is not always UTF-8.

use std::fmt;

use encoding_rs::Encoding;
use tracing::debug;

/// Encoding tried when command output is not valid UTF-8
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FallbackEncoding(&'static Encoding);

impl FallbackEncoding {
    /// Resolve an encoding label
    ///
    /// Accepts WHATWG labels (`windows-1252`, `latin1`, `shift_jis`) as well as
    /// editor display names such as `Western (Windows 1252)`, where the text
    /// inside the last pair of parentheses names the encoding.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }

        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return Some(Self(encoding));
        }

        let inner = match (label.rfind('('), label.rfind(')')) {
            (Some(open), Some(close)) if open < close => &label[open + 1..close],
            _ => label,
        };
        let normalized = inner.trim().trim_end_matches("with BOM").trim().replace(' ', "-");

        Encoding::for_label(normalized.as_bytes()).map(Self)
    }

    /// Canonical WHATWG name of the encoding
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Decode without replacement characters; `None` if the bytes are unmappable
    fn decode_strict(&self, bytes: &[u8]) -> Option<String> {
        self.0
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
    }
}

impl fmt::Debug for FallbackEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FallbackEncoding").field(&self.name()).finish()
    }
}

/// Decode captured process output
///
/// Valid UTF-8 is returned as-is. Otherwise the fallback encoding is tried,
/// and when that is missing or cannot map the bytes either, the output is
/// decoded as UTF-8 with U+FFFD replacement characters. Bytes are never
/// dropped without a trace.
pub fn decode_output(bytes: Vec<u8>, fallback: Option<FallbackEncoding>) -> String {
    let bytes = match String::from_utf8(bytes) {
        Ok(text) => return text,
        Err(err) => err.into_bytes(),
    };

    if let Some(encoding) = fallback {
        if let Some(text) = encoding.decode_strict(&bytes) {
            debug!("Decoded {} bytes as {}", bytes.len(), encoding.name());
            return text;
        }
        debug!("Output is not valid {} either", encoding.name());
    }

    String::from_utf8_lossy(&bytes).into_owned()
}
