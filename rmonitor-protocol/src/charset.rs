//! Legacy 8-bit charset handling for the CSV wire format
//!
//! Timing systems emit CSV in a single-byte Windows codepage (historically
//! cp1252). Decoding never fails; encoding replaces anything the target
//! charset cannot represent with `?`.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::{EncoderResult, Encoding, WINDOWS_1252};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ProtocolError, Result};

/// Byte substituted for characters the target charset cannot encode
const REPLACEMENT: u8 = b'?';

/// A character encoding resolved from a WHATWG label
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

impl Charset {
    /// Resolve a label such as `cp1252`, `latin1` or `utf-8`
    pub fn from_label(label: &str) -> Result<Self> {
        Encoding::for_label(label.trim().as_bytes())
            .map(Self)
            .ok_or_else(|| ProtocolError::UnknownCharset(label.to_string()))
    }

    /// Canonical name of the encoding
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Decode wire bytes into text
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (text, had_errors) = self.0.decode_without_bom_handling(bytes);
        if had_errors {
            tracing::debug!(charset = self.name(), "malformed byte sequence replaced while decoding");
        }
        text
    }

    /// Encode text for the wire, substituting unencodable characters
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut encoder = self.0.new_encoder();
        let mut out = Vec::with_capacity(text.len() + 4);
        let mut src = text;
        let mut replaced = 0usize;

        loop {
            let needed = encoder
                .max_buffer_length_from_utf8_without_replacement(src.len())
                .unwrap_or(src.len() * 4 + 16);
            out.reserve(needed);

            let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(src, &mut out, true);
            src = &src[read..];

            match result {
                EncoderResult::InputEmpty => break,
                EncoderResult::OutputFull => continue,
                EncoderResult::Unmappable(_) => {
                    out.push(REPLACEMENT);
                    replaced += 1;
                }
            }
        }

        if replaced > 0 {
            tracing::debug!(charset = self.name(), replaced, "unencodable characters replaced");
        }
        out
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self(WINDOWS_1252)
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Charset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Charset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Charset::from_label(&label).map_err(serde::de::Error::custom)
    }
}
