//! Content-type negotiation for unstructured payloads
//!
//! Maps a declared content-type header to a (mimetype, charset) pair and
//! converts between raw bytes and decoded text in both directions. Parsing
//! is total; charset labels are only validated when they are actually used
//! to decode or encode a payload.

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};

/// Mimetype assumed when the caller does not declare one
pub const DEFAULT_MIMETYPE: &str = "text/plain";

/// Charset assumed when the declared content type carries none
pub const DEFAULT_CHARSET: &str = "utf8";

/// Mimetype reported for binary responses without an override
pub const BINARY_MIMETYPE: &str = "application/octet-stream";

/// A resolved (mimetype, charset) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    pub mimetype: String,
    pub charset: String,
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            mimetype: DEFAULT_MIMETYPE.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

impl ContentType {
    /// Parse a header-like string of form `type/subtype;charset=value`.
    ///
    /// Never fails: a missing or empty header yields the defaults, unknown
    /// parameters are ignored, and names are lowercased. A bad charset label
    /// only surfaces later, when a payload is decoded or encoded with it.
    pub fn parse(header: Option<&str>) -> Self {
        let raw = match header.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw,
            None => return Self::default(),
        };

        let mut parts = raw.split(';');
        let mimetype = parts
            .next()
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());

        let mut charset = DEFAULT_CHARSET.to_string();
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case("charset") {
                    let value = value.trim().trim_matches('"').to_ascii_lowercase();
                    if !value.is_empty() {
                        charset = value;
                    }
                }
            }
        }

        Self { mimetype, charset }
    }

    /// Whether payloads of this mimetype are decoded to text
    pub fn is_textual(&self) -> bool {
        self.mimetype.starts_with("text/") || self.mimetype == "application/json"
    }

    /// Header value for a text response, `type/subtype;charset=value`
    pub fn header_value(&self) -> String {
        format!("{};charset={}", self.mimetype, self.charset)
    }
}

/// A payload after inbound resolution: decoded text or raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    /// Payload size in bytes as received or produced, before re-encoding
    pub fn size(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Binary(b) => b.len(),
        }
    }
}

/// Partial outbound override returned by an unstructured scorer.
///
/// Either field may be set independently; unset fields fall back to the
/// payload-kind defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundOverride {
    pub mimetype: Option<String>,
    pub charset: Option<String>,
}

/// Resolve inbound bytes against the declared content type.
///
/// Text-like mimetypes (`text/*`, `application/json`) are decoded with the
/// resolved charset; anything else passes through as binary with the charset
/// recorded but unused.
pub fn resolve_inbound(raw: &[u8], declared: Option<&str>) -> Result<(Payload, ContentType)> {
    let content_type = ContentType::parse(declared);

    if !content_type.is_textual() {
        return Ok((Payload::Binary(raw.to_vec()), content_type));
    }

    let encoding = encoding_for(&content_type.charset)?;
    let (text, _, had_errors) = encoding.decode(raw);
    if had_errors {
        return Err(RunnerError::invalid_input(format!(
            "payload is not valid {} text",
            content_type.charset
        )));
    }

    Ok((Payload::Text(text.into_owned()), content_type))
}

/// Resolve an outbound payload to wire bytes and a content-type header value.
///
/// Text is encoded with the resolved charset and reports
/// `mimetype;charset=value`; binary passes through unchanged and reports the
/// mimetype alone. Charsets that cannot be used for encoding fall back to
/// their standard output encoding, and the fallback is what gets reported.
pub fn resolve_outbound(
    payload: Payload,
    overrides: &OutboundOverride,
) -> Result<(Vec<u8>, String)> {
    match payload {
        Payload::Text(text) => {
            let mimetype = overrides
                .mimetype
                .clone()
                .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());
            let charset = overrides
                .charset
                .clone()
                .unwrap_or_else(|| DEFAULT_CHARSET.to_string());

            let encoding = encoding_for(&charset)?;
            let (bytes, used, _) = encoding.encode(&text);
            let charset = if used == encoding {
                charset
            } else {
                used.name().to_ascii_lowercase()
            };

            let header = ContentType { mimetype, charset }.header_value();
            Ok((bytes.into_owned(), header))
        }
        Payload::Binary(bytes) => {
            let mimetype = overrides
                .mimetype
                .clone()
                .unwrap_or_else(|| BINARY_MIMETYPE.to_string());
            Ok((bytes, mimetype))
        }
    }
}

fn encoding_for(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| RunnerError::content_type(format!("unknown charset label '{label}'")))
}
