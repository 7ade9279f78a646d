//! Request-target parsing and the canonical renderings used in logs.
//!
//! # Responsibilities
//! - Classify the target (origin, asterisk, absolute, authority form)
//! - Reject targets with control bytes or broken percent-escapes in the path
//! - Produce the escaped path and the sorted, re-encoded query string
//!
//! The raw target text is kept by the caller; nothing here normalizes dot
//! segments or case, so logged paths match what the scanner sent.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode, percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

/// Bytes escaped when rendering a decoded path.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Bytes escaped in query keys and values. Space is handled separately.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Sub-delimiters and brackets a raw path may carry without escaping.
const PATH_LITERAL_EXTRA: &[u8] = b"!$&'()*+,;=:@[]%";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("empty request target")]
    Empty,
    #[error("invalid control character in request target")]
    ControlCharacter,
    #[error("missing protocol scheme")]
    MissingScheme,
    #[error("invalid request target {0:?}")]
    InvalidForm(String),
    #[error("invalid URL escape in path {0:?}")]
    InvalidEscape(String),
}

/// The request-target split into the parts the decoy reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUri {
    raw_path: String,
    path: Vec<u8>,
    raw_query: Option<String>,
    host: Option<String>,
}

impl RequestUri {
    /// Parse the target of a request line sent with `method`.
    pub fn parse(method: &str, target: &str) -> Result<Self, UriError> {
        if target.is_empty() {
            return Err(UriError::Empty);
        }
        if target.bytes().any(|b| b < 0x20 || b == 0x7f) {
            return Err(UriError::ControlCharacter);
        }
        if target == "*" {
            return Ok(Self {
                raw_path: "*".to_string(),
                path: b"*".to_vec(),
                raw_query: None,
                host: None,
            });
        }

        // CONNECT carries a bare authority; treat it as if it had a scheme.
        let authority_form = method == "CONNECT" && !target.starts_with('/');
        let (has_scheme, rest) = if authority_form {
            (true, target)
        } else {
            match split_scheme(target)? {
                Some((_, rest)) => (true, rest),
                None => (false, target),
            }
        };

        let (rest, raw_query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query.to_string())),
            None => (rest, None),
        };

        if !rest.starts_with('/') && !authority_form {
            if has_scheme {
                // Opaque form such as `mailto:x`; there is no path to report.
                return Ok(Self {
                    raw_path: String::new(),
                    path: Vec::new(),
                    raw_query,
                    host: None,
                });
            }
            return Err(UriError::InvalidForm(target.to_string()));
        }

        let (host, raw_path) = if authority_form {
            split_authority(rest)
        } else if has_scheme && rest.starts_with("//") {
            split_authority(&rest[2..])
        } else {
            (None, rest)
        };

        let path = unescape(raw_path, false)
            .ok_or_else(|| UriError::InvalidEscape(raw_path.to_string()))?;

        Ok(Self {
            raw_path: raw_path.to_string(),
            path,
            raw_query,
            host,
        })
    }

    /// Path as it should appear in logs: the raw path when it is already a
    /// valid encoding, otherwise the decoded path re-escaped.
    pub fn escaped_path(&self) -> String {
        if self.raw_path == "*" || is_valid_path_encoding(&self.raw_path) {
            return self.raw_path.clone();
        }
        percent_encode(&self.path, PATH_ESCAPE).to_string()
    }

    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    /// Authority from an absolute or authority-form target.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Query re-encoded with keys sorted; malformed pairs are dropped.
    pub fn encoded_query(&self) -> String {
        encode_form(self.raw_query())
    }
}

/// Merge `application/x-www-form-urlencoded` sources and re-encode them
/// with keys sorted. Values of a key keep source order, then arrival order.
/// Pairs containing `;` or a broken escape are dropped.
pub fn encode_form<'a>(sources: impl IntoIterator<Item = &'a str>) -> String {
    let mut values: BTreeMap<Vec<u8>, Vec<Vec<u8>>> = BTreeMap::new();
    for pair in sources.into_iter().flat_map(|raw| raw.split('&')) {
        if pair.is_empty() || pair.contains(';') {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let (Some(key), Some(value)) = (unescape(key, true), unescape(value, true)) else {
            continue;
        };
        values.entry(key).or_default().push(value);
    }

    let mut encoded = String::new();
    for (key, vals) in &values {
        let key = query_escape(key);
        for value in vals {
            if !encoded.is_empty() {
                encoded.push('&');
            }
            encoded.push_str(&key);
            encoded.push('=');
            encoded.push_str(&query_escape(value));
        }
    }
    encoded
}

/// Split a leading `scheme:` off the target, if there is one.
fn split_scheme(target: &str) -> Result<Option<(&str, &str)>, UriError> {
    for (i, b) in target.bytes().enumerate() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' => {}
            b'0'..=b'9' | b'+' | b'-' | b'.' if i > 0 => {}
            b':' if i == 0 => return Err(UriError::MissingScheme),
            b':' => return Ok(Some((&target[..i], &target[i + 1..]))),
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// Split `authority[/path]` into host and path.
fn split_authority(rest: &str) -> (Option<String>, &str) {
    match rest.find('/') {
        Some(i) => (Some(rest[..i].to_string()), &rest[i..]),
        None => (Some(rest.to_string()), ""),
    }
}

/// Percent-decode, failing on a `%` not followed by two hex digits.
fn unescape(s: &str, plus_is_space: bool) -> Option<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    if plus_is_space {
        let spaced = s.replace('+', " ");
        Some(percent_decode(spaced.as_bytes()).collect())
    } else {
        Some(percent_decode(bytes).collect())
    }
}

fn is_valid_path_encoding(raw: &str) -> bool {
    raw.bytes().all(|b| {
        b.is_ascii_alphanumeric()
            || b"-_.~$&+,/:;=@".contains(&b)
            || PATH_LITERAL_EXTRA.contains(&b)
    })
}

/// Form-style escaping: space becomes `+`.
fn query_escape(bytes: &[u8]) -> String {
    bytes
        .split(|b| *b == b' ')
        .map(|segment| percent_encode(segment, QUERY_ESCAPE).to_string())
        .collect::<Vec<_>>()
        .join("+")
}
