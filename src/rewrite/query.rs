//! Query-string handling for request targets.
//!
//! Parsing is strict where form-urlencoded decoding is lenient: a malformed
//! percent escape or a `;` separator rejects the whole query so the caller
//! can forward the request untouched.

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::rewrite::InjectError;

/// Decoded query parameters, keyed in ascending order.
///
/// Values under one key keep the order they appeared in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    /// Parse a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Result<Self, InjectError> {
        for pair in raw.split('&') {
            if pair.contains(';') {
                return Err(InjectError::InvalidQuery(
                    "semicolon separator in query".to_string(),
                ));
            }
            check_escapes(pair).map_err(InjectError::InvalidQuery)?;
        }

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        Ok(Self { params })
    }

    /// Remove every value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.params.remove(key)
    }

    /// Append a value under `key`.
    pub fn append(&mut self, key: &str, value: &str) {
        self.params
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Encode as `key=value` pairs joined by `&`, keys sorted.
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        for (key, values) in &self.params {
            for value in values {
                if !encoded.is_empty() {
                    encoded.push('&');
                }
                escape_into(&mut encoded, key);
                encoded.push('=');
                escape_into(&mut encoded, value);
            }
        }
        encoded
    }
}

/// Form-encode `component` onto `out`.
///
/// Same alphabet as Docker clients produce: `~` stays literal and `*` is
/// escaped, the reverse of the WHATWG form serializer.
fn escape_into(out: &mut String, component: &str) {
    for piece in form_urlencoded::byte_serialize(component.as_bytes()) {
        match piece {
            "%7E" => out.push('~'),
            _ => out.push_str(&piece.replace('*', "%2A")),
        }
    }
}

/// Reject `%` not followed by two hex digits.
pub(crate) fn check_escapes(component: &str) -> Result<(), String> {
    let bytes = component.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        let well_formed = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !well_formed {
            let end = (i + 3).min(bytes.len());
            return Err(format!(
                "invalid escape {:?}",
                String::from_utf8_lossy(&bytes[i..end])
            ));
        }
        i += 3;
    }
    Ok(())
}
