//! Submitted form records.
//!
//! A [`Record`] is the flat field-name to field-value mapping produced by
//! decoding one `application/x-www-form-urlencoded` body.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bytes left unescaped by [`Record::to_form_body`].
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// One decoded form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a URL-encoded form body.
    ///
    /// The whole body is plus- and percent-decoded first, then split on `&`
    /// into segments and each segment on `=`. Every segment must contain
    /// exactly one `=`. Later duplicate keys overwrite earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] if the body is not UTF-8 or any
    /// segment does not contain exactly one `=`. Nothing is returned for a
    /// partially valid body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|e| Error::malformed(format!("body is not valid UTF-8: {e}")))?;
        let decoded = unquote_plus(text);

        let mut fields = BTreeMap::new();
        for segment in decoded.split('&') {
            let mut parts = segment.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => {
                    fields.insert(key.to_string(), value.to_string());
                }
                _ => {
                    return Err(Error::malformed(format!(
                        "segment {segment:?} must contain exactly one '='"
                    )));
                }
            }
        }

        Ok(Self { fields })
    }

    /// Render the record as a canonical form body.
    ///
    /// Keys are emitted in sorted order; spaces become `+` and every other
    /// reserved byte is percent-escaped.
    #[must_use]
    pub fn to_form_body(&self) -> String {
        self.fields
            .iter()
            .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Insert a field, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(key.into(), value.into())
    }

    /// Look up a field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn unquote_plus(text: &str) -> String {
    let spaced = text.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

fn encode_component(text: &str) -> String {
    utf8_percent_encode(text, FORM_VALUE)
        .to_string()
        .replace("%20", "+")
}
