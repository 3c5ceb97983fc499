//! Typed header view with a cached `Content-Length`.
//!
//! # Responsibilities
//! - Present a raw [`HeaderCollection`] as a name → values map
//! - Derive `Content-Length` lazily and cache it against the raw text
//! - Write canonical `Content-Length` text back into the raw collection
//!
//! # Design Decisions
//! - The cache is keyed by the raw text it was computed from, so writes that
//!   bypass this view (or go through `set`) can never leak a stale length
//! - Parsing is lenient: anything but one well-formed non-negative integer reads
//!   as "no content length"

use thiserror::Error;

use super::collection::{HeaderCollection, RawHeaders};
use super::values::HeaderValues;

/// Canonical spelling of the content length header.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Errors raised by header mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// A negative content length was assigned.
    #[error("content length cannot be negative (got {0})")]
    NegativeContentLength(i64),
}

/// A typed header map over a raw collection.
#[derive(Debug, Clone, Default)]
pub struct HeaderDictionary<C = RawHeaders> {
    collection: C,
    content_length: Option<u64>,
    content_length_text: HeaderValues,
}

impl<C: HeaderCollection> HeaderDictionary<C> {
    /// Wrap a raw collection.
    pub fn new(collection: C) -> Self {
        Self {
            collection,
            content_length: None,
            content_length_text: HeaderValues::new(),
        }
    }

    /// Borrow the underlying collection.
    pub fn collection(&self) -> &C {
        &self.collection
    }

    /// Unwrap the underlying collection.
    pub fn into_inner(self) -> C {
        self.collection
    }

    /// All values stored under `name`; empty when absent.
    pub fn get(&self, name: &str) -> HeaderValues {
        self.collection.get_values(name).unwrap_or_default()
    }

    /// Replace all values stored under `name`.
    pub fn set(&mut self, name: &str, values: impl Into<HeaderValues>) {
        self.collection.set_values(name, values.into());
    }

    /// Append values to `name`, keeping any already present.
    pub fn add(&mut self, name: &str, values: impl Into<HeaderValues>) {
        self.collection.append_values(name, values.into());
    }

    /// Remove `name`, returning whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        if !self.collection.contains(name) {
            return false;
        }
        self.collection.remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.collection.contains(name)
    }

    /// Values stored under `name`, or `None` when the name is absent.
    pub fn try_get_value(&self, name: &str) -> Option<HeaderValues> {
        self.collection.get_values(name)
    }

    pub fn clear(&mut self) {
        self.collection.clear();
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Snapshot of the header names at call time.
    pub fn keys(&self) -> Vec<String> {
        self.collection
            .entries()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Snapshot of the value sequences at call time, parallel to [`keys`](Self::keys).
    pub fn values(&self) -> Vec<HeaderValues> {
        self.collection
            .entries()
            .into_iter()
            .map(|(_, values)| values)
            .collect()
    }

    /// Snapshot of every `(name, values)` entry in collection order.
    pub fn iter(&self) -> std::vec::IntoIter<(String, HeaderValues)> {
        self.collection.entries().into_iter()
    }

    /// The parsed `Content-Length`, if the raw header holds exactly one valid value.
    pub fn content_length(&mut self) -> Option<u64> {
        let raw = self.get(CONTENT_LENGTH);
        if raw == self.content_length_text {
            return self.content_length;
        }

        let value = match &raw[..] {
            [single] => parse_non_negative(single)?,
            _ => return None,
        };

        self.content_length_text = raw;
        self.content_length = Some(value);
        Some(value)
    }

    /// Assign or clear `Content-Length`.
    ///
    /// `None` removes the header.
    pub fn set_content_length(&mut self, value: Option<i64>) -> Result<(), HeaderError> {
        match value {
            Some(length) if length < 0 => Err(HeaderError::NegativeContentLength(length)),
            Some(length) => {
                let length = length.unsigned_abs();
                let text = HeaderValues::from(length.to_string());
                self.collection.set_values(CONTENT_LENGTH, text.clone());
                self.content_length_text = text;
                self.content_length = Some(length);
                Ok(())
            }
            None => {
                self.remove(CONTENT_LENGTH);
                self.content_length_text = HeaderValues::new();
                self.content_length = None;
                Ok(())
            }
        }
    }
}

impl<'a, C: HeaderCollection> IntoIterator for &'a HeaderDictionary<C> {
    type Item = (String, HeaderValues);
    type IntoIter = std::vec::IntoIter<(String, HeaderValues)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Digits only after trimming, within the signed 64-bit range.
fn parse_non_negative(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<i64>().ok().map(i64::unsigned_abs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::SharedHeaders;

    fn dictionary() -> HeaderDictionary {
        HeaderDictionary::new(RawHeaders::new())
    }

    #[test]
    fn test_get_absent_is_empty() {
        let headers = dictionary();
        assert!(headers.get("x-missing").is_empty());
        assert!(headers.try_get_value("x-missing").is_none());
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut headers = dictionary();
        headers.add("Vary", ["Accept", "Origin"]);
        headers.set("vary", "Cookie");
        assert_eq!(headers.get("Vary"), HeaderValues::from("Cookie"));
    }

    #[test]
    fn test_keys_and_values_are_snapshots() {
        let mut headers = dictionary();
        headers.add("A", "1");
        headers.add("B", ["2", "3"]);
        headers.add("a", "4");

        let keys = headers.keys();
        let values = headers.values();
        headers.remove("A");

        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(
            values,
            vec![HeaderValues::from(["1", "4"]), HeaderValues::from(["2", "3"])]
        );
        assert_eq!(headers.keys(), vec!["B"]);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_enumeration_yields_one_entry_per_name() {
        let mut headers = dictionary();
        headers.add("Set-Cookie", "a=1");
        headers.add("Host", "example.com");
        headers.add("set-cookie", "b=2");

        let entries: Vec<_> = (&headers).into_iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, HeaderValues::from(["a=1", "b=2"]));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut headers = dictionary();
        assert!(!headers.remove("Host"));
        headers.set("Host", "example.com");
        assert!(headers.remove("host"));
        assert!(!headers.remove("host"));
        assert!(!headers.contains_key("Host"));
    }

    #[test]
    fn test_content_length_round_trip() {
        let mut headers = dictionary();
        for n in [0i64, 7, 1024, i64::MAX] {
            headers.set_content_length(Some(n)).unwrap();
            assert_eq!(headers.content_length(), Some(n as u64));
            assert_eq!(headers.get(CONTENT_LENGTH), HeaderValues::from(n.to_string()));
        }
    }

    #[test]
    fn test_negative_content_length_rejected() {
        let mut headers = dictionary();
        headers.set_content_length(Some(12)).unwrap();

        let err = headers.set_content_length(Some(-1)).unwrap_err();
        assert_eq!(err, HeaderError::NegativeContentLength(-1));
        assert_eq!(headers.content_length(), Some(12));
        assert_eq!(headers.get(CONTENT_LENGTH), HeaderValues::from("12"));
    }

    #[test]
    fn test_clearing_content_length_removes_header() {
        let mut headers = dictionary();
        headers.set_content_length(Some(5)).unwrap();
        headers.set_content_length(None).unwrap();
        assert!(!headers.contains_key(CONTENT_LENGTH));
        assert_eq!(headers.content_length(), None);
    }

    #[test]
    fn test_malformed_content_length_reads_absent() {
        let cases: &[&[&str]] = &[
            &[],
            &["1", "2"],
            &[""],
            &["   "],
            &["abc"],
            &["-5"],
            &["+5"],
            &["1.5"],
            &["99999999999999999999"],
        ];
        for raw in cases {
            let mut headers = dictionary();
            headers.set(CONTENT_LENGTH, *raw);
            assert_eq!(headers.content_length(), None, "raw value {:?}", raw);
        }
    }

    #[test]
    fn test_content_length_trims_and_accepts_leading_zeros() {
        let mut headers = dictionary();
        headers.set(CONTENT_LENGTH, " 0042 ");
        assert_eq!(headers.content_length(), Some(42));
    }

    #[test]
    fn test_cache_recomputes_after_external_write() {
        let shared = SharedHeaders::default();
        let mut headers = HeaderDictionary::new(shared.clone());
        headers.set_content_length(Some(10)).unwrap();
        assert_eq!(headers.content_length(), Some(10));

        headers.set(CONTENT_LENGTH, "20");
        assert_eq!(headers.content_length(), Some(20));

        // Bypass the view entirely.
        let mut raw = shared;
        raw.set_values(CONTENT_LENGTH, HeaderValues::from("30"));
        assert_eq!(headers.content_length(), Some(30));

        raw.set_values(CONTENT_LENGTH, HeaderValues::from("garbage"));
        assert_eq!(headers.content_length(), None);
    }

    #[test]
    fn test_clear_empties_collection() {
        let mut headers = dictionary();
        headers.add("A", "1");
        headers.set_content_length(Some(3)).unwrap();
        headers.clear();
        assert!(headers.is_empty());
        assert_eq!(headers.content_length(), None);
    }
}
