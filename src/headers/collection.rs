//! Raw header collection.
//!
//! # Responsibilities
//! - Store header names with their ordered value sequences
//! - Collapse names case-insensitively, keeping the first spelling seen
//! - Convert to and from `http::HeaderMap` at the listener boundary
//!
//! # Design Decisions
//! - Iteration follows insertion order of distinct names
//! - Removing a name keeps the relative order of the others
//! - `SharedHeaders` lets the raw response and the typed view reference one store

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use indexmap::IndexMap;

use super::values::HeaderValues;

/// Operations the typed header view needs from the underlying collection.
pub trait HeaderCollection {
    /// Number of distinct names.
    fn len(&self) -> usize;

    /// Returns true when no header is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a value sequence is stored under `name`.
    fn contains(&self, name: &str) -> bool;

    /// All values stored under `name`, or `None` when the name is absent.
    fn get_values(&self, name: &str) -> Option<HeaderValues>;

    /// Replaces every value stored under `name`.
    fn set_values(&mut self, name: &str, values: HeaderValues);

    /// Appends values after any already stored under `name`.
    fn append_values(&mut self, name: &str, values: HeaderValues);

    /// Removes `name`, returning whether it was present.
    fn remove(&mut self, name: &str) -> bool;

    /// Removes every header.
    fn clear(&mut self);

    /// Snapshot of `(name, values)` pairs in iteration order.
    fn entries(&self) -> Vec<(String, HeaderValues)>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    values: HeaderValues,
}

/// Ordered, case-insensitive, multi-valued header store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeaders {
    entries: IndexMap<String, Entry>,
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl RawHeaders {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the headers of a hyper/http request.
    ///
    /// Values that are not valid UTF-8 are decoded lossily.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map.iter() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers.append_values(name.as_str(), HeaderValues::from(value));
        }
        headers
    }

    /// Build an `http::HeaderMap`, skipping names or values the wire cannot carry.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for entry in self.entries.values() {
            let name = match HeaderName::from_bytes(entry.name.as_bytes()) {
                Ok(name) => name,
                Err(_) => {
                    tracing::warn!(header = %entry.name, "Skipping invalid header name");
                    continue;
                }
            };
            for value in &entry.values {
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        map.append(name.clone(), value);
                    }
                    Err(_) => {
                        tracing::warn!(header = %entry.name, "Skipping invalid header value");
                    }
                }
            }
        }
        map
    }
}

impl HeaderCollection for RawHeaders {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&fold(name))
    }

    fn get_values(&self, name: &str) -> Option<HeaderValues> {
        self.entries.get(&fold(name)).map(|entry| entry.values.clone())
    }

    fn set_values(&mut self, name: &str, values: HeaderValues) {
        if values.is_empty() {
            self.remove(name);
            return;
        }
        let key = fold(name);
        match self.entries.get_mut(&key) {
            Some(entry) => entry.values = values,
            None => {
                self.entries.insert(
                    key,
                    Entry {
                        name: name.to_string(),
                        values,
                    },
                );
            }
        }
    }

    fn append_values(&mut self, name: &str, values: HeaderValues) {
        if values.is_empty() {
            return;
        }
        let entry = self.entries.entry(fold(name)).or_insert_with(|| Entry {
            name: name.to_string(),
            values: HeaderValues::new(),
        });
        for value in values {
            entry.values.push(value);
        }
    }

    fn remove(&mut self, name: &str) -> bool {
        self.entries.shift_remove(&fold(name)).is_some()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn entries(&self) -> Vec<(String, HeaderValues)> {
        self.entries
            .values()
            .map(|entry| (entry.name.clone(), entry.values.clone()))
            .collect()
    }
}

/// A [`RawHeaders`] handle shared between the raw response and its views.
#[derive(Debug, Clone, Default)]
pub struct SharedHeaders {
    inner: Arc<Mutex<RawHeaders>>,
}

impl SharedHeaders {
    /// Wrap an existing collection.
    pub fn new(headers: RawHeaders) -> Self {
        Self {
            inner: Arc::new(Mutex::new(headers)),
        }
    }

    /// Lock the collection for a batch of operations.
    ///
    /// A poisoned lock is recovered: header state has no invariant a panic can break.
    pub fn lock(&self) -> MutexGuard<'_, RawHeaders> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone the current contents.
    pub fn snapshot(&self) -> RawHeaders {
        self.lock().clone()
    }
}

impl From<RawHeaders> for SharedHeaders {
    fn from(headers: RawHeaders) -> Self {
        Self::new(headers)
    }
}

impl HeaderCollection for SharedHeaders {
    fn len(&self) -> usize {
        self.lock().len()
    }

    fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    fn get_values(&self, name: &str) -> Option<HeaderValues> {
        self.lock().get_values(name)
    }

    fn set_values(&mut self, name: &str, values: HeaderValues) {
        self.lock().set_values(name, values);
    }

    fn append_values(&mut self, name: &str, values: HeaderValues) {
        self.lock().append_values(name, values);
    }

    fn remove(&mut self, name: &str) -> bool {
        self.lock().remove(name)
    }

    fn clear(&mut self) {
        self.lock().clear();
    }

    fn entries(&self) -> Vec<(String, HeaderValues)> {
        self.lock().entries()
    }
}
