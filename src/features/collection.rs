//! Feature lookup by capability type.

use axum::http::Extensions;

/// A type map of per-request capabilities.
///
/// Each feature type is stored at most once; lookups clone nothing.
#[derive(Debug, Clone, Default)]
pub struct Features {
    extensions: Extensions,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature, returning the one it replaced.
    pub fn set<T: Clone + Send + Sync + 'static>(&mut self, feature: T) -> Option<T> {
        self.extensions.insert(feature)
    }

    /// Look a feature up by its type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.get::<T>().is_some()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions.remove::<T>()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
