//! Header storage and the typed header view.
//!
//! # Data Flow
//! ```text
//! listener (hyper HeaderMap)
//!     → collection.rs (RawHeaders: ordered, case-insensitive, multi-valued)
//!     → SharedHeaders (one collection referenced by raw response + features)
//!     → dictionary.rs (HeaderDictionary: typed view, cached Content-Length)
//!     → application handlers
//! ```
//!
//! # Design Decisions
//! - The raw collection is referenced, never copied, by the dictionary
//! - Multiple values per name are preserved, not joined
//! - A malformed Content-Length is "absent", never an error

pub mod collection;
pub mod dictionary;
pub mod values;

pub use collection::{HeaderCollection, RawHeaders, SharedHeaders};
pub use dictionary::{HeaderDictionary, HeaderError, CONTENT_LENGTH};
pub use values::HeaderValues;
