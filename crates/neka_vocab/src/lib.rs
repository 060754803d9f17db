//! Decoding for the packed "vocabulary" format used by kit pages.
//!
//! A kit page ships its data as a flat table of tagged strings plus a root index.
//! This crate turns that pair back into an ordinary JSON document:
//!
//! - [`base62`] encodes and decodes the back-reference indices and fractional offsets
//! - [`Decompressor`] materializes nested arrays/objects from the table
//! - [`RawPayload`] pulls the `(vocabulary, root)` pair out of a fetched page payload
//!
//! # Example
//!
//! ```
//! use neka_vocab::Decompressor;
//! use serde_json::json;
//!
//! let vocab = vec![json!("a|1|2"), json!("s|hair"), json!("n|A")];
//! let mut decompressor = Decompressor::new(&vocab);
//! let value = decompressor.decompress(0);
//! assert_eq!(value, json!(["hair", 10]));
//! ```

pub mod base62;
mod decompress;
mod error;
mod payload;

pub use decompress::{Decompressor, VocabEntry, DEFAULT_MAX_DEPTH, RAW_ERROR_KEY};
pub use error::{DecodeError, Result};
pub use payload::RawPayload;
