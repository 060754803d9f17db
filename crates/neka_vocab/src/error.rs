use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors raised while decoding base-62 values or decompressing a vocabulary.
///
/// Most of these are recorded as diagnostics by the [`Decompressor`](crate::Decompressor)
/// and the offending node is replaced with `null`. Only a failure at the root is returned
/// to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// A character outside `[0-9A-Za-z]` was found by a strict decoder.
    #[error("invalid base-62 digit {ch:?} at position {position}")]
    InvalidDigit { ch: char, position: usize },

    /// The decoded integer does not fit in 64 bits.
    #[error("base-62 value '{0}' overflows 64 bits")]
    Overflow(String),

    /// An `n|` entry whose payload is neither a base-62 integer nor a float.
    #[error("malformed number literal at index {index}: {raw:?}")]
    MalformedNumber { index: usize, raw: String },

    /// An `o|` entry whose key list is missing or does not match its value count.
    #[error("object at index {index} has {keys} keys for {values} values")]
    KeyValueMismatch {
        index: usize,
        keys: usize,
        values: usize,
    },

    /// Nesting went deeper than the configured ceiling.
    #[error("recursion depth {depth} exceeded at index {index}")]
    DepthExceeded { index: usize, depth: usize },

    /// The root index points past the end of the vocabulary.
    #[error("root index {index} is out of range (vocabulary has {len} entries)")]
    RootOutOfRange { index: usize, len: usize },

    /// The root decompressed to `null` or a diagnostic placeholder.
    #[error("root entry {0} did not decompress to a document")]
    EmptyRoot(usize),

    /// The fetched payload does not contain a `(vocabulary, root)` pair.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
