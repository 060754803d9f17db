//! Vocabulary decompression.
//!
//! Every vocabulary slot is either a plain JSON value or a string carrying a two-character
//! tag:
//!
//! | Tag  | Shape                  | Meaning                                             |
//! |------|------------------------|-----------------------------------------------------|
//! | `n|` | `n|<b62>` / `n|-<b62>` | integer, or a plain float if the body contains `.`  |
//! | `s|` | `s|<text>`             | literal string                                      |
//! | `a|` | `a|<ref>|<ref>...`     | array of referenced slots                           |
//! | `o|` | `o|<keys>|<ref>...`    | object; `<keys>` references an array of key names   |
//!
//! References are base-62 indices back into the same table. Slots are memoized by index,
//! so shared sub-structures are decoded once. A slot is marked in-progress before its
//! children are visited, and a reference to an in-progress slot resolves to `null`. This is
//! what keeps self-referencing entries from recursing forever.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::base62;
use crate::error::{DecodeError, Result};

/// Default recursion ceiling. Real kits nest a few dozen levels at most.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Key of the placeholder object produced for a malformed `o|` entry.
pub const RAW_ERROR_KEY: &str = "__raw_error__";

/// One classified vocabulary slot.
#[derive(Debug, Clone, PartialEq)]
pub enum VocabEntry<'a> {
    /// `n|` body, not yet parsed.
    Number(&'a str),
    /// `s|` body.
    String(&'a str),
    /// `a|` references.
    Array(Vec<usize>),
    /// `o|` key-list reference followed by value references. `keys` is `None` when the
    /// entry carries no key reference at all.
    Object {
        keys: Option<usize>,
        values: Vec<usize>,
    },
    /// A string without a recognized tag, kept verbatim.
    Literal(&'a str),
    /// A non-string JSON value, kept verbatim.
    Raw(&'a Value),
}

impl<'a> VocabEntry<'a> {
    /// Classify a raw vocabulary value.
    pub fn parse(value: &'a Value) -> Self {
        let Value::String(s) = value else {
            return VocabEntry::Raw(value);
        };

        if let Some(body) = s.strip_prefix("n|") {
            VocabEntry::Number(body)
        } else if let Some(body) = s.strip_prefix("s|") {
            VocabEntry::String(body)
        } else if let Some(body) = s.strip_prefix("a|") {
            VocabEntry::Array(parse_refs(body).collect())
        } else if let Some(body) = s.strip_prefix("o|") {
            let mut refs = parse_refs(body);
            let keys = refs.next();
            VocabEntry::Object {
                keys,
                values: refs.collect(),
            }
        } else {
            VocabEntry::Literal(s)
        }
    }
}

fn parse_refs(body: &str) -> impl Iterator<Item = usize> + '_ {
    body.split('|')
        .filter(|segment| !segment.is_empty())
        .map(|segment| base62::decode_int(segment) as usize)
}

enum Slot {
    InProgress,
    Done(Value),
}

/// Memoizing decompressor over one vocabulary table.
///
/// Decoding problems below the root never abort the walk. The offending node becomes `null`
/// (or a `{"__raw_error__": ...}` placeholder for bad objects), and the problem is kept in
/// [`diagnostics`](Self::diagnostics).
pub struct Decompressor<'v> {
    vocab: &'v [Value],
    memo: HashMap<usize, Slot>,
    max_depth: usize,
    lookups: usize,
    diagnostics: Vec<DecodeError>,
}

impl<'v> Decompressor<'v> {
    pub fn new(vocab: &'v [Value]) -> Self {
        Self {
            vocab,
            memo: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            lookups: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Override the recursion ceiling.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Number of vocabulary slots read so far (memo hits are not counted).
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Entry-level problems encountered so far.
    pub fn diagnostics(&self) -> &[DecodeError] {
        &self.diagnostics
    }

    /// Decompress the document rooted at a base-62 encoded index.
    ///
    /// This is the only hard failure: the root must exist and must decode to something
    /// other than `null` or a placeholder.
    pub fn decompress_root(&mut self, root: &str) -> Result<Value> {
        let index = base62::decode_int(root) as usize;
        if index >= self.vocab.len() {
            return Err(DecodeError::RootOutOfRange {
                index,
                len: self.vocab.len(),
            });
        }

        let value = self.decompress(index);
        let is_placeholder = value
            .as_object()
            .is_some_and(|obj| obj.len() == 1 && obj.contains_key(RAW_ERROR_KEY));
        if value.is_null() || is_placeholder {
            return Err(DecodeError::EmptyRoot(index));
        }

        tracing::debug!(
            "Decompressed root {} ({} lookups, {} diagnostics)",
            index,
            self.lookups,
            self.diagnostics.len()
        );
        Ok(value)
    }

    /// Decompress the slot at `index`. Out-of-range references yield `null`.
    pub fn decompress(&mut self, index: usize) -> Value {
        self.visit(index, 0)
    }

    fn visit(&mut self, index: usize, depth: usize) -> Value {
        match self.memo.get(&index) {
            Some(Slot::Done(value)) => return value.clone(),
            Some(Slot::InProgress) => return Value::Null,
            None => {}
        }

        if depth > self.max_depth {
            self.diagnostics
                .push(DecodeError::DepthExceeded { index, depth });
            return Value::Null;
        }

        self.lookups += 1;
        let vocab = self.vocab;
        let Some(raw) = vocab.get(index) else {
            self.memo.insert(index, Slot::Done(Value::Null));
            return Value::Null;
        };

        self.memo.insert(index, Slot::InProgress);
        let value = match VocabEntry::parse(raw) {
            VocabEntry::Raw(value) => value.clone(),
            VocabEntry::Literal(s) => Value::String(s.to_string()),
            VocabEntry::String(s) => Value::String(s.to_string()),
            VocabEntry::Number(body) => match parse_number(body) {
                Some(n) => Value::Number(n),
                None => {
                    self.diagnostics.push(DecodeError::MalformedNumber {
                        index,
                        raw: body.to_string(),
                    });
                    Value::Null
                }
            },
            VocabEntry::Array(refs) => Value::Array(
                refs.into_iter()
                    .map(|child| self.visit(child, depth + 1))
                    .collect(),
            ),
            VocabEntry::Object { keys, values } => {
                self.build_object(index, raw, keys, values, depth)
            }
        };

        self.memo.insert(index, Slot::Done(value.clone()));
        value
    }

    fn build_object(
        &mut self,
        index: usize,
        raw: &Value,
        keys: Option<usize>,
        values: Vec<usize>,
        depth: usize,
    ) -> Value {
        let keys = keys.map(|k| self.visit(k, depth + 1));
        let values: Vec<Value> = values
            .into_iter()
            .map(|child| self.visit(child, depth + 1))
            .collect();

        match keys {
            Some(Value::Array(keys)) if keys.len() == values.len() => {
                let map: Map<String, Value> = keys.iter().map(key_to_string).zip(values).collect();
                Value::Object(map)
            }
            other => {
                let key_count = match &other {
                    Some(Value::Array(keys)) => keys.len(),
                    _ => 0,
                };
                self.diagnostics.push(DecodeError::KeyValueMismatch {
                    index,
                    keys: key_count,
                    values: values.len(),
                });
                let mut placeholder = Map::new();
                placeholder.insert(RAW_ERROR_KEY.to_string(), raw.clone());
                Value::Object(placeholder)
            }
        }
    }
}

fn parse_number(body: &str) -> Option<Number> {
    if body.contains('.') {
        return body.parse::<f64>().ok().and_then(Number::from_f64);
    }

    let (negative, digits) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let magnitude = base62::decode_int(digits);
    if !negative {
        return Some(Number::from(magnitude));
    }
    match i64::try_from(magnitude) {
        Ok(v) => Some(Number::from(-v)),
        Err(_) => Number::from_f64(-(magnitude as f64)),
    }
}

fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
