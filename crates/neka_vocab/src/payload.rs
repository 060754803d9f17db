use serde_json::Value;

use crate::decompress::Decompressor;
use crate::error::{DecodeError, Result};

/// The `(vocabulary, root)` pair handed over by the page fetch step.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub vocabulary: Vec<Value>,
    pub root: String,
}

impl RawPayload {
    pub fn new(vocabulary: Vec<Value>, root: impl Into<String>) -> Self {
        Self {
            vocabulary,
            root: root.into(),
        }
    }

    /// Extract the pair from any of the shapes the fetch step produces:
    ///
    /// - a bare `[vocabulary, root]` array
    /// - a page data object with `props.pageProps.kitOnSale = [vocabulary, root]`
    /// - a dump object wrapping the page data under `next_data`
    pub fn from_json(value: Value) -> Result<Self> {
        let pair = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => {
                let page = match obj.remove("next_data") {
                    Some(inner) => inner,
                    None => Value::Object(obj),
                };
                match page.pointer("/props/pageProps/kitOnSale") {
                    Some(Value::Array(items)) => items.clone(),
                    Some(_) => {
                        return Err(DecodeError::InvalidPayload(
                            "kitOnSale is not an array".to_string(),
                        ))
                    }
                    None => {
                        return Err(DecodeError::InvalidPayload(
                            "props.pageProps.kitOnSale not found".to_string(),
                        ))
                    }
                }
            }
            _ => {
                return Err(DecodeError::InvalidPayload(
                    "expected an array or an object".to_string(),
                ))
            }
        };

        let mut pair = pair.into_iter();
        match (pair.next(), pair.next()) {
            (Some(Value::Array(vocabulary)), Some(Value::String(root))) => {
                Ok(Self { vocabulary, root })
            }
            _ => Err(DecodeError::InvalidPayload(
                "expected [vocabulary, root] with a string root".to_string(),
            )),
        }
    }

    /// Parse the payload from raw JSON text.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;
        Self::from_json(value)
    }

    /// Decompress the whole document.
    ///
    /// Entry-level diagnostics are logged and dropped; use a [`Decompressor`] directly to
    /// inspect them.
    pub fn decompress(&self) -> Result<Value> {
        let mut decompressor = Decompressor::new(&self.vocabulary);
        let value = decompressor.decompress_root(&self.root)?;
        for diagnostic in decompressor.diagnostics() {
            tracing::warn!("Vocabulary entry skipped: {}", diagnostic);
        }
        Ok(value)
    }
}
