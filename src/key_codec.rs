//! Reversible encoding of composite keys into a single partition key string.
//!
//! Parts are joined with [`DELIMITER`]; occurrences of the delimiter or the
//! [`ESCAPER`] inside a part are prefixed with the escaper. Decoding treats an
//! escaper as "next character is literal", so `decode(encode(p)) == p` for any
//! non-empty `p`.
//!
//! Encoding the empty sequence yields `""`, while decoding `""` yields `[""]`.
//! [`CompositeKey`] rejects empty sequences so that case never reaches a store.

use std::fmt;

use crate::error::RunnerError;

/// Separates parts of an encoded key.
pub const DELIMITER: char = ':';

/// Marks the following character as literal.
pub const ESCAPER: char = '\\';

/// Encodes an ordered list of parts into one delimited string.
pub fn encode<S: AsRef<str>>(parts: &[S]) -> String {
    let mut result = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            result.push(DELIMITER);
        }
        for c in part.as_ref().chars() {
            if c == ESCAPER || c == DELIMITER {
                result.push(ESCAPER);
            }
            result.push(c);
        }
    }
    result
}

/// Decodes a string produced by [`encode`] back into its parts.
pub fn decode(s: &str) -> Vec<String> {
    let mut results = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }
        match c {
            ESCAPER => escaped = true,
            DELIMITER => results.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    results.push(current);
    results
}

/// An ordered, non-empty list of strings identifying one logical state item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    parts: Vec<String>,
}

impl CompositeKey {
    /// Creates a composite key, rejecting an empty sequence of parts.
    pub fn new<I, S>(parts: I) -> Result<Self, RunnerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.is_empty() {
            return Err(RunnerError::validation(
                "Composite key must have at least one part",
            ));
        }
        Ok(Self { parts })
    }

    /// Rebuilds a composite key from its encoded form.
    pub fn from_encoded(encoded: &str) -> Self {
        Self {
            parts: decode(encoded),
        }
    }

    /// Returns the key parts in order.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Returns the encoded form used as the store's partition key.
    pub fn encoded(&self) -> String {
        encode(&self.parts)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded())
    }
}
