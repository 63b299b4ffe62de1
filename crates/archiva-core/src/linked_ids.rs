//! One-or-many remote identifier codec.
//!
//! Records that came out of an ERP order merge point at several remote
//! orders. The stored form is a bare string for a single identifier and a
//! JSON array string for several. [`LinkedIds`] is the in-memory shape;
//! [`encode`] and [`decode`] are the only places that know the stored form.

use serde::Deserialize;

/// One or more remote identifiers (or labels) attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkedIds {
    Single(String),
    Multiple(Vec<String>),
}

impl LinkedIds {
    /// Build from an ordered list of values.
    ///
    /// Blank entries and duplicates are dropped, order of first appearance is
    /// kept. Returns `None` when nothing is left.
    pub fn from_values<I, S>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = Vec::new();
        for value in values {
            let value = value.into();
            let value = value.trim();
            if value.is_empty() || ids.iter().any(|existing| existing == value) {
                continue;
            }
            ids.push(value.to_string());
        }

        match ids.len() {
            0 => None,
            1 => ids.pop().map(Self::Single),
            _ => Some(Self::Multiple(ids)),
        }
    }

    /// Identifiers in stored order.
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::Single(id) => std::slice::from_ref(id),
            Self::Multiple(ids) => ids,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.as_slice().iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Always false for values built through [`LinkedIds::from_values`] or [`decode`].
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.iter().any(|candidate| candidate == id)
    }
}

/// Encode into the stored representation.
///
/// A single identifier is stored verbatim; several are stored as a JSON array.
pub fn encode(ids: &LinkedIds) -> String {
    match ids {
        LinkedIds::Single(id) => id.clone(),
        LinkedIds::Multiple(ids) => serde_json::to_string(ids).unwrap_or_else(|_| ids.join(",")),
    }
}

/// Decode a stored value.
///
/// Anything that looks like a JSON array but fails to parse is kept as a
/// single opaque identifier rather than rejected.
pub fn decode(raw: &str) -> Option<LinkedIds> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<ArrayEntry>>(trimmed) {
            Ok(entries) => {
                return LinkedIds::from_values(entries.into_iter().filter_map(ArrayEntry::into_text))
            }
            Err(error) => {
                tracing::debug!("Treating malformed identifier list as scalar: {error}");
            }
        }
    }

    Some(LinkedIds::Single(trimmed.to_string()))
}

/// Decode an optional stored value, treating `None` like an empty string.
pub fn decode_option(raw: Option<&str>) -> Option<LinkedIds> {
    raw.and_then(decode)
}

/// Array entries are strings in practice, but older writers stored numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArrayEntry {
    Text(String),
    Number(serde_json::Number),
    Other(serde_json::Value),
}

impl ArrayEntry {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(number) => Some(number.to_string()),
            Self::Other(_) => None,
        }
    }
}

/// Serde adapter for `Option<LinkedIds>` fields carried in the legacy wire format.
pub mod wire {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{decode, encode, LinkedIds};

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<LinkedIds>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ids) => serializer.serialize_str(&encode(ids)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<LinkedIds>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(serde_json::Value::String(text)) => decode(&text),
            Some(serde_json::Value::Number(number)) => decode(&number.to_string()),
            Some(serde_json::Value::Array(values)) => LinkedIds::from_values(
                values.into_iter().filter_map(|value| match value {
                    serde_json::Value::String(text) => Some(text),
                    serde_json::Value::Number(number) => Some(number.to_string()),
                    _ => None,
                }),
            ),
            _ => None,
        })
    }
}
