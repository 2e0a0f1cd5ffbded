//! Operation types: values, records, modifications, and search results.

use std::collections::HashMap;

/// A directory value that is either abstract text or bytes in some
/// concrete encoding.
///
/// The distinction drives the [`crate::encoding::EncodingBridge`]: text is
/// encoded towards the wire, bytes are decoded from their side's encoding
/// first. Binary attribute values stay `Bytes` end to end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DirValue {
    /// Decoded text.
    Text(String),
    /// Bytes in the encoding of whichever side they came from.
    Bytes(Vec<u8>),
}

impl DirValue {
    /// The raw bytes of this value; text is viewed as UTF-8.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            DirValue::Text(s) => s.as_bytes(),
            DirValue::Bytes(b) => b,
        }
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            DirValue::Text(s) => s.into_bytes(),
            DirValue::Bytes(b) => b,
        }
    }

    /// The text form, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DirValue::Text(s) => Some(s),
            DirValue::Bytes(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<&str> for DirValue {
    fn from(s: &str) -> Self {
        DirValue::Text(s.to_string())
    }
}

impl From<String> for DirValue {
    fn from(s: String) -> Self {
        DirValue::Text(s)
    }
}

impl From<Vec<u8>> for DirValue {
    fn from(b: Vec<u8>) -> Self {
        DirValue::Bytes(b)
    }
}

/// Caller-supplied attribute values for insert and modify.
///
/// A single string may express multiple values by separating them with
/// semicolons. `Binary` values are passed to the wire without any encoding
/// conversion when the attribute key carries the `;binary` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValues {
    /// One string, possibly semicolon-delimited.
    Single(String),
    /// An explicit list of string values.
    Many(Vec<String>),
    /// Raw byte values.
    Binary(Vec<Vec<u8>>),
}

impl From<&str> for AttrValues {
    fn from(s: &str) -> Self {
        AttrValues::Single(s.to_string())
    }
}

impl From<String> for AttrValues {
    fn from(s: String) -> Self {
        AttrValues::Single(s)
    }
}

impl From<Vec<String>> for AttrValues {
    fn from(values: Vec<String>) -> Self {
        AttrValues::Many(values)
    }
}

impl From<Vec<&str>> for AttrValues {
    fn from(values: Vec<&str>) -> Self {
        AttrValues::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<Vec<u8>>> for AttrValues {
    fn from(values: Vec<Vec<u8>>) -> Self {
        AttrValues::Binary(values)
    }
}

/// Explicit modification mode for [`crate::client::LdapClient::modify`].
///
/// When no mode is given the client infers one per attribute by diffing
/// the request against the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModType {
    Add,
    Replace,
    Delete,
}

/// One entry of a wire-level modification list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Add values to an attribute.
    Add {
        attribute: String,
        values: Vec<Vec<u8>>,
    },
    /// Replace all values of an attribute.
    Replace {
        attribute: String,
        values: Vec<Vec<u8>>,
    },
    /// Delete the listed values, or the whole attribute when `values` is
    /// `None`.
    Delete {
        attribute: String,
        values: Option<Vec<Vec<u8>>>,
    },
}

impl Modification {
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add { attribute, .. }
            | Modification::Replace { attribute, .. }
            | Modification::Delete { attribute, .. } => attribute,
        }
    }
}

/// Search breadth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// The base entry only.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The full subtree under the base entry.
    #[default]
    Subtree,
}

/// One directory record: a DN plus its attribute values.
///
/// Records produced by a search carry an injected `dn` attribute holding
/// the outgoing-converted distinguished name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// The record's distinguished name as wire-side text.
    pub dn: String,
    /// Attribute name to ordered value list.
    pub attrs: HashMap<String, Vec<DirValue>>,
}

impl Record {
    /// Values of an attribute, if present.
    pub fn get(&self, name: &str) -> Option<&[DirValue]> {
        self.attrs.get(name).map(Vec::as_slice)
    }

    /// First value of an attribute as text, if present and textual.
    pub fn first_text(&self, name: &str) -> Option<&str> {
        self.attrs.get(name)?.first()?.as_text()
    }
}

/// Result of a search: the matched records in server order.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Number of matched records.
    pub count: usize,
    /// The matched records.
    pub records: Vec<Record>,
}
