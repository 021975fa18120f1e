use serde::{Deserialize, Serialize};
use std::fmt;

/// What a derived key is bound to
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// One key per field, identity = field name bytes
    Field(String),
    /// One key per (field, term), identity = field name bytes followed by term bytes
    Term(String, Vec<u8>),
}

impl KeyScope {
    pub fn field(name: &str) -> Self {
        KeyScope::Field(name.to_string())
    }

    pub fn term(name: &str, term: &[u8]) -> Self {
        KeyScope::Term(name.to_string(), term.to_vec())
    }

    /// Byte string fed to key derivation
    pub fn identity(&self) -> Vec<u8> {
        match self {
            KeyScope::Field(name) => name.as_bytes().to_vec(),
            KeyScope::Term(name, term) => {
                let mut id = Vec::with_capacity(name.len() + term.len());
                id.extend_from_slice(name.as_bytes());
                id.extend_from_slice(term);
                id
            }
        }
    }

    pub fn field_name(&self) -> &str {
        match self {
            KeyScope::Field(name) | KeyScope::Term(name, _) => name,
        }
    }
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyScope::Field(name) => write!(f, "field '{}'", name),
            KeyScope::Term(name, term) => {
                write!(f, "term '{}' in field '{}'", term.escape_ascii(), name)
            }
        }
    }
}

/// Granularity of postings keys within a segment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScopeMode {
    #[default]
    PerField,
    /// Legacy layout: every postings span has its own (field, term) key
    PerTerm,
}

impl KeyScopeMode {
    /// Scope of the key sealing the postings of `term` in `field`
    pub fn postings_scope(&self, field: &str, term: &[u8]) -> KeyScope {
        match self {
            KeyScopeMode::PerField => KeyScope::field(field),
            KeyScopeMode::PerTerm => KeyScope::term(field, term),
        }
    }
}
