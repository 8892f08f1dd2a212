//! The `SecretRef` tagged sum and its validation rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_ENV_ID_LEN: usize = 128;

/// A declarative reference to a secret value, resolved at activation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SecretRef {
    Env { id: String },
    File { id: String },
}

impl SecretRef {
    /// Parses a `SecretRef` out of an arbitrary JSON value, validating both
    /// the shape (`{ source, id }`) and the per-source `id` grammar. Any
    /// other shape is not a `SecretRef` and yields `None`, never an error —
    /// callers use this to distinguish "this is a ref" from "this is
    /// plaintext", not to validate already-known refs.
    pub fn try_from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.len() != 2 {
            return None;
        }
        let source = obj.get("source")?.as_str()?;
        let id = obj.get("id")?.as_str()?;
        match source {
            "env" if is_valid_env_id(id) => Some(SecretRef::Env { id: id.to_string() }),
            "file" if is_valid_file_pointer(id) => {
                Some(SecretRef::File { id: id.to_string() })
            }
            _ => None,
        }
    }

    /// True if `value` has the `{ source, id }` shape of a `SecretRef`
    /// (valid or not) — used to decide whether a plaintext sibling should be
    /// treated as "already migrated" even if malformed.
    pub fn looks_like_ref(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| obj.len() == 2 && obj.contains_key("source") && obj.contains_key("id"))
    }

    pub fn source_tag(&self) -> &'static str {
        match self {
            SecretRef::Env { .. } => "env",
            SecretRef::File { .. } => "file",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SecretRef::Env { id } | SecretRef::File { id } => id,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "source": self.source_tag(), "id": self.id() })
    }
}

/// `^[A-Z][A-Z0-9_]{0,127}$`
pub fn is_valid_env_id(id: &str) -> bool {
    if id.is_empty() || id.len() > MAX_ENV_ID_LEN {
        return false;
    }
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_uppercase() {
        return false;
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// An absolute RFC 6901 JSON pointer: empty, or starting with `/`.
pub fn is_valid_file_pointer(id: &str) -> bool {
    id.starts_with('/')
}
