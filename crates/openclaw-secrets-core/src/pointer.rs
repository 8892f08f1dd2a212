//! RFC 6901 JSON Pointer tokenization, read and set over `serde_json::Value`.

use serde_json::{Map, Value};

/// Behavior of [`read`] when the pointer does not resolve to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissing {
    /// Return `Err` naming the pointer.
    Throw,
    /// Return `Ok(None)`.
    Undefined,
}

/// Splits a pointer into its unescaped tokens. The empty pointer (`""`)
/// addresses the root and yields zero tokens.
fn tokenize(pointer: &str) -> Result<Vec<String>, anyhow::Error> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
        anyhow::bail!("invalid JSON pointer \"{pointer}\": must be empty or start with \"/\"");
    }
    Ok(pointer[1..]
        .split('/')
        .map(|raw| raw.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Escapes a single raw key into a pointer token (`~`→`~0`, `/`→`~1`).
pub fn escape_token(raw: &str) -> String {
    raw.replace('~', "~0").replace('/', "~1")
}

/// Joins already-escaped tokens into a pointer string, e.g. `["a", "b"]` → `"/a/b"`.
pub fn join(tokens: &[&str]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push('/');
        out.push_str(&escape_token(token));
    }
    out
}

/// Reads the value addressed by `pointer` within `root`.
pub fn read<'a>(
    root: &'a Value,
    pointer: &str,
    on_missing: OnMissing,
) -> Result<Option<&'a Value>, anyhow::Error> {
    let tokens = tokenize(pointer)?;
    let mut current = root;
    for token in &tokens {
        let next = match current {
            Value::Object(map) => map.get(token),
            Value::Array(items) => token
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => {
                return match on_missing {
                    OnMissing::Throw => {
                        Err(anyhow::anyhow!("JSON pointer \"{pointer}\" does not resolve"))
                    }
                    OnMissing::Undefined => Ok(None),
                };
            }
        }
    }
    Ok(Some(current))
}

/// Sets the value addressed by `pointer` within `root`, creating intermediate
/// objects as needed. The empty pointer replaces the root itself.
pub fn set(root: &mut Value, pointer: &str, value: Value) -> Result<(), anyhow::Error> {
    let tokens = tokenize(pointer)?;
    if tokens.is_empty() {
        *root = value;
        return Ok(());
    }

    let mut current = root;
    for token in &tokens[..tokens.len() - 1] {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            anyhow::bail!(
                "cannot set JSON pointer \"{pointer}\": intermediate segment is not an object"
            );
        };
        current = map.entry(token.clone()).or_insert_with(|| Value::Object(Map::new()));
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    let Value::Object(map) = current else {
        anyhow::bail!("cannot set JSON pointer \"{pointer}\": intermediate segment is not an object");
    };
    map.insert(tokens[tokens.len() - 1].clone(), value);
    Ok(())
}

/// Deletes the value addressed by `pointer`, if present. Returns whether a
/// value was removed. Has no effect if an intermediate segment is missing.
pub fn delete(root: &mut Value, pointer: &str) -> Result<bool, anyhow::Error> {
    let tokens = tokenize(pointer)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Ok(false);
    };

    let mut current = root;
    for token in parents {
        let next = match current {
            Value::Object(map) => map.get_mut(token),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(false),
        }
    }

    match current {
        Value::Object(map) => Ok(map.remove(last).is_some()),
        _ => Ok(false),
    }
}
