//! Conservative `.env` scrubbing: only drop a line whose allow-listed key's
//! parsed value exactly equals a value that was migrated into the encrypted
//! payload. Partial or derived matches are never removed.

use std::collections::HashSet;

/// Scrubs `original`, returning the rewritten contents and the number of
/// lines removed.
pub fn scrub_env_file(original: &str, migrated_values: &HashSet<String>, allowlist: &[String]) -> (String, u32) {
    let had_trailing_newline = original.ends_with('\n');
    let mut lines: Vec<&str> = original.split('\n').collect();
    if had_trailing_newline {
        lines.pop();
    }

    let mut kept = Vec::with_capacity(lines.len());
    let mut removed = 0u32;

    for raw_line in lines {
        let (line, had_cr) = match raw_line.strip_suffix('\r') {
            Some(stripped) => (stripped, true),
            None => (raw_line, false),
        };

        if let Some((key, raw_value)) = parse_env_line(line) {
            if allowlist.iter().any(|k| k == &key) {
                let parsed_value = dequote(raw_value.trim());
                if migrated_values.contains(&parsed_value) {
                    removed += 1;
                    continue;
                }
            }
        }

        kept.push(if had_cr { format!("{line}\r") } else { line.to_string() });
    }

    let mut result = kept.join("\n");
    if had_trailing_newline {
        result.push('\n');
    }
    (result, removed)
}

/// Matches `^\s*(export\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*)$`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let mut rest = line.trim_start();
    if let Some(after_export) = rest.strip_prefix("export") {
        if let Some(after_ws) = after_export.strip_prefix(|c: char| c.is_whitespace()) {
            rest = after_ws.trim_start();
        }
    }

    let first = rest.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let key_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let (key, after_key) = rest.split_at(key_end);

    let after_key = after_key.trim_start();
    let value = after_key.strip_prefix('=')?;
    Some((key.to_string(), value.trim_start().to_string()))
}

/// Strips one matching pair of surrounding single or double quotes.
fn dequote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
