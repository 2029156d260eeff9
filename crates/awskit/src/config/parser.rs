//! Parser for `KEY=VALUE` configuration files.
//!
//! The format is deliberately inert: nothing is evaluated or expanded.
//! ```text
//! # comment
//! REGION=eu-west-1
//! export MAX_RETRIES=5
//! GREETING="hello world"
//! ```

use crate::error::{Error, Result};
use std::path::Path;

/// Parse a configuration file.
///
/// Returns `Ok(None)` when the file does not exist; a missing source is
/// never an error.
pub fn parse_file(path: &Path) -> Result<Option<Vec<(String, String)>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_string(&content, path).map(Some)
}

/// Parse configuration from a string. `origin` is only used in errors.
pub fn parse_string(content: &str, origin: &Path) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = parse_line(line).map_err(|message| Error::ConfigLoad {
            path: origin.to_path_buf(),
            line: line_num + 1,
            message,
        })?;
        entries.push((key, value));
    }

    Ok(entries)
}

fn parse_line(line: &str) -> std::result::Result<(String, String), String> {
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);

    let (key, value) = line
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, found '{line}'"))?;

    let key = key.trim();
    if !is_valid_key(key) {
        return Err(format!("invalid key '{key}'"));
    }

    Ok((key.to_string(), unquote(value.trim()).to_string()))
}

/// Keys look like environment variable names.
fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// Strip one pair of matching quotes. No escape processing.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
