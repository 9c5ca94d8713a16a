//! Path quoting for manifest lines.
//!
//! A path is written verbatim unless it would confuse the line parser, in
//! which case it is wrapped in double quotes with `\\`, `\"`, `\n`, `\r`,
//! `\t` and `\xNN` escapes. Bytes that are not valid UTF-8 are always
//! escaped as `\xNN`.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Raw bytes of a path.
#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> Result<PathBuf, String> {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    Ok(PathBuf::from(OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> Result<PathBuf, String> {
    String::from_utf8(bytes)
        .map(PathBuf::from)
        .map_err(|_| "escaped bytes are not valid UTF-8".to_string())
}

/// Check whether `path` has to be quoted.
pub fn needs_quoting(path: &Path) -> bool {
    let bytes = path_bytes(path);
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return true;
    };

    let starts_or_ends_blank = text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace);

    starts_or_ends_blank
        || text
            .chars()
            .any(|c| matches!(c, '|' | '"' | '\\') || c.is_control())
}

/// Encode a path for the third field of a manifest line.
pub fn quote_path(path: &Path) -> Cow<'_, str> {
    if !needs_quoting(path) {
        return path.to_string_lossy();
    }

    let bytes = path_bytes(path);
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_ascii_control() => {
                    let _ = write!(out, "\\x{:02x}", c as u8);
                }
                c => out.push(c),
            }
        }
        for b in chunk.invalid() {
            let _ = write!(out, "\\x{b:02x}");
        }
    }
    out.push('"');
    Cow::Owned(out)
}

/// Decode the path field of a manifest line.
///
/// Fields that do not start with `"` are returned verbatim.
pub fn unquote_path(field: &str) -> Result<PathBuf, String> {
    if !field.starts_with('"') {
        return Ok(PathBuf::from(field));
    }

    let inner = field
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|_| field.len() >= 2)
        .ok_or_else(|| "unterminated quoted string".to_string())?;

    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'"' => return Err("unescaped quote".to_string()),
            b'\\' => {
                let escaped = match bytes.next() {
                    Some(b'\\') => b'\\',
                    Some(b'"') => b'"',
                    Some(b'n') => b'\n',
                    Some(b'r') => b'\r',
                    Some(b't') => b'\t',
                    Some(b'x') => {
                        let hi = bytes.next().and_then(hex_digit);
                        let lo = bytes.next().and_then(hex_digit);
                        match (hi, lo) {
                            (Some(hi), Some(lo)) => (hi << 4) | lo,
                            _ => return Err("bad \\x escape".to_string()),
                        }
                    }
                    Some(other) => {
                        return Err(format!("unknown escape '\\{}'", other as char));
                    }
                    None => return Err("trailing backslash".to_string()),
                };
                out.push(escaped);
            }
            b => out.push(b),
        }
    }

    if out.is_empty() {
        return Err("empty filename".to_string());
    }
    path_from_bytes(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
