//! Slash-separated path helpers shared by filesystem URIs and virtual disc paths.
//!
//! Filesystem URIs look like `file:///home/user/a%20b` and keep every byte
//! outside the RFC 3986 `pchar` set percent-escaped. Virtual disc paths look
//! like `/music/a b` and are plain UTF-8. Both have a root (`file:///` and `/`)
//! and never end with a slash unless they are the root.

use std::path::{Path, PathBuf};

pub const FILE_SCHEME: &str = "file://";

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn root_len(path: &str) -> usize {
    if path.starts_with(FILE_SCHEME) {
        FILE_SCHEME.len() + 1
    } else {
        1
    }
}

pub fn is_root(path: &str) -> bool {
    path.len() <= root_len(path)
}

/// Parent of `path`, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let root = root_len(path);
    if path.len() <= root {
        return None;
    }
    match path.rfind('/') {
        Some(index) if index >= root => Some(&path[..index]),
        Some(_) => Some(&path[..root]),
        None => None,
    }
}

pub fn basename(path: &str) -> &str {
    if is_root(path) {
        return "";
    }
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

pub fn join(dir: &str, name: &str) -> String {
    if name.is_empty() {
        dir.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Part of `path` below `ancestor` without the leading slash; `Some("")` when
/// both are equal and `None` when `ancestor` does not contain `path`.
pub fn relative_to<'a>(path: &'a str, ancestor: &str) -> Option<&'a str> {
    if path == ancestor {
        return Some("");
    }
    let rest = path.strip_prefix(ancestor)?;
    if ancestor.ends_with('/') {
        (!rest.is_empty()).then_some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    relative_to(path, ancestor).is_some()
}

pub fn is_strict_ancestor(ancestor: &str, path: &str) -> bool {
    matches!(relative_to(path, ancestor), Some(rest) if !rest.is_empty())
}

/// Moves `path` from below `old_prefix` to below `new_prefix`.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    relative_to(path, old_prefix).map(|rest| join(new_prefix, rest))
}

/// Iterates over the strict ancestors of `path`, closest first.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent(path), |current| parent(*current))
}

fn is_pchar(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"-._~!$&'()*+,;=:@".contains(&byte)
}

pub fn escape_name(raw: &[u8]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for &byte in raw {
        if is_pchar(byte) {
            escaped.push(byte as char);
        } else {
            escaped.push('%');
            escaped.push(HEX[(byte >> 4) as usize] as char);
            escaped.push(HEX[(byte & 0xf) as usize] as char);
        }
    }
    escaped
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

pub fn unescape(escaped: &str) -> Vec<u8> {
    let bytes = escaped.as_bytes();
    let mut raw = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_value(bytes[index + 1]), hex_value(bytes[index + 2])) {
                raw.push(high << 4 | low);
                index += 3;
                continue;
            }
        }
        raw.push(bytes[index]);
        index += 1;
    }
    raw
}

/// Unescaped base name of a URI, `None` when it is not valid UTF-8.
pub fn display_name(uri: &str) -> Option<String> {
    String::from_utf8(unescape(basename(uri))).ok()
}

/// A valid UTF-8 replacement for a name that is not.
pub fn valid_name(uri: &str) -> String {
    String::from_utf8_lossy(&unescape(basename(uri)))
        .chars()
        .map(|c| if c == char::REPLACEMENT_CHARACTER { '_' } else { c })
        .collect()
}

/// Turns the escaped part of a URI below some directory into a virtual suffix.
pub fn unescape_relative(relative: &str) -> String {
    relative
        .split('/')
        .map(|segment| String::from_utf8_lossy(&unescape(segment)).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Turns a virtual suffix into the escaped part of a URI.
pub fn escape_relative(relative: &str) -> String {
    relative
        .split('/')
        .map(|segment| escape_name(segment.as_bytes()))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().replace('\\', "/").into_bytes()
}

/// File URI of `path`; relative paths are taken from the working directory.
pub fn from_path(path: &Path) -> String {
    let bytes = match std::path::absolute(path) {
        Ok(absolute) => path_bytes(&absolute),
        Err(_) => path_bytes(path),
    };
    let escaped = bytes
        .split(|&byte| byte == b'/')
        .map(escape_name)
        .collect::<Vec<_>>()
        .join("/");
    if escaped.starts_with('/') {
        format!("{FILE_SCHEME}{escaped}")
    } else {
        format!("{FILE_SCHEME}/{escaped}")
    }
}

#[cfg(unix)]
pub fn to_path(uri: &str) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    let path = uri.strip_prefix(FILE_SCHEME).unwrap_or(uri);
    PathBuf::from(OsString::from_vec(unescape(path)))
}

#[cfg(not(unix))]
pub fn to_path(uri: &str) -> PathBuf {
    let path = uri.strip_prefix(FILE_SCHEME).unwrap_or(uri);
    PathBuf::from(String::from_utf8_lossy(&unescape(path)).into_owned())
}
