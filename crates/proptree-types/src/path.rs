//! Canonical path handling.
//!
//! Every path that reaches a store is rooted and lexically clean: no repeated
//! separators, no `.` or `..` elements, no trailing slash (except the root).

/// Lexically clean `path` into its canonical rooted form.
///
/// Relative input is taken relative to `/`, and `..` never climbs above the
/// root. The empty string cleans to `/`.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Returns `true` if `path` equals `prefix` or lies in its subtree.
///
/// Both arguments must be canonical. The separator anchor keeps `/foo1` out
/// of the `/foo` subtree.
pub fn is_within(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Replace the `from` prefix of `path` with `to`, keeping the suffix.
///
/// Returns `None` when `path` is not within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_within(path, from) {
        return None;
    }
    let suffix = if from == "/" {
        path
    } else {
        &path[from.len()..]
    };
    if suffix.is_empty() || suffix == "/" {
        return Some(to.to_string());
    }
    if to == "/" {
        Some(suffix.to_string())
    } else {
        Some(format!("{to}{suffix}"))
    }
}
