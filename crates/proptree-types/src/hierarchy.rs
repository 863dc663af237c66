//! Ancestor resolution for change propagation.
//!
//! A write to `/local/users/d/demo/photos/1.png` must be visible from the
//! owning user's home `/local/users/d/demo` by polling etags, so every
//! directory between the home anchor and the written path gets notified.
//! Nothing above the home anchor is ever touched.

/// Number of `/`-separated segments forming the home anchor.
///
/// The empty segment before the leading slash counts, so the anchor of
/// `/local/users/d/demo/x` is `/local/users/d/demo`.
pub const HOME_BOUNDARY_SEGMENTS: usize = 5;

/// Ancestors of `path` that propagation must update, deepest first.
///
/// `path` must be canonical. The result excludes `path` itself and is empty
/// when `path` is at or above the home anchor.
pub fn propagation_chain(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() <= HOME_BOUNDARY_SEGMENTS {
        return Vec::new();
    }

    let (home, rest) = segments.split_at(HOME_BOUNDARY_SEGMENTS);
    let mut current = home.join("/");
    let mut chain = Vec::with_capacity(rest.len());
    chain.push(current.clone());
    // The last segment is the leaf itself.
    for segment in &rest[..rest.len() - 1] {
        current.push('/');
        current.push_str(segment);
        chain.push(current.clone());
    }
    chain.reverse();
    chain
}
