//! Helpers for slash-separated storage paths.
//!
//! Storage paths are relative to a storage's root. Leading and trailing
//! slashes are insignificant, the empty string names the root.

/// Normalize a storage path by stripping leading/trailing slashes and
/// collapsing empty and `.` segments.
///
/// # Arguments
/// * `path` - Storage path
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<&str>>()
        .join("/")
}

/// Parent directory of a path, `None` for entries directly under the root.
///
/// # Arguments
/// * `path` - Storage path
pub fn parent(path: &str) -> Option<String> {
    let normalized: String = normalize(path);
    normalized
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
}

/// Final segment of a path.
///
/// # Arguments
/// * `path` - Storage path
pub fn file_name(path: &str) -> String {
    let normalized: String = normalize(path);
    match normalized.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => normalized,
    }
}

/// Join a directory path and an entry name.
///
/// # Arguments
/// * `dir` - Directory path (may be the root)
/// * `name` - Entry name
pub fn join(dir: &str, name: &str) -> String {
    let dir: String = normalize(dir);
    let name: String = normalize(name);
    if dir.is_empty() {
        name
    } else if name.is_empty() {
        dir
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Ancestor directories of a path, outermost first, excluding the root and
/// the path itself.
///
/// `a/b/c.txt` yields `["a", "a/b"]`.
///
/// # Arguments
/// * `path` - Storage path
pub fn ancestors(path: &str) -> Vec<String> {
    let normalized: String = normalize(path);
    let segments: Vec<&str> = normalized.split('/').collect();
    (1..segments.len())
        .map(|end| segments[..end].join("/"))
        .collect()
}
