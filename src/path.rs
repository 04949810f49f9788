//! Forward-slash path helpers shared by the backends.

/// Strip one trailing `/` unless the path is the root.
pub fn remove_slash_at_end(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Parent directory of `path`; `/` for top-level entries, empty for bare names.
pub fn directory(path: &str) -> &str {
    let trimmed = remove_slash_at_end(path);
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(pos) => &trimmed[..pos],
        None => "",
    }
}

/// Final component of `path`.
pub fn file_name(path: &str) -> &str {
    let trimmed = remove_slash_at_end(path);
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Join a directory and a child name with exactly one separator.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.strip_suffix('/').unwrap_or(dir);
    let name = name.strip_prefix('/').unwrap_or(name);
    format!("{dir}/{name}")
}

/// Ensure a leading `/`.
pub fn absolute(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
