use crate::tree::error::{TreeError, TreeResult};

const MAX_PATH_LENGTH: usize = 4096;
const MAX_FILENAME_LENGTH: usize = 255;

/// Normalize an absolute path: collapse repeated separators, drop `.` and
/// resolve `..` lexically. `..` at the root stays at the root.
pub fn normalize_path(path: &str) -> TreeResult<String> {
    check_raw(path)?;

    if !path.starts_with('/') {
        return Err(TreeError::InvalidPath(format!("Path must start with /: {path}")));
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => {
                if name.len() > MAX_FILENAME_LENGTH {
                    return Err(TreeError::FilenameTooLong(name.len()));
                }
                parts.push(name);
            }
        }
    }

    Ok(format!("/{}", parts.join("/")))
}

/// Convert a raw archive entry name (`./etc/passwd`, `etc/`, `/bin/sh`) into a
/// normalized absolute path. Names climbing above the archive root are rejected.
pub fn archive_entry_path(name: &str) -> TreeResult<String> {
    check_raw(name)?;

    let mut depth: usize = 0;
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                depth = depth.checked_sub(1).ok_or_else(|| TreeError::EscapesRoot(name.into()))?;
            }
            _ => depth += 1,
        }
    }

    normalize_path(&format!("/{}", name.trim_start_matches('/')))
}

/// Resolve a link target against the directory holding the link.
pub fn resolve_link_target(link_path: &str, target: &str) -> TreeResult<String> {
    if target.starts_with('/') {
        return normalize_path(target);
    }
    let parent = parent_path(link_path).unwrap_or_else(|| "/".to_string());
    normalize_path(&format!("{parent}/{target}"))
}

/// Parent of a normalized path, `None` for the root.
pub fn parent_path(path: &str) -> Option<String> {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return None;
    }

    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(pos) => Some(path[..pos].to_string()),
        None => None,
    }
}

/// Final component of a path.
pub fn base_name(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// True when `path` lies strictly beneath the directory `dir`.
pub fn is_beneath(path: &str, dir: &str) -> bool {
    if dir == "/" {
        return path != "/";
    }
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

pub fn path_components(path: &str) -> TreeResult<Vec<String>> {
    let normalized = normalize_path(path)?;
    Ok(normalized.split('/').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect())
}

fn check_raw(path: &str) -> TreeResult<()> {
    if path.is_empty() {
        return Err(TreeError::InvalidPath("Empty path".to_string()));
    }

    if path.contains('\0') {
        return Err(TreeError::InvalidPath("Path contains NULL character".to_string()));
    }

    if path.len() > MAX_PATH_LENGTH {
        return Err(TreeError::PathTooLong(path.len()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_root() {
        assert_eq!(normalize_path("/").unwrap(), "/");
    }

    #[test]
    fn test_normalize_path_trailing_slash() {
        assert_eq!(normalize_path("/data/").unwrap(), "/data");
    }

    #[test]
    fn test_normalize_path_multiple_slashes() {
        assert_eq!(normalize_path("//data//files//").unwrap(), "/data/files");
    }

    #[test]
    fn test_normalize_path_dot_segments() {
        assert_eq!(normalize_path("/usr/./lib/../bin").unwrap(), "/usr/bin");
        assert_eq!(normalize_path("/../../etc").unwrap(), "/etc");
    }

    #[test]
    fn test_normalize_path_rejects_relative_and_empty() {
        assert!(normalize_path("").is_err());
        assert!(normalize_path("data").is_err());
        assert!(normalize_path("/a\0b").is_err());
    }

    #[test]
    fn test_normalize_path_filename_too_long() {
        let long = format!("/{}", "x".repeat(300));
        assert_eq!(normalize_path(&long), Err(TreeError::FilenameTooLong(300)));
    }

    #[test]
    fn test_archive_entry_path() {
        assert_eq!(archive_entry_path("./etc/passwd").unwrap(), "/etc/passwd");
        assert_eq!(archive_entry_path("etc/").unwrap(), "/etc");
        assert_eq!(archive_entry_path("./").unwrap(), "/");
        assert_eq!(archive_entry_path("/bin/sh").unwrap(), "/bin/sh");
        assert_eq!(archive_entry_path("a/../b").unwrap(), "/b");
    }

    #[test]
    fn test_archive_entry_path_escape() {
        assert!(matches!(archive_entry_path("../etc/shadow"), Err(TreeError::EscapesRoot(_))));
        assert!(matches!(archive_entry_path("a/../../x"), Err(TreeError::EscapesRoot(_))));
    }

    #[test]
    fn test_resolve_link_target() {
        assert_eq!(resolve_link_target("/bin/link", "/bin/real").unwrap(), "/bin/real");
        assert_eq!(resolve_link_target("/bin/link", "real").unwrap(), "/bin/real");
        assert_eq!(resolve_link_target("/usr/bin/sh", "../../bin/bash").unwrap(), "/bin/bash");
        assert_eq!(resolve_link_target("/top", "other").unwrap(), "/other");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/foo/bar"), Some("/foo".to_string()));
        assert_eq!(parent_path("/foo"), Some("/".to_string()));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/foo/bar"), "bar");
        assert_eq!(base_name("/foo/.wh.bar"), ".wh.bar");
        assert_eq!(base_name("foo"), "foo");
    }

    #[test]
    fn test_is_beneath() {
        assert!(is_beneath("/var/log/x", "/var/log"));
        assert!(!is_beneath("/var/log", "/var/log"));
        assert!(!is_beneath("/var/logs", "/var/log"));
        assert!(is_beneath("/etc", "/"));
        assert!(!is_beneath("/", "/"));
    }

    #[test]
    fn test_path_components() {
        assert_eq!(path_components("/").unwrap().len(), 0);
        assert_eq!(path_components("/data/files/test.txt").unwrap(), vec![
            "data", "files", "test.txt"
        ]);
    }
}
