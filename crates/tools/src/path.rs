//! Sandbox path validation.
//!
//! Every filesystem-touching tool is parameterized with an allowed root;
//! a request that resolves outside that root is rejected before any I/O
//! happens. Validation walks the requested path forward one component at
//! a time, re-canonicalizing at each level that exists, so a symlink
//! planted anywhere along the way cannot smuggle the resolution out of
//! the sandbox.

use std::path::{Component, Path, PathBuf};

/// Validate a tool-supplied path against the sandbox root and return the
/// absolute location it designates.
///
/// Rejected up front: empty input, absolute paths, Windows drive
/// prefixes, and any `..` component. The surviving components are then
/// walked from the canonical root; existing prefixes are resolved through
/// the filesystem (following symlinks, with a containment check after
/// each hop) and the not-yet-existing suffix is appended literally —
/// safe, because `..` was already excluded.
pub fn validate_path(root: &Path, requested: &str) -> Result<PathBuf, String> {
    if requested.trim().is_empty() {
        return Err("a relative file path is required".to_owned());
    }
    if Path::new(requested).is_absolute() || has_drive_prefix(requested) {
        return Err(format!(
            "'{requested}' is absolute; tool paths are relative to the workspace"
        ));
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!(
                    "'{requested}' uses '..', which cannot be used inside the workspace"
                ));
            }
            _ => {
                return Err(format!(
                    "'{requested}' is absolute; tool paths are relative to the workspace"
                ));
            }
        }
    }

    let base = root.canonicalize().map_err(|e| {
        format!("workspace root {} is unavailable: {e}", root.display())
    })?;

    let mut current = base.clone();
    let mut exists = true;
    for part in parts {
        current.push(part);
        if !exists {
            continue;
        }
        match current.canonicalize() {
            Ok(real) => {
                if !real.starts_with(&base) {
                    return Err(format!("'{requested}' escapes the workspace"));
                }
                current = real;
            }
            Err(_) => {
                // A dangling symlink pretends not to exist but would
                // redirect a later write; refuse it outright.
                if current.symlink_metadata().is_ok() {
                    return Err(format!(
                        "'{requested}' goes through a broken symlink"
                    ));
                }
                exists = false;
            }
        }
    }

    Ok(current)
}

fn has_drive_prefix(raw: &str) -> bool {
    let mut chars = raw.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

/// Root-relative display form used in events, diffs, and version rows.
pub fn display_path(root: &Path, absolute: &Path) -> String {
    let canonical_root = match root.canonicalize() {
        Ok(r) => r,
        Err(_) => return absolute.display().to_string(),
    };
    match absolute.strip_prefix(&canonical_root) {
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => absolute.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn blank_input_is_refused() {
        let ws = TempDir::new().unwrap();
        assert!(validate_path(ws.path(), "").is_err());
        assert!(validate_path(ws.path(), "   ").is_err());
    }

    #[test]
    fn absolute_paths_are_refused() {
        let ws = TempDir::new().unwrap();
        let err = validate_path(ws.path(), "/etc/passwd").unwrap_err();
        assert!(err.contains("absolute"), "{err}");
    }

    #[test]
    fn drive_prefixes_are_refused() {
        let ws = TempDir::new().unwrap();
        assert!(validate_path(ws.path(), "C:\\Windows\\System32").is_err());
        assert!(validate_path(ws.path(), "c:stuff").is_err());
    }

    #[test]
    fn dotdot_is_refused_wherever_it_appears() {
        let ws = TempDir::new().unwrap();
        for attempt in ["..", "../x", "a/../../b", "a/b/.."] {
            let err = validate_path(ws.path(), attempt).unwrap_err();
            assert!(err.contains(".."), "{attempt}: {err}");
        }
    }

    #[test]
    fn existing_file_resolves_inside_root() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("kept.txt"), "ok").unwrap();
        let resolved = validate_path(ws.path(), "kept.txt").unwrap();
        assert!(resolved.starts_with(ws.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("kept.txt"));
    }

    #[test]
    fn uncreated_nested_target_is_allowed() {
        let ws = TempDir::new().unwrap();
        let resolved = validate_path(ws.path(), "deep/er/new.txt").unwrap();
        assert!(resolved.ends_with("deep/er/new.txt"));
        // Validation itself creates nothing.
        assert!(!ws.path().join("deep").exists());
    }

    #[test]
    fn curdir_segments_are_transparent() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("plain.txt"), "x").unwrap();
        let via_dot = validate_path(ws.path(), "./plain.txt").unwrap();
        let direct = validate_path(ws.path(), "plain.txt").unwrap();
        assert_eq!(via_dot, direct);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_root_is_followed() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join("real")).unwrap();
        std::fs::write(ws.path().join("real/data.txt"), "x").unwrap();
        std::os::unix::fs::symlink("real", ws.path().join("alias")).unwrap();

        let resolved = validate_path(ws.path(), "alias/data.txt").unwrap();
        assert!(resolved.ends_with("real/data.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_leaving_root_is_blocked() {
        let ws = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.path().join("exit")).unwrap();

        let err = validate_path(ws.path(), "exit/secret.txt").unwrap_err();
        assert!(err.contains("escapes"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_blocked() {
        let ws = TempDir::new().unwrap();
        std::os::unix::fs::symlink("gone-target", ws.path().join("dangling")).unwrap();

        let err = validate_path(ws.path(), "dangling").unwrap_err();
        assert!(err.contains("broken symlink"), "{err}");
    }

    #[test]
    fn display_path_is_root_relative() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.txt"), "x").unwrap();
        let resolved = validate_path(ws.path(), "a.txt").unwrap();
        assert_eq!(display_path(ws.path(), &resolved), "a.txt");
    }
}
