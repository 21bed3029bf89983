use std::env;
use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path: `.` components are dropped and `..` folds into its parent.
/// An empty result becomes `.`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

/// Makes a path absolute against the current directory, then normalizes it.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(e) => {
            log::warn!(
                "Cannot read current directory to absolutize '{}': {}",
                path.display(),
                e
            );
            normalize(path)
        }
    }
}

/// Platform case folding: lower-cased with backslash separators on Windows, unchanged elsewhere.
pub fn normcase(path: &Path) -> String {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        text.to_lowercase().replace('/', "\\")
    } else {
        text.into_owned()
    }
}

/// The string form filters are evaluated against.
pub fn match_key(path: &Path) -> String {
    normcase(&absolutize(path))
}

/// `path` expressed relative to `base`; `.` when both are the same directory.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let relative = pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf());
    if relative.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        relative
    }
}

/// Renders a path with the backslash separators MSBuild and solution files expect.
pub fn msbuild_path(path: &Path) -> String {
    path.to_string_lossy().replace('/', "\\")
}

/// Case-insensitive comparison key used for sorting and executable path matching.
pub fn fold_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/b/../../..")), PathBuf::from(".."));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize(Path::new("")), PathBuf::from("."));
    }

    #[test]
    fn relative_to_same_dir_is_dot() {
        assert_eq!(relative_to(Path::new("/a/b"), Path::new("/a/b")), PathBuf::from("."));
        assert_eq!(
            relative_to(Path::new("/a/b/c.py"), Path::new("/a")),
            PathBuf::from("b/c.py")
        );
        assert_eq!(relative_to(Path::new("/a"), Path::new("/a/b")), PathBuf::from(".."));
    }

    #[test]
    fn msbuild_path_uses_backslashes() {
        assert_eq!(msbuild_path(Path::new("a/b/c.py")), "a\\b\\c.py");
    }
}
