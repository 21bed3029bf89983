use crate::filter::{FilterRules, PathFilter};
use crate::paths;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Files found by one classification walk, in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub compile_files: Vec<PathBuf>,
    pub content_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Prune,
    Collect,
    Descend,
}

/// Walks a directory tree once, pruning excluded directories and bucketing the files of
/// included directories into the compile and content groups.
#[derive(Debug, Clone)]
pub struct TreeClassifier {
    directories: PathFilter,
    compile: PathFilter,
    content: PathFilter,
}

impl TreeClassifier {
    pub fn new(rules: &FilterRules) -> Self {
        TreeClassifier {
            directories: PathFilter::directories(&rules.directory_in, &rules.directory_ex),
            compile: PathFilter::files(&rules.compile_in, &rules.compile_ex),
            content: PathFilter::files(&rules.content_in, &rules.content_ex),
        }
    }

    fn visit(&self, dir: &Path) -> Visit {
        if self.directories.is_excluded(dir) {
            Visit::Prune
        } else if self.directories.is_included(dir) {
            Visit::Collect
        } else if self.directories.may_contain_included(dir) {
            Visit::Descend
        } else {
            Visit::Prune
        }
    }

    /// Classifies every file under `root`. A missing or unreadable root yields empty lists.
    pub fn classify(&self, root: &Path) -> Classification {
        let mut result = Classification::default();
        let root = paths::absolutize(root);
        if !root.is_dir() {
            log::debug!(
                "Classification root is not a directory, nothing to collect: {}",
                root.display()
            );
            return result;
        }

        let mut collecting: HashSet<PathBuf> = HashSet::new();
        let mut walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by(files_first)
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry during walk: {}", e);
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_type().is_dir() {
                match self.visit(path) {
                    Visit::Prune => {
                        log::debug!("Pruning directory: {}", path.display());
                        walker.skip_current_dir();
                    }
                    Visit::Collect => {
                        log::trace!("Collecting files in: {}", path.display());
                        collecting.insert(path.to_path_buf());
                    }
                    Visit::Descend => {
                        log::trace!("Descending without collecting: {}", path.display());
                    }
                }
                continue;
            }
            if entry.path_is_symlink() && path.is_dir() {
                log::trace!("Not following directory symlink: {}", path.display());
                continue;
            }
            if !path.parent().is_some_and(|parent| collecting.contains(parent)) {
                continue;
            }

            if self.compile.matches(path) {
                log::trace!("Compile: {}", path.display());
                result.compile_files.push(path.to_path_buf());
            }
            if self.content.matches(path) {
                log::trace!("Content: {}", path.display());
                result.content_files.push(path.to_path_buf());
            }
        }

        log::debug!(
            "Classified {}: {} compile, {} content",
            root.display(),
            result.compile_files.len(),
            result.content_files.len()
        );
        result
    }
}

/// Classifies `root` with the given rules.
pub fn classify(root: &Path, rules: &FilterRules) -> Classification {
    TreeClassifier::new(rules).classify(root)
}

// Files of a directory come before its subdirectories, each group by name.
fn files_first(a: &DirEntry, b: &DirEntry) -> std::cmp::Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_file(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "").unwrap();
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn excluded_directory_is_pruned() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        create_file(&root.join("src/a.py"));
        create_file(&root.join("build/x.py"));
        create_file(&root.join("build/nested/y.py"));

        let rules = FilterRules {
            directory_ex: strings(&["*build*"]),
            compile_in: strings(&["*.py"]),
            ..Default::default()
        };
        let result = classify(root, &rules);

        assert_eq!(result.compile_files, vec![root.join("src/a.py")]);
    }

    #[test]
    fn compile_exclusion_with_empty_includes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        create_file(&root.join("a.py"));
        create_file(&root.join("a.pyc"));

        let rules = FilterRules {
            compile_ex: strings(&["*.pyc"]),
            ..Default::default()
        };
        let result = classify(root, &rules);

        assert_eq!(result.compile_files, vec![root.join("a.py")]);
    }

    #[test]
    fn file_can_land_in_both_groups() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        create_file(&root.join("setup.py"));
        create_file(&root.join("README.md"));

        let rules = FilterRules {
            compile_in: strings(&["*.py"]),
            content_in: strings(&["*.py", "*.md"]),
            ..Default::default()
        };
        let result = classify(root, &rules);

        assert_eq!(result.compile_files, vec![root.join("setup.py")]);
        assert_eq!(
            result.content_files,
            vec![root.join("README.md"), root.join("setup.py")]
        );
    }

    #[test]
    fn files_outside_included_directories_are_skipped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        create_file(&root.join("top.py"));
        create_file(&root.join("src/pkg/a.py"));
        create_file(&root.join("src/pkg/sub/b.py"));
        create_file(&root.join("docs/c.py"));

        let include = root.join("src").join("pkg").to_string_lossy().into_owned();
        let rules = FilterRules {
            directory_in: vec![include],
            ..Default::default()
        };
        let result = classify(root, &rules);

        assert_eq!(
            result.compile_files,
            vec![root.join("src/pkg/a.py"), root.join("src/pkg/sub/b.py")]
        );
    }

    #[test]
    fn missing_root_yields_nothing() {
        let temp = TempDir::new().unwrap();
        let result = classify(&temp.path().join("does-not-exist"), &FilterRules::default());
        assert_eq!(result, Classification::default());
    }

    #[test]
    fn walk_lists_files_before_subdirectories() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        create_file(&root.join("b.py"));
        create_file(&root.join("a/z.py"));
        create_file(&root.join("c.py"));

        let result = classify(root, &FilterRules::default());

        assert_eq!(
            result.compile_files,
            vec![root.join("b.py"), root.join("c.py"), root.join("a/z.py")]
        );
    }
}
