use crate::paths;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::Path;

/// How bare (non-glob) patterns are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Directory filters: a bare pattern matches when the normalized path contains it.
    Containment,
    /// File filters: globs against the full path, `.ext` matches the extension exactly.
    Glob,
}

/// What an empty pattern list matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyMatch {
    Everything,
    Nothing,
}

/// A compiled list of filter patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    globs: GlobSet,
    has_globs: bool,
    extensions: Vec<String>,
    substrings: Vec<String>,
    literals: Vec<String>,
}

impl PatternSet {
    pub fn new(patterns: &[String], mode: MatchMode) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut glob_sources = Vec::new();
        let mut extensions = Vec::new();
        let mut substrings = Vec::new();
        let mut literals = Vec::new();

        for raw in patterns {
            let pattern = raw.trim();
            if pattern.is_empty() {
                continue;
            }
            match mode {
                MatchMode::Glob if is_extension(pattern) => extensions.push(fold(pattern)),
                MatchMode::Containment if !has_glob_meta(pattern) => {
                    substrings.push(paths::normcase(&paths::normalize(Path::new(pattern))))
                }
                _ => match compile_glob(pattern) {
                    Ok(glob) => {
                        log::trace!("Adding glob pattern: {}", pattern);
                        builder.add(glob);
                        glob_sources.push(pattern.to_string());
                    }
                    Err(e) => {
                        log::warn!(
                            "Invalid glob pattern \"{}\" ({}); matching it literally",
                            pattern,
                            e
                        );
                        literals.push(fold(pattern));
                    }
                },
            }
        }

        let globs = builder.build().unwrap_or_else(|e| {
            log::error!("Error building glob set, matching patterns literally: {}", e);
            literals.extend(glob_sources.iter().map(|p| fold(p)));
            GlobSet::empty()
        });
        let has_globs = !globs.is_empty();

        PatternSet {
            globs,
            has_globs,
            extensions,
            substrings,
            literals,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.has_globs
            && self.extensions.is_empty()
            && self.substrings.is_empty()
            && self.literals.is_empty()
    }

    pub fn is_match(&self, path: &Path, empty: EmptyMatch) -> bool {
        if self.is_empty() {
            return empty == EmptyMatch::Everything;
        }
        let key = paths::match_key(path);

        if self.globs.is_match(key.as_str()) {
            return true;
        }
        if !self.extensions.is_empty() {
            let extension = path
                .extension()
                .map(|ext| fold(&format!(".{}", ext.to_string_lossy())));
            if extension.is_some_and(|ext| self.extensions.contains(&ext)) {
                return true;
            }
        }
        if self.substrings.iter().any(|s| key.contains(s.as_str())) {
            return true;
        }
        if !self.literals.is_empty() {
            let file_name = path
                .file_name()
                .map(|name| fold(&name.to_string_lossy()))
                .unwrap_or_default();
            return self
                .literals
                .iter()
                .any(|literal| *literal == key || *literal == file_name);
        }
        false
    }

    /// Whether `dir` may be an ancestor of something these patterns match.
    /// Only absolute containment patterns allow a negative answer.
    pub fn may_contain(&self, dir: &Path) -> bool {
        if self.is_empty() || self.has_globs || !self.extensions.is_empty() || !self.literals.is_empty()
        {
            return true;
        }
        let key = paths::match_key(dir);
        self.substrings
            .iter()
            .any(|s| !Path::new(s).is_absolute() || s.contains(key.as_str()))
    }
}

/// An include/exclude pair where exclusion always wins.
#[derive(Debug, Clone)]
pub struct PathFilter {
    includes: PatternSet,
    excludes: PatternSet,
}

impl PathFilter {
    pub fn new(includes: &[String], excludes: &[String], mode: MatchMode) -> Self {
        PathFilter {
            includes: PatternSet::new(includes, mode),
            excludes: PatternSet::new(excludes, mode),
        }
    }

    pub fn directories(includes: &[String], excludes: &[String]) -> Self {
        Self::new(includes, excludes, MatchMode::Containment)
    }

    pub fn files(includes: &[String], excludes: &[String]) -> Self {
        Self::new(includes, excludes, MatchMode::Glob)
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.excludes.is_match(path, EmptyMatch::Nothing)
    }

    pub fn is_included(&self, path: &Path) -> bool {
        self.includes.is_match(path, EmptyMatch::Everything)
    }

    pub fn matches(&self, path: &Path) -> bool {
        !self.is_excluded(path) && self.is_included(path)
    }

    pub fn may_contain_included(&self, dir: &Path) -> bool {
        self.includes.may_contain(dir)
    }
}

/// One-shot form of [`PathFilter::matches`].
pub fn matches(path: &Path, includes: &[String], excludes: &[String], mode: MatchMode) -> bool {
    PathFilter::new(includes, excludes, mode).matches(path)
}

/// The six filter lists a project classifies its tree with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRules {
    pub directory_in: Vec<String>,
    pub directory_ex: Vec<String>,
    pub compile_in: Vec<String>,
    pub compile_ex: Vec<String>,
    pub content_in: Vec<String>,
    pub content_ex: Vec<String>,
}

/// Per-call replacements for [`FilterRules`]. `None` keeps the project's own list;
/// `Some(vec![])` replaces it with an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOverrides {
    pub directory_in: Option<Vec<String>>,
    pub directory_ex: Option<Vec<String>>,
    pub compile_in: Option<Vec<String>>,
    pub compile_ex: Option<Vec<String>>,
    pub content_in: Option<Vec<String>>,
    pub content_ex: Option<Vec<String>>,
}

impl FilterRules {
    pub fn with_overrides(&self, overrides: &FilterOverrides) -> FilterRules {
        let pick = |own: &Vec<String>, over: &Option<Vec<String>>| {
            over.as_ref().unwrap_or(own).clone()
        };
        FilterRules {
            directory_in: pick(&self.directory_in, &overrides.directory_in),
            directory_ex: pick(&self.directory_ex, &overrides.directory_ex),
            compile_in: pick(&self.compile_in, &overrides.compile_in),
            compile_ex: pick(&self.compile_ex, &overrides.compile_ex),
            content_in: pick(&self.content_in, &overrides.content_in),
            content_ex: pick(&self.content_ex, &overrides.content_ex),
        }
    }
}

fn compile_glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(&fold(pattern))
        .case_insensitive(cfg!(windows))
        .literal_separator(false)
        .build()
}

fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

fn is_extension(pattern: &str) -> bool {
    pattern.len() > 1
        && pattern.starts_with('.')
        && !has_glob_meta(pattern)
        && !pattern.contains(['/', '\\'])
}

fn fold(text: &str) -> String {
    if cfg!(windows) {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let path = Path::new("/proj/src/module.py");
        assert!(!matches(
            path,
            &strings(&["*.py"]),
            &strings(&["*module*"]),
            MatchMode::Glob
        ));
        assert!(!matches(
            Path::new("/proj/build/out"),
            &strings(&["/proj"]),
            &strings(&["build"]),
            MatchMode::Containment
        ));
    }

    #[test]
    fn empty_includes_match_everything_not_excluded() {
        for path in ["/a/b.py", "/a/b.txt", "/x/y/z"] {
            assert!(matches(Path::new(path), &[], &[], MatchMode::Glob));
            assert!(matches(Path::new(path), &[], &strings(&["*.pyc"]), MatchMode::Glob));
        }
        assert!(!matches(
            Path::new("/a/b.pyc"),
            &[],
            &strings(&["*.pyc"]),
            MatchMode::Glob
        ));
    }

    #[test]
    fn bare_extension_matches_extension_only() {
        let filter = PathFilter::files(&strings(&[".py"]), &[]);
        assert!(filter.matches(Path::new("/proj/a.py")));
        assert!(!filter.matches(Path::new("/proj/a.pyc")));
        assert!(!filter.matches(Path::new("/proj/.py/readme")));
    }

    #[test]
    fn glob_star_crosses_separators() {
        let filter = PathFilter::files(&strings(&["*/tests/*.py"]), &[]);
        assert!(filter.matches(Path::new("/proj/pkg/tests/test_a.py")));
        assert!(!filter.matches(Path::new("/proj/pkg/src/a.py")));
    }

    #[test]
    fn malformed_glob_falls_back_to_literal() {
        let filter = PathFilter::files(&strings(&["[abc"]), &[]);
        assert!(filter.matches(Path::new("/proj/[abc")));
        assert!(!filter.matches(Path::new("/proj/abc")));
    }

    #[test]
    fn directory_patterns_use_containment_or_glob() {
        let filter = PathFilter::directories(&[], &strings(&["*build*", "/proj/.git"]));
        assert!(filter.is_excluded(Path::new("/proj/build")));
        assert!(filter.is_excluded(Path::new("/proj/.git/objects")));
        assert!(!filter.is_excluded(Path::new("/proj/src")));
    }

    #[test]
    fn ancestor_test_only_prunes_for_absolute_literals() {
        let absolute = PathFilter::directories(&strings(&["/proj/src/pkg"]), &[]);
        assert!(absolute.may_contain_included(Path::new("/proj")));
        assert!(absolute.may_contain_included(Path::new("/proj/src")));
        assert!(!absolute.may_contain_included(Path::new("/proj/docs")));

        let relative = PathFilter::directories(&strings(&["pkg"]), &[]);
        assert!(relative.may_contain_included(Path::new("/anything")));

        let glob = PathFilter::directories(&strings(&["*pkg*"]), &[]);
        assert!(glob.may_contain_included(Path::new("/anything")));
    }

    #[test]
    fn overrides_distinguish_none_from_empty() {
        let rules = FilterRules {
            compile_in: strings(&["*.py"]),
            content_in: strings(&["*.txt"]),
            ..Default::default()
        };
        let overrides = FilterOverrides {
            compile_in: Some(vec![]),
            ..Default::default()
        };
        let effective = rules.with_overrides(&overrides);
        assert!(effective.compile_in.is_empty());
        assert_eq!(effective.content_in, strings(&["*.txt"]));
    }
}
