use crate::paths;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Computes the folder entries an IDE needs to display `files` and `explicit_dirs`:
/// every containing directory plus all of its ancestors, relative to `project_root`.
///
/// The project root itself is never an entry. The result is a set, ordered by path.
pub fn synthesize_folders<'a, I>(
    explicit_dirs: &[PathBuf],
    files: I,
    project_root: &Path,
) -> BTreeSet<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let file_dirs = files.into_iter().filter_map(|file| file.parent());
    let mut folders = BTreeSet::new();

    for dir in explicit_dirs.iter().map(PathBuf::as_path).chain(file_dirs) {
        let relative = paths::relative_to(dir, project_root);
        for ancestor in relative.ancestors() {
            if ancestor.as_os_str().is_empty() || ancestor == Path::new(".") {
                continue;
            }
            folders.insert(ancestor.to_path_buf());
        }
    }
    log::trace!("Synthesized {} folder entries", folders.len());
    folders
}
