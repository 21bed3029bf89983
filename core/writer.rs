use crate::error::{AppError, Result};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Something that renders itself to a file.
pub trait Writable: Send + Sync {
    fn writable_name(&self) -> &'static str {
        "Unknown Writable"
    }

    fn write(&self) -> Result<()> {
        Err(AppError::NotImplemented(format!(
            "{} does not implement write()",
            self.writable_name()
        )))
    }
}

/// The log line announcing a batch, derived from the kinds of item in it.
pub fn batch_message(items: &[&dyn Writable]) -> String {
    let names: BTreeSet<&str> = items.iter().map(|item| item.writable_name()).collect();
    match names.len() {
        0 => "Writing no files.".to_string(),
        1 => format!(
            "Writing {}{}",
            names.iter().next().copied().unwrap_or_default(),
            if items.len() > 1 { "s" } else { "" }
        ),
        _ => "Writing a mixed collection of files.".to_string(),
    }
}

/// Writes every item. In parallel mode all items are attempted and the first failure is
/// returned; sequential mode writes in the given order and stops at the first failure.
pub fn write_all(label: &str, items: &[&dyn Writable], parallel: bool) -> Result<()> {
    log::info!("{}: {}", label, batch_message(items));
    let start = Instant::now();

    if parallel {
        let results: Vec<Result<()>> = items.par_iter().map(|item| item.write()).collect();
        for result in results {
            result?;
        }
    } else {
        for item in items {
            item.write()?;
        }
    }

    log::info!(
        "{}: Wrote {} files in {:.3} seconds",
        label,
        items.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Writes `content` to `path`, creating missing parent directories.
pub fn write_text_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AppError::DirCreation {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(path, content).map_err(|e| AppError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Note {
        path: PathBuf,
        order: &'static Mutex<Vec<String>>,
    }

    impl Writable for Note {
        fn writable_name(&self) -> &'static str {
            "Note"
        }

        fn write(&self) -> Result<()> {
            let name = self.path.to_string_lossy().into_owned();
            self.order.lock().unwrap().push(name.clone());
            write_text_file(&self.path, &name)
        }
    }

    struct Abstract;
    impl Writable for Abstract {}

    #[test]
    fn sequential_writes_keep_caller_order() {
        static ORDER: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let temp = TempDir::new().unwrap();
        let notes: Vec<Note> = ["b", "a", "c"]
            .iter()
            .map(|n| Note {
                path: temp.path().join("out").join(n),
                order: &ORDER,
            })
            .collect();
        let items: Vec<&dyn Writable> = notes.iter().map(|n| n as &dyn Writable).collect();

        write_all("Writing notes", &items, false).unwrap();

        let order = ORDER.lock().unwrap().clone();
        let expected: Vec<String> = notes
            .iter()
            .map(|n| n.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn parallel_writes_every_item() {
        static ORDER: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let temp = TempDir::new().unwrap();
        let notes: Vec<Note> = (0..16)
            .map(|i| Note {
                path: temp.path().join(format!("n{}", i)),
                order: &ORDER,
            })
            .collect();
        let items: Vec<&dyn Writable> = notes.iter().map(|n| n as &dyn Writable).collect();

        write_all("Writing notes", &items, true).unwrap();

        assert_eq!(ORDER.lock().unwrap().len(), 16);
        assert!(notes.iter().all(|n| n.path.is_file()));
    }

    // Items 1 and 3 target a path under a regular file, so creating their directory fails.
    fn notes_with_failures(base: &Path, order: &'static Mutex<Vec<String>>) -> Vec<Note> {
        fs::write(base.join("blocker1"), "").unwrap();
        fs::write(base.join("blocker3"), "").unwrap();
        ["ok0", "blocker1/n1", "ok2", "blocker3/n3", "ok4"]
            .iter()
            .map(|n| Note {
                path: base.join(n),
                order,
            })
            .collect()
    }

    #[test]
    fn parallel_failure_attempts_every_item_and_returns_first_error() {
        static ORDER: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let temp = TempDir::new().unwrap();
        let notes = notes_with_failures(temp.path(), &ORDER);
        let items: Vec<&dyn Writable> = notes.iter().map(|n| n as &dyn Writable).collect();

        let err = write_all("Writing notes", &items, true).unwrap_err();

        match err {
            AppError::DirCreation { path, .. } => assert_eq!(path, temp.path().join("blocker1")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(ORDER.lock().unwrap().len(), 5);
        assert!(temp.path().join("ok0").is_file());
        assert!(temp.path().join("ok2").is_file());
        assert!(temp.path().join("ok4").is_file());
    }

    #[test]
    fn sequential_failure_stops_at_first_error() {
        static ORDER: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let temp = TempDir::new().unwrap();
        let notes = notes_with_failures(temp.path(), &ORDER);
        let items: Vec<&dyn Writable> = notes.iter().map(|n| n as &dyn Writable).collect();

        let err = write_all("Writing notes", &items, false).unwrap_err();

        assert!(matches!(err, AppError::DirCreation { .. }));
        let attempted = ORDER.lock().unwrap().clone();
        let expected: Vec<String> = notes[..2]
            .iter()
            .map(|n| n.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(attempted, expected);
        assert!(temp.path().join("ok0").is_file());
        assert!(!temp.path().join("ok2").exists());
    }

    #[test]
    fn default_write_is_not_implemented() {
        let items: Vec<&dyn Writable> = vec![&Abstract];
        let err = write_all("Writing abstract", &items, false).unwrap_err();
        assert!(matches!(err, AppError::NotImplemented(_)));
        let err = write_all("Writing abstract", &items, true).unwrap_err();
        assert!(matches!(err, AppError::NotImplemented(_)));
    }

    #[test]
    fn batch_message_reflects_item_kinds() {
        static ORDER: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let note = Note {
            path: PathBuf::from("x"),
            order: &ORDER,
        };
        assert_eq!(batch_message(&[]), "Writing no files.");
        assert_eq!(batch_message(&[&note]), "Writing Note");
        assert_eq!(batch_message(&[&note, &note]), "Writing Notes");
        assert_eq!(
            batch_message(&[&note, &Abstract]),
            "Writing a mixed collection of files."
        );
    }
}
