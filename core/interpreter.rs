use crate::config::ConfigSource;
use crate::error::{AppError, Result};
use crate::paths;
use crate::project::BuildContext;
use crate::register::Registerable;
use crate::registry::InterpreterRegistry;
use crate::version::VsVersion;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use uuid::Uuid;

pub const DEFAULT_PATH_ENV_VAR: &str = "PYTHONPATH";

const PYTHON_EXE: &str = "python.exe";
const PYTHONW_EXE: &str = "pythonw.exe";
const SCRIPTS_DIR: &str = "Scripts";
const LIB_DIR: &str = "Lib";
const LIB_PATH: &str = "Lib/";
const ORIG_PREFIX_FILE: &str = "orig-prefix.txt";
const PYVENV_CFG_FILE: &str = "pyvenv.cfg";

const VERSION_SCRIPT: &str = "import sys; print('.'.join(str(s) for s in sys.version_info[:2]))";
const ARCH_SCRIPT: &str =
    "import platform; print('Amd64' if '64bit' in platform.architecture() else 'x86')";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterpreterState {
    /// Built from filesystem evidence or a registry record.
    Probed,
    /// Identity reconciled against the registry.
    Resolved,
}

/// Construction record for [`Interpreter`]. Relative paths are relative to `path`.
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    pub id: Option<Uuid>,
    pub base_interpreter: Option<Uuid>,
    pub architecture: String,
    pub version: String,
    pub description: String,
    pub path: PathBuf,
    pub interpreter_path: PathBuf,
    pub windows_interpreter_path: PathBuf,
    pub library_path: PathBuf,
    pub path_environment_variable: Option<String>,
    pub vs_version: Option<VsVersion>,
}

/// A Python installation or virtual environment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpreter {
    pub id: Uuid,
    /// Equal to `id` unless this is a virtual environment.
    pub base_interpreter: Uuid,
    pub architecture: String,
    pub version: String,
    pub description: String,
    /// Install root.
    pub path: PathBuf,
    pub interpreter_path: PathBuf,
    pub interpreter_abs_path: PathBuf,
    pub windows_interpreter_path: PathBuf,
    pub windows_interpreter_abs_path: PathBuf,
    pub library_path: PathBuf,
    pub library_abs_path: PathBuf,
    pub path_environment_variable: String,
    pub vs_version: Option<VsVersion>,
    pub state: InterpreterState,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Result<Self> {
        if config.interpreter_path.as_os_str().is_empty() {
            return Err(AppError::config(format!(
                "Interpreter at '{}' requires an interpreter path",
                config.path.display()
            )));
        }
        let id = config.id.unwrap_or_else(Uuid::new_v4);
        let root = config.path;
        Ok(Interpreter {
            id,
            base_interpreter: config.base_interpreter.unwrap_or(id),
            architecture: config.architecture,
            version: config.version,
            description: config.description,
            interpreter_abs_path: absolute_under(&root, &config.interpreter_path),
            windows_interpreter_abs_path: absolute_under(&root, &config.windows_interpreter_path),
            library_abs_path: absolute_under(&root, &config.library_path),
            interpreter_path: config.interpreter_path,
            windows_interpreter_path: config.windows_interpreter_path,
            library_path: config.library_path,
            path: root,
            path_environment_variable: config
                .path_environment_variable
                .unwrap_or_else(|| DEFAULT_PATH_ENV_VAR.to_string()),
            vs_version: config.vs_version,
            state: InterpreterState::Probed,
        })
    }

    pub fn is_virtual_environment(&self) -> bool {
        self.base_interpreter != self.id
    }

    /// Adopts the identity of the known interpreter with the same executable
    /// (compared case-insensitively) and returns the resulting identity.
    pub fn reconcile(&mut self, known: &[Interpreter]) -> Uuid {
        let key = paths::fold_key(&self.interpreter_abs_path);
        if let Some(existing) = known
            .iter()
            .find(|candidate| paths::fold_key(&candidate.interpreter_abs_path) == key)
        {
            log::debug!(
                "Interpreter {} matches registered {{{}}}",
                self.interpreter_abs_path.display(),
                existing.id
            );
            self.id = existing.id;
            self.base_interpreter = existing.id;
        }
        self.state = InterpreterState::Resolved;
        self.id
    }

    /// Reconciles against the interpreters `registry` knows for this interpreter's
    /// Visual Studio version.
    pub fn resolve(&mut self, registry: &dyn InterpreterRegistry) -> Result<Uuid> {
        let vs_version = self.vs_version.ok_or_else(|| {
            AppError::config("Cannot resolve interpreter with invalid Visual Studio Version")
        })?;
        let known = registry.known(vs_version)?;
        Ok(self.reconcile(&known))
    }

    /// Probes a Python installation directory. `Ok(None)` when `python.exe` is missing.
    pub fn from_python_installation(
        directory: &Path,
        vs_version: Option<VsVersion>,
        registry: Option<&dyn InterpreterRegistry>,
    ) -> Result<Option<Self>> {
        Self::probe_installation(directory, vs_version, registry, None)
    }

    fn probe_installation(
        directory: &Path,
        vs_version: Option<VsVersion>,
        registry: Option<&dyn InterpreterRegistry>,
        cache: Option<&InterpreterCache>,
    ) -> Result<Option<Self>> {
        let root = paths::absolutize(directory);
        let python = root.join(PYTHON_EXE);
        if !python.is_file() {
            log::debug!("No {} in {}", PYTHON_EXE, root.display());
            return Ok(None);
        }
        if let Some(known) = cache.and_then(|cache| cache.get(&python, vs_version)) {
            log::trace!("Reusing probed interpreter {{{}}} for {}", known.id, python.display());
            return Ok(Some(known));
        }

        let mut config = InterpreterConfig {
            description: dir_name(&root),
            interpreter_path: PathBuf::from(PYTHON_EXE),
            version: query_python(&python, VERSION_SCRIPT),
            architecture: query_python(&python, ARCH_SCRIPT),
            vs_version,
            ..Default::default()
        };
        if root.join(PYTHONW_EXE).is_file() {
            config.windows_interpreter_path = PathBuf::from(PYTHONW_EXE);
        }
        if root.join(LIB_DIR).is_dir() {
            config.library_path = PathBuf::from(LIB_PATH);
        }
        config.path = root;

        let mut interpreter = Interpreter::new(config)?;
        if let Some(registry) = registry {
            interpreter.resolve(registry)?;
        }
        if let Some(cache) = cache {
            cache.insert(&python, vs_version, &interpreter);
        }
        Ok(Some(interpreter))
    }

    /// Probes a virtual environment. `Ok(None)` when `Scripts/python.exe` is missing, when
    /// neither `Lib/orig-prefix.txt` nor `pyvenv.cfg` names a base installation, or when
    /// that base installation cannot be probed.
    pub fn from_virtual_environment(
        directory: &Path,
        vs_version: Option<VsVersion>,
        registry: Option<&dyn InterpreterRegistry>,
    ) -> Result<Option<Self>> {
        Self::probe_virtual_environment(directory, vs_version, registry, None)
    }

    fn probe_virtual_environment(
        directory: &Path,
        vs_version: Option<VsVersion>,
        registry: Option<&dyn InterpreterRegistry>,
        cache: Option<&InterpreterCache>,
    ) -> Result<Option<Self>> {
        let root = paths::absolutize(directory);
        let python = root.join(SCRIPTS_DIR).join(PYTHON_EXE);
        if !python.is_file() {
            log::debug!("No {}/{} in {}", SCRIPTS_DIR, PYTHON_EXE, root.display());
            return Ok(None);
        }
        if let Some(known) = cache.and_then(|cache| cache.get(&python, vs_version)) {
            log::trace!("Reusing probed environment {{{}}} for {}", known.id, python.display());
            return Ok(Some(known));
        }
        let Some(base_dir) = read_base_dir(&root)? else {
            log::debug!("No base installation marker in {}", root.display());
            return Ok(None);
        };
        let Some(base) = Self::probe_installation(&base_dir, vs_version, registry, cache)? else {
            log::warn!(
                "Virtual environment {} references missing installation {}",
                root.display(),
                base_dir.display()
            );
            return Ok(None);
        };

        let mut config = InterpreterConfig {
            base_interpreter: Some(base.id),
            description: format!("{} ({})", dir_name(&root), base.description),
            interpreter_path: Path::new(SCRIPTS_DIR).join(PYTHON_EXE),
            version: query_python(&python, VERSION_SCRIPT),
            architecture: query_python(&python, ARCH_SCRIPT),
            vs_version,
            ..Default::default()
        };
        if root.join(SCRIPTS_DIR).join(PYTHONW_EXE).is_file() {
            config.windows_interpreter_path = Path::new(SCRIPTS_DIR).join(PYTHONW_EXE);
        }
        if root.join(LIB_DIR).is_dir() {
            config.library_path = PathBuf::from(LIB_PATH);
        }
        config.path = root;

        let interpreter = Interpreter::new(config)?;
        if let Some(cache) = cache {
            cache.insert(&python, vs_version, &interpreter);
        }
        Ok(Some(interpreter))
    }

    /// Probes every installation and environment an interpreter section lists. Executables
    /// already probed through `context` keep the identity they were given then.
    pub fn from_section(
        config: &dyn ConfigSource,
        section: &str,
        context: &BuildContext<'_>,
    ) -> Result<Vec<Self>> {
        config.require_section(section)?;
        let BuildContext {
            vs_version,
            registry,
            interpreters: cache,
        } = *context;
        let mut interpreters = Vec::new();

        for dir in config.get_dirs(section, "interpreter_paths")? {
            match Self::probe_installation(&dir, vs_version, registry, cache)? {
                Some(interpreter) => interpreters.push(interpreter),
                None => log::warn!(
                    "[{}] {} is not a Python installation",
                    section,
                    dir.display()
                ),
            }
        }
        for dir in config.get_dirs(section, "environment_paths")? {
            match Self::probe_virtual_environment(&dir, vs_version, registry, cache)? {
                Some(interpreter) => interpreters.push(interpreter),
                None => log::warn!(
                    "[{}] {} is not a virtual environment",
                    section,
                    dir.display()
                ),
            }
        }

        if let Some(description) = config.get(section, "description") {
            for interpreter in &mut interpreters {
                interpreter.description = description.clone();
            }
        }
        Ok(interpreters)
    }
}

/// Interpreters probed during one build, by executable and Visual Studio version.
#[derive(Debug, Default)]
pub struct InterpreterCache {
    probed: RefCell<HashMap<(String, String), Interpreter>>,
}

impl InterpreterCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(executable: &Path, vs_version: Option<VsVersion>) -> (String, String) {
        (
            paths::fold_key(executable),
            vs_version.map(|v| v.to_string()).unwrap_or_default(),
        )
    }

    fn get(&self, executable: &Path, vs_version: Option<VsVersion>) -> Option<Interpreter> {
        self.probed
            .borrow()
            .get(&Self::key(executable, vs_version))
            .cloned()
    }

    fn insert(&self, executable: &Path, vs_version: Option<VsVersion>, interpreter: &Interpreter) {
        self.probed
            .borrow_mut()
            .insert(Self::key(executable, vs_version), interpreter.clone());
    }
}

impl Registerable for Interpreter {
    fn registerable_name(&self) -> &'static str {
        "Python Interpreter"
    }

    fn register(&self, registry: &dyn InterpreterRegistry) -> Result<bool> {
        if self.vs_version.is_none() {
            return Err(AppError::config(
                "Cannot register interpreter with invalid Visual Studio Version",
            ));
        }
        registry.register(self)
    }
}

fn absolute_under(root: &Path, declared: &Path) -> PathBuf {
    if declared.is_absolute() {
        declared.to_path_buf()
    } else {
        paths::absolutize(&root.join(declared))
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// `home` in pyvenv.cfg wins over the first line of Lib/orig-prefix.txt.
fn read_base_dir(root: &Path) -> Result<Option<PathBuf>> {
    let orig_prefix = root.join(LIB_DIR).join(ORIG_PREFIX_FILE);
    let pyvenv_cfg = root.join(PYVENV_CFG_FILE);
    let mut base_dir = None;

    if orig_prefix.is_file() {
        let content = read_marker(&orig_prefix)?;
        base_dir = content
            .lines()
            .next()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from);
    }
    if pyvenv_cfg.is_file() {
        let content = read_marker(&pyvenv_cfg)?;
        for line in content.lines() {
            if let Some((key, value)) = line.split_once('=') {
                if key.trim().eq_ignore_ascii_case("home") {
                    base_dir = Some(PathBuf::from(value.trim()));
                }
            }
        }
    }
    Ok(base_dir)
}

fn read_marker(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| AppError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}

fn query_python(python: &Path, script: &str) -> String {
    match Command::new(python).args(["-c", script]).output() {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        Ok(output) => {
            log::debug!(
                "{} exited with {} while probing",
                python.display(),
                output.status
            );
            String::new()
        }
        Err(e) => {
            log::debug!("Could not run {}: {}", python.display(), e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TomlConfig;
    use crate::registry::{MemoryRegistry, RegistryRecord};
    use tempfile::TempDir;

    fn create_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn vs14() -> Option<VsVersion> {
        Some(VsVersion::new(14.0).unwrap())
    }

    fn installation(root: &Path) {
        create_file(&root.join("python.exe"), "");
        create_file(&root.join("pythonw.exe"), "");
        fs::create_dir_all(root.join("Lib")).unwrap();
    }

    #[test]
    fn absolute_paths_resolve_against_install_root() {
        let interpreter = Interpreter::new(InterpreterConfig {
            path: PathBuf::from("/py"),
            interpreter_path: PathBuf::from("python.exe"),
            windows_interpreter_path: PathBuf::from("/elsewhere/pythonw.exe"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(interpreter.interpreter_abs_path, PathBuf::from("/py/python.exe"));
        assert_eq!(
            interpreter.windows_interpreter_abs_path,
            PathBuf::from("/elsewhere/pythonw.exe")
        );
        assert_eq!(interpreter.base_interpreter, interpreter.id);
        assert_eq!(interpreter.path_environment_variable, "PYTHONPATH");
        assert!(!interpreter.is_virtual_environment());
    }

    #[test]
    fn interpreter_path_is_required() {
        assert!(Interpreter::new(InterpreterConfig::default()).is_err());
    }

    #[test]
    fn reconcile_adopts_matching_identity() {
        let id1 = Uuid::new_v4();
        let known = vec![
            Interpreter::new(InterpreterConfig {
                path: PathBuf::from("/other"),
                interpreter_path: PathBuf::from("python.exe"),
                ..Default::default()
            })
            .unwrap(),
            Interpreter::new(InterpreterConfig {
                id: Some(id1),
                path: PathBuf::from("/Py"),
                interpreter_path: PathBuf::from("/Py/Python.exe"),
                ..Default::default()
            })
            .unwrap(),
        ];
        let mut reversed = known.clone();
        reversed.reverse();

        for known in [known, reversed] {
            let mut candidate = Interpreter::new(InterpreterConfig {
                path: PathBuf::from("/py"),
                interpreter_path: PathBuf::from("python.exe"),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(candidate.reconcile(&known), id1);
            assert_eq!(candidate.base_interpreter, id1);
            assert_eq!(candidate.state, InterpreterState::Resolved);
        }
    }

    #[test]
    fn reconcile_without_match_keeps_identity() {
        let mut candidate = Interpreter::new(InterpreterConfig {
            path: PathBuf::from("/py"),
            interpreter_path: PathBuf::from("python.exe"),
            ..Default::default()
        })
        .unwrap();
        let original = candidate.id;
        assert_eq!(candidate.reconcile(&[]), original);
    }

    #[test]
    fn resolve_requires_visual_studio_version() {
        let mut candidate = Interpreter::new(InterpreterConfig {
            path: PathBuf::from("/py"),
            interpreter_path: PathBuf::from("python.exe"),
            ..Default::default()
        })
        .unwrap();
        let err = candidate.resolve(&MemoryRegistry::new()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn probes_installation_markers() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("Python35");
        installation(&root);

        let interpreter = Interpreter::from_python_installation(&root, vs14(), None)
            .unwrap()
            .unwrap();
        assert_eq!(interpreter.description, "Python35");
        assert_eq!(interpreter.interpreter_abs_path, root.join("python.exe"));
        assert_eq!(interpreter.windows_interpreter_path, PathBuf::from("pythonw.exe"));
        assert_eq!(interpreter.library_abs_path, root.join("Lib"));

        assert!(
            Interpreter::from_python_installation(&temp.path().join("empty"), vs14(), None)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn installation_resolves_against_registry() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("Python35");
        installation(&root);
        let id1 = Uuid::new_v4();
        let registry = MemoryRegistry::with_records(
            VsVersion::new(14.0).unwrap(),
            vec![RegistryRecord {
                id: id1,
                architecture: String::new(),
                description: "Registered".to_string(),
                interpreter_path: root.join("python.exe"),
                library_path: PathBuf::new(),
                path_environment_variable: "PYTHONPATH".to_string(),
                version: String::new(),
                windows_interpreter_path: PathBuf::new(),
            }],
        );

        let interpreter = Interpreter::from_python_installation(&root, vs14(), Some(&registry))
            .unwrap()
            .unwrap();
        assert_eq!(interpreter.id, id1);
        assert_eq!(interpreter.base_interpreter, id1);
    }

    #[test]
    fn venv_without_markers_is_not_an_interpreter() {
        let temp = TempDir::new().unwrap();
        let venv = temp.path().join("env");
        create_file(&venv.join("Scripts/python.exe"), "");

        let probed = Interpreter::from_virtual_environment(&venv, vs14(), None).unwrap();
        assert!(probed.is_none());
    }

    #[test]
    fn venv_links_to_base_installation() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("Python27");
        installation(&base);
        let venv = temp.path().join("env27");
        create_file(&venv.join("Scripts/python.exe"), "");
        create_file(&venv.join("Scripts/pythonw.exe"), "");
        create_file(
            &venv.join("Lib/orig-prefix.txt"),
            &format!("{}\n", base.display()),
        );

        let interpreter = Interpreter::from_virtual_environment(&venv, vs14(), None)
            .unwrap()
            .unwrap();
        assert!(interpreter.is_virtual_environment());
        assert_eq!(interpreter.description, "env27 (Python27)");
        assert_eq!(interpreter.interpreter_path, Path::new("Scripts").join("python.exe"));
        assert_eq!(paths::msbuild_path(&interpreter.library_path), "Lib\\");
        assert_eq!(interpreter.library_abs_path, venv.join("Lib"));
    }

    #[test]
    fn pyvenv_home_overrides_orig_prefix() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("Python36");
        installation(&base);
        let venv = temp.path().join("env36");
        create_file(&venv.join("Scripts/python.exe"), "");
        create_file(&venv.join("Lib/orig-prefix.txt"), "/nowhere\n");
        create_file(
            &venv.join("pyvenv.cfg"),
            &format!("home = {}\ninclude-system-site-packages = false\n", base.display()),
        );

        let interpreter = Interpreter::from_virtual_environment(&venv, vs14(), None)
            .unwrap()
            .unwrap();
        assert_eq!(interpreter.description, "env36 (Python36)");
    }

    #[test]
    fn build_cache_shares_identity_between_probes() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("Python35");
        installation(&base);
        let venv = temp.path().join("env35");
        create_file(&venv.join("Scripts/python.exe"), "");
        create_file(&venv.join("pyvenv.cfg"), &format!("home = {}\n", base.display()));
        let config = TomlConfig::parse(
            "[py]\ninterpreter_paths = \"Python3*\"\n\n[envs]\nenvironment_paths = \"env*\"\n",
            Some(temp.path()),
        )
        .unwrap();

        let cache = InterpreterCache::new();
        let context = BuildContext {
            vs_version: vs14(),
            registry: None,
            interpreters: Some(&cache),
        };
        let first = Interpreter::from_section(&config, "py", &context).unwrap();
        let again = Interpreter::from_section(&config, "py", &context).unwrap();
        let envs = Interpreter::from_section(&config, "envs", &context).unwrap();
        assert_eq!(first[0].id, again[0].id);
        assert_eq!(envs[0].base_interpreter, first[0].id);

        let uncached = BuildContext {
            vs_version: vs14(),
            ..Default::default()
        };
        let other = Interpreter::from_section(&config, "py", &uncached).unwrap();
        assert_ne!(other[0].id, first[0].id);
    }

    #[test]
    fn registering_requires_visual_studio_version() {
        let interpreter = Interpreter::new(InterpreterConfig {
            path: PathBuf::from("/py"),
            interpreter_path: PathBuf::from("python.exe"),
            ..Default::default()
        })
        .unwrap();
        assert!(Registerable::register(&interpreter, &MemoryRegistry::new()).is_err());
    }
}
