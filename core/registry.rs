use crate::error::{AppError, Result};
use crate::interpreter::{Interpreter, InterpreterConfig};
use crate::version::VsVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Registry location of the interpreters known to a Visual Studio version.
pub const REGISTRY_KEY_TEMPLATE: &str =
    r"Software\Microsoft\VisualStudio\{VSVersion}\PythonTools\Interpreters";

const STORE_FILENAME: &str = "Interpreters.json";

pub fn registry_key(vs_version: VsVersion) -> String {
    REGISTRY_KEY_TEMPLATE.replace("{VSVersion}", &vs_version.to_string())
}

/// One registered interpreter, with every path in absolute form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistryRecord {
    pub id: Uuid,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub description: String,
    pub interpreter_path: PathBuf,
    #[serde(default)]
    pub library_path: PathBuf,
    #[serde(default = "default_path_env_var")]
    pub path_environment_variable: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub windows_interpreter_path: PathBuf,
}

fn default_path_env_var() -> String {
    crate::interpreter::DEFAULT_PATH_ENV_VAR.to_string()
}

impl RegistryRecord {
    pub fn from_interpreter(interpreter: &Interpreter) -> Self {
        RegistryRecord {
            id: interpreter.id,
            architecture: interpreter.architecture.clone(),
            description: interpreter.description.clone(),
            interpreter_path: interpreter.interpreter_abs_path.clone(),
            library_path: interpreter.library_abs_path.clone(),
            path_environment_variable: interpreter.path_environment_variable.clone(),
            version: interpreter.version.clone(),
            windows_interpreter_path: interpreter.windows_interpreter_abs_path.clone(),
        }
    }

    pub fn to_interpreter(&self, vs_version: VsVersion) -> Result<Interpreter> {
        Interpreter::new(InterpreterConfig {
            id: Some(self.id),
            base_interpreter: None,
            architecture: self.architecture.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            path: self
                .interpreter_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            interpreter_path: self.interpreter_path.clone(),
            windows_interpreter_path: self.windows_interpreter_path.clone(),
            library_path: self.library_path.clone(),
            path_environment_variable: Some(self.path_environment_variable.clone()),
            vs_version: Some(vs_version),
        })
    }
}

/// The external store of registered interpreters, namespaced by Visual Studio version.
pub trait InterpreterRegistry: Send + Sync {
    /// Every interpreter registered for `vs_version`.
    fn known(&self, vs_version: VsVersion) -> Result<Vec<Interpreter>>;

    /// Adds or replaces the record for `interpreter` (matched by identity).
    fn register(&self, interpreter: &Interpreter) -> Result<bool>;
}

fn require_version(interpreter: &Interpreter) -> Result<VsVersion> {
    interpreter.vs_version.ok_or_else(|| {
        AppError::config("Cannot register interpreter with invalid Visual Studio Version")
    })
}

fn upsert(records: &mut Vec<RegistryRecord>, record: RegistryRecord) {
    match records.iter_mut().find(|existing| existing.id == record.id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

fn records_to_interpreters(records: &[RegistryRecord], vs_version: VsVersion) -> Result<Vec<Interpreter>> {
    records
        .iter()
        .map(|record| record.to_interpreter(vs_version))
        .collect()
}

/// Directory-backed registry. Each Visual Studio version is a namespace directory that
/// must be installed before interpreters can be resolved against or registered into it.
#[derive(Debug)]
pub struct FileRegistry {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileRegistry {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn default_root() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("vsgen").join("registry"))
            .ok_or_else(|| {
                AppError::config("Cannot determine the user data directory for the interpreter registry")
            })
    }

    fn namespace_dir(&self, vs_version: VsVersion) -> PathBuf {
        self.root
            .join("VisualStudio")
            .join(vs_version.to_string())
            .join("PythonTools")
    }

    fn store_path(&self, vs_version: VsVersion) -> PathBuf {
        self.namespace_dir(vs_version).join(STORE_FILENAME)
    }

    pub fn is_installed(&self, vs_version: VsVersion) -> bool {
        self.namespace_dir(vs_version).is_dir()
    }

    /// Creates the namespace for `vs_version`.
    pub fn install(&self, vs_version: VsVersion) -> Result<PathBuf> {
        let dir = self.namespace_dir(vs_version);
        fs::create_dir_all(&dir).map_err(|e| AppError::DirCreation {
            path: dir.clone(),
            source: e,
        })?;
        log::info!("Installed registry namespace {}", registry_key(vs_version));
        Ok(dir)
    }

    fn ensure_installed(&self, vs_version: VsVersion) -> Result<()> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(AppError::Registry(format!(
                "Registry root '{}' is not a directory",
                self.root.display()
            )));
        }
        if !self.is_installed(vs_version) {
            return Err(AppError::Config(format!(
                "Cannot resolve the registry path {} for Visual Studio {} under '{}'. Is PTVS installed?",
                registry_key(vs_version),
                vs_version,
                self.root.display()
            )));
        }
        Ok(())
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| AppError::Registry("Registry lock poisoned".to_string()))
    }

    /// The stored records for `vs_version`, read under the same lock registration holds.
    pub fn records(&self, vs_version: VsVersion) -> Result<Vec<RegistryRecord>> {
        let _guard = self.guard()?;
        self.load(vs_version)
    }

    fn load(&self, vs_version: VsVersion) -> Result<Vec<RegistryRecord>> {
        self.ensure_installed(vs_version)?;
        let path = self.store_path(vs_version);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| AppError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Registry(format!("Corrupt registry store '{}': {}", path.display(), e))
        })
    }

    // Written beside the store and renamed over it, so readers never see a partial file.
    fn save(&self, vs_version: VsVersion, records: &[RegistryRecord]) -> Result<()> {
        let path = self.store_path(vs_version);
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(records)?;
        fs::write(&staging, content).map_err(|e| AppError::FileWrite {
            path: staging.clone(),
            source: e,
        })?;
        fs::rename(&staging, &path).map_err(|e| AppError::FileWrite { path, source: e })
    }
}

impl InterpreterRegistry for FileRegistry {
    fn known(&self, vs_version: VsVersion) -> Result<Vec<Interpreter>> {
        records_to_interpreters(&self.records(vs_version)?, vs_version)
    }

    fn register(&self, interpreter: &Interpreter) -> Result<bool> {
        let vs_version = require_version(interpreter)?;
        let _guard = self.guard()?;
        let mut records = self.load(vs_version)?;
        upsert(&mut records, RegistryRecord::from_interpreter(interpreter));
        self.save(vs_version, &records)?;
        log::debug!(
            "Registered interpreter {{{}}} ({}) under {}",
            interpreter.id,
            interpreter.interpreter_abs_path.display(),
            registry_key(vs_version)
        );
        Ok(true)
    }
}

/// In-process registry; every namespace is available.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    namespaces: Mutex<HashMap<String, Vec<RegistryRecord>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(vs_version: VsVersion, records: Vec<RegistryRecord>) -> Self {
        let registry = Self::new();
        if let Ok(mut namespaces) = registry.namespaces.lock() {
            namespaces.insert(registry_key(vs_version), records);
        }
        registry
    }

    pub fn records(&self, vs_version: VsVersion) -> Vec<RegistryRecord> {
        self.namespaces
            .lock()
            .map(|namespaces| {
                namespaces
                    .get(&registry_key(vs_version))
                    .cloned()
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

impl InterpreterRegistry for MemoryRegistry {
    fn known(&self, vs_version: VsVersion) -> Result<Vec<Interpreter>> {
        records_to_interpreters(&self.records(vs_version), vs_version)
    }

    fn register(&self, interpreter: &Interpreter) -> Result<bool> {
        let vs_version = require_version(interpreter)?;
        let mut namespaces = self
            .namespaces
            .lock()
            .map_err(|_| AppError::Registry("Registry lock poisoned".to_string()))?;
        upsert(
            namespaces.entry(registry_key(vs_version)).or_default(),
            RegistryRecord::from_interpreter(interpreter),
        );
        Ok(true)
    }
}
