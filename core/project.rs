use crate::classify::TreeClassifier;
use crate::config::ConfigSource;
use crate::error::{AppError, Result};
use crate::filter::{FilterOverrides, FilterRules};
use crate::folders::synthesize_folders;
use crate::interpreter::{Interpreter, InterpreterCache};
use crate::ptvs::PtvsProject;
use crate::register::Registerable;
use crate::registry::InterpreterRegistry;
use crate::version::VsVersion;
use crate::writer::Writable;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Named, optional construction fields for a [`Project`].
#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    pub id: Option<Uuid>,
    pub name: String,
    pub file_name: Option<PathBuf>,
    pub project_home: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub startup_file: Option<PathBuf>,
    pub root_namespace: String,
    pub compile_files: Vec<PathBuf>,
    pub content_files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub filters: FilterRules,
    /// Tree to classify into the file groups once the project is built.
    pub root_path: Option<PathBuf>,
    pub vs_version: Option<VsVersion>,
}

impl ProjectConfig {
    /// Reads the options every project kind shares.
    pub fn from_section(config: &dyn ConfigSource, section: &str) -> Result<Self> {
        config.require_section(section)?;
        let list = |option: &str| config.get_list(section, option).unwrap_or_default();
        Ok(ProjectConfig {
            id: None,
            name: config.get_or(section, "name", ""),
            file_name: config.get_file(section, "filename", false),
            project_home: config.get_dir(section, "project_home", false),
            working_directory: config.get_dir(section, "working_directory", false),
            output_path: config.get_dir(section, "output_path", false),
            startup_file: config.get_file(section, "startup_file", false),
            root_namespace: config.get_or(section, "root_namespace", ""),
            compile_files: config.get_paths(section, "compile_files"),
            content_files: config.get_paths(section, "content_files"),
            directories: config.get_paths(section, "directories"),
            filters: FilterRules {
                directory_in: list("directory_in_filter"),
                directory_ex: list("directory_ex_filter"),
                compile_in: list("compile_in_filter"),
                compile_ex: list("compile_ex_filter"),
                content_in: list("content_in_filter"),
                content_ex: list("content_ex_filter"),
            },
            root_path: config.get_dir(section, "root_path", false),
            vs_version: None,
        })
    }
}

/// The project model shared by every project kind: identity, anchors, classified file
/// groups and the interpreters the project can run with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub file_name: PathBuf,
    pub project_home: PathBuf,
    pub working_directory: PathBuf,
    pub output_path: PathBuf,
    pub startup_file: Option<PathBuf>,
    pub root_namespace: String,
    pub compile_files: Vec<PathBuf>,
    pub content_files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub filters: FilterRules,
    /// Base interpreters available to the project.
    pub interpreters: Vec<Interpreter>,
    pub virtual_environments: Vec<Interpreter>,
    pub selected_interpreter: Option<Interpreter>,
    pub vs_version: Option<VsVersion>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Project {
            id: Uuid::new_v4(),
            name: name.into(),
            file_name: PathBuf::new(),
            project_home: PathBuf::new(),
            working_directory: PathBuf::new(),
            output_path: PathBuf::new(),
            startup_file: None,
            root_namespace: String::new(),
            compile_files: Vec::new(),
            content_files: Vec::new(),
            directories: Vec::new(),
            filters: FilterRules::default(),
            interpreters: Vec::new(),
            virtual_environments: Vec::new(),
            selected_interpreter: None,
            vs_version: None,
        }
    }

    /// Builds a project, requiring a name and a project file. The home directory defaults to
    /// the project file's directory; the working and output directories default to the home.
    pub fn from_config(config: ProjectConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(AppError::config("Project requires a name"));
        }
        let file_name = config.file_name.ok_or_else(|| {
            AppError::config(format!("Project \"{}\" requires a file name", config.name))
        })?;
        let project_home = config
            .project_home
            .or_else(|| file_name.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        let mut project = Project {
            id: config.id.unwrap_or_else(Uuid::new_v4),
            name: config.name,
            working_directory: config
                .working_directory
                .unwrap_or_else(|| project_home.clone()),
            output_path: config.output_path.unwrap_or_else(|| project_home.clone()),
            project_home,
            file_name,
            startup_file: config.startup_file,
            root_namespace: config.root_namespace,
            compile_files: config.compile_files,
            content_files: config.content_files,
            directories: config.directories,
            filters: config.filters,
            interpreters: Vec::new(),
            virtual_environments: Vec::new(),
            selected_interpreter: None,
            vs_version: config.vs_version,
        };
        if let Some(root) = config.root_path {
            project.insert_files(&root, &FilterOverrides::default());
        }
        Ok(project)
    }

    /// Classifies the tree under `root` and appends the results to the file groups.
    /// Filters not overridden fall back to the project's own. Not idempotent: inserting the
    /// same tree twice lists its files twice.
    pub fn insert_files(&mut self, root: &Path, overrides: &FilterOverrides) {
        let rules = self.filters.with_overrides(overrides);
        let found = TreeClassifier::new(&rules).classify(root);
        log::debug!(
            "{}: inserted {} compile and {} content files from {}",
            self.name,
            found.compile_files.len(),
            found.content_files.len(),
            root.display()
        );
        self.compile_files.extend(found.compile_files);
        self.content_files.extend(found.content_files);
    }

    /// Folder entries for the explicit directories and every classified file, relative to
    /// the project home.
    pub fn folders(&self) -> BTreeSet<PathBuf> {
        synthesize_folders(
            &self.directories,
            self.compile_files.iter().chain(&self.content_files),
            &self.project_home,
        )
    }

    /// The selected interpreter, else the first available one.
    pub fn selected(&self) -> Option<&Interpreter> {
        self.selected_interpreter
            .as_ref()
            .or_else(|| self.interpreters.first())
    }

    /// Available interpreters with duplicate identities removed, first occurrence kept.
    pub fn distinct_interpreters(&self) -> Vec<&Interpreter> {
        let mut seen = HashSet::new();
        self.interpreters
            .iter()
            .filter(|interpreter| seen.insert(interpreter.id))
            .collect()
    }
}

impl Writable for Project {
    fn writable_name(&self) -> &'static str {
        "Visual Studio Base Project"
    }
}

impl Registerable for Project {
    fn registerable_name(&self) -> &'static str {
        "Visual Studio Base Registerable"
    }
}

/// A concrete project kind a solution can own.
pub trait SuiteProject: Writable + Registerable + fmt::Debug {
    fn project(&self) -> &Project;

    /// The `type` tag the kind is registered under.
    fn kind(&self) -> &'static str;

    /// Project type identifier written into solution files.
    fn type_guid(&self) -> Uuid;

    fn as_writable(&self) -> &dyn Writable;

    fn as_registerable(&self) -> &dyn Registerable;
}

/// Shared inputs when a solution builds its projects.
#[derive(Clone, Copy, Default)]
pub struct BuildContext<'a> {
    pub vs_version: Option<VsVersion>,
    pub registry: Option<&'a dyn InterpreterRegistry>,
    /// Shares interpreter identities between the projects of one build.
    pub interpreters: Option<&'a InterpreterCache>,
}

pub type ProjectFactory =
    fn(&dyn ConfigSource, &str, &BuildContext<'_>) -> Result<Box<dyn SuiteProject>>;

fn build_ptvs(
    config: &dyn ConfigSource,
    section: &str,
    context: &BuildContext<'_>,
) -> Result<Box<dyn SuiteProject>> {
    Ok(Box::new(PtvsProject::from_section(config, section, context)?))
}

/// Project kinds by `type` tag.
pub static PROJECT_KINDS: Lazy<IndexMap<&'static str, ProjectFactory>> = Lazy::new(|| {
    let mut kinds: IndexMap<&'static str, ProjectFactory> = IndexMap::new();
    kinds.insert(PtvsProject::KIND, build_ptvs);
    kinds
});

pub fn project_factory(kind: &str) -> Option<ProjectFactory> {
    PROJECT_KINDS.get(kind).copied()
}

/// Builds the project a section describes, dispatching on its `type` option.
pub fn build_project(
    config: &dyn ConfigSource,
    section: &str,
    context: &BuildContext<'_>,
) -> Result<Box<dyn SuiteProject>> {
    config.require_section(section)?;
    let kind = config.get(section, "type").ok_or_else(|| {
        AppError::Config(format!(
            "Section [{}] mandatory option \"type\" not found",
            section
        ))
    })?;
    let factory = project_factory(kind.trim()).ok_or_else(|| {
        AppError::Config(format!(
            "Cannot resolve option \"type\" (\"{}\") to a recognised project type in section [{}]. Known types: {}",
            kind,
            section,
            PROJECT_KINDS.keys().copied().collect::<Vec<_>>().join(", ")
        ))
    })?;
    log::debug!("Building {} project from [{}]", kind, section);
    factory(config, section, context)
}
