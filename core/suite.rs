use crate::config::{ConfigSource, MAIN_SECTION, SOLUTION_SECTION_MARKER, TomlConfig};
use crate::error::{AppError, Result};
use crate::interpreter::InterpreterCache;
use crate::paths;
use crate::project::{BuildContext, SuiteProject, build_project};
use crate::register::{Registerable, register_all};
use crate::registry::InterpreterRegistry;
use crate::solution::{Solution, SolutionConfig};
use crate::templates;
use crate::writer::{Writable, write_all};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Every solution a configuration describes, with the projects they share.
#[derive(Debug, Clone)]
pub struct Suite {
    pub root: PathBuf,
    pub solutions: Vec<Solution>,
}

impl Suite {
    /// Builds every `vsgen.solution*` section in declaration order. A project section
    /// referenced by several solutions of the same Visual Studio version is built once.
    pub fn from_config(
        config: &dyn ConfigSource,
        registry: Option<&dyn InterpreterRegistry>,
    ) -> Result<Self> {
        let raw_root = config
            .get(MAIN_SECTION, "root")
            .filter(|root| !root.trim().is_empty())
            .ok_or_else(|| AppError::config("Expected option \"root\" in section [vsgen]."))?;
        let root = config
            .get_dir(MAIN_SECTION, "root", true)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "Expected option \"root\" ({}) does not resolve to valid directory.",
                    raw_root
                ))
            })?;

        let interpreters = InterpreterCache::new();
        let mut built: HashMap<(String, String), Arc<dyn SuiteProject>> = HashMap::new();
        let mut solutions = Vec::new();
        for section in config
            .sections()
            .into_iter()
            .filter(|section| section.contains(SOLUTION_SECTION_MARKER))
        {
            let record = SolutionConfig::from_section(config, &section)?;
            let vs_version = record.vs_version.ok_or_else(|| {
                AppError::Config(format!(
                    "Solution section [{}] requires a value for Visual Studio Version (visual_studio_version)",
                    section
                ))
            })?;
            let context = BuildContext {
                vs_version: Some(vs_version),
                registry,
                interpreters: Some(&interpreters),
            };

            let mut projects = Vec::with_capacity(record.projects.len());
            for project_section in &record.projects {
                let key = (project_section.clone(), vs_version.to_string());
                let project = match built.get(&key) {
                    Some(project) => Arc::clone(project),
                    None => {
                        let project: Arc<dyn SuiteProject> =
                            Arc::from(build_project(config, project_section, &context)?);
                        built.insert(key, Arc::clone(&project));
                        project
                    }
                };
                projects.push(project);
            }
            solutions.push(Solution::from_config(record, projects)?);
        }

        log::info!(
            "Suite at {} holds {} solution(s) and {} project(s)",
            root.display(),
            solutions.len(),
            built.len()
        );
        Ok(Suite { root, solutions })
    }

    /// Loads a configuration file; relative paths in it resolve against its directory.
    pub fn from_file(path: &Path, registry: Option<&dyn InterpreterRegistry>) -> Result<Self> {
        let config = TomlConfig::load_from_path(path)?;
        Self::from_config(&config, registry)
    }

    /// Auto mode: configures `directory` from the embedded template for `kind`. `[vsgen]`
    /// root and name come from the directory; `overrides` then replace template options.
    pub fn from_directory(
        kind: &str,
        directory: &Path,
        overrides: &IndexMap<String, String>,
        registry: Option<&dyn InterpreterRegistry>,
    ) -> Result<Self> {
        let mut config = TomlConfig::parse(&templates::suite_template(kind)?, None)?;
        let root = paths::absolutize(directory);
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| kind.to_string());
        config.set(MAIN_SECTION, "root", root.to_string_lossy());
        config.set(MAIN_SECTION, "name", name);
        let applied = config.apply_overrides(overrides);
        log::debug!("Applied {} template override(s)", applied);
        Self::from_config(&config, registry)
    }

    /// Distinct projects across all solutions, sorted by name.
    pub fn projects(&self) -> Vec<Arc<dyn SuiteProject>> {
        let mut seen = HashSet::new();
        let mut projects: Vec<Arc<dyn SuiteProject>> = self
            .solutions
            .iter()
            .flat_map(|solution| solution.projects.iter())
            .filter(|project| seen.insert(project.project().id))
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.project().name.cmp(&b.project().name));
        projects
    }

    /// Writes the solutions, then the projects, each batch sorted by name.
    pub fn write(&self, parallel: bool) -> Result<()> {
        let mut solutions: Vec<&Solution> = self.solutions.iter().collect();
        solutions.sort_by(|a, b| a.name.cmp(&b.name));
        let items: Vec<&dyn Writable> = solutions.iter().map(|s| *s as &dyn Writable).collect();
        write_all("Writing Visual Studio Solutions", &items, parallel)?;

        let projects = self.projects();
        let items: Vec<&dyn Writable> = projects.iter().map(|p| p.as_writable()).collect();
        write_all("Writing Visual Studio Projects", &items, parallel)
    }

    /// Registers the interpreters of every distinct project, in name order.
    pub fn register(&self, registry: &dyn InterpreterRegistry) -> Result<usize> {
        let projects = self.projects();
        let items: Vec<&dyn Registerable> =
            projects.iter().map(|p| p.as_registerable()).collect();
        register_all("Registering Project Registerables", &items, registry)
    }

    /// Writes everything, then registers when a registry is given.
    pub fn generate(
        &self,
        parallel: bool,
        registry: Option<&dyn InterpreterRegistry>,
    ) -> Result<()> {
        self.write(parallel)?;
        if let Some(registry) = registry {
            self.register(registry)?;
        }
        Ok(())
    }
}
