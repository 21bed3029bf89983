use crate::config::ConfigSource;
use crate::error::{AppError, Result};
use crate::paths;
use crate::project::SuiteProject;
use crate::ptvs::braced_upper;
use crate::version::VsVersion;
use crate::writer::{Writable, write_text_file};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const CONFIGURATIONS: [&str; 2] = ["Debug", "Release"];

/// Named, optional construction fields for a [`Solution`].
#[derive(Debug, Clone, Default)]
pub struct SolutionConfig {
    pub id: Option<Uuid>,
    pub name: String,
    pub file_name: Option<PathBuf>,
    pub vs_version: Option<VsVersion>,
    /// Section names of the projects the solution owns, in declaration order.
    pub projects: Vec<String>,
}

impl SolutionConfig {
    pub fn from_section(config: &dyn ConfigSource, section: &str) -> Result<Self> {
        config.require_section(section)?;
        let vs_version = config
            .get_float(section, "visual_studio_version")?
            .map(VsVersion::new)
            .transpose()?;
        Ok(SolutionConfig {
            id: None,
            name: config.get_or(section, "name", ""),
            file_name: config.get_file(section, "filename", false),
            vs_version,
            projects: config.get_list(section, "projects").unwrap_or_default(),
        })
    }
}

/// A Visual Studio solution (`.sln`) over the projects it owns.
#[derive(Debug, Clone)]
pub struct Solution {
    pub id: Uuid,
    pub name: String,
    pub file_name: PathBuf,
    pub vs_version: VsVersion,
    pub projects: Vec<Arc<dyn SuiteProject>>,
}

impl Solution {
    /// Validates the record: a Visual Studio version and a file name are required, and a
    /// missing name falls back to the file stem.
    pub fn from_config(config: SolutionConfig, projects: Vec<Arc<dyn SuiteProject>>) -> Result<Self> {
        let file_name = config.file_name.ok_or_else(|| {
            AppError::config(format!("Solution \"{}\" requires a file name", config.name))
        })?;
        let vs_version = config.vs_version.ok_or_else(|| {
            AppError::config(format!(
                "Solution \"{}\" requires a value for Visual Studio Version (visual_studio_version)",
                config.name
            ))
        })?;
        let name = if config.name.trim().is_empty() {
            file_name
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            config.name
        };
        if name.is_empty() {
            return Err(AppError::config("Solution requires a name"));
        }
        Ok(Solution {
            id: config.id.unwrap_or_else(Uuid::new_v4),
            name,
            file_name,
            vs_version,
            projects,
        })
    }

    fn header(&self) -> &'static [&'static str] {
        let version = self.vs_version.value();
        if version == 14.0 {
            &[
                "# Visual Studio 14",
                "VisualStudioVersion = 14.0.23107.0",
                "MinimumVisualStudioVersion = 10.0.40219.1",
            ]
        } else if version == 12.0 {
            &[
                "# Visual Studio 2013",
                "VisualStudioVersion = 12.0.31101.0",
                "MinimumVisualStudioVersion = 10.0.40219.1",
            ]
        } else if version == 11.0 {
            &["# Visual Studio 2012"]
        } else {
            &[]
        }
    }

    /// Renders the `.sln` text.
    pub fn render(&self) -> String {
        let sln_dir = self.file_name.parent().unwrap_or(Path::new(""));
        let mut out = String::from("Microsoft Visual Studio Solution File, Format Version 12.00\n");
        for line in self.header() {
            out.push_str(line);
            out.push('\n');
        }

        for project in &self.projects {
            let model = project.project();
            let _ = writeln!(
                out,
                "Project(\"{}\") = \"{}\", \"{}\", \"{}\"",
                braced_upper(project.type_guid()),
                model.name,
                paths::msbuild_path(&paths::relative_to(&model.file_name, sln_dir)),
                braced_upper(model.id)
            );
            out.push_str("EndProject\n");
        }

        out.push_str("Global\n");
        out.push_str("\tGlobalSection(SolutionConfigurationPlatforms) = preSolution\n");
        for configuration in CONFIGURATIONS {
            let _ = writeln!(out, "\t\t{0}|Any CPU = {0}|Any CPU", configuration);
        }
        out.push_str("\tEndGlobalSection\n");
        out.push_str("\tGlobalSection(ProjectConfigurationPlatforms) = postSolution\n");
        for project in &self.projects {
            let id = braced_upper(project.project().id);
            for configuration in CONFIGURATIONS {
                let _ = writeln!(out, "\t\t{0}.{1}|Any CPU.ActiveCfg = {1}|Any CPU", id, configuration);
                let _ = writeln!(out, "\t\t{0}.{1}|Any CPU.Build.0 = {1}|Any CPU", id, configuration);
            }
        }
        out.push_str("\tEndGlobalSection\n");
        out.push_str("\tGlobalSection(SolutionProperties) = preSolution\n");
        out.push_str("\t\tHideSolutionNode = FALSE\n");
        out.push_str("\tEndGlobalSection\n");
        out.push_str("EndGlobal\n");
        out
    }
}

impl Writable for Solution {
    fn writable_name(&self) -> &'static str {
        "Visual Studio Solution"
    }

    fn write(&self) -> Result<()> {
        write_text_file(&self.file_name, &self.render())
    }
}
