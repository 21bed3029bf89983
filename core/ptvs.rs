use crate::config::ConfigSource;
use crate::error::{AppError, Result};
use crate::interpreter::Interpreter;
use crate::paths;
use crate::project::{BuildContext, Project, ProjectConfig, SuiteProject};
use crate::register::Registerable;
use crate::registry::InterpreterRegistry;
use crate::writer::{Writable, write_text_file};
use quick_xml::Writer;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::{Uuid, uuid};

const MSBUILD_NS: &str = "http://schemas.microsoft.com/developer/msbuild/2003";
const PTVS_PROJECT_TYPE: Uuid = uuid!("888888a0-9f3d-457c-b088-3a5042f75d52");
const VS_TOOLS_PATH: &str = r"$(MSBuildExtensionsPath32)\Microsoft\VisualStudio\v$(VisualStudioVersion)";
const PTVS_TARGETS_FILE: &str = r"$(MSBuildExtensionsPath32)\Microsoft\VisualStudio\v$(VisualStudioVersion)\Python Tools\Microsoft.PythonTools.targets";
const COMMON_TARGETS_FILE: &str = r"$(MSBuildToolsPath)\Microsoft.Common.targets";

/// A Python Tools for Visual Studio project (`.pyproj`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PtvsProject {
    #[serde(flatten)]
    pub project: Project,
    pub search_path: Vec<PathBuf>,
    pub is_windows_application: bool,
    pub interpreter_args: Vec<String>,
}

impl PtvsProject {
    pub const KIND: &'static str = "ptvs";

    pub fn new(project: Project) -> Self {
        PtvsProject {
            project,
            search_path: Vec::new(),
            is_windows_application: false,
            interpreter_args: Vec::new(),
        }
    }

    /// Builds a project from its section, probing every interpreter section it references.
    pub fn from_section(
        config: &dyn ConfigSource,
        section: &str,
        context: &BuildContext<'_>,
    ) -> Result<Self> {
        let mut project_config = ProjectConfig::from_section(config, section)?;
        project_config.vs_version = context.vs_version;
        let mut project = Project::from_config(project_config)?;

        let selected_section = config
            .get(section, "python_interpreter")
            .filter(|name| !name.trim().is_empty());
        for name in config
            .get_list(section, "python_interpreters")
            .unwrap_or_default()
        {
            let probed = Interpreter::from_section(config, &name, context)?;
            if project.selected_interpreter.is_none() && selected_section.as_deref() == Some(name.as_str())
            {
                project.selected_interpreter = probed.first().cloned();
            }
            project.interpreters.extend(probed);
        }
        if let Some(name) = &selected_section {
            if project.selected_interpreter.is_none() {
                log::warn!(
                    "[{}] python_interpreter \"{}\" selects no probed interpreter",
                    section,
                    name
                );
            }
        }
        for name in config
            .get_list(section, "python_virtual_environments")
            .unwrap_or_default()
        {
            project
                .virtual_environments
                .extend(Interpreter::from_section(config, &name, context)?);
        }

        Ok(PtvsProject {
            project,
            search_path: config.get_dirs(section, "search_path")?,
            is_windows_application: config
                .get_bool(section, "is_windows_application")?
                .unwrap_or(false),
            interpreter_args: config
                .get_list(section, "python_interpreter_args")
                .unwrap_or_default(),
        })
    }

    /// Renders the `.pyproj` document.
    pub fn render(&self) -> Result<String> {
        let p = &self.project;
        let file_dir = p.file_name.parent().unwrap_or(Path::new(""));
        let home = &p.project_home;
        let rel_home = |path: &Path| paths::msbuild_path(&paths::relative_to(path, home));

        let search_path = if self.search_path.is_empty() {
            ".".to_string()
        } else {
            self.search_path
                .iter()
                .map(|path| rel_home(path))
                .collect::<Vec<_>>()
                .join(";")
        };

        let mut xml = MsBuildXml::new();
        xml.declaration()?;
        xml.start(
            "Project",
            &[
                ("ToolsVersion", "4.0"),
                ("xmlns", MSBUILD_NS),
                ("DefaultTargets", "Build"),
            ],
        )?;

        xml.start("PropertyGroup", &[])?;
        xml.element(
            "Configuration",
            &[("Condition", " '$(Configuration)' == '' ")],
            "Debug",
        )?;
        xml.element("SchemaVersion", &[], "2.0")?;
        xml.element("ProjectGuid", &[], &braced_lower(p.id))?;
        xml.element(
            "ProjectHome",
            &[],
            &paths::msbuild_path(&paths::relative_to(home, file_dir)),
        )?;
        match &p.startup_file {
            Some(startup) => xml.element("StartupFile", &[], &rel_home(startup))?,
            None => xml.empty("StartupFile", &[])?,
        }
        xml.element("SearchPath", &[], &search_path)?;
        xml.element("WorkingDirectory", &[], &rel_home(&p.working_directory))?;
        xml.element("OutputPath", &[], &rel_home(&p.output_path))?;
        xml.element("RootNamespace", &[], &p.root_namespace)?;
        xml.element(
            "IsWindowsApplication",
            &[],
            if self.is_windows_application {
                "True"
            } else {
                "False"
            },
        )?;
        if let Some(interpreter) = p.selected() {
            xml.element("InterpreterId", &[], &braced_lower(interpreter.id))?;
            xml.element("InterpreterVersion", &[], &interpreter.version)?;
        }
        xml.element("LaunchProvider", &[], "Standard Python launcher")?;
        xml.empty("CommandLineArguments", &[])?;
        xml.empty("InterpreterPath", &[])?;
        if self.interpreter_args.is_empty() {
            xml.empty("InterpreterArguments", &[])?;
        } else {
            xml.element("InterpreterArguments", &[], &self.interpreter_args.join(" "))?;
        }
        xml.element(
            "VisualStudioVersion",
            &[("Condition", "'$(VisualStudioVersion)' == ''")],
            "10.0",
        )?;
        xml.element(
            "VSToolsPath",
            &[("Condition", "'$(VSToolsPath)' == ''")],
            VS_TOOLS_PATH,
        )?;
        xml.end("PropertyGroup")?;

        for configuration in ["Debug", "Release"] {
            let condition = format!(" '$(Configuration)' == '{}' ", configuration);
            xml.start("PropertyGroup", &[("Condition", &condition)])?;
            xml.element("DebugSymbols", &[], "true")?;
            xml.element("EnableUnmanagedDebugging", &[], "false")?;
            xml.end("PropertyGroup")?;
        }

        xml.start("PropertyGroup", &[])?;
        xml.element(
            "VisualStudioVersion",
            &[("Condition", " '$(VisualStudioVersion)' == '' ")],
            "10.0",
        )?;
        xml.element("PtvsTargetsFile", &[], PTVS_TARGETS_FILE)?;
        xml.end("PropertyGroup")?;

        xml.item_group("Content", &sorted_relative(&p.content_files, home))?;
        xml.item_group("Compile", &sorted_relative(&p.compile_files, home))?;
        let folders: Vec<String> = p.folders().iter().map(|f| paths::msbuild_path(f)).collect();
        xml.item_group("Folder", &folders)?;

        if !p.virtual_environments.is_empty() {
            xml.start("ItemGroup", &[])?;
            for venv in &p.virtual_environments {
                write_virtual_environment(&mut xml, venv, home)?;
            }
            xml.end("ItemGroup")?;
        }

        if !p.interpreters.is_empty() {
            xml.start("ItemGroup", &[])?;
            for interpreter in &p.interpreters {
                let include = format!(
                    "{}\\{}",
                    braced_upper(interpreter.base_interpreter),
                    interpreter.version
                );
                xml.empty("InterpreterReference", &[("Include", &include)])?;
            }
            xml.end("ItemGroup")?;
        }

        xml.empty(
            "Import",
            &[
                ("Project", "$(PtvsTargetsFile)"),
                ("Condition", "Exists($(PtvsTargetsFile))"),
            ],
        )?;
        xml.empty(
            "Import",
            &[
                ("Project", COMMON_TARGETS_FILE),
                ("Condition", "!Exists($(PtvsTargetsFile))"),
            ],
        )?;
        xml.end("Project")?;
        xml.finish()
    }
}

fn write_virtual_environment(xml: &mut MsBuildXml, venv: &Interpreter, home: &Path) -> Result<()> {
    let include = paths::msbuild_path(&paths::relative_to(&venv.path, home));
    xml.start("Interpreter", &[("Include", &include)])?;
    xml.element("Id", &[], &braced_upper(venv.id))?;
    xml.element("BaseInterpreter", &[], &braced_upper(venv.base_interpreter))?;
    xml.element("Version", &[], &venv.version)?;
    xml.element("Description", &[], &venv.description)?;
    xml.element(
        "InterpreterPath",
        &[],
        &paths::msbuild_path(&venv.interpreter_path),
    )?;
    xml.element(
        "WindowsInterpreterPath",
        &[],
        &paths::msbuild_path(&venv.windows_interpreter_path),
    )?;
    xml.element("LibraryPath", &[], &paths::msbuild_path(&venv.library_path))?;
    xml.element("PathEnvironmentVariable", &[], &venv.path_environment_variable)?;
    xml.element("Architecture", &[], &venv.architecture)?;
    xml.end("Interpreter")
}

fn sorted_relative(files: &[PathBuf], home: &Path) -> Vec<String> {
    let mut sorted: Vec<&PathBuf> = files.iter().collect();
    sorted.sort_by_cached_key(|path| paths::fold_key(path));
    sorted
        .into_iter()
        .map(|path| paths::msbuild_path(&paths::relative_to(path, home)))
        .collect()
}

pub(crate) fn braced_lower(id: Uuid) -> String {
    format!("{{{}}}", id.hyphenated())
}

pub(crate) fn braced_upper(id: Uuid) -> String {
    format!("{{{}}}", id.hyphenated()).to_uppercase()
}

/// Event writer for MSBuild documents: two space indentation, conditions written unescaped.
struct MsBuildXml {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl MsBuildXml {
    fn new() -> Self {
        MsBuildXml {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| AppError::XmlSerialize(e.to_string()))
    }

    fn tag<'a>(name: &'a str, attributes: &[(&'a str, &'a str)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for &(key, value) in attributes {
            if key == "Condition" {
                start.push_attribute(Attribute::from((key.as_bytes(), value.as_bytes())));
            } else {
                start.push_attribute((key, value));
            }
        }
        start
    }

    fn declaration(&mut self) -> Result<()> {
        self.emit(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        self.emit(Event::Start(Self::tag(name, attributes)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        self.emit(Event::Empty(Self::tag(name, attributes)))
    }

    fn element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        if text.is_empty() {
            return self.empty(name, attributes);
        }
        self.start(name, attributes)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// An `ItemGroup` of `<kind Include=".." />` items; nothing when `items` is empty.
    fn item_group(&mut self, kind: &str, items: &[String]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.start("ItemGroup", &[])?;
        for item in items {
            self.empty(kind, &[("Include", item)])?;
        }
        self.end("ItemGroup")
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| AppError::XmlSerialize(e.to_string()))
    }
}

impl Writable for PtvsProject {
    fn writable_name(&self) -> &'static str {
        "Visual Studio PTVS Project"
    }

    fn write(&self) -> Result<()> {
        let content = self.render()?;
        write_text_file(&self.project.file_name, &content)
    }
}

impl Registerable for PtvsProject {
    fn registerable_name(&self) -> &'static str {
        "Visual Studio PTVS Python Interpreter"
    }

    /// Registers every distinct base interpreter. True when all registrations succeed.
    fn register(&self, registry: &dyn InterpreterRegistry) -> Result<bool> {
        let mut all = true;
        for interpreter in self.project.distinct_interpreters() {
            all &= interpreter.register(registry)?;
        }
        Ok(all)
    }
}

impl SuiteProject for PtvsProject {
    fn project(&self) -> &Project {
        &self.project
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn type_guid(&self) -> Uuid {
        PTVS_PROJECT_TYPE
    }

    fn as_writable(&self) -> &dyn Writable {
        self
    }

    fn as_registerable(&self) -> &dyn Registerable {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TomlConfig;
    use crate::interpreter::InterpreterConfig;
    use crate::registry::MemoryRegistry;
    use crate::version::VsVersion;
    use std::fs;
    use tempfile::TempDir;

    fn create_file(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn interpreter(root: &str, version: &str) -> Interpreter {
        Interpreter::new(InterpreterConfig {
            path: PathBuf::from(root),
            interpreter_path: PathBuf::from("python.exe"),
            version: version.to_string(),
            vs_version: Some(VsVersion::new(14.0).unwrap()),
            ..Default::default()
        })
        .unwrap()
    }

    fn sample() -> PtvsProject {
        let mut project = Project::new("App");
        project.file_name = PathBuf::from("/work/build/App.pyproj");
        project.project_home = PathBuf::from("/work/src");
        project.working_directory = PathBuf::from("/work/src");
        project.output_path = PathBuf::from("/work/src/out");
        project.compile_files = vec![
            PathBuf::from("/work/src/pkg/Zeta.py"),
            PathBuf::from("/work/src/pkg/alpha.py"),
        ];
        project.content_files = vec![PathBuf::from("/work/src/docs/index.rst")];
        PtvsProject::new(project)
    }

    #[test]
    fn renders_property_and_item_groups() {
        let xml = sample().render().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<ProjectHome>..\\src</ProjectHome>"));
        assert!(xml.contains("<StartupFile/>"));
        assert!(xml.contains("<SearchPath>.</SearchPath>"));
        assert!(xml.contains("<WorkingDirectory>.</WorkingDirectory>"));
        assert!(xml.contains("<OutputPath>out</OutputPath>"));
        assert!(xml.contains("<IsWindowsApplication>False</IsWindowsApplication>"));
        assert!(!xml.contains("<InterpreterId>"));

        let alpha = xml.find("pkg\\alpha.py").unwrap();
        let zeta = xml.find("pkg\\Zeta.py").unwrap();
        assert!(alpha < zeta);
        assert!(xml.find("<Content Include").unwrap() < xml.find("<Compile Include").unwrap());
        assert!(xml.contains("<Folder Include=\"docs\"/>"));
        assert!(xml.contains("<Folder Include=\"pkg\"/>"));
        assert!(xml.trim_end().ends_with("</Project>"));
    }

    #[test]
    fn conditions_are_written_verbatim() {
        let xml = sample().render().unwrap();
        assert!(xml.contains("Condition=\" '$(Configuration)' == 'Release' \""));
    }

    #[test]
    fn selected_interpreter_falls_back_to_first_available() {
        let mut ptvs = sample();
        let first = interpreter("/py35", "3.5");
        ptvs.project.interpreters = vec![first.clone(), interpreter("/py27", "2.7")];
        ptvs.interpreter_args = vec!["-O".to_string(), "-B".to_string()];

        let xml = ptvs.render().unwrap();
        assert!(xml.contains(&format!("<InterpreterId>{}</InterpreterId>", braced_lower(first.id))));
        assert!(xml.contains("<InterpreterVersion>3.5</InterpreterVersion>"));
        assert!(xml.contains("<InterpreterArguments>-O -B</InterpreterArguments>"));
        assert!(xml.contains(&format!(
            "<InterpreterReference Include=\"{}\\3.5\"/>",
            braced_upper(first.base_interpreter)
        )));
    }

    #[test]
    fn registers_distinct_interpreters() {
        let mut ptvs = sample();
        let shared = interpreter("/py35", "3.5");
        ptvs.project.interpreters = vec![shared.clone(), shared, interpreter("/py27", "2.7")];

        let registry = MemoryRegistry::new();
        assert!(Registerable::register(&ptvs, &registry).unwrap());
        assert_eq!(registry.records(VsVersion::new(14.0).unwrap()).len(), 2);
    }

    #[test]
    fn writes_project_file_creating_directories() {
        let temp = TempDir::new().unwrap();
        let mut ptvs = sample();
        ptvs.project.file_name = temp.path().join("nested/out/App.pyproj");
        ptvs.write().unwrap();
        let written = fs::read_to_string(&ptvs.project.file_name).unwrap();
        assert!(written.contains("<Compile Include="));
    }

    #[test]
    fn from_section_probes_interpreters_and_options() {
        let temp = TempDir::new().unwrap();
        create_file(&temp.path().join("Python35/python.exe"));
        create_file(&temp.path().join("app/main.py"));
        fs::create_dir_all(temp.path().join("lib")).unwrap();
        let config = TomlConfig::parse(
            r#"
[app]
type = "ptvs"
name = "App"
filename = "App.pyproj"
root_path = "app"
search_path = "lib"
is_windows_application = "yes"
python_interpreter_args = "-O"
python_interpreter = "py"
python_interpreters = "py"

[py]
interpreter_paths = "Python3*"
"#,
            Some(temp.path()),
        )
        .unwrap();
        let context = BuildContext {
            vs_version: Some(VsVersion::new(14.0).unwrap()),
            ..Default::default()
        };

        let ptvs = PtvsProject::from_section(&config, "app", &context).unwrap();
        assert!(ptvs.is_windows_application);
        assert_eq!(ptvs.search_path, vec![temp.path().join("lib")]);
        assert_eq!(ptvs.interpreter_args, vec!["-O".to_string()]);
        assert_eq!(ptvs.project.interpreters.len(), 1);
        assert_eq!(
            ptvs.project.selected_interpreter.as_ref().map(|i| i.id),
            Some(ptvs.project.interpreters[0].id)
        );
        assert_eq!(ptvs.project.compile_files, vec![temp.path().join("app/main.py")]);
    }
}
