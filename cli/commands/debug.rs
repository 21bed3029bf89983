use crate::cli_args::DebugArgs;
use crate::open_registry;
use crate::output::{self, display_relative};
use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use vsgen_core::{FilterRules, Interpreter, InterpreterRegistry, Suite};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectPlan<'a> {
    name: &'a str,
    kind: &'static str,
    file_name: &'a Path,
    project_home: &'a Path,
    solutions: Vec<&'a str>,
    filters: &'a FilterRules,
    compile_files: Vec<String>,
    content_files: Vec<String>,
    folders: Vec<PathBuf>,
    interpreters: &'a [Interpreter],
    virtual_environments: &'a [Interpreter],
    selected_interpreter: Option<&'a Interpreter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuitePlan<'a> {
    root: &'a Path,
    solutions: Vec<SolutionPlan<'a>>,
    projects: Vec<ProjectPlan<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolutionPlan<'a> {
    name: &'a str,
    file_name: &'a Path,
    visual_studio_version: String,
    projects: Vec<&'a str>,
}

pub fn handle_debug_command(args: DebugArgs) -> Result<()> {
    let registry = match &args.registry_dir {
        Some(dir) => Some(open_registry(Some(dir))?),
        None => None,
    };
    let suite = Suite::from_file(
        &args.config,
        registry.as_ref().map(|r| r as &dyn InterpreterRegistry),
    )
    .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;

    let projects = suite.projects();
    let plan = SuitePlan {
        root: &suite.root,
        solutions: suite
            .solutions
            .iter()
            .map(|solution| SolutionPlan {
                name: &solution.name,
                file_name: &solution.file_name,
                visual_studio_version: solution.vs_version.to_string(),
                projects: solution
                    .projects
                    .iter()
                    .map(|p| p.project().name.as_str())
                    .collect(),
            })
            .collect(),
        projects: projects
            .iter()
            .map(|project| {
                let model = project.project();
                ProjectPlan {
                    name: &model.name,
                    kind: project.kind(),
                    file_name: &model.file_name,
                    project_home: &model.project_home,
                    solutions: suite
                        .solutions
                        .iter()
                        .filter(|s| s.projects.iter().any(|p| p.project().id == model.id))
                        .map(|s| s.name.as_str())
                        .collect(),
                    filters: &model.filters,
                    compile_files: relative_list(&model.compile_files, &model.project_home),
                    content_files: relative_list(&model.content_files, &model.project_home),
                    folders: model.folders().into_iter().collect(),
                    interpreters: &model.interpreters,
                    virtual_environments: &model.virtual_environments,
                    selected_interpreter: model.selected(),
                }
            })
            .collect(),
    };

    match args.format.as_deref() {
        Some("json") => output::print_json(&plan),
        _ => {
            print_plan_pretty(&plan);
            Ok(())
        }
    }
}

fn relative_list(files: &[PathBuf], base: &Path) -> Vec<String> {
    files.iter().map(|f| display_relative(f, base)).collect()
}

fn print_plan_pretty(plan: &SuitePlan) {
    println!(
        "{} {}",
        "Suite root:".green().bold(),
        plan.root.display().to_string().cyan()
    );
    for solution in &plan.solutions {
        println!(
            "{} {} ({}) -> {}",
            "Solution".green().bold(),
            solution.name.cyan(),
            solution.visual_studio_version,
            solution.file_name.display()
        );
    }

    for project in &plan.projects {
        println!(
            "{}",
            format!("\n=== {} [{}] ===", project.name, project.kind)
                .green()
                .bold()
        );
        println!("{:<14} {}", "File:".green(), project.file_name.display());
        println!("{:<14} {}", "Home:".green(), project.project_home.display());
        println!("{:<14} {}", "Solutions:".green(), project.solutions.join(", "));
        output::print_path_list("Compile Files", &project.compile_files);
        output::print_path_list("Content Files", &project.content_files);
        let folders: Vec<String> = project
            .folders
            .iter()
            .map(|f| f.to_string_lossy().to_string())
            .collect();
        output::print_path_list("Folders", &folders);
        output::print_interpreters("Interpreters", project.interpreters);
        output::print_interpreters("Virtual Environments", project.virtual_environments);
        match project.selected_interpreter {
            Some(selected) => println!(
                "{} {} {}",
                "Selected interpreter:".green(),
                selected.description.cyan(),
                selected.version
            ),
            None => println!("{}", "No interpreter selected".dimmed()),
        }
    }
}
