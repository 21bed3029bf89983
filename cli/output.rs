use anyhow::{Context, Result};
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use vsgen_core::{Interpreter, RegistryRecord, Suite};

pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(data).context("Failed to serialize output to JSON")?;
    write_to_stdout(&content)
}

pub fn print_heading(title: &str) {
    println!("{}", format!("\n--- {} ---", title).green().bold().underline());
}

pub fn print_path_list(title: &str, paths: &[String]) {
    print_heading(title);
    if paths.is_empty() {
        println!("{}", "(None)".dimmed());
    } else {
        paths.iter().for_each(|p| println!("- {}", p.cyan()));
    }
}

pub fn print_interpreters(title: &str, interpreters: &[Interpreter]) {
    print_heading(title);
    if interpreters.is_empty() {
        println!("{}", "(None)".dimmed());
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Description").fg(Color::Green),
        Cell::new("Version").fg(Color::Green),
        Cell::new("Id").fg(Color::Green),
        Cell::new("Interpreter").fg(Color::Green),
    ]);
    for interpreter in interpreters {
        table.add_row(vec![
            Cell::new(&interpreter.description).fg(Color::Cyan),
            Cell::new(&interpreter.version),
            Cell::new(interpreter.id).fg(Color::DarkGrey),
            Cell::new(interpreter.interpreter_abs_path.display()),
        ]);
    }
    println!("{table}");
}

pub fn print_registry_records(records: &[RegistryRecord]) {
    if records.is_empty() {
        println!("{}", "(No interpreters registered)".yellow());
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::Green),
        Cell::new("Description").fg(Color::Green),
        Cell::new("Version").fg(Color::Green),
        Cell::new("Architecture").fg(Color::Green),
        Cell::new("Interpreter").fg(Color::Green),
    ]);
    for record in records {
        table.add_row(vec![
            Cell::new(record.id).fg(Color::DarkGrey),
            Cell::new(&record.description).fg(Color::Cyan),
            Cell::new(&record.version),
            Cell::new(&record.architecture),
            Cell::new(record.interpreter_path.display()),
        ]);
    }
    println!("{table}");
}

/// One row per project of every solution, with the size of each file group.
pub fn print_suite_summary(source: &str, suite: &Suite) {
    println!(
        "{} Generated {} solution(s) from {}",
        "✅".green(),
        suite.solutions.len(),
        source.blue()
    );
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Solution").fg(Color::Green),
        Cell::new("Project").fg(Color::Green),
        Cell::new("Project File").fg(Color::Green),
        Cell::new("Compile").fg(Color::Green),
        Cell::new("Content").fg(Color::Green),
        Cell::new("Folders").fg(Color::Green),
    ]);
    for solution in &suite.solutions {
        for project in &solution.projects {
            let model = project.project();
            table.add_row(vec![
                Cell::new(&solution.name).fg(Color::Cyan),
                Cell::new(&model.name),
                Cell::new(display_relative(&model.file_name, &suite.root)).fg(Color::DarkGrey),
                Cell::new(model.compile_files.len()).set_alignment(CellAlignment::Right),
                Cell::new(model.content_files.len()).set_alignment(CellAlignment::Right),
                Cell::new(model.folders().len()).set_alignment(CellAlignment::Right),
            ]);
        }
    }
    println!("{table}");
}

pub fn display_relative(path: &Path, base: &Path) -> String {
    pathdiff::diff_paths(path, base)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .context("Failed to write to stdout")?;
    if !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write newline to stdout")?;
    }
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}
