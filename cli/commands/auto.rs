use crate::cli_args::{AutoArgs, AutoKind};
use crate::output;
use crate::registry_for;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use vsgen_core::{AppError, InterpreterRegistry, Suite};

pub fn handle_auto_command(args: AutoArgs, quiet: bool) -> Result<()> {
    let kind = args.kind.name();
    let AutoKind::Ptvs(ptvs) = args.kind;

    if !ptvs.directory.is_dir() {
        return Err(AppError::InvalidArgument(format!(
            "'{}' is not a directory",
            ptvs.directory.display()
        ))
        .into());
    }

    let mut overrides: IndexMap<String, String> = ptvs.overrides.into_iter().collect();
    if let Some(name) = ptvs.name {
        overrides.insert("name".to_string(), name);
    }
    log::debug!("Template overrides: {:?}", overrides);

    let registry = registry_for(&ptvs.generate)?;
    let registry = registry.as_ref().map(|r| r as &dyn InterpreterRegistry);
    let suite = Suite::from_directory(kind, &ptvs.directory, &overrides, registry)
        .with_context(|| format!("Failed to configure {}", ptvs.directory.display()))?;
    suite
        .generate(!ptvs.generate.sequential, registry)
        .context("Failed to generate")?;

    if !quiet {
        output::print_suite_summary(&suite.root.display().to_string(), &suite);
    }
    Ok(())
}
