use crate::cli_args::GenerateArgs;
use crate::output;
use crate::registry_for;
use anyhow::{Context, Result};
use vsgen_core::{InterpreterRegistry, Suite};

/// Loads every configuration before generating any of them, so one bad file aborts the run
/// without partial output.
pub fn handle_generate_command(args: GenerateArgs, quiet: bool) -> Result<()> {
    let registry = registry_for(&args.generate)?;
    let registry = registry.as_ref().map(|r| r as &dyn InterpreterRegistry);

    let suites = args
        .configs
        .iter()
        .map(|path| {
            Suite::from_file(path, registry)
                .with_context(|| format!("Failed to load configuration {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    log::info!("Loaded {} configuration(s)", suites.len());

    for (path, suite) in args.configs.iter().zip(&suites) {
        suite
            .generate(!args.generate.sequential, registry)
            .with_context(|| format!("Failed to generate {}", path.display()))?;
        if !quiet {
            output::print_suite_summary(&path.display().to_string(), suite);
        }
    }
    Ok(())
}
