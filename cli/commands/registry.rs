use crate::cli_args::{RegistryAction, RegistryArgs};
use crate::open_registry;
use crate::output;
use anyhow::{Context, Result};
use colored::*;
use vsgen_core::registry::registry_key;
use vsgen_core::{AppError, VsVersion};

pub fn handle_registry_command(args: RegistryArgs, quiet: bool) -> Result<()> {
    let registry = open_registry(args.registry_dir.as_deref())?;
    match args.action {
        RegistryAction::Init { version } => {
            let version = parse_version(&version)?;
            let dir = registry
                .install(version)
                .context("Failed to install registry namespace")?;
            if !quiet {
                println!(
                    "{} {} ready at {}",
                    "✅".green(),
                    registry_key(version).cyan(),
                    dir.display().to_string().blue()
                );
            }
        }
        RegistryAction::List { version, format } => {
            let version = parse_version(&version)?;
            let records = registry
                .records(version)
                .with_context(|| format!("Failed to read {}", registry_key(version)))?;
            match format.as_deref() {
                Some("json") => output::print_json(&records)?,
                _ => {
                    output::print_heading(&registry_key(version));
                    output::print_registry_records(&records);
                }
            }
        }
    }
    Ok(())
}

fn parse_version(text: &str) -> Result<VsVersion> {
    text.parse::<VsVersion>()
        .map_err(|e| AppError::InvalidArgument(e.to_string()).into())
}
