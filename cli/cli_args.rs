use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateOpts {
    #[arg(
        long,
        help = "Write files one after another instead of in parallel.",
        help_heading = "Generation"
    )]
    pub sequential: bool,

    #[arg(
        long,
        help = "Do not register interpreters, and do not reconcile them against the registry.",
        help_heading = "Generation"
    )]
    pub no_register: bool,

    #[arg(
        long,
        help = "Interpreter registry directory (default: <user data dir>/vsgen/registry).",
        value_name = "PATH",
        help_heading = "Generation"
    )]
    pub registry_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Generate Visual Studio solutions and PTVS projects from configuration.",
    long_about = "vsgen reads suite configuration files, classifies each project's source tree \ninto compile and content groups, writes .sln and .pyproj files and registers \nthe Python interpreters the projects use.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  vsgen generate vsgen.toml\n  vsgen auto ptvs ./mytool --set visual_studio_version=12.0\n  vsgen debug vsgen.toml -f json\n  vsgen registry init 14.0",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase message verbosity (-v, -vv).")]
    pub verbose: u8,

    #[arg(
        short,
        long,
        global = true,
        help = "Silence informational messages and warnings."
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(
        visible_alias = "g",
        visible_alias = "gen",
        about = "Generate solutions and projects from one or more configuration files."
    )]
    Generate(GenerateArgs),

    #[command(
        visible_alias = "a",
        about = "Generate a solution and project for a single directory from a built-in template."
    )]
    Auto(AutoArgs),

    #[command(
        visible_alias = "d",
        about = "Show what a configuration would generate without writing anything."
    )]
    Debug(DebugArgs),

    #[command(about = "Inspect or prepare the interpreter registry.")]
    Registry(RegistryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(
        required = true,
        value_name = "CONFIG",
        help = "Configuration files containing [vsgen] sections."
    )]
    pub configs: Vec<PathBuf>,

    #[command(flatten)]
    pub generate: GenerateOpts,
}

#[derive(Args, Debug, Clone)]
pub struct AutoArgs {
    #[command(subcommand)]
    pub kind: AutoKind,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AutoKind {
    #[command(about = "A PTVS (.pyproj) project and its solution.")]
    Ptvs(AutoPtvsArgs),
}

impl AutoKind {
    pub fn name(&self) -> &'static str {
        match self {
            AutoKind::Ptvs(_) => "ptvs",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AutoPtvsArgs {
    #[arg(
        value_name = "DIR",
        default_value = ".",
        help = "Directory to generate for."
    )]
    pub directory: PathBuf,

    #[arg(
        long,
        value_name = "NAME",
        help = "Name of the solution and project (default: directory name)."
    )]
    pub name: Option<String>,

    #[arg(
        long = "set",
        value_name = "KEY=VALUE",
        value_parser = parse_key_val,
        action = clap::ArgAction::Append,
        help = "Replace a template option, e.g. --set compile_in_filter=*.py,*.pyx (repeatable)."
    )]
    pub overrides: Vec<(String, String)>,

    #[command(flatten)]
    pub generate: GenerateOpts,
}

#[derive(Args, Debug, Clone)]
pub struct DebugArgs {
    #[arg(value_name = "CONFIG", help = "Configuration file to inspect.")]
    pub config: PathBuf,

    #[arg(short = 'f', long, help = "Set the output format.", value_name = "FORMAT", value_parser = ["json", "text"], help_heading = "Output Formatting")]
    pub format: Option<String>,

    #[arg(
        long,
        help = "Resolve interpreters against the registry in this directory.",
        value_name = "PATH"
    )]
    pub registry_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RegistryArgs {
    #[command(subcommand)]
    pub action: RegistryAction,

    #[arg(
        long,
        global = true,
        help = "Interpreter registry directory (default: <user data dir>/vsgen/registry).",
        value_name = "PATH"
    )]
    pub registry_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RegistryAction {
    #[command(about = "Create the registry namespace for a Visual Studio version.")]
    Init {
        #[arg(value_name = "VERSION", help = "Visual Studio version, e.g. 14.0.")]
        version: String,
    },

    #[command(about = "List the interpreters registered for a Visual Studio version.")]
    List {
        #[arg(value_name = "VERSION", help = "Visual Studio version, e.g. 14.0.")]
        version: String,

        #[arg(short = 'f', long, help = "Set the output format.", value_name = "FORMAT", value_parser = ["json", "text"])]
        format: Option<String>,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.find('=')
        .map(|idx| {
            let key = s[..idx].trim().to_string();
            let value = s[idx + 1..].trim().to_string();
            if key.is_empty() {
                Err("Option name cannot be empty".to_string())
            } else {
                Ok((key, value))
            }
        })
        .ok_or_else(|| "Invalid KEY=VALUE format for --set".to_string())?
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_auto_overrides() {
        let cli = Cli::parse_from([
            "vsgen",
            "auto",
            "ptvs",
            "tool",
            "--set",
            "visual_studio_version=12.0",
            "--sequential",
        ]);
        let Some(Commands::Auto(args)) = cli.command else {
            panic!("expected auto command");
        };
        let AutoKind::Ptvs(ptvs) = args.kind;
        assert_eq!(ptvs.directory, PathBuf::from("tool"));
        assert_eq!(
            ptvs.overrides,
            vec![("visual_studio_version".to_string(), "12.0".to_string())]
        );
        assert!(ptvs.generate.sequential);
    }

    #[test]
    fn rejects_malformed_overrides() {
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
        assert_eq!(
            parse_key_val(" a = b ").unwrap(),
            ("a".to_string(), "b".to_string())
        );
    }
}
