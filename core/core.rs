pub mod classify;
pub mod config;
pub mod error;
pub mod filter;
pub mod folders;
pub mod interpreter;
pub mod paths;
pub mod project;
pub mod ptvs;
pub mod register;
pub mod registry;
pub mod solution;
pub mod suite;
pub mod templates;
pub mod version;
pub mod writer;

pub use classify::{Classification, TreeClassifier, classify};
pub use config::{ConfigSource, TomlConfig};
pub use error::{AppError, Result};
pub use filter::{FilterOverrides, FilterRules, MatchMode, PathFilter};
pub use folders::synthesize_folders;
pub use interpreter::{Interpreter, InterpreterCache, InterpreterConfig, InterpreterState};
pub use project::{BuildContext, PROJECT_KINDS, Project, ProjectConfig, SuiteProject};
pub use ptvs::PtvsProject;
pub use register::{Registerable, register_all};
pub use registry::{FileRegistry, InterpreterRegistry, MemoryRegistry, RegistryRecord};
pub use solution::{Solution, SolutionConfig};
pub use suite::Suite;
pub use templates::{available_suite_kinds, suite_template};
pub use version::VsVersion;
pub use writer::{Writable, write_all};
