use crate::error::{AppError, Result};
use crate::paths;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAIN_SECTION: &str = "vsgen";
pub const SOLUTION_SECTION_MARKER: &str = "vsgen.solution";
const MAX_INTERPOLATION_DEPTH: usize = 10;

/// Sectioned key/value configuration, read through string accessors.
///
/// Implementors provide `sections` and `get`; every typed accessor is derived from those.
pub trait ConfigSource {
    fn sections(&self) -> Vec<String>;

    fn get(&self, section: &str, option: &str) -> Option<String>;

    /// Directory relative paths are resolved against.
    fn base_dir(&self) -> Option<&Path> {
        None
    }

    fn has_section(&self, section: &str) -> bool {
        self.sections().iter().any(|s| s == section)
    }

    fn require_section(&self, section: &str) -> Result<()> {
        if self.has_section(section) {
            Ok(())
        } else {
            Err(AppError::Config(format!(
                "Section [{}] not found in [{}]",
                section,
                self.sections().join(", ")
            )))
        }
    }

    fn get_or(&self, section: &str, option: &str, fallback: &str) -> String {
        self.get(section, option)
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Comma separated list, items trimmed. An empty value is an empty list.
    fn get_list(&self, section: &str, option: &str) -> Option<Vec<String>> {
        self.get(section, option).map(|value| split_list(&value))
    }

    fn resolve_path(&self, raw: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(raw.trim()).as_ref());
        let joined = match self.base_dir() {
            Some(base) if expanded.is_relative() => base.join(expanded),
            _ => expanded,
        };
        paths::normalize(&joined)
    }

    fn get_path(&self, section: &str, option: &str) -> Option<PathBuf> {
        let raw = self.get(section, option)?;
        if raw.trim().is_empty() {
            return None;
        }
        Some(self.resolve_path(&raw))
    }

    fn get_paths(&self, section: &str, option: &str) -> Vec<PathBuf> {
        self.get_list(section, option)
            .unwrap_or_default()
            .iter()
            .filter(|item| !item.is_empty())
            .map(|item| self.resolve_path(item))
            .collect()
    }

    /// A file path; with `validate`, a path that is not an existing file counts as absent.
    fn get_file(&self, section: &str, option: &str, validate: bool) -> Option<PathBuf> {
        self.get_path(section, option)
            .filter(|path| !validate || path.is_file())
    }

    /// A directory path; with `validate`, a path that is not an existing directory counts as absent.
    fn get_dir(&self, section: &str, option: &str, validate: bool) -> Option<PathBuf> {
        self.get_path(section, option)
            .filter(|path| !validate || path.is_dir())
    }

    /// Every list item is a glob; existing directories among the matches are returned.
    fn get_dirs(&self, section: &str, option: &str) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for pattern in self.get_list(section, option).unwrap_or_default() {
            if pattern.is_empty() {
                continue;
            }
            let resolved = self.resolve_path(&pattern);
            for entry in glob::glob(&resolved.to_string_lossy())? {
                match entry {
                    Ok(path) if path.is_dir() => dirs.push(path),
                    Ok(path) => log::trace!("Ignoring non-directory match: {}", path.display()),
                    Err(e) => log::warn!("Unreadable match for '{}': {}", pattern, e),
                }
            }
        }
        Ok(dirs)
    }

    fn get_bool(&self, section: &str, option: &str) -> Result<Option<bool>> {
        match self.get(section, option) {
            None => Ok(None),
            Some(value) => match value.trim().to_lowercase().as_str() {
                "1" | "yes" | "true" | "on" => Ok(Some(true)),
                "0" | "no" | "false" | "off" => Ok(Some(false)),
                other => Err(AppError::Config(format!(
                    "Option \"{}\" in section [{}] is not a boolean: '{}'",
                    option, section, other
                ))),
            },
        }
    }

    fn get_float(&self, section: &str, option: &str) -> Result<Option<f64>> {
        match self.get(section, option) {
            None => Ok(None),
            Some(value) => value.trim().parse::<f64>().map(Some).map_err(|e| {
                AppError::Config(format!(
                    "Option \"{}\" in section [{}] is not a number: '{}' ({})",
                    option, section, value, e
                ))
            }),
        }
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    value.split(',').map(|item| item.trim().to_string()).collect()
}

#[derive(Debug, Clone, PartialEq)]
enum ConfigValue {
    Scalar(String),
    List(Vec<String>),
}

impl ConfigValue {
    fn joined(&self) -> String {
        match self {
            ConfigValue::Scalar(value) => value.clone(),
            ConfigValue::List(items) => items.join(", "),
        }
    }
}

/// A [`ConfigSource`] read from TOML. Tables are sections; nested tables become dotted
/// section names. Values may reference `${option}` or `${section:option}`.
#[derive(Debug, Clone, Default)]
pub struct TomlConfig {
    sections: IndexMap<String, IndexMap<String, ConfigValue>>,
    base_dir: Option<PathBuf>,
}

impl TomlConfig {
    pub fn parse(content: &str, base_dir: Option<&Path>) -> Result<Self> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| AppError::TomlParse(e.to_string()))?;
        let mut config = TomlConfig {
            sections: IndexMap::new(),
            base_dir: base_dir.map(Path::to_path_buf),
        };
        for (name, value) in &table {
            match value {
                toml::Value::Table(section) => config.add_table(name, section),
                _ => log::warn!("Ignoring option '{}' declared outside any section", name),
            }
        }
        log::debug!("Parsed configuration sections: {:?}", config.sections());
        Ok(config)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        log::info!("Loading configuration from: {}", config_path.display());
        let content = fs::read_to_string(config_path).map_err(|e| AppError::FileRead {
            path: config_path.to_path_buf(),
            source: e,
        })?;
        let base_dir = paths::absolutize(config_path.parent().unwrap_or(Path::new(".")));
        Self::parse(&content, Some(&base_dir)).map_err(|e| match e {
            AppError::TomlParse(msg) => AppError::TomlParse(format!(
                "Error parsing config file '{}': {}",
                config_path.display(),
                msg
            )),
            other => other,
        })
    }

    fn add_table(&mut self, name: &str, table: &toml::Table) {
        let mut options = IndexMap::new();
        let mut nested = Vec::new();
        for (key, value) in table {
            match value {
                toml::Value::Table(child) => nested.push((format!("{}.{}", name, key), child)),
                toml::Value::Array(items) => {
                    options.insert(
                        key.clone(),
                        ConfigValue::List(items.iter().map(scalar_text).collect()),
                    );
                }
                other => {
                    options.insert(key.clone(), ConfigValue::Scalar(scalar_text(other)));
                }
            }
        }
        // Implicit parents of dotted headers carry no options of their own.
        if !options.is_empty() || nested.is_empty() {
            self.sections
                .entry(name.to_string())
                .or_default()
                .extend(options);
        }
        for (child_name, child) in nested {
            self.add_table(&child_name, child);
        }
    }

    pub fn set(&mut self, section: &str, option: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(option.to_string(), ConfigValue::Scalar(value.into()));
    }

    /// Replaces every declared occurrence of each override's option, in every section.
    /// Returns the number of values replaced.
    pub fn apply_overrides(&mut self, overrides: &IndexMap<String, String>) -> usize {
        let mut applied = 0;
        for (option, value) in overrides {
            let mut used = false;
            for options in self.sections.values_mut() {
                if let Some(slot) = options.get_mut(option) {
                    *slot = ConfigValue::Scalar(value.clone());
                    applied += 1;
                    used = true;
                }
            }
            if !used {
                log::warn!("Override '{}' matches no option in the configuration", option);
            }
        }
        applied
    }

    fn raw(&self, section: &str, option: &str) -> Option<&ConfigValue> {
        self.sections.get(section)?.get(option)
    }

    fn interpolate(&self, section: &str, text: &str, depth: usize) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let reference = &after[..end];
            let (ref_section, ref_option) = reference.split_once(':').unwrap_or((section, reference));
            match self.raw(ref_section, ref_option) {
                Some(value) if depth < MAX_INTERPOLATION_DEPTH => {
                    out.push_str(&self.interpolate(ref_section, &value.joined(), depth + 1));
                }
                _ => {
                    log::warn!(
                        "Unresolved reference '${{{}}}' in section [{}]",
                        reference,
                        section
                    );
                    out.push_str(&rest[start..start + end + 3]);
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

impl ConfigSource for TomlConfig {
    fn sections(&self) -> Vec<String> {
        self.sections.keys().cloned().collect()
    }

    fn get(&self, section: &str, option: &str) -> Option<String> {
        self.raw(section, option)
            .map(|value| self.interpolate(section, &value.joined(), 0))
    }

    fn get_list(&self, section: &str, option: &str) -> Option<Vec<String>> {
        match self.raw(section, option)? {
            ConfigValue::List(items) => Some(
                items
                    .iter()
                    .map(|item| self.interpolate(section, item, 0).trim().to_string())
                    .collect(),
            ),
            ConfigValue::Scalar(value) => Some(split_list(&self.interpolate(section, value, 0))),
        }
    }

    fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }
}

fn scalar_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(text) => text.clone(),
        toml::Value::Float(number) if number.fract() == 0.0 => format!("{:.1}", number),
        other => other.to_string(),
    }
}
