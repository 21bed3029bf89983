use crate::error::{AppError, Result};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "../data/templates/"]
struct SuiteTemplates;

const TEMPLATE_EXTENSION: &str = ".toml";

/// The embedded suite configuration auto mode starts from for `kind`.
pub fn suite_template(kind: &str) -> Result<String> {
    let file_path = format!("{}{}", kind, TEMPLATE_EXTENSION);
    log::trace!("Loading embedded suite template: {}", file_path);
    let asset = SuiteTemplates::get(&file_path).ok_or_else(|| {
        AppError::InvalidArgument(format!(
            "Cannot resolve \"{}\" to a recognised suite type. Available: {}",
            kind,
            available_suite_kinds().join(", ")
        ))
    })?;
    let content = std::str::from_utf8(asset.data.as_ref()).map_err(|e| {
        AppError::DataLoading(format!("UTF-8 error in embedded template {}: {}", file_path, e))
    })?;
    Ok(content.to_string())
}

/// Suite kinds with an embedded template, sorted.
pub fn available_suite_kinds() -> Vec<String> {
    let mut kinds: Vec<String> = SuiteTemplates::iter()
        .filter_map(|name| {
            name.strip_suffix(TEMPLATE_EXTENSION)
                .map(str::to_string)
        })
        .collect();
    kinds.sort();
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, TomlConfig};

    #[test]
    fn ptvs_template_is_embedded() {
        assert!(available_suite_kinds().contains(&"ptvs".to_string()));
        let config = TomlConfig::parse(&suite_template("ptvs").unwrap(), None).unwrap();
        assert!(config.has_section("vsgen"));
        assert_eq!(config.get("vsgen.project", "type").as_deref(), Some("ptvs"));
    }

    #[test]
    fn unknown_kind_is_an_invalid_argument() {
        let err = suite_template("cmake").unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }
}
