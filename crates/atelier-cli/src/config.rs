//! Effective configuration: TOML file, then command-line overrides

use anyhow::{Context, Result};
use atelier_autosave::AutosaveConfig;
use std::path::Path;
use std::time::Duration;

/// Overrides taken from the command line
#[derive(Debug, Default, Clone)]
pub(crate) struct Overrides {
    pub(crate) debounce_ms: Option<u64>,
    pub(crate) updated_by: Option<String>,
}

/// Load `path` if given, apply overrides and validate
pub(crate) fn load(path: Option<&Path>, overrides: &Overrides) -> Result<AutosaveConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            parse(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => AutosaveConfig::default(),
    };

    if let Some(ms) = overrides.debounce_ms {
        config = config.with_debounce(Duration::from_millis(ms));
    }
    if let Some(user) = &overrides.updated_by {
        config = config.with_updated_by(user.clone());
    }

    config.validate()?;
    Ok(config)
}

pub(crate) fn parse(raw: &str) -> Result<AutosaveConfig> {
    Ok(toml::from_str(raw)?)
}

pub(crate) fn render(config: &AutosaveConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse("debounce_ms = 300\nupdated_by = \"iris\"\n").unwrap();
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.long_text_debounce_ms, 2000);
        assert_eq!(config.updated_by.as_deref(), Some("iris"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let overrides = Overrides {
            debounce_ms: Some(250),
            updated_by: Some("owner".to_string()),
        };
        let config = load(None, &overrides).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.updated_by.as_deref(), Some("owner"));
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let overrides = Overrides {
            debounce_ms: Some(0),
            ..Overrides::default()
        };
        let err = load(None, &overrides).unwrap_err();
        assert!(err.to_string().contains("debounce_ms"));
    }

    #[test]
    fn rendered_config_parses_back() {
        let config = AutosaveConfig::new().with_updated_by("iris");
        let rendered = render(&config).unwrap();
        assert_eq!(parse(&rendered).unwrap(), config);
    }
}
