//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use image_export_bridge::{Extent, Pattern, SourceConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub sessions: Vec<SessionConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub consumer: Option<ConsumerConfig>,
}

/// One exported image and how often it is pulled
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub name: String,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    /// Region requested before every pull (default: whole extent)
    pub update_extent: Option<Extent>,
    /// Mark the source modified between rounds so every round pulls
    #[serde(default = "default_true")]
    pub modify_between_rounds: bool,
}

fn default_rounds() -> usize {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub output_dir: Option<PathBuf>,
    /// Write a JSON sidecar next to every raw buffer
    #[serde(default = "default_true")]
    pub sidecar: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            sidecar: default_true(),
        }
    }
}

/// A foreign consumer in a shared library
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    pub library: PathBuf,
    #[serde(default = "default_symbol")]
    pub symbol: String,
}

fn default_symbol() -> String {
    "consume_image".to_string()
}

impl AppConfig {
    /// Check everything that can be checked before a bridge is created
    pub fn validate(&self) -> Result<()> {
        if self.sessions.is_empty() {
            bail!("No sessions configured");
        }

        let mut names = HashSet::new();
        for session in &self.sessions {
            if !names.insert(session.name.as_str()) {
                bail!("Duplicate session name '{}'", session.name);
            }
            if session.rounds == 0 {
                bail!("Session '{}' must run at least one round", session.name);
            }
            session
                .source
                .validate()
                .with_context(|| format!("Invalid source for session '{}'", session.name))?;
            if let Some(extent) = &session.update_extent {
                if extent.is_empty() || !session.source.whole_extent.contains(extent) {
                    bail!(
                        "Session '{}': update extent {} is outside whole extent {}",
                        session.name,
                        extent,
                        session.source.whole_extent
                    );
                }
            }
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

/// Parse a pattern given on the command line: `constant:VALUE`, `ramp[:SCALE]`
/// or `checkerboard[:SQUARE]`
pub fn parse_pattern(s: &str) -> std::result::Result<Pattern, String> {
    let (kind, arg) = match s.split_once(':') {
        Some((kind, arg)) => (kind, Some(arg)),
        None => (s, None),
    };

    match (kind.trim().to_lowercase().as_str(), arg) {
        ("constant", Some(value)) => value
            .trim()
            .parse()
            .map(|value| Pattern::Constant { value })
            .map_err(|e| format!("invalid constant value '{}': {}", value, e)),
        ("constant", None) => Err("constant pattern needs a value, e.g. constant:7".to_string()),
        ("ramp", None) => Ok(Pattern::Ramp { scale: 1.0 }),
        ("ramp", Some(scale)) => scale
            .trim()
            .parse()
            .map(|scale| Pattern::Ramp { scale })
            .map_err(|e| format!("invalid ramp scale '{}': {}", scale, e)),
        ("checkerboard", square) => {
            let square = match square {
                Some(square) => square
                    .trim()
                    .parse()
                    .map_err(|e| format!("invalid checker square '{}': {}", square, e))?,
                None => 8,
            };
            Ok(Pattern::Checkerboard {
                square,
                low: 0.0,
                high: 255.0,
            })
        }
        (other, _) => Err(format!(
            "unknown pattern '{}' (expected constant, ramp or checkerboard)",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_export_bridge::ScalarType;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [[sessions]]
            name = "ct"
            rounds = 3
            update_extent = [0, 15, 0, 15, 0, 0]

            [sessions.source]
            scalar_type = "short"
            whole_extent = [0, 31, 0, 31, 0, 3]
            pattern = { kind = "checkerboard", square = 4 }

            [[sessions]]
            name = "rgb"

            [sessions.source]
            scalar_type = "unsigned_char"
            components = 3

            [output]
            output_dir = "out"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.sessions.len(), 2);
        assert_eq!(config.sessions[0].rounds, 3);
        assert_eq!(config.sessions[0].source.scalar_type, ScalarType::Short);
        assert_eq!(
            config.sessions[0].update_extent,
            Some(Extent::new([0, 15, 0, 15, 0, 0]))
        );
        assert_eq!(config.sessions[1].rounds, 1);
        assert_eq!(config.sessions[1].source.components, 3);
        assert!(config.sessions[1].modify_between_rounds);
        assert_eq!(config.output.output_dir, Some(PathBuf::from("out")));
        assert!(config.consumer.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_sidecar_defaults_on_with_or_without_output_section() {
        let without: AppConfig = toml::from_str("[[sessions]]\nname = \"a\"\n").unwrap();
        assert!(without.output.sidecar);

        let with: AppConfig =
            toml::from_str("[[sessions]]\nname = \"a\"\n\n[output]\noutput_dir = \"out\"\n").unwrap();
        assert!(with.output.sidecar);
        assert!(OutputConfig::default().sidecar);
    }

    #[test]
    fn test_consumer_section() {
        let toml_content = r#"
            [[sessions]]
            name = "a"

            [consumer]
            library = "libviewer.so"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        let consumer = config.consumer.unwrap();
        assert_eq!(consumer.library, PathBuf::from("libviewer.so"));
        assert_eq!(consumer.symbol, "consume_image");
    }

    #[test]
    fn test_validation_rejects_bad_sessions() {
        let mut config: AppConfig = toml::from_str(
            r#"
            [[sessions]]
            name = "a"
            [[sessions]]
            name = "a"
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        config.sessions.pop();
        config.sessions[0].update_extent = Some(Extent::new([0, 100, 0, 0, 0, 0]));
        assert!(config.validate().is_err());

        config.sessions[0].update_extent = None;
        config.sessions[0].rounds = 0;
        assert!(config.validate().is_err());

        config.sessions[0].rounds = 2;
        config.validate().unwrap();
    }

    #[test]
    fn test_load_config_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.toml");
        fs::write(&path, "sessions = 5").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.toml"));
        assert!(load_config(&tmp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(parse_pattern("ramp"), Ok(Pattern::Ramp { scale: 1.0 }));
        assert_eq!(parse_pattern("ramp:2.5"), Ok(Pattern::Ramp { scale: 2.5 }));
        assert_eq!(parse_pattern("constant:7"), Ok(Pattern::Constant { value: 7.0 }));
        assert_eq!(
            parse_pattern("Checkerboard:4"),
            Ok(Pattern::Checkerboard {
                square: 4,
                low: 0.0,
                high: 255.0
            })
        );
        assert!(parse_pattern("constant").is_err());
        assert!(parse_pattern("noise").is_err());
        assert!(parse_pattern("ramp:x").is_err());
    }
}
