//! Configuration system for the transcription scorer

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub scoring: ScoringConfig,
    pub families: FamilyConfig,
    pub output: OutputConfig,
    pub similarity: SimilarityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            scoring: ScoringConfig::default(),
            families: FamilyConfig::default(),
            output: OutputConfig::default(),
            similarity: SimilarityConfig::default(),
        }
    }
}

/// Note matching tolerances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Maximum onset deviation in seconds
    pub onset_tolerance: f64,
    /// Maximum pitch deviation in semitones
    pub pitch_tolerance: f64,
    /// Offset window as a fraction of the reference note duration
    pub offset_ratio: f64,
    /// Only match notes whose instrument families agree
    pub require_family_match: bool,
    /// Also score every instrument family on its own
    pub family_breakdown: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            onset_tolerance: 0.05,
            pitch_tolerance: 0.5,
            offset_ratio: 0.2,
            require_family_match: false,
            family_breakdown: true,
        }
    }
}

/// Instrument family table source
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FamilyConfig {
    /// JSON family table; the built-in General MIDI table is used when unset
    pub table_path: Option<PathBuf>,
}

/// Text output formatting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Decimal places for note times in extraction dumps
    pub time_decimals: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { time_decimals: 4 }
    }
}

/// Instrument similarity output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Default destination of the similarity matrix
    pub output_path: PathBuf,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("instrument_similarity.json"),
        }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let scoring = &config.scoring;
    if !scoring.onset_tolerance.is_finite() || scoring.onset_tolerance < 0.0 {
        anyhow::bail!("onset_tolerance must be a non-negative number");
    }
    if !scoring.pitch_tolerance.is_finite() || scoring.pitch_tolerance < 0.0 {
        anyhow::bail!("pitch_tolerance must be a non-negative number");
    }
    if !scoring.offset_ratio.is_finite() || scoring.offset_ratio < 0.0 {
        anyhow::bail!("offset_ratio must be a non-negative number");
    }
    if config.output.time_decimals > 9 {
        anyhow::bail!("time_decimals must be at most 9");
    }
    if config.similarity.output_path.as_os_str().is_empty() {
        anyhow::bail!("similarity output_path must not be empty");
    }
    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert!((config.scoring.onset_tolerance - 0.05).abs() < 1e-12);
        assert!((config.scoring.pitch_tolerance - 0.5).abs() < 1e-12);
        assert!(!config.scoring.require_family_match);
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let mut config = Config::default();
        config.scoring.onset_tolerance = -0.01;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"scoring": {"require_family_match": true}}"#).unwrap();
        assert!(config.scoring.require_family_match);
        assert!((config.scoring.offset_ratio - 0.2).abs() < 1e-12);
        assert_eq!(config.output.time_decimals, 4);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.scoring.pitch_tolerance = 1.0;
        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert!((loaded.scoring.pitch_tolerance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_similarity_section_holds_only_output_path() {
        let config: Config = serde_json::from_str(
            r#"{"similarity": {"output_path": "matrix.json", "default_sample_rate": 22050}}"#,
        )
        .unwrap();
        assert_eq!(config.similarity.output_path, PathBuf::from("matrix.json"));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["similarity"].as_object().unwrap().len(), 1);

        let mut config = Config::default();
        config.similarity.output_path = PathBuf::new();
        assert!(validate_config(&config).is_err());
    }
}
