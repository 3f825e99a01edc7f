use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "alumni.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub spatial: SpatialConfig,
    pub attributes: AttributeTables,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub record_count: usize,
    pub target_fraction: f64,
    pub target_zips: Vec<String>,
    pub seed: Option<u64>,
    pub reference_date: Option<NaiveDate>,
    pub email_domain: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            record_count: 10_000,
            target_fraction: 0.70,
            target_zips: ["29680", "29650", "29607", "29681"]
                .iter()
                .map(|zip| zip.to_string())
                .collect(),
            seed: None,
            reference_date: None,
            email_domain: "alumni.example.edu".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridKind {
    #[default]
    Hex,
    Approximate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    pub grid: GridKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedChoice {
    pub value: String,
    pub weight: u32,
}

fn weighted(entries: &[(&str, u32)]) -> Vec<WeightedChoice> {
    entries
        .iter()
        .map(|(value, weight)| WeightedChoice {
            value: value.to_string(),
            weight: *weight,
        })
        .collect()
}

/// Weighted lookup tables handed to the attribute synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeTables {
    pub first_names: Vec<WeightedChoice>,
    pub last_names: Vec<WeightedChoice>,
    pub majors: Vec<WeightedChoice>,
    pub degrees: Vec<WeightedChoice>,
}

impl Default for AttributeTables {
    fn default() -> Self {
        Self {
            first_names: weighted(&[
                ("James", 4),
                ("Mary", 4),
                ("John", 3),
                ("Patricia", 3),
                ("Robert", 3),
                ("Jennifer", 3),
                ("Michael", 3),
                ("Linda", 2),
                ("William", 2),
                ("Elizabeth", 2),
                ("David", 2),
                ("Sarah", 2),
                ("Christopher", 2),
                ("Jessica", 2),
                ("Ashley", 1),
                ("Tyler", 1),
            ]),
            last_names: weighted(&[
                ("Smith", 4),
                ("Johnson", 4),
                ("Williams", 3),
                ("Brown", 3),
                ("Jones", 3),
                ("Davis", 2),
                ("Miller", 2),
                ("Wilson", 2),
                ("Moore", 2),
                ("Taylor", 2),
                ("Anderson", 2),
                ("Thomas", 2),
                ("Jackson", 1),
                ("White", 1),
                ("Harris", 1),
                ("Martin", 1),
            ]),
            majors: weighted(&[
                ("Business Administration", 5),
                ("Engineering", 4),
                ("Computer Science", 4),
                ("Biology", 3),
                ("Psychology", 3),
                ("Nursing", 3),
                ("Education", 2),
                ("Economics", 2),
                ("Political Science", 2),
                ("English", 2),
                ("History", 1),
                ("Mathematics", 1),
            ]),
            degrees: weighted(&[
                ("Bachelor of Arts", 35),
                ("Bachelor of Science", 40),
                ("Master of Science", 12),
                ("Master of Business Administration", 8),
                ("Doctor of Philosophy", 5),
            ]),
        }
    }
}

/// CLI flags that override file and environment values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub record_count: Option<usize>,
    pub target_fraction: Option<f64>,
    pub seed: Option<u64>,
    pub reference_date: Option<NaiveDate>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>, cli: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match Self::resolve_path(path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.apply_cli_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&contents, &path.display().to_string())
    }

    /// Parse config text; `origin` names the source in parse errors.
    pub fn from_toml(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var("ALUMNI_SEED") {
            let seed = raw
                .parse()
                .map_err(|_| ConfigError::validation("ALUMNI_SEED", "must be an unsigned integer"))?;
            self.generation.seed = Some(seed);
        }
        if let Ok(raw) = std::env::var("ALUMNI_RECORD_COUNT") {
            let count = raw.parse().map_err(|_| {
                ConfigError::validation("ALUMNI_RECORD_COUNT", "must be an unsigned integer")
            })?;
            self.generation.record_count = count;
        }
        Ok(())
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(count) = cli.record_count {
            self.generation.record_count = count;
        }
        if let Some(fraction) = cli.target_fraction {
            self.generation.target_fraction = fraction;
        }
        if cli.seed.is_some() {
            self.generation.seed = cli.seed;
        }
        if cli.reference_date.is_some() {
            self.generation.reference_date = cli.reference_date;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if generation.record_count == 0 {
            return Err(ConfigError::validation(
                "generation.record_count",
                "must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&generation.target_fraction) {
            return Err(ConfigError::validation(
                "generation.target_fraction",
                "must be between 0.0 and 1.0",
            ));
        }
        if generation.email_domain.trim().is_empty() {
            return Err(ConfigError::validation(
                "generation.email_domain",
                "must not be empty",
            ));
        }

        let tables = [
            ("attributes.first_names", &self.attributes.first_names),
            ("attributes.last_names", &self.attributes.last_names),
            ("attributes.majors", &self.attributes.majors),
            ("attributes.degrees", &self.attributes.degrees),
        ];
        for (field, table) in tables {
            if table.iter().all(|choice| choice.weight == 0) {
                return Err(ConfigError::validation(
                    field,
                    "needs at least one entry with a positive weight",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generation.record_count, 10_000);
        assert_eq!(config.generation.target_fraction, 0.70);
        assert_eq!(config.spatial.grid, GridKind::Hex);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [generation]
            record_count = 500
            seed = 7
            reference_date = "2024-06-30"

            [spatial]
            grid = "approximate"
            "#,
            "alumni.toml",
        )
        .unwrap();

        assert_eq!(config.generation.record_count, 500);
        assert_eq!(config.generation.seed, Some(7));
        assert_eq!(
            config.generation.reference_date,
            NaiveDate::from_ymd_opt(2024, 6, 30)
        );
        assert_eq!(config.generation.target_fraction, 0.70);
        assert_eq!(config.spatial.grid, GridKind::Approximate);
        assert_eq!(config.attributes, AttributeTables::default());
    }

    #[test]
    fn attribute_tables_can_be_replaced() {
        let config = AppConfig::from_toml(
            r#"
            [attributes]
            majors = [{ value = "Forestry", weight = 1 }]
            "#,
            "alumni.toml",
        )
        .unwrap();

        assert_eq!(config.attributes.majors.len(), 1);
        assert_eq!(config.attributes.majors[0].value, "Forestry");
        assert!(!config.attributes.first_names.is_empty());
    }

    #[test]
    fn rejects_fraction_out_of_range() {
        let mut config = AppConfig::default();
        config.generation.target_fraction = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { field, .. }) if field == "generation.target_fraction"
        ));
    }

    #[test]
    fn rejects_zero_weight_table() {
        let mut config = AppConfig::default();
        config.attributes.degrees = vec![WeightedChoice {
            value: "Bachelor of Arts".to_string(),
            weight: 0,
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn cli_overrides_win() {
        let mut config = AppConfig::default();
        config.apply_cli_overrides(&CliOverrides {
            record_count: Some(25),
            target_fraction: Some(0.5),
            seed: Some(99),
            reference_date: None,
        });
        assert_eq!(config.generation.record_count, 25);
        assert_eq!(config.generation.target_fraction, 0.5);
        assert_eq!(config.generation.seed, Some(99));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            AppConfig::from_toml("[generation\nrecord_count = 1", "alumni.toml"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn file_parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[spatial]\ngrid = \"octagon\"\n").unwrap();

        match AppConfig::from_file(&path) {
            Err(ConfigError::Parse { path: origin, .. }) => {
                assert_eq!(origin, path.display().to_string())
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
