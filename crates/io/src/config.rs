use std::fmt;
use std::path::{Path, PathBuf};

use imputer_core::DEFAULT_AGE_MAX;
use imputer_engine::{DEFAULT_REL_TOL, DEFAULT_SIZE_FROM};
use serde::Deserialize;

use crate::error::{IoError, Result};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// One impute run: which way to go, how groups are formed, and which record
/// keys play which role.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub direction: Direction,
    pub grouping: Grouping,
    pub supergroups_from: String,
    pub subgroups_from: String,
    #[serde(default = "default_size_from")]
    pub size_from: String,
    #[serde(default)]
    pub loop_over: Vec<String>,
    #[serde(default)]
    pub rate: Vec<String>,
    #[serde(default)]
    pub count: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_age_max")]
    pub age_max: f64,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default = "default_rel_tol")]
    pub rel_tol: f64,
    pub files: FilesConfig,
}

fn default_size_from() -> String {
    DEFAULT_SIZE_FROM.to_string()
}

fn default_age_max() -> f64 {
    DEFAULT_AGE_MAX
}

fn default_rel_tol() -> f64 {
    DEFAULT_REL_TOL
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Aggregate,
    Disaggregate,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate => write!(f, "aggregate"),
            Self::Disaggregate => write!(f, "disaggregate"),
        }
    }
}

/// How supergroup and subgroup records are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// Age-band labels under one key; weights are band widths.
    Age,
    /// Every subgroup category under every supergroup category; weights
    /// are sizes.
    Categorical,
    /// An explicit pairing file; weights are sizes.
    Pairing,
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Age => write!(f, "age"),
            Self::Categorical => write!(f, "categorical"),
            Self::Pairing => write!(f, "pairing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {
    pub supergroups: PathBuf,
    pub subgroups: PathBuf,
    #[serde(default)]
    pub pairing: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl FilesConfig {
    fn resolve_against(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.supergroups);
        resolve(&mut self.subgroups);
        if let Some(p) = self.pairing.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.output.as_mut() {
            resolve(p);
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing + validation
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file; relative `[files]` paths resolve
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&input)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.files.resolve_against(base);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.supergroups_from.is_empty() || self.subgroups_from.is_empty() {
            return Err(IoError::ConfigValidation(
                "supergroups_from and subgroups_from must be non-empty".into(),
            ));
        }

        match self.grouping {
            Grouping::Age if self.supergroups_from != self.subgroups_from => {
                return Err(IoError::ConfigValidation(format!(
                    "age grouping reads both tiers from one key, got supergroups_from '{}' and subgroups_from '{}'",
                    self.supergroups_from, self.subgroups_from
                )));
            }
            Grouping::Categorical | Grouping::Pairing if self.supergroups_from == self.subgroups_from => {
                return Err(IoError::ConfigValidation(format!(
                    "{} grouping needs distinct supergroups_from and subgroups_from, both are '{}'",
                    self.grouping, self.subgroups_from
                )));
            }
            Grouping::Pairing if self.files.pairing.is_none() => {
                return Err(IoError::ConfigValidation(
                    "pairing grouping requires files.pairing".into(),
                ));
            }
            _ => {}
        }

        if !(self.age_max.is_finite() && self.age_max > 0.0) {
            return Err(IoError::ConfigValidation(format!(
                "age_max must be positive and finite, got {}",
                self.age_max
            )));
        }
        if !(self.rel_tol.is_finite() && self.rel_tol > 0.0) {
            return Err(IoError::ConfigValidation(format!(
                "rel_tol must be positive and finite, got {}",
                self.rel_tol
            )));
        }

        let lists = [("rate", &self.rate), ("count", &self.count), ("exclude", &self.exclude)];
        for (i, (name_a, keys_a)) in lists.iter().enumerate() {
            for (name_b, keys_b) in &lists[i + 1..] {
                if let Some(key) = keys_a.iter().find(|k| keys_b.contains(*k)) {
                    return Err(IoError::ConfigValidation(format!(
                        "key '{key}' is listed in both {name_a} and {name_b}"
                    )));
                }
            }
        }

        if self.exclude.contains(&self.size_from) {
            return Err(IoError::ConfigValidation(format!(
                "size_from '{}' cannot be excluded",
                self.size_from
            )));
        }
        for key in [&self.supergroups_from, &self.subgroups_from] {
            if self.loop_over.contains(key) {
                return Err(IoError::ConfigValidation(format!(
                    "grouping key '{key}' cannot also be a loop_over key"
                )));
            }
        }

        Ok(())
    }

    /// Keys whose CSV cells must parse as numbers.
    pub fn numeric_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.count.iter().chain(&self.rate).cloned().collect();
        if !keys.contains(&self.size_from) {
            keys.push(self.size_from.clone());
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGE_TOML: &str = r#"
direction = "disaggregate"
grouping = "age"
supergroups_from = "age_group"
subgroups_from = "age_group"
count = ["cases", "size"]
rate = ["vaccination_rate"]
exclude = ["notes"]

[files]
supergroups = "data/supergroups.json"
subgroups = "data/subgroups.json"
"#;

    const CATEGORICAL_TOML: &str = r#"
direction = "aggregate"
grouping = "categorical"
supergroups_from = "state"
subgroups_from = "splitvar"
size_from = "population"
loop_over = ["year"]
count = ["deaths"]
normalize = true
rel_tol = 0.01

[files]
supergroups = "/abs/states.csv"
subgroups = "counties.csv"
output = "out.csv"
"#;

    #[test]
    fn parse_with_defaults() {
        let config = RunConfig::from_toml(AGE_TOML).unwrap();
        assert_eq!(config.direction, Direction::Disaggregate);
        assert_eq!(config.grouping, Grouping::Age);
        assert_eq!(config.size_from, "size");
        assert_eq!(config.age_max, 100.0);
        assert!(!config.normalize);
        assert_eq!(config.rel_tol, 1e-6);
        assert!(config.loop_over.is_empty());
        assert!(config.files.pairing.is_none());
    }

    #[test]
    fn parse_overrides() {
        let config = RunConfig::from_toml(CATEGORICAL_TOML).unwrap();
        assert_eq!(config.direction, Direction::Aggregate);
        assert_eq!(config.size_from, "population");
        assert_eq!(config.loop_over, ["year"]);
        assert!(config.normalize);
        assert_eq!(config.rel_tol, 0.01);
        assert_eq!(config.numeric_keys(), ["deaths", "population"]);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let mut config = RunConfig::from_toml(CATEGORICAL_TOML).unwrap();
        config.files.resolve_against(Path::new("/runs/2024"));
        assert_eq!(config.files.supergroups, PathBuf::from("/abs/states.csv"));
        assert_eq!(config.files.subgroups, PathBuf::from("/runs/2024/counties.csv"));
        assert_eq!(config.files.output, Some(PathBuf::from("/runs/2024/out.csv")));
    }

    #[test]
    fn age_grouping_needs_one_key() {
        let input = AGE_TOML.replace(r#"subgroups_from = "age_group""#, r#"subgroups_from = "age""#);
        let err = RunConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, IoError::ConfigValidation(ref m) if m.contains("one key")), "{err}");
    }

    #[test]
    fn pairing_grouping_needs_file() {
        let input = CATEGORICAL_TOML.replace(r#""categorical""#, r#""pairing""#);
        let err = RunConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, IoError::ConfigValidation(ref m) if m.contains("files.pairing")));
    }

    #[test]
    fn key_in_two_role_lists_rejected() {
        let input = AGE_TOML.replace(r#"exclude = ["notes"]"#, r#"exclude = ["notes", "cases"]"#);
        let err = RunConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, IoError::ConfigValidation(ref m) if m.contains("'cases'")));
    }

    #[test]
    fn size_cannot_be_excluded() {
        let input = AGE_TOML.replace(r#"exclude = ["notes"]"#, r#"exclude = ["size"]"#);
        // "size" is also a count key, so the overlap check fires first.
        assert!(RunConfig::from_toml(&input).is_err());

        let input = CATEGORICAL_TOML.replace(r#"count = ["deaths"]"#, r#"exclude = ["population"]"#);
        let err = RunConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, IoError::ConfigValidation(ref m) if m.contains("size_from")));
    }

    #[test]
    fn bad_tolerances_rejected() {
        let input = CATEGORICAL_TOML.replace("rel_tol = 0.01", "rel_tol = 0.0");
        assert!(RunConfig::from_toml(&input).is_err());

        let input = format!("age_max = -1.0\n{AGE_TOML}");
        assert!(RunConfig::from_toml(&input).is_err());
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let input = format!("colour = \"red\"\n{AGE_TOML}");
        assert!(matches!(RunConfig::from_toml(&input), Err(IoError::ConfigParse(_))));
    }

    #[test]
    fn unknown_direction_is_a_parse_error() {
        let input = AGE_TOML.replace("disaggregate", "sideways");
        assert!(matches!(RunConfig::from_toml(&input), Err(IoError::ConfigParse(_))));
    }
}
