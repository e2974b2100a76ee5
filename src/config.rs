use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::split::PartitionKind;

/// How categorical fields are turned into numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// One integer code per fitted label, `-1` for anything else.
    Vocabulary,
    /// One 0/1 column per fitted label.
    Expansion,
}

impl EncodingMode {
    pub fn name(&self) -> &'static str {
        match self {
            EncodingMode::Vocabulary => "vocabulary",
            EncodingMode::Expansion => "expansion",
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which encoding runs the pipeline performs over a single split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EncodingSelection {
    Vocabulary,
    Expansion,
    Both,
}

impl EncodingSelection {
    pub fn modes(&self) -> Vec<EncodingMode> {
        match self {
            EncodingSelection::Vocabulary => vec![EncodingMode::Vocabulary],
            EncodingSelection::Expansion => vec![EncodingMode::Expansion],
            EncodingSelection::Both => vec![EncodingMode::Vocabulary, EncodingMode::Expansion],
        }
    }
}

impl FromStr for EncodingSelection {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vocabulary" | "label" => Ok(EncodingSelection::Vocabulary),
            "expansion" | "onehot" | "one-hot" => Ok(EncodingSelection::Expansion),
            "both" => Ok(EncodingSelection::Both),
            _ => Err(PrepError::EncodingMode {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for EncodingSelection {
    type Error = PrepError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EncodingSelection> for String {
    fn from(selection: EncodingSelection) -> Self {
        match selection {
            EncodingSelection::Vocabulary => "vocabulary",
            EncodingSelection::Expansion => "expansion",
            EncodingSelection::Both => "both",
        }
        .to_string()
    }
}

/// Train and validation shares of the input; test takes the rest, possibly nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitFractions {
    pub train: f64,
    pub validation: f64,
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            train: 0.70,
            validation: 0.15,
        }
    }
}

impl SplitFractions {
    pub fn test(&self) -> f64 {
        (1.0 - self.train - self.validation).max(0.0)
    }

    pub fn for_kind(&self, kind: PartitionKind) -> f64 {
        match kind {
            PartitionKind::Train => self.train,
            PartitionKind::Validation => self.validation,
            PartitionKind::Test => self.test(),
        }
    }

    /// Share of the post-train remainder that goes to validation.
    pub fn validation_share_of_remainder(&self) -> f64 {
        self.validation / (self.validation + self.test())
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |x: f64| x.is_finite() && x > 0.0 && x < 1.0;
        if !in_unit(self.train) || !in_unit(self.validation) {
            return Err(PrepError::SplitFractions {
                reason: format!(
                    "train ({}) and validation ({}) must both lie strictly between 0 and 1",
                    self.train, self.validation
                ),
            });
        }
        if self.train + self.validation > 1.0 + 1e-9 {
            return Err(PrepError::SplitFractions {
                reason: format!(
                    "train + validation = {} exceeds 1",
                    self.train + self.validation
                ),
            });
        }
        Ok(())
    }
}

/// Rewrites a set of category labels of one field into a single label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMerge {
    pub field: String,
    pub labels: Vec<String>,
    pub into: String,
}

/// Maps a two-valued text field to 0/1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMap {
    pub field: String,
    pub negative: String,
    pub positive: String,
}

impl BinaryMap {
    pub fn map(&self, value: &str) -> Option<i32> {
        if value == self.negative {
            Some(0)
        } else if value == self.positive {
            Some(1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPaths {
    pub train: PathBuf,
    pub validation: PathBuf,
    pub test: PathBuf,
}

impl OutputPaths {
    pub fn under<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            train: dir.join("train.csv"),
            validation: dir.join("validation.csv"),
            test: dir.join("test.csv"),
        }
    }

    pub fn for_kind(&self, kind: PartitionKind) -> &Path {
        match kind {
            PartitionKind::Train => &self.train,
            PartitionKind::Validation => &self.validation,
            PartitionKind::Test => &self.test,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayout {
    pub vocabulary: OutputPaths,
    pub expansion: OutputPaths,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::under("data/processed")
    }
}

impl OutputLayout {
    /// `<dir>/*.csv` for vocabulary runs and `<dir>/onehot/*.csv` for expansion runs.
    pub fn under<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            vocabulary: OutputPaths::under(dir),
            expansion: OutputPaths::under(dir.join("onehot")),
        }
    }

    pub fn for_mode(&self, mode: EncodingMode) -> &OutputPaths {
        match mode {
            EncodingMode::Vocabulary => &self.vocabulary,
            EncodingMode::Expansion => &self.expansion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_path: PathBuf,
    pub outputs: OutputLayout,
    pub target_field: String,
    pub seed: u64,
    pub split: SplitFractions,
    /// Uninformative input fields removed right after the split.
    pub drop_fields: Vec<String>,
    pub numeric_fields: Vec<String>,
    pub categorical_fields: Vec<String>,
    pub binary_maps: Vec<BinaryMap>,
    pub merges: Vec<CategoryMerge>,
    pub encoding: EncodingSelection,
    /// Output columns removed after encoding, e.g. a complementary dummy.
    pub drop_columns: Vec<String>,
    pub drop_first_dummy: bool,
    pub null_values: Vec<String>,
    pub median_fallback: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            raw_path: PathBuf::from("data/healthcare-dataset-stroke-data.csv"),
            outputs: OutputLayout::default(),
            target_field: "stroke".to_string(),
            seed: 42,
            split: SplitFractions::default(),
            drop_fields: strings(&["id", "gender", "Residence_type"]),
            numeric_fields: strings(&["age", "avg_glucose_level", "bmi"]),
            categorical_fields: strings(&["work_type", "smoking_status"]),
            binary_maps: vec![BinaryMap {
                field: "ever_married".to_string(),
                negative: "No".to_string(),
                positive: "Yes".to_string(),
            }],
            merges: vec![CategoryMerge {
                field: "work_type".to_string(),
                labels: strings(&["children", "Never_worked"]),
                into: "Not_working".to_string(),
            }],
            encoding: EncodingSelection::Vocabulary,
            drop_columns: Vec::new(),
            drop_first_dummy: false,
            null_values: strings(&["N/A", ""]),
            median_fallback: 0.0,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: PipelineConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        if self.target_field.trim().is_empty() {
            return Err(PrepError::config("target_field must not be empty"));
        }
        if !self.median_fallback.is_finite() {
            return Err(PrepError::config("median_fallback must be finite"));
        }

        let mut roles: Vec<&str> = Vec::new();
        roles.extend(self.numeric_fields.iter().map(String::as_str));
        roles.extend(self.categorical_fields.iter().map(String::as_str));
        roles.extend(self.binary_maps.iter().map(|b| b.field.as_str()));
        for (i, field) in roles.iter().enumerate() {
            if *field == self.target_field {
                return Err(PrepError::config(format!(
                    "target field {:?} cannot also be a feature",
                    field
                )));
            }
            if roles[..i].contains(field) {
                return Err(PrepError::config(format!(
                    "field {:?} is assigned more than one role",
                    field
                )));
            }
        }
        if self.drop_fields.contains(&self.target_field) {
            return Err(PrepError::config("drop_fields must not contain the target"));
        }

        for merge in &self.merges {
            if merge.labels.is_empty() {
                return Err(PrepError::config(format!(
                    "merge for {:?} lists no labels",
                    merge.field
                )));
            }
            if !self.categorical_fields.contains(&merge.field) {
                return Err(PrepError::config(format!(
                    "merge targets {:?}, which is not a categorical field",
                    merge.field
                )));
            }
        }
        for map in &self.binary_maps {
            if map.negative == map.positive {
                return Err(PrepError::config(format!(
                    "binary map for {:?} uses {:?} for both values",
                    map.field, map.negative
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.target_field, "stroke");
        assert!((config.split.test() - 0.15).abs() < 1e-12);
    }

    fn fractions(train: f64, validation: f64) -> SplitFractions {
        SplitFractions { train, validation }
    }

    #[test]
    fn test_split_fractions_bounds() {
        let err = fractions(0.9, 0.15).validate().unwrap_err();
        assert!(err.is_config());
        assert!(fractions(0.0, 0.5).validate().is_err());
        assert!(fractions(0.6, 0.2).validate().is_ok());
    }

    #[test]
    fn test_fractions_may_leave_test_empty() {
        let full = fractions(0.85, 0.15);
        full.validate().unwrap();
        assert!(full.test() < 1e-9);
        assert!((full.validation_share_of_remainder() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_remainder_share() {
        let share = SplitFractions::default().validation_share_of_remainder();
        assert!((share - 0.5).abs() < 1e-12);
        let share = fractions(0.6, 0.1).validation_share_of_remainder();
        assert!((share - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_encoding_selection_parsing() {
        assert_eq!(
            "both".parse::<EncodingSelection>().unwrap(),
            EncodingSelection::Both
        );
        assert_eq!(
            "One-Hot".parse::<EncodingSelection>().unwrap(),
            EncodingSelection::Expansion
        );
        let err = "target".parse::<EncodingSelection>().unwrap_err();
        assert!(matches!(err, PrepError::EncodingMode { .. }));
        assert!(err.is_config());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "seed": 7, "encoding": "both", "split": { "train": 0.8, "validation": 0.1 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.encoding, EncodingSelection::Both);
        assert_eq!(config.target_field, "stroke");
        assert_eq!(config.numeric_fields.len(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/stroke.json");
        let config = PipelineConfig::from_json_file(path).unwrap();
        assert_eq!(
            config,
            PipelineConfig {
                encoding: EncodingSelection::Both,
                ..PipelineConfig::default()
            }
        );
    }

    #[test]
    fn test_json_rejects_unknown_encoding() {
        let json = r#"{ "encoding": "hashing" }"#;
        assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_target_as_feature() {
        let config = PipelineConfig {
            numeric_fields: vec!["stroke".to_string()],
            ..PipelineConfig::default()
        };
        assert!(config.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_validate_rejects_merge_on_unknown_field() {
        let mut config = PipelineConfig::default();
        config.merges[0].field = "bmi".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_layout_for_mode() {
        let layout = OutputLayout::under("out");
        assert_eq!(
            layout.for_mode(EncodingMode::Expansion).for_kind(PartitionKind::Test),
            Path::new("out/onehot/test.csv")
        );
        assert_eq!(
            layout.for_mode(EncodingMode::Vocabulary).for_kind(PartitionKind::Train),
            Path::new("out/train.csv")
        );
    }

    #[test]
    fn test_binary_map() {
        let map = BinaryMap {
            field: "ever_married".to_string(),
            negative: "No".to_string(),
            positive: "Yes".to_string(),
        };
        assert_eq!(map.map("No"), Some(0));
        assert_eq!(map.map("Yes"), Some(1));
        assert_eq!(map.map("yes"), None);
    }
}
