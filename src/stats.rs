use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use polars::prelude::{DataFrame, DataType};

use crate::config::EncodingMode;
use crate::error::{PrepError, Result};
use crate::records;

/// Code assigned to a label that was not seen during fitting.
pub const UNKNOWN_CODE: i64 = -1;

/// Sorted distinct labels of one categorical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let labels: BTreeSet<&str> = values.into_iter().flatten().collect();
        Self {
            labels: labels.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, value: &str) -> bool {
        self.index_of(value).is_some()
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|label| label.as_str().cmp(value))
            .ok()
    }

    /// Integer code of `value`, or [`UNKNOWN_CODE`] for missing and unseen values.
    pub fn code(&self, value: Option<&str>) -> i64 {
        value
            .and_then(|v| self.index_of(v))
            .map_or(UNKNOWN_CODE, |i| i as i64)
    }

    pub fn dummy_columns(&self, field: &str) -> Vec<String> {
        self.labels
            .iter()
            .map(|label| dummy_column(field, label))
            .collect()
    }
}

fn dummy_column(field: &str, label: &str) -> String {
    format!("{}_{}", field, label)
}

/// Everything learned from train; the only state shared with validation and test.
#[derive(Debug, Clone, PartialEq)]
pub struct FitStatistics {
    mode: EncodingMode,
    medians: BTreeMap<String, f64>,
    vocabularies: BTreeMap<String, Vocabulary>,
    fallback_fields: Vec<String>,
}

impl FitStatistics {
    /// Learn medians and vocabularies from `train`.
    ///
    /// `train` must already have the category merges applied. Fields missing from the
    /// frame are skipped. A numeric field with no observed value gets `median_fallback`.
    pub fn fit(
        train: &DataFrame,
        numeric_fields: &[String],
        categorical_fields: &[String],
        mode: EncodingMode,
        median_fallback: f64,
    ) -> Result<Self> {
        if train.height() == 0 {
            return Err(PrepError::EmptyTraining);
        }
        let present = |field: &String| train.get_column_names().contains(&field.as_str());

        let mut medians = BTreeMap::new();
        let mut fallback_fields = Vec::new();
        for field in numeric_fields {
            if !present(field) {
                debug!("numeric field {:?} absent from training frame, skipped", field);
                continue;
            }
            let value = match train.column(field)?.cast(&DataType::Float64)?.median() {
                Some(m) => m,
                None => {
                    warn!(
                        "numeric field {:?} is entirely missing in training, imputing {}",
                        field, median_fallback
                    );
                    fallback_fields.push(field.clone());
                    median_fallback
                }
            };
            medians.insert(field.clone(), value);
        }

        let mut vocabularies = BTreeMap::new();
        for field in categorical_fields {
            if !present(field) {
                debug!(
                    "categorical field {:?} absent from training frame, skipped",
                    field
                );
                continue;
            }
            let values = records::text_values(train.column(field)?)?;
            let vocabulary = Vocabulary::from_values(values.iter().map(|v| v.as_deref()));
            debug!("{:?} vocabulary: {:?}", field, vocabulary.labels());
            vocabularies.insert(field.clone(), vocabulary);
        }

        Ok(Self {
            mode,
            medians,
            vocabularies,
            fallback_fields,
        })
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    pub fn median(&self, field: &str) -> Option<f64> {
        self.medians.get(field).copied()
    }

    pub fn medians(&self) -> &BTreeMap<String, f64> {
        &self.medians
    }

    pub fn vocabulary(&self, field: &str) -> Option<&Vocabulary> {
        self.vocabularies.get(field)
    }

    pub fn vocabularies(&self) -> &BTreeMap<String, Vocabulary> {
        &self.vocabularies
    }

    /// Numeric fields whose median fell back to the configured default.
    pub fn fallback_fields(&self) -> &[String] {
        &self.fallback_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use polars::df;

    fn strings(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn train_frame() -> DataFrame {
        df!(
            "bmi" => &[Some(30.0f64), None, Some(20.0), Some(25.0)],
            "age" => &[40.0f64, 50.0, 60.0, 70.0],
            "work_type" => &[Some("Private"), Some("Govt_job"), None, Some("Private")],
            "stroke" => &[0i64, 1, 0, 0]
        )
        .unwrap()
    }

    #[test]
    fn test_vocabulary_is_sorted_and_skips_nulls() {
        let vocabulary =
            Vocabulary::from_values(vec![Some("b"), None, Some("a"), Some("b"), Some("c")]);
        assert_eq!(vocabulary.labels(), &strings(&["a", "b", "c"])[..]);
        assert_eq!(vocabulary.code(Some("a")), 0);
        assert_eq!(vocabulary.code(Some("c")), 2);
        assert_eq!(vocabulary.code(Some("z")), UNKNOWN_CODE);
        assert_eq!(vocabulary.code(None), UNKNOWN_CODE);
    }

    #[test]
    fn test_fit_learns_medians_and_vocabularies() {
        let stats = FitStatistics::fit(
            &train_frame(),
            &strings(&["bmi", "age"]),
            &strings(&["work_type"]),
            EncodingMode::Vocabulary,
            0.0,
        )
        .unwrap();

        assert_relative_eq!(stats.median("bmi").unwrap(), 25.0);
        assert_relative_eq!(stats.median("age").unwrap(), 55.0);
        let vocabulary = stats.vocabulary("work_type").unwrap();
        assert_eq!(vocabulary.labels(), &strings(&["Govt_job", "Private"])[..]);
        assert!(stats.fallback_fields().is_empty());
    }

    #[test]
    fn test_all_missing_numeric_field_falls_back() {
        let train = df!(
            "bmi" => &[None::<f64>, None],
            "stroke" => &[0i64, 1]
        )
        .unwrap();
        let stats = FitStatistics::fit(
            &train,
            &strings(&["bmi"]),
            &[],
            EncodingMode::Vocabulary,
            -1.5,
        )
        .unwrap();

        assert_relative_eq!(stats.median("bmi").unwrap(), -1.5);
        assert_eq!(stats.fallback_fields(), &strings(&["bmi"])[..]);
    }

    #[test]
    fn test_absent_fields_are_skipped() {
        let stats = FitStatistics::fit(
            &train_frame(),
            &strings(&["avg_glucose_level"]),
            &strings(&["smoking_status"]),
            EncodingMode::Vocabulary,
            0.0,
        )
        .unwrap();
        assert!(stats.medians().is_empty());
        assert!(stats.vocabularies().is_empty());
    }

    #[test]
    fn test_empty_training_frame_is_rejected() {
        let train = train_frame().head(Some(0));
        let err = FitStatistics::fit(&train, &[], &[], EncodingMode::Vocabulary, 0.0).unwrap_err();
        assert!(matches!(err, PrepError::EmptyTraining));
    }

    #[test]
    fn test_statistics_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FitStatistics>();
    }
}
