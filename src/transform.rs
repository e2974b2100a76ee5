use log::{debug, info, warn};
use polars::prelude::{col, lit, DataFrame, DataType, IntoLazy, Series};

use crate::config::{BinaryMap, CategoryMerge, EncodingMode, PipelineConfig};
use crate::error::{PrepError, Result};
use crate::records;
use crate::report::DataQualityIssue;
use crate::stats::{FitStatistics, Vocabulary};

/// Rewrite merged labels into their collapsed label. Needs no fitting.
pub fn apply_merges(df: &DataFrame, merges: &[CategoryMerge]) -> Result<DataFrame> {
    let mut out = df.clone();
    for merge in merges {
        let Ok(column) = df.column(&merge.field) else {
            continue;
        };
        let merged: Vec<Option<String>> = records::text_values(column)?
            .into_iter()
            .map(|value| {
                value.map(|v| {
                    if merge.labels.contains(&v) {
                        merge.into.clone()
                    } else {
                        v
                    }
                })
            })
            .collect();
        out.with_column(Series::new(&merge.field, merged))?;
    }
    Ok(out)
}

/// Remove the named columns that are present; unknown names are ignored.
pub fn drop_present(df: &DataFrame, names: &[String]) -> Result<DataFrame> {
    let keep: Vec<&str> = df
        .get_column_names()
        .into_iter()
        .filter(|c| !names.iter().any(|n| n.as_str() == *c))
        .collect();
    Ok(df.select(keep)?)
}

/// Configured transforms, not yet fitted.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target: String,
    numeric_fields: Vec<String>,
    categorical_fields: Vec<String>,
    binary_maps: Vec<BinaryMap>,
    merges: Vec<CategoryMerge>,
    drop_columns: Vec<String>,
    drop_first_dummy: bool,
    mode: EncodingMode,
    median_fallback: f64,
}

impl Preprocessor {
    pub fn from_config(config: &PipelineConfig, mode: EncodingMode) -> Self {
        Self {
            target: config.target_field.clone(),
            numeric_fields: config.numeric_fields.clone(),
            categorical_fields: config.categorical_fields.clone(),
            binary_maps: config.binary_maps.clone(),
            merges: config.merges.clone(),
            drop_columns: config.drop_columns.clone(),
            drop_first_dummy: config.drop_first_dummy,
            mode,
            median_fallback: config.median_fallback,
        }
    }

    /// Learn statistics from the training frame only.
    pub fn fit(&self, train: &DataFrame) -> Result<FittedPreprocessor> {
        let merged = apply_merges(train, &self.merges)?;
        let stats = FitStatistics::fit(
            &merged,
            &self.numeric_fields,
            &self.categorical_fields,
            self.mode,
            self.median_fallback,
        )?;
        Ok(FittedPreprocessor {
            plan: self.clone(),
            stats,
        })
    }

    /// Fit on `train` and transform it in one step.
    pub fn fit_transform(&self, train: &DataFrame) -> Result<(FittedPreprocessor, Transformed)> {
        let fitted = self.fit(train)?;
        let transformed = fitted.transform(train)?;
        Ok((fitted, transformed))
    }
}

/// Output of one transform call.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub frame: DataFrame,
    pub issues: Vec<DataQualityIssue>,
}

/// A [`Preprocessor`] paired with statistics frozen from train.
#[derive(Debug, Clone)]
pub struct FittedPreprocessor {
    plan: Preprocessor,
    stats: FitStatistics,
}

impl FittedPreprocessor {
    pub fn statistics(&self) -> &FitStatistics {
        &self.stats
    }

    /// Fill missing numeric values with the fitted medians; nothing else changes.
    pub fn impute(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut fills = Vec::with_capacity(self.stats.medians().len());
        for (field, &value) in self.stats.medians() {
            if df.column(field).is_err() {
                return Err(PrepError::MissingField {
                    field: field.clone(),
                });
            }
            fills.push(col(field).cast(DataType::Float64).fill_null(lit(value)));
        }
        Ok(df.clone().lazy().with_columns(fills).collect()?)
    }

    /// Column names `transform` produces for a frame with `input_columns`.
    pub fn output_columns(&self, input_columns: &[&str]) -> Vec<String> {
        let mut columns = Vec::new();
        for &name in input_columns {
            if name == self.plan.target {
                continue;
            }
            match self.expanded_vocabulary(name) {
                Some(vocabulary) => columns.extend(self.kept_dummies(name, vocabulary)),
                None => columns.push(name.to_string()),
            }
        }
        if input_columns.contains(&self.plan.target.as_str()) {
            columns.push(self.plan.target.clone());
        }
        columns.retain(|c| !self.plan.drop_columns.contains(c));
        columns
    }

    pub fn transform(&self, df: &DataFrame) -> Result<Transformed> {
        for field in self
            .stats
            .medians()
            .keys()
            .chain(self.stats.vocabularies().keys())
        {
            if df.column(field).is_err() {
                return Err(PrepError::MissingField {
                    field: field.clone(),
                });
            }
        }

        let imputed = self.impute(&apply_merges(df, &self.plan.merges)?)?;
        let mut issues = Vec::new();
        let mut columns: Vec<Series> = Vec::with_capacity(imputed.width());
        let mut target: Option<Series> = None;

        for series in imputed.get_columns() {
            let name = series.name();
            if name == self.plan.target {
                target = Some(series.clone());
            } else if let Some(vocabulary) = self.stats.vocabulary(name) {
                let values = records::text_values(series)?;
                let unknown = values
                    .iter()
                    .flatten()
                    .filter(|v| !vocabulary.contains(v))
                    .count();
                if unknown > 0 {
                    info!(
                        "{}: {} values outside the fitted vocabulary",
                        name, unknown
                    );
                    issues.push(DataQualityIssue::UnknownCategory {
                        field: name.to_string(),
                        count: unknown,
                    });
                }
                match self.stats.mode() {
                    EncodingMode::Vocabulary => {
                        let codes: Vec<i64> =
                            values.iter().map(|v| vocabulary.code(v.as_deref())).collect();
                        columns.push(Series::new(name, codes));
                    }
                    EncodingMode::Expansion => {
                        columns.extend(self.expand(name, vocabulary, &values));
                    }
                }
            } else if let Some(map) = self.plan.binary_maps.iter().find(|m| m.field == name) {
                let (series, unmapped) = map_binary(map, series)?;
                if unmapped > 0 {
                    warn!(
                        "{}: {} values are neither {:?} nor {:?}, left missing",
                        name, unmapped, map.negative, map.positive
                    );
                    issues.push(DataQualityIssue::UnmappedBinary {
                        field: name.to_string(),
                        count: unmapped,
                    });
                }
                columns.push(series);
            } else {
                columns.push(series.clone());
            }
        }
        columns.extend(target);

        let frame = drop_present(&DataFrame::new(columns)?, &self.plan.drop_columns)?;
        debug!(
            "transformed {} rows into {} columns",
            frame.height(),
            frame.width()
        );
        Ok(Transformed { frame, issues })
    }

    fn expanded_vocabulary(&self, field: &str) -> Option<&Vocabulary> {
        match self.stats.mode() {
            EncodingMode::Expansion => self.stats.vocabulary(field),
            EncodingMode::Vocabulary => None,
        }
    }

    fn kept_dummies(&self, field: &str, vocabulary: &Vocabulary) -> Vec<String> {
        let skip = usize::from(self.plan.drop_first_dummy);
        vocabulary.dummy_columns(field).into_iter().skip(skip).collect()
    }

    fn expand(&self, field: &str, vocabulary: &Vocabulary, values: &[Option<String>]) -> Vec<Series> {
        let skip = usize::from(self.plan.drop_first_dummy);
        vocabulary
            .labels()
            .iter()
            .zip(vocabulary.dummy_columns(field))
            .skip(skip)
            .map(|(label, column)| {
                let hits: Vec<i32> = values
                    .iter()
                    .map(|v| i32::from(v.as_deref() == Some(label.as_str())))
                    .collect();
                Series::new(&column, hits)
            })
            .collect()
    }
}

/// Map a two-valued column to 0/1, returning how many values could not be mapped.
fn map_binary(map: &BinaryMap, series: &Series) -> Result<(Series, usize)> {
    let mapped: Vec<Option<i32>> = records::text_values(series)?
        .iter()
        .map(|v| v.as_deref().and_then(|v| map.map(v)))
        .collect();
    let unmapped = mapped.iter().filter(|v| v.is_none()).count();
    Ok((Series::new(series.name(), mapped), unmapped))
}
