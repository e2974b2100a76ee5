use polars::prelude::{DataFrame, DataType, Field, Schema, Series};

use crate::config::PipelineConfig;
use crate::error::{PrepError, Result};

/// Reader dtypes for the columns present in `header` that the configuration knows about.
///
/// Numeric fields are forced to Float64 so that null tokens such as `N/A` parse as missing
/// values instead of turning the whole column into text.
pub fn raw_schema(header: &[String], config: &PipelineConfig) -> Schema {
    let present = |field: &String| header.iter().any(|h| h == field);

    let numeric = config
        .numeric_fields
        .iter()
        .filter(|f| present(f))
        .map(|f| Field::new(f, DataType::Float64));
    let text = config
        .categorical_fields
        .iter()
        .chain(config.binary_maps.iter().map(|b| &b.field))
        .filter(|f| present(f))
        .map(|f| Field::new(f, DataType::Utf8));

    Schema::from_iter(numeric.chain(text))
}

pub fn text_values(series: &Series) -> Result<Vec<Option<String>>> {
    let cast = series.cast(&DataType::Utf8)?;
    let values = cast
        .utf8()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}

/// Target values rendered as text, one per row. Fails on unlabeled rows.
pub fn class_labels(df: &DataFrame, target: &str) -> Result<Vec<String>> {
    let column = df.column(target).map_err(|_| PrepError::MissingTarget {
        field: target.to_string(),
    })?;
    let values = text_values(column)?;
    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing > 0 {
        return Err(PrepError::MissingLabels {
            field: target.to_string(),
            count: missing,
        });
    }
    Ok(values.into_iter().flatten().collect())
}
