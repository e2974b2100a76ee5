use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use polars::prelude::*;

use crate::config::PipelineConfig;
use crate::error::{PrepError, Result};
use crate::records;

/// Column names from the first line of a delimited file.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let header = reader.headers()?.iter().map(|h| h.to_string()).collect();
    Ok(header)
}

/// Load the raw table, checking the header against the configuration first.
pub fn read_csv<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<DataFrame> {
    let path = path.as_ref();
    let header = read_header(path)?;
    if !header.iter().any(|h| h == &config.target_field) {
        return Err(PrepError::MissingTarget {
            field: config.target_field.clone(),
        });
    }
    debug!("header of {}: {:?}", path.display(), header);

    let null_values = if config.null_values.is_empty() {
        None
    } else {
        Some(NullValues::AllColumns(config.null_values.clone()))
    };

    let file = File::open(path)?;
    let df = CsvReader::new(file)
        .has_header(true)
        .with_dtypes(Some(Arc::new(records::raw_schema(&header, config))))
        .with_null_values(null_values)
        .finish()?;

    info!(
        "loaded {}: {} rows, {} columns",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Write a frame with a header row, creating parent directories as needed.
pub fn write_csv<P: AsRef<Path>>(path: P, df: &DataFrame) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(path)?;
    let mut df = df.clone();
    CsvWriter::new(&mut file).has_header(true).finish(&mut df)?;

    debug!("wrote {} rows to {}", df.height(), path.display());
    Ok(())
}
