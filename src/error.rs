use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("invalid configuration: {message}")]
    Config { message: String },
    #[error("target field {field:?} is not present in the input schema")]
    MissingTarget { field: String },
    #[error("invalid encoding mode {value:?}, expected one of: vocabulary, expansion, both")]
    EncodingMode { value: String },
    #[error("invalid split fractions: {reason}")]
    SplitFractions { reason: String },
    #[error("target field {field:?} has {count} rows without a label")]
    MissingLabels { field: String, count: usize },
    #[error("cannot fit statistics on an empty training partition")]
    EmptyTraining,
    #[error("field {field:?} was fitted but is missing from the frame being transformed")]
    MissingField { field: String },
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PrepError {
    pub fn config(message: impl Into<String>) -> Self {
        PrepError::Config {
            message: message.into(),
        }
    }

    /// True for errors raised by validating configuration against the input schema.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PrepError::Config { .. }
                | PrepError::MissingTarget { .. }
                | PrepError::EncodingMode { .. }
                | PrepError::SplitFractions { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PrepError>;
