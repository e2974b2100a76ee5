//! Stratified train/validation/test preparation with statistics fitted on train only.
//!
//! ```no_run
//! use stroke_preprocessing::{Pipeline, PipelineConfig};
//!
//! let report = Pipeline::new(PipelineConfig::default())?.run()?;
//! println!("{}", report);
//! # Ok::<(), stroke_preprocessing::PrepError>(())
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod split;
pub mod stats;
pub mod transform;

pub use config::{EncodingMode, EncodingSelection, PipelineConfig, SplitFractions};
pub use error::{PrepError, Result};
pub use pipeline::{EncodedRun, Pipeline, Prepared};
pub use report::{DataQualityIssue, PipelineReport};
pub use split::{Partition, PartitionKind, SplitPartitions, StratifiedSplitter};
pub use stats::{FitStatistics, Vocabulary, UNKNOWN_CODE};
pub use transform::{FittedPreprocessor, Preprocessor, Transformed};
