use std::collections::BTreeMap;
use std::fmt;

use polars::prelude::DataFrame;
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};

use crate::config::EncodingMode;
use crate::error::Result;
use crate::records;
use crate::split::PartitionKind;

/// Non-fatal problems found while fitting or transforming.
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityIssue {
    /// Numeric field with no observed value in train; imputed with the fallback.
    MedianFallback { field: String, value: f64 },
    /// Values of a binary field matching neither configured literal.
    UnmappedBinary { field: String, count: usize },
    /// Categorical values absent from the fitted vocabulary.
    UnknownCategory { field: String, count: usize },
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityIssue::MedianFallback { field, value } => {
                write!(f, "{}: no values in train, imputed with {}", field, value)
            }
            DataQualityIssue::UnmappedBinary { field, count } => {
                write!(f, "{}: {} unrecognized values left missing", field, count)
            }
            DataQualityIssue::UnknownCategory { field, count } => {
                write!(f, "{}: {} values unseen in train", field, count)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartitionSummary {
    pub kind: PartitionKind,
    pub rows: usize,
    pub class_counts: BTreeMap<String, usize>,
    pub issues: Vec<DataQualityIssue>,
}

impl PartitionSummary {
    pub fn from_frame(
        kind: PartitionKind,
        df: &DataFrame,
        target: &str,
        issues: Vec<DataQualityIssue>,
    ) -> Result<Self> {
        let mut class_counts = BTreeMap::new();
        for label in records::class_labels(df, target)? {
            *class_counts.entry(label).or_insert(0) += 1;
        }
        Ok(Self {
            kind,
            rows: df.height(),
            class_counts,
            issues,
        })
    }

    pub fn share(&self, class: &str) -> f64 {
        if self.rows == 0 {
            return 0.0;
        }
        self.class_counts.get(class).copied().unwrap_or(0) as f64 / self.rows as f64
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: EncodingMode,
    pub columns: Vec<String>,
    pub partitions: Vec<PartitionSummary>,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub input_rows: usize,
    pub target: String,
    pub runs: Vec<RunReport>,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input rows: {}", self.input_rows)?;
        for run in &self.runs {
            writeln!(f, "[{}] {} columns", run.mode, run.columns.len())?;
            for partition in &run.partitions {
                writeln!(f, "  {:<10} {:>6} rows", partition.kind.name(), partition.rows)?;
                for (class, count) in &partition.class_counts {
                    writeln!(
                        f,
                        "    {}={:<6} {:>6} ({:.2}%)",
                        self.target,
                        class,
                        count,
                        100.0 * partition.share(class)
                    )?;
                }
                for issue in &partition.issues {
                    writeln!(f, "    ! {}", issue)?;
                }
            }
        }
        Ok(())
    }
}

/// Resident memory of this process in bytes, 0 if unavailable.
pub fn monitor_memory() -> u64 {
    let Ok(pid) = get_current_pid() else {
        return 0;
    };
    let mut system = System::new();
    system.refresh_process(pid);
    system.process(pid).map_or(0, |process| process.memory())
}
