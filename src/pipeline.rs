use log::{debug, info};
use polars::prelude::DataFrame;

use crate::config::{EncodingMode, PipelineConfig};
use crate::error::Result;
use crate::io;
use crate::report::{DataQualityIssue, PartitionSummary, PipelineReport, RunReport};
use crate::split::{PartitionKind, SplitPartitions, StratifiedSplitter};
use crate::stats::FitStatistics;
use crate::transform::{drop_present, Preprocessor, Transformed};

/// Transformed partitions of one encoding run, all produced from the same statistics.
#[derive(Debug, Clone)]
pub struct EncodedRun {
    pub mode: EncodingMode,
    pub statistics: FitStatistics,
    pub train: Transformed,
    pub validation: Transformed,
    pub test: Transformed,
}

impl EncodedRun {
    pub fn get(&self, kind: PartitionKind) -> &Transformed {
        match kind {
            PartitionKind::Train => &self.train,
            PartitionKind::Validation => &self.validation,
            PartitionKind::Test => &self.test,
        }
    }
}

/// Result of [`Pipeline::prepare`]: the split plus one run per selected encoding mode.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub split: SplitPartitions,
    pub runs: Vec<EncodedRun>,
}

/// Load, split, fit on train, transform every partition, persist and report.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run end to end against the configured paths.
    pub fn run(&self) -> Result<PipelineReport> {
        let raw = io::read_csv(&self.config.raw_path, &self.config)?;
        let prepared = self.prepare(&raw)?;
        self.persist(&prepared)?;
        self.report(raw.height(), &prepared)
    }

    /// Split once, then fit and transform for every selected encoding mode. No I/O.
    pub fn prepare(&self, raw: &DataFrame) -> Result<Prepared> {
        let split = self.split(raw)?;
        let runs = self
            .config
            .encoding
            .modes()
            .into_iter()
            .map(|mode| self.encode(&split, mode))
            .collect::<Result<Vec<_>>>()?;
        Ok(Prepared { split, runs })
    }

    /// Stratified split followed by removal of the configured uninformative fields.
    pub fn split(&self, raw: &DataFrame) -> Result<SplitPartitions> {
        let splitter = StratifiedSplitter::new(
            self.config.target_field.clone(),
            self.config.split,
            self.config.seed,
        )?;
        let split = splitter.split(raw)?;
        info!(
            "train {} rows | validation {} | test {}",
            split.train.height(),
            split.validation.height(),
            split.test.height()
        );
        split.map_frames(|frame| drop_present(frame, &self.config.drop_fields))
    }

    /// Fit on the train partition of `split` and apply the result to all three partitions.
    pub fn encode(&self, split: &SplitPartitions, mode: EncodingMode) -> Result<EncodedRun> {
        let preprocessor = Preprocessor::from_config(&self.config, mode);
        let (fitted, train) = preprocessor.fit_transform(&split.train.frame)?;
        let validation = fitted.transform(&split.validation.frame)?;
        let test = fitted.transform(&split.test.frame)?;

        debug!("[{}] statistics: {:?}", mode, fitted.statistics());

        Ok(EncodedRun {
            mode,
            statistics: fitted.statistics().clone(),
            train,
            validation,
            test,
        })
    }

    pub fn persist(&self, prepared: &Prepared) -> Result<()> {
        for run in &prepared.runs {
            let paths = self.config.outputs.for_mode(run.mode);
            for kind in PartitionKind::ALL {
                let path = paths.for_kind(kind);
                io::write_csv(path, &run.get(kind).frame)?;
                info!(
                    "[{}] saved {}: {} rows to {}",
                    run.mode,
                    kind,
                    run.get(kind).frame.height(),
                    path.display()
                );
            }
        }
        Ok(())
    }

    pub fn report(&self, input_rows: usize, prepared: &Prepared) -> Result<PipelineReport> {
        let target = self.config.target_field.as_str();
        let mut runs = Vec::with_capacity(prepared.runs.len());
        for run in &prepared.runs {
            let mut partitions = Vec::with_capacity(PartitionKind::ALL.len());
            for kind in PartitionKind::ALL {
                let transformed = run.get(kind);
                let mut issues = Vec::new();
                if kind == PartitionKind::Train {
                    issues.extend(run.statistics.fallback_fields().iter().map(|field| {
                        DataQualityIssue::MedianFallback {
                            field: field.clone(),
                            value: self.config.median_fallback,
                        }
                    }));
                }
                issues.extend(transformed.issues.iter().cloned());
                partitions.push(PartitionSummary::from_frame(
                    kind,
                    &transformed.frame,
                    target,
                    issues,
                )?);
            }
            runs.push(RunReport {
                mode: run.mode,
                columns: run
                    .train
                    .frame
                    .get_column_names()
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                partitions,
            });
        }
        Ok(PipelineReport {
            input_rows,
            target: target.to_string(),
            runs,
        })
    }
}
