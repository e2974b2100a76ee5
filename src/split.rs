use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use polars::prelude::{DataFrame, IdxCa, IdxSize, NewChunkedArray};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::SplitFractions;
use crate::error::Result;
use crate::records;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionKind {
    Train,
    Validation,
    Test,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 3] = [
        PartitionKind::Train,
        PartitionKind::Validation,
        PartitionKind::Test,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PartitionKind::Train => "train",
            PartitionKind::Validation => "validation",
            PartitionKind::Test => "test",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One side of the split together with its provenance.
#[derive(Debug, Clone)]
pub struct Partition {
    pub kind: PartitionKind,
    pub frame: DataFrame,
    /// Positions of the rows in the input table.
    pub rows: Vec<usize>,
    /// Requested share of the input.
    pub fraction: f64,
    /// Field the partition was stratified on.
    pub target: String,
}

impl Partition {
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Same provenance, different frame.
    pub fn with_frame(&self, frame: DataFrame) -> Partition {
        Partition {
            kind: self.kind,
            frame,
            rows: self.rows.clone(),
            fraction: self.fraction,
            target: self.target.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitPartitions {
    pub train: Partition,
    pub validation: Partition,
    pub test: Partition,
}

impl SplitPartitions {
    pub fn get(&self, kind: PartitionKind) -> &Partition {
        match kind {
            PartitionKind::Train => &self.train,
            PartitionKind::Validation => &self.validation,
            PartitionKind::Test => &self.test,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        PartitionKind::ALL.into_iter().map(move |kind| self.get(kind))
    }

    /// Apply `f` to every frame, keeping provenance.
    pub fn map_frames<F>(&self, mut f: F) -> Result<SplitPartitions>
    where
        F: FnMut(&DataFrame) -> Result<DataFrame>,
    {
        Ok(SplitPartitions {
            train: self.train.with_frame(f(&self.train.frame)?),
            validation: self.validation.with_frame(f(&self.validation.frame)?),
            test: self.test.with_frame(f(&self.test.frame)?),
        })
    }
}

/// Two-stage stratified split: train off the whole table, then validation and test off the
/// remainder, re-stratified on the remainder's own class counts.
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    target: String,
    fractions: SplitFractions,
    seed: u64,
}

impl StratifiedSplitter {
    pub fn new(target: impl Into<String>, fractions: SplitFractions, seed: u64) -> Result<Self> {
        fractions.validate()?;
        Ok(Self {
            target: target.into(),
            fractions,
            seed,
        })
    }

    pub fn split(&self, df: &DataFrame) -> Result<SplitPartitions> {
        let labels = records::class_labels(df, &self.target)?;
        let all: Vec<usize> = (0..labels.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let (train, rest) = stratified_two_way(&all, &labels, self.fractions.train, &mut rng);
        let (validation, test) = stratified_two_way(
            &rest,
            &labels,
            self.fractions.validation_share_of_remainder(),
            &mut rng,
        );

        debug!(
            "split {} rows into {} / {} / {}",
            labels.len(),
            train.len(),
            validation.len(),
            test.len()
        );

        let partitions = SplitPartitions {
            train: self.partition(df, PartitionKind::Train, train)?,
            validation: self.partition(df, PartitionKind::Validation, validation)?,
            test: self.partition(df, PartitionKind::Test, test)?,
        };
        warn_on_missing_strata(&labels, &partitions);
        Ok(partitions)
    }

    fn partition(&self, df: &DataFrame, kind: PartitionKind, rows: Vec<usize>) -> Result<Partition> {
        let idx = IdxCa::from_vec("", rows.iter().map(|&i| i as IdxSize).collect());
        Ok(Partition {
            kind,
            frame: df.take(&idx)?,
            rows,
            fraction: self.fractions.for_kind(kind),
            target: self.target.clone(),
        })
    }
}

/// Stratified split of `indices` into a `first_fraction` share and the rest.
fn stratified_two_way(
    indices: &[usize],
    labels: &[String],
    first_fraction: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    // nudge past float noise such as 1533 * 0.4999999999999999
    let total = ((indices.len() as f64) * first_fraction + 1e-9).round() as usize;
    let total = total.min(indices.len());

    let mut strata: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for &i in indices {
        strata.entry(labels[i].as_str()).or_default().push(i);
    }
    let counts: Vec<usize> = strata.values().map(Vec::len).collect();
    let quotas = allocate(&counts, total);

    let mut first = Vec::with_capacity(total);
    let mut second = Vec::with_capacity(indices.len() - total);
    for (mut members, quota) in strata.into_values().zip(quotas) {
        members.shuffle(rng);
        let rest = members.split_off(quota);
        first.extend(members);
        second.extend(rest);
    }
    first.shuffle(rng);
    second.shuffle(rng);
    (first, second)
}

/// Largest-remainder apportionment of `total` slots across strata of size `counts`.
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return vec![0; counts.len()];
    }

    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * total as f64 / n as f64)
        .collect();
    let mut quotas: Vec<usize> = exact
        .iter()
        .zip(counts)
        .map(|(e, &c)| (e.floor() as usize).min(c))
        .collect();
    let mut remaining = total.saturating_sub(quotas.iter().sum());

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });
    while remaining > 0 {
        let before = remaining;
        for &i in &order {
            if remaining == 0 {
                break;
            }
            if quotas[i] < counts[i] {
                quotas[i] += 1;
                remaining -= 1;
            }
        }
        if remaining == before {
            break;
        }
    }
    quotas
}

fn warn_on_missing_strata(labels: &[String], partitions: &SplitPartitions) {
    let classes: Vec<&str> = {
        let mut classes: Vec<&str> = labels.iter().map(String::as_str).collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    };
    for partition in partitions.iter().filter(|p| p.fraction > 0.0) {
        for class in &classes {
            if !partition.rows.iter().any(|&i| labels[i] == *class) {
                warn!(
                    "class {:?} of {:?} has no rows in the {} partition",
                    class, partition.target, partition.kind
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;
    use std::collections::HashSet;

    fn labeled_frame(positives: usize, negatives: usize) -> DataFrame {
        let n = positives + negatives;
        let ids: Vec<i64> = (0..n as i64).collect();
        // spread positives through the table instead of bunching them at the start
        let stroke: Vec<i64> = (0..n)
            .map(|i| if i * positives / n != (i + 1) * positives / n { 1 } else { 0 })
            .collect();
        df!("id" => ids, "stroke" => stroke).unwrap()
    }

    fn positives(partition: &Partition) -> usize {
        records::class_labels(&partition.frame, "stroke")
            .unwrap()
            .iter()
            .filter(|l| l.as_str() == "1")
            .count()
    }

    #[test]
    fn test_allocate_largest_remainder() {
        assert_eq!(allocate(&[249, 4861], 3577), vec![174, 3403]);
        assert_eq!(allocate(&[75, 1458], 767), vec![38, 729]);
        assert_eq!(allocate(&[], 0), Vec::<usize>::new());
        assert_eq!(allocate(&[3], 3), vec![3]);
    }

    #[test]
    fn test_partitions_are_disjoint_and_cover_input() {
        let df = labeled_frame(249, 4861);
        let splitter = StratifiedSplitter::new("stroke", SplitFractions::default(), 42).unwrap();
        let parts = splitter.split(&df).unwrap();

        let mut seen = HashSet::new();
        for partition in parts.iter() {
            assert_eq!(partition.rows.len(), partition.height());
            for &row in &partition.rows {
                assert!(seen.insert(row), "row {} assigned twice", row);
            }
        }
        assert_eq!(seen.len(), df.height());
    }

    #[test]
    fn test_partition_sizes_and_strata_match_reference_scenario() {
        let df = labeled_frame(249, 4861);
        let splitter = StratifiedSplitter::new("stroke", SplitFractions::default(), 42).unwrap();
        let parts = splitter.split(&df).unwrap();

        assert_eq!(parts.train.height(), 3577);
        assert_eq!(parts.validation.height(), 767);
        assert_eq!(parts.test.height(), 766);

        let base = 249.0 / 5110.0;
        for partition in parts.iter() {
            let share = positives(partition) as f64 / partition.height() as f64;
            assert!(
                (share - base).abs() < 0.02,
                "{} positive share {} too far from {}",
                partition.kind,
                share,
                base
            );
        }
        assert_eq!(positives(&parts.train), 174);
    }

    #[test]
    fn test_rows_follow_frame_contents() {
        let df = labeled_frame(10, 90);
        let splitter = StratifiedSplitter::new("stroke", SplitFractions::default(), 1).unwrap();
        let parts = splitter.split(&df).unwrap();

        let ids: Vec<i64> = parts
            .test
            .frame
            .column("id")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let expected: Vec<i64> = parts.test.rows.iter().map(|&r| r as i64).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_same_seed_reproduces_split() {
        let df = labeled_frame(30, 170);
        let a = StratifiedSplitter::new("stroke", SplitFractions::default(), 7)
            .unwrap()
            .split(&df)
            .unwrap();
        let b = StratifiedSplitter::new("stroke", SplitFractions::default(), 7)
            .unwrap()
            .split(&df)
            .unwrap();
        let c = StratifiedSplitter::new("stroke", SplitFractions::default(), 8)
            .unwrap()
            .split(&df)
            .unwrap();

        for kind in PartitionKind::ALL {
            assert_eq!(a.get(kind).rows, b.get(kind).rows);
        }
        assert_ne!(a.train.rows, c.train.rows);
    }

    #[test]
    fn test_tiny_class_still_splits() {
        // two positives cannot reach all three partitions
        let df = labeled_frame(2, 18);
        let splitter = StratifiedSplitter::new("stroke", SplitFractions::default(), 3).unwrap();
        let parts = splitter.split(&df).unwrap();

        let total: usize = parts.iter().map(positives).sum();
        assert_eq!(total, 2);
        assert_eq!(parts.iter().map(Partition::height).sum::<usize>(), 20);
    }

    #[test]
    fn test_full_allocation_leaves_test_empty() {
        let df = labeled_frame(20, 80);
        let fractions = SplitFractions {
            train: 0.8,
            validation: 0.2,
        };
        let parts = StratifiedSplitter::new("stroke", fractions, 11)
            .unwrap()
            .split(&df)
            .unwrap();

        assert_eq!(parts.train.height(), 80);
        assert_eq!(parts.validation.height(), 20);
        assert_eq!(parts.test.height(), 0);
        assert_eq!(positives(&parts.validation), 4);
    }

    #[test]
    fn test_missing_target_is_config_error() {
        let df = df!("id" => &[1i64, 2, 3]).unwrap();
        let splitter = StratifiedSplitter::new("stroke", SplitFractions::default(), 0).unwrap();
        let err = splitter.split(&df).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_string_targets_are_stratified() {
        let labels: Vec<&str> = (0..100).map(|i| if i % 4 == 0 { "yes" } else { "no" }).collect();
        let df = df!("label" => labels).unwrap();
        let splitter = StratifiedSplitter::new("label", SplitFractions::default(), 5).unwrap();
        let parts = splitter.split(&df).unwrap();

        let yes = records::class_labels(&parts.train.frame, "label")
            .unwrap()
            .iter()
            .filter(|l| l.as_str() == "yes")
            .count();
        assert_eq!(parts.train.height(), 70);
        assert_eq!(yes, 17);
    }
}
