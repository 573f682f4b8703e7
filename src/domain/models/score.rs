//! Score matrices and evaluation-output parsing.
//!
//! A [`ScoreMatrix`] accumulates, for every metric of a competition, an N×N
//! matrix of score sums plus one shared N×N count matrix. Rows are masters
//! (graders), columns are students (answerers). The matrix is always
//! re-derivable from the persisted duel results, so it is never the only
//! copy of the data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::competition::MetricSet;
use crate::domain::errors::{DomainError, DomainResult};

/// Metric name → score in `[0.0, 1.0]`.
pub type MetricScores = BTreeMap<String, f64>;

/// Errors raised while turning a master's evaluation text into scores.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreParseError {
    /// No `{`...`}` pair in the output.
    #[error("cannot find a JSON object in evaluation output")]
    MissingJson,

    /// The extracted fragment is not a JSON object.
    #[error("invalid JSON '{fragment}': {reason}")]
    InvalidJson { fragment: String, reason: String },

    /// A declared metric has no value.
    #[error("metric '{0}' is missing from evaluation output")]
    MissingMetric(String),

    /// A key outside the declared metric set.
    #[error("unexpected metric '{0}' in evaluation output")]
    UnexpectedMetric(String),

    /// A metric value is not numeric.
    #[error("metric '{metric}' is not a number: {value}")]
    NotANumber { metric: String, value: String },

    /// A metric value lies outside `[0, 1]`.
    #[error("metric '{metric}' is out of range [0, 1]: {value}")]
    OutOfRange { metric: String, value: f64 },
}

/// Return the substring from the first `{` up to the first `}` after it.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw[start + 1..].find('}')? + start + 1;
    Some(&raw[start..=end])
}

/// Parse a master's evaluation response against the competition's metric set.
///
/// Surrounding prose is tolerated; the object itself must contain exactly the
/// declared metrics, each a number in `[0.0, 1.0]`.
pub fn parse_scores(raw: &str, metrics: &MetricSet) -> Result<MetricScores, ScoreParseError> {
    let fragment = extract_json_object(raw).ok_or(ScoreParseError::MissingJson)?;

    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(fragment)
        .map_err(|e| ScoreParseError::InvalidJson {
            fragment: fragment.to_string(),
            reason: e.to_string(),
        })?;

    if let Some(unexpected) = object.keys().find(|key| !metrics.contains(key)) {
        return Err(ScoreParseError::UnexpectedMetric(unexpected.clone()));
    }

    let mut scores = MetricScores::new();
    for metric in metrics.keys() {
        let value = object
            .get(metric)
            .ok_or_else(|| ScoreParseError::MissingMetric(metric.clone()))?;
        let score = value.as_f64().ok_or_else(|| ScoreParseError::NotANumber {
            metric: metric.clone(),
            value: value.to_string(),
        })?;
        if !(0.0..=1.0).contains(&score) {
            return Err(ScoreParseError::OutOfRange {
                metric: metric.clone(),
                value: score,
            });
        }
        scores.insert(metric.clone(), score);
    }

    Ok(scores)
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    /// Reduce over masters: one value per student.
    Students,
    /// Reduce over students: one value per master.
    Masters,
}

/// Per-metric sum matrices with a shared count matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMatrix {
    n_workers: usize,
    metric_keys: Vec<String>,
    sums: BTreeMap<String, Vec<Vec<f64>>>,
    counts: Vec<Vec<u32>>,
}

impl ScoreMatrix {
    /// All-zero matrix for `n_workers` and the competition's metrics.
    pub fn new(n_workers: usize, metrics: &MetricSet) -> Self {
        let sums = metrics
            .keys()
            .iter()
            .map(|key| (key.clone(), vec![vec![0.0; n_workers]; n_workers]))
            .collect();

        Self {
            n_workers,
            metric_keys: metrics.keys().to_vec(),
            sums,
            counts: vec![vec![0; n_workers]; n_workers],
        }
    }

    /// Matrix side length.
    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Metrics tracked per cell.
    pub fn metric_keys(&self) -> &[String] {
        &self.metric_keys
    }

    /// Add one duel's scores to the (master, student) cell.
    ///
    /// The update is all-or-nothing: the scores must cover exactly the
    /// matrix's metrics, otherwise nothing is recorded.
    pub fn update(&mut self, master: usize, student: usize, scores: &MetricScores) -> DomainResult<()> {
        if master >= self.n_workers || student >= self.n_workers {
            return Err(DomainError::ValidationFailed(format!(
                "cell ({master}, {student}) outside a {n}x{n} score matrix",
                n = self.n_workers
            )));
        }
        if scores.len() != self.metric_keys.len()
            || scores.keys().any(|key| !self.sums.contains_key(key))
        {
            return Err(DomainError::ValidationFailed(format!(
                "scores {:?} do not match metrics {:?}",
                scores.keys().collect::<Vec<_>>(),
                self.metric_keys
            )));
        }

        for (key, value) in scores {
            if let Some(matrix) = self.sums.get_mut(key) {
                matrix[master][student] += value;
            }
        }
        self.counts[master][student] += 1;
        Ok(())
    }

    /// Results recorded for one (master, student) cell; 0 when out of range.
    pub fn count(&self, master: usize, student: usize) -> u32 {
        self.counts
            .get(master)
            .and_then(|row| row.get(student))
            .copied()
            .unwrap_or(0)
    }

    /// Results recorded across all cells.
    pub fn total_count(&self) -> u64 {
        self.counts.iter().flatten().map(|&c| u64::from(c)).sum()
    }

    /// Raw sum of `metric` in one cell.
    pub fn sum(&self, metric: &str, master: usize, student: usize) -> Option<f64> {
        self.sums.get(metric)?.get(master)?.get(student).copied()
    }

    /// Elementwise sum/count per metric. Empty cells divide by one and so
    /// read as a plain zero.
    pub fn average_per_metric_cell(&self) -> BTreeMap<String, Vec<Vec<f64>>> {
        self.sums
            .iter()
            .map(|(key, matrix)| {
                let averaged = matrix
                    .iter()
                    .zip(&self.counts)
                    .map(|(row, counts)| {
                        row.iter()
                            .zip(counts)
                            .map(|(&sum, &count)| sum / f64::from(count.max(1)))
                            .collect()
                    })
                    .collect();
                (key.clone(), averaged)
            })
            .collect()
    }

    /// How well each worker answered, across all masters.
    pub fn student_averages(&self) -> Vec<Option<MetricScores>> {
        self.axis_averages(Axis::Students)
    }

    /// How each worker graded, across all students.
    pub fn master_averages(&self) -> Vec<Option<MetricScores>> {
        self.axis_averages(Axis::Masters)
    }

    fn axis_averages(&self, axis: Axis) -> Vec<Option<MetricScores>> {
        (0..self.n_workers)
            .map(|worker| {
                let cells: Vec<(usize, usize)> = (0..self.n_workers)
                    .map(|other| match axis {
                        Axis::Students => (other, worker),
                        Axis::Masters => (worker, other),
                    })
                    .collect();

                let count: u64 = cells
                    .iter()
                    .map(|&(m, s)| u64::from(self.counts[m][s]))
                    .sum();
                if count == 0 {
                    return None;
                }

                let averages = self
                    .sums
                    .iter()
                    .map(|(key, matrix)| {
                        let total: f64 = cells.iter().map(|&(m, s)| matrix[m][s]).sum();
                        (key.clone(), total / count as f64)
                    })
                    .collect();
                Some(averages)
            })
            .collect()
    }

    /// Compare two matrices, allowing for floating-point summation order.
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.n_workers == other.n_workers
            && self.metric_keys == other.metric_keys
            && self.counts == other.counts
            && self.sums.iter().all(|(key, matrix)| {
                other.sums.get(key).is_some_and(|theirs| {
                    matrix
                        .iter()
                        .flatten()
                        .zip(theirs.iter().flatten())
                        .all(|(a, b)| (a - b).abs() <= epsilon)
                })
            })
    }
}
