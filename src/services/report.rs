//! Final score report: text tables and a JSON snapshot.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CompetitionTemplate, MetricScores, ScoreMatrix};

const NO_SCORE: &str = "no score";

/// One-line rendering of a worker's averages.
pub fn format_scores(scores: Option<&MetricScores>) -> String {
    match scores {
        None => NO_SCORE.to_string(),
        Some(scores) => scores
            .iter()
            .map(|(key, value)| format!("{key}={value:.2}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[derive(Serialize)]
struct ReportSnapshot<'a> {
    template_id: &'a str,
    worker_ids: &'a [String],
    student_averages: Vec<Option<MetricScores>>,
    master_averages: Vec<Option<MetricScores>>,
    matrix: &'a ScoreMatrix,
}

/// Scores of a finished (or partially finished) experiment.
pub struct ScoreReport {
    template: CompetitionTemplate,
    worker_ids: Vec<String>,
    scores: ScoreMatrix,
}

impl ScoreReport {
    /// Report over a matrix indexed like `worker_ids`.
    pub fn new(template: CompetitionTemplate, worker_ids: Vec<String>, scores: ScoreMatrix) -> Self {
        Self { template, worker_ids, scores }
    }

    /// The underlying matrix.
    pub fn scores(&self) -> &ScoreMatrix {
        &self.scores
    }

    /// Rows are workers, columns metrics. Workers without duels read "no score".
    pub fn averages_table(&self, averages: &[Option<MetricScores>]) -> Table {
        let mut headers = vec!["WORKER".to_string()];
        headers.extend(self.scores.metric_keys().iter().map(|k| k.to_uppercase()));
        let mut table = new_table(&headers);

        for (worker, scores) in self.worker_ids.iter().zip(averages) {
            let mut row = vec![Cell::new(worker)];
            for key in self.scores.metric_keys() {
                let text = scores
                    .as_ref()
                    .and_then(|s| s.get(key))
                    .map_or_else(|| NO_SCORE.to_string(), |v| format!("{v:.3}"));
                row.push(Cell::new(text).set_alignment(CellAlignment::Right));
            }
            table.add_row(row);
        }
        table
    }

    /// Master (rows) by student (columns) averages of one metric, or of the
    /// mean over all metrics when `metric` is `None`. Empty cells show "-".
    pub fn heatmap_table(&self, metric: Option<&str>) -> Table {
        let cells = self.scores.average_per_metric_cell();
        let keys: Vec<&String> = match metric {
            Some(metric) => self.scores.metric_keys().iter().filter(|k| *k == metric).collect(),
            None => self.scores.metric_keys().iter().collect(),
        };

        let mut headers = vec!["MASTER \\ STUDENT".to_string()];
        headers.extend(self.worker_ids.iter().cloned());
        let mut table = new_table(&headers);

        for (master, master_id) in self.worker_ids.iter().enumerate() {
            let mut row = vec![Cell::new(master_id)];
            for student in 0..self.worker_ids.len() {
                let text = if self.scores.count(master, student) == 0 || keys.is_empty() {
                    "-".to_string()
                } else {
                    let total: f64 = keys.iter().filter_map(|k| cells.get(*k)).map(|m| m[master][student]).sum();
                    format!("{:.3}", total / keys.len() as f64)
                };
                row.push(Cell::new(text).set_alignment(CellAlignment::Right));
            }
            table.add_row(row);
        }
        table
    }

    /// Every table, ready to print.
    pub fn render(&self) -> String {
        let mut sections = vec![
            format!(
                "{} {} ({} duels scored)",
                style("Competition:").bold(),
                self.template.name(),
                self.scores.total_count()
            ),
            format!("{}\n{}", style("Average scores as student").bold(), self.averages_table(&self.scores.student_averages())),
            format!("{}\n{}", style("Average scores as master").bold(), self.averages_table(&self.scores.master_averages())),
        ];
        for key in self.scores.metric_keys() {
            sections.push(format!("{}\n{}", style(format!("Metric: {key}")).bold(), self.heatmap_table(Some(key))));
        }
        sections.push(format!("{}\n{}", style("Overall mean").bold(), self.heatmap_table(None)));
        sections.join("\n\n")
    }

    /// Snapshot of matrix, worker ids and averages as pretty JSON.
    pub fn to_json(&self) -> DomainResult<String> {
        let snapshot = ReportSnapshot {
            template_id: self.template.id(),
            worker_ids: &self.worker_ids,
            student_averages: self.scores.student_averages(),
            master_averages: self.scores.master_averages(),
            matrix: &self.scores,
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Write `<template_id>_scores.json` into `dir`, creating it if needed.
    pub fn write_json(&self, dir: &Path) -> DomainResult<PathBuf> {
        let path = dir.join(format!("{}_scores.json", self.template.id()));
        let io_err = |e: std::io::Error| DomainError::SerializationError(format!("{}: {e}", path.display()));

        std::fs::create_dir_all(dir).map_err(io_err)?;
        std::fs::write(&path, self.to_json()?).map_err(io_err)?;
        Ok(path)
    }
}

fn new_table(headers: &[String]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(Cell::new));
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ScoreReport {
        let template = CompetitionTemplate::from_id("creative_writing").unwrap();
        let mut scores = ScoreMatrix::new(3, template.metrics());
        let grade = MetricScores::from([
            ("creativity".to_string(), 0.9),
            ("depth".to_string(), 0.6),
            ("flow".to_string(), 0.3),
        ]);
        scores.update(0, 1, &grade).unwrap();
        let workers = vec!["mock:a".to_string(), "mock:b".to_string(), "mock:c".to_string()];
        ScoreReport::new(template, workers, scores)
    }

    #[test]
    fn test_format_scores() {
        assert_eq!(format_scores(None), "no score");
        let scores = MetricScores::from([("depth".to_string(), 0.5), ("clarity".to_string(), 0.25)]);
        assert_eq!(format_scores(Some(&scores)), "clarity=0.25 depth=0.50");
    }

    #[test]
    fn test_render_marks_missing_workers() {
        let rendered = report().render();
        assert!(rendered.contains("Creative Writing"));
        assert!(rendered.contains("no score"));
        assert!(rendered.contains("0.900"));
        assert!(rendered.contains("Overall mean"));
    }

    #[test]
    fn test_overall_heatmap_is_metric_mean() {
        let table = report().heatmap_table(None).to_string();
        assert!(table.contains("0.600"));
    }

    #[test]
    fn test_write_json_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = report().write_json(&dir.path().join("workdir")).unwrap();

        assert!(path.ends_with("creative_writing_scores.json"));
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["worker_ids"][1], "mock:b");
        assert!(json["student_averages"][0].is_null());
        assert_eq!(json["matrix"]["counts"][0][1], 1);
    }
}
