use std::collections::HashMap;
use std::fmt::{self, Display};

use serde::Serialize;
use thiserror::Error;

/// Placeholder for undefined efficiencies
pub const NO_EFFICIENCY: &str = "—";

/// Misuse of cutflow stage names
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum CutFlowError {
    #[error("Cutflow stage `{0}` is already registered")]
    Duplicate(String),
    #[error("Cutflow stage `{0}` is not registered")]
    Unknown(String),
}

/// A single selection stage
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stage {
    pub key: String,
    pub label: String,
    pub count: f64,
}

/// Ordered event counters for consecutive selection stages
///
/// Stages are kept in the order in which they are registered. The
/// first stage serves as the baseline for the skim efficiency.
#[derive(Clone, Debug, Default)]
pub struct CutFlow {
    stages: Vec<Stage>,
    index: HashMap<String, usize>,
}

impl CutFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stage with zero count
    pub fn add(
        &mut self,
        key: &str,
        label: &str,
    ) -> Result<(), CutFlowError> {
        self.add_static(key, label, 0.)
    }

    /// Register a new stage with a count that is known beforehand
    ///
    /// This is mostly useful for the number of events before any
    /// preselection, which is not visible to the analysis itself.
    pub fn add_static(
        &mut self,
        key: &str,
        label: &str,
        count: f64,
    ) -> Result<(), CutFlowError> {
        if self.index.contains_key(key) {
            return Err(CutFlowError::Duplicate(key.to_owned()));
        }
        self.index.insert(key.to_owned(), self.stages.len());
        self.stages.push(Stage {
            key: key.to_owned(),
            label: label.to_owned(),
            count,
        });
        Ok(())
    }

    pub fn increment(&mut self, key: &str) -> Result<(), CutFlowError> {
        let idx = self.position(key)?;
        self.stages[idx].count += 1.;
        Ok(())
    }

    /// Increment the first `depth` stages in `keys`
    ///
    /// `depth` is the number of consecutive cuts passed by the best
    /// candidate in the current event.
    pub fn increment_chain(
        &mut self,
        keys: &[&str],
        depth: usize,
    ) -> Result<(), CutFlowError> {
        for key in &keys[..depth.min(keys.len())] {
            self.increment(key)?;
        }
        Ok(())
    }

    pub fn count(&self, key: &str) -> Result<f64, CutFlowError> {
        self.position(key).map(|idx| self.stages[idx].count)
    }

    /// Position of the stage with the given name
    pub fn position(&self, key: &str) -> Result<usize, CutFlowError> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| CutFlowError::Unknown(key.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Stage] {
        self.stages.as_slice()
    }

    /// Fraction of events passing stage `i` relative to the first stage, in per cent
    ///
    /// Returns `None` for the first stage and if the first stage is empty.
    pub fn skim_efficiency(&self, i: usize) -> Option<f64> {
        if i == 0 || i >= self.len() {
            return None;
        }
        percentage(self.stages[i].count, self.stages[0].count)
    }

    /// Fraction of events passing stage `i` relative to stage `i - 1`, in per cent
    ///
    /// Returns `None` for the first stage and if the previous stage is empty.
    pub fn relative_efficiency(&self, i: usize) -> Option<f64> {
        if i == 0 || i >= self.len() {
            return None;
        }
        percentage(self.stages[i].count, self.stages[i - 1].count)
    }

    pub fn report(&self) -> CutFlowReport {
        let rows = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| CutFlowRow {
                label: stage.label.clone(),
                count: stage.count,
                skim_efficiency: self.skim_efficiency(i),
                relative_efficiency: self.relative_efficiency(i),
            })
            .collect();
        CutFlowReport(rows)
    }
}

fn percentage(num: f64, denom: f64) -> Option<f64> {
    if denom == 0. {
        None
    } else {
        Some(100. * num / denom)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CutFlowRow {
    pub label: String,
    pub count: f64,
    pub skim_efficiency: Option<f64>,
    pub relative_efficiency: Option<f64>,
}

/// Table of all cutflow stages with their efficiencies
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CutFlowReport(pub Vec<CutFlowRow>);

impl CutFlowReport {
    pub fn rows(&self) -> &[CutFlowRow] {
        self.0.as_slice()
    }
}

fn fmt_efficiency(eff: Option<f64>) -> String {
    match eff {
        Some(eff) => format!("{eff:.2}%"),
        None => NO_EFFICIENCY.to_owned(),
    }
}

impl Display for CutFlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .0
            .iter()
            .map(|row| row.label.chars().count())
            .chain(std::iter::once("Selection".len()))
            .max()
            .unwrap_or_default();
        writeln!(
            f,
            "{:<width$} | {:>12} | {:>9} | {:>9}",
            "Selection", "Events", "Skim", "Relative"
        )?;
        writeln!(f, "{}", "-".repeat(width + 41))?;
        for row in &self.0 {
            writeln!(
                f,
                "{:<width$} | {:>12} | {:>9} | {:>9}",
                row.label,
                row.count,
                fmt_efficiency(row.skim_efficiency),
                fmt_efficiency(row.relative_efficiency)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_stages() -> CutFlow {
        let mut cutflow = CutFlow::new();
        cutflow.add_static("total", "Total events", 10.).unwrap();
        cutflow.add("trigger", "Trigger").unwrap();
        cutflow.add("vertex", "Good vertex").unwrap();
        cutflow
    }

    #[test]
    fn register() {
        let mut cutflow = three_stages();
        assert_eq!(cutflow.len(), 3);
        assert_eq!(
            cutflow.add("trigger", "again"),
            Err(CutFlowError::Duplicate("trigger".to_owned()))
        );
        assert_eq!(
            cutflow.increment("muons"),
            Err(CutFlowError::Unknown("muons".to_owned()))
        );
        assert!(cutflow.count("muons").is_err());
        assert_eq!(cutflow.position("vertex"), Ok(2));
    }

    #[test]
    fn efficiencies() {
        let mut cutflow = three_stages();
        assert_eq!(cutflow.skim_efficiency(1), Some(0.));
        assert_eq!(cutflow.relative_efficiency(2), None);
        for _ in 0..4 {
            cutflow.increment("trigger").unwrap();
        }
        cutflow.increment_chain(&["vertex"], 1).unwrap();
        assert_eq!(cutflow.count("total"), Ok(10.));
        assert_eq!(cutflow.count("trigger"), Ok(4.));
        assert_eq!(cutflow.count("vertex"), Ok(1.));
        assert_eq!(cutflow.skim_efficiency(0), None);
        assert_eq!(cutflow.skim_efficiency(1), Some(40.));
        assert_eq!(cutflow.skim_efficiency(2), Some(10.));
        assert_eq!(cutflow.relative_efficiency(0), None);
        assert_eq!(cutflow.relative_efficiency(2), Some(25.));
        assert_eq!(cutflow.skim_efficiency(3), None);
    }

    #[test]
    fn chain_depth() {
        let mut cutflow = CutFlow::new();
        let keys = ["a", "b", "c"];
        for key in keys {
            cutflow.add(key, key).unwrap();
        }
        cutflow.increment_chain(&keys, 2).unwrap();
        cutflow.increment_chain(&keys, 0).unwrap();
        cutflow.increment_chain(&keys, 5).unwrap();
        let counts: Vec<_> = cutflow.stages().iter().map(|s| s.count).collect();
        assert_eq!(counts, [2., 2., 1.]);
    }

    #[test]
    fn table() {
        let mut cutflow = CutFlow::new();
        cutflow.add("all", "All events").unwrap();
        cutflow.add("trigger", "Trigger").unwrap();
        let report = cutflow.report();
        assert_eq!(report.rows().len(), 2);
        let table = report.to_string();
        assert!(table.contains("All events"));
        assert!(table.contains(NO_EFFICIENCY));
        assert!(!table.contains('%'));
    }
}
