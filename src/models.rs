use std::fmt;

use serde::Serialize;

use crate::category::CalculationMethod;

/// A raw spreadsheet cell as loaded, before any cleaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Number(n) => n.is_nan(),
            Cell::Text(_) => false,
        }
    }

    /// Stringified value, `None` for missing cells.
    pub fn text(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

/// Summed amount for one entity within one scope (a period, or overall).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub entity_name: String,
    pub period_label: Option<String>,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsResult {
    pub entity_name: String,
    pub total_amount: f64,
    pub percentage_or_rate: f64,
    pub earnings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReport {
    pub period_label: String,
    pub results: Vec<EarningsResult>,
}

/// Everything the renderer needs for one category run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsReport {
    pub category: String,
    pub method: CalculationMethod,
    pub periods: Vec<PeriodReport>,
    pub overall: Vec<EarningsResult>,
}

impl EarningsReport {
    pub fn total_amount(&self) -> f64 {
        self.overall.iter().map(|r| r.total_amount).sum()
    }

    pub fn total_earnings(&self) -> f64 {
        self.overall.iter().map(|r| r.earnings).sum()
    }
}
