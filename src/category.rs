use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::period::PERIOD_COLUMN;
use crate::table::Table;

// ---------------------------------------------------------------------------
// Calculation method
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    Percentage,
    FlatRate,
    SumOnly,
    Custom,
}

impl CalculationMethod {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::FlatRate => "flat_rate",
            Self::SumOnly => "sum_only",
            Self::Custom => "custom",
        }
    }

    /// Unrecognized names map to `Custom`, which calculates nothing.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "percentage" | "percent" => Self::Percentage,
            "flat_rate" | "flat" => Self::FlatRate,
            "sum_only" | "sum" | "totals" => Self::SumOnly,
            _ => Self::Custom,
        }
    }

    /// The entry type a user-typed value gets under this method.
    pub fn entry_kind(&self) -> EntryKind {
        match self {
            Self::Percentage => EntryKind::Percentage,
            Self::FlatRate => EntryKind::FlatRate,
            Self::SumOnly | Self::Custom => EntryKind::Value,
        }
    }

    fn accepts(&self, kind: EntryKind) -> bool {
        match self {
            Self::Percentage => kind == EntryKind::Percentage,
            Self::FlatRate => kind == EntryKind::FlatRate,
            Self::SumOnly | Self::Custom => true,
        }
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Entity configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Percentage,
    FlatRate,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub value: f64,
}

impl ConfigEntry {
    pub fn percentage(value: f64) -> Self {
        Self { kind: EntryKind::Percentage, value }
    }

    pub fn flat_rate(value: f64) -> Self {
        Self { kind: EntryKind::FlatRate, value }
    }
}

/// Entity display name (as the user typed it) to its rate.
pub type EntityConfig = BTreeMap<String, ConfigEntry>;

/// The rate method every entry of `config` was typed for, if they all agree.
pub fn implied_method(config: &EntityConfig) -> Option<CalculationMethod> {
    let mut kinds = config.values().map(|e| e.kind);
    let first = kinds.next()?;
    if kinds.any(|k| k != first) {
        return None;
    }
    match first {
        EntryKind::Percentage => Some(CalculationMethod::Percentage),
        EntryKind::FlatRate => Some(CalculationMethod::FlatRate),
        EntryKind::Value => None,
    }
}

// ---------------------------------------------------------------------------
// Category rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub entity_column: String,
    pub amount_columns: Vec<String>,
    #[serde(default)]
    pub grouping_columns: Vec<String>,
    pub calculation_method: CalculationMethod,
    #[serde(default = "default_true")]
    pub config_required: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

fn default_confidence() -> f64 {
    1.0
}

pub const DISPATCHER_EARNINGS: &str = "Dispatcher Earnings";
pub const DRIVER_PAYMENTS: &str = "Driver Payments";
pub const BROKER_PERFORMANCE: &str = "Broker Performance";

pub fn category_id(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

impl CategoryRule {
    pub fn new(
        name: &str,
        entity_column: &str,
        amount_columns: Vec<String>,
        calculation_method: CalculationMethod,
    ) -> Self {
        Self {
            name: name.to_string(),
            entity_column: entity_column.to_string(),
            amount_columns,
            grouping_columns: Vec::new(),
            calculation_method,
            config_required: !matches!(calculation_method, CalculationMethod::SumOnly),
            confidence: 1.0,
            description: String::new(),
        }
    }

    pub fn dispatcher(entity_column: &str, amount_columns: Vec<String>) -> Self {
        Self {
            description: "Calculate earnings for each dispatcher based on their revenue percentage"
                .to_string(),
            ..Self::new(DISPATCHER_EARNINGS, entity_column, amount_columns, CalculationMethod::Percentage)
        }
    }

    pub fn driver(entity_column: &str, amount_columns: Vec<String>) -> Self {
        Self {
            description: "Calculate payments for each driver based on their revenue".to_string(),
            ..Self::new(DRIVER_PAYMENTS, entity_column, amount_columns, CalculationMethod::Percentage)
        }
    }

    pub fn broker(entity_column: &str, amount_columns: Vec<String>) -> Self {
        Self {
            description: "Analyze revenue by broker/customer (totals only)".to_string(),
            ..Self::new(BROKER_PERFORMANCE, entity_column, amount_columns, CalculationMethod::SumOnly)
        }
    }

    pub fn id(&self) -> String {
        category_id(&self.name)
    }

    pub fn with_grouping(mut self, columns: Vec<String>) -> Self {
        self.grouping_columns = columns;
        self
    }

    /// Switches between percentage and flat rate to match how the stored
    /// configuration was entered. Other methods are left alone.
    pub fn with_config_method(mut self, config: Option<&EntityConfig>) -> Self {
        let rate_based = matches!(
            self.calculation_method,
            CalculationMethod::Percentage | CalculationMethod::FlatRate
        );
        if let Some(method) = config.and_then(implied_method).filter(|_| rate_based) {
            self.calculation_method = method;
        }
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim();
        self.name.eq_ignore_ascii_case(q) || self.id() == category_id(q)
    }

    /// Checks that every column this rule names exists in `table`. The derived
    /// period column is exempt because the pipeline adds it.
    pub fn validate_against(&self, table: &Table) -> Result<()> {
        if !table.has_column(&self.entity_column) {
            return Err(TallyError::MissingColumn {
                role: "entity",
                column: self.entity_column.clone(),
            });
        }
        if self.amount_columns.is_empty() {
            return Err(TallyError::NoColumn("amount", "Amount, Total or Revenue"));
        }
        for col in &self.amount_columns {
            if !table.has_column(col) {
                return Err(TallyError::MissingColumn { role: "amount", column: col.clone() });
            }
        }
        for col in &self.grouping_columns {
            if col != PERIOD_COLUMN && !table.has_column(col) {
                return Err(TallyError::MissingColumn { role: "grouping", column: col.clone() });
            }
        }
        Ok(())
    }

    /// Validates a configuration submission as a unit. Every problem is
    /// reported; nothing is accepted if any entry is bad.
    pub fn validate_config(&self, config: &EntityConfig) -> Result<()> {
        let mut problems = Vec::new();

        if config.is_empty() && self.config_required {
            problems.push(format!("{} needs at least one entity", self.name));
        }

        let mut seen = HashSet::new();
        for (entity, entry) in config {
            if entity.trim().is_empty() {
                problems.push("entity name is empty".to_string());
            }
            if !seen.insert(entity.to_lowercase()) {
                problems.push(format!("'{entity}' is listed more than once (names ignore case)"));
            }
            if !self.calculation_method.accepts(entry.kind) {
                problems.push(format!(
                    "'{entity}' has a {:?} value but {} uses {}",
                    entry.kind, self.name, self.calculation_method
                ));
            }
            if !entry.value.is_finite() || entry.value < 0.0 {
                problems.push(format!("'{entity}' must not be negative (got {})", entry.value));
            } else if entry.kind == EntryKind::Percentage && entry.value > 100.0 {
                problems.push(format!("'{entity}' percentage must be 0-100 (got {})", entry.value));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TallyError::InvalidConfig(problems))
        }
    }
}

// ---------------------------------------------------------------------------
// Advisory proposals
// ---------------------------------------------------------------------------

/// A category as proposed by the advisory service, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposedRule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub entity_column: String,
    #[serde(default)]
    pub amount_columns: Vec<String>,
    #[serde(default)]
    pub grouping_columns: Vec<String>,
    #[serde(default)]
    pub calculation_method: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl ProposedRule {
    /// Turns a proposal into a rule, or `None` if it names columns that do not
    /// exist. Well-known names get their preset method; anything else uses
    /// the proposed method, defaulting to percentage.
    pub fn normalize(self, table: &Table) -> Option<CategoryRule> {
        let name = self.name.trim();
        if name.is_empty() || !(0.0..=1.0).contains(&self.confidence) {
            return None;
        }
        let amounts: Vec<String> = self.amount_columns.iter().map(|c| c.trim().to_string()).collect();
        let entity = self.entity_column.trim();

        let lower = name.to_lowercase();
        let mut rule = if lower.contains("dispatch") {
            CategoryRule::dispatcher(entity, amounts)
        } else if lower.contains("driver") {
            CategoryRule::driver(entity, amounts)
        } else if lower.contains("broker") {
            CategoryRule::broker(entity, amounts)
        } else {
            let method = self
                .calculation_method
                .as_deref()
                .map(CalculationMethod::parse)
                .unwrap_or(CalculationMethod::Percentage);
            CategoryRule::new(name, entity, amounts, method)
        };
        if !self.description.trim().is_empty() {
            rule.description = self.description.trim().to_string();
        }
        rule.grouping_columns = self.grouping_columns;
        rule.confidence = self.confidence;

        rule.validate_against(table).ok()?;
        Some(rule)
    }
}
