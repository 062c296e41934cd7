use serde::Serialize;

use crate::category::CategoryRule;
use crate::models::Cell;
use crate::period::PERIOD_COLUMN;
use crate::table::Table;

const ENTITY_KEYWORDS: &[&str] = &["name", "dispatch", "driver", "broker", "customer", "vendor"];
const AMOUNT_KEYWORDS: &[&str] = &["amount", "total", "revenue", "pay", "earning", "salary", "rate"];
const MARKER_KEYWORDS: &[&str] = &["broker"];

const SAMPLE_LIMIT: usize = 10;
const FALLBACK_CONFIDENCE: f64 = 0.8;

fn matches_any(column: &str, keywords: &[&str]) -> bool {
    let lower = column.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnRoles {
    pub entity: Vec<String>,
    pub amount: Vec<String>,
    pub marker: Vec<String>,
}

impl ColumnRoles {
    pub fn marker_column(&self) -> Option<&str> {
        self.marker.first().map(String::as_str)
    }
}

/// Keyword classification of column names. A column may land in several
/// roles ("Broker" is both an entity and a marker host) or in none.
pub fn classify<S: AsRef<str>>(columns: &[S]) -> ColumnRoles {
    let mut roles = ColumnRoles::default();
    for col in columns {
        let col = col.as_ref();
        if matches_any(col, ENTITY_KEYWORDS) {
            roles.entity.push(col.to_string());
        }
        if matches_any(col, AMOUNT_KEYWORDS) {
            roles.amount.push(col.to_string());
        }
        if matches_any(col, MARKER_KEYWORDS) {
            roles.marker.push(col.to_string());
        }
    }
    roles
}

/// Columns whose non-empty cells are all numbers.
pub fn numeric_columns(table: &Table) -> Vec<String> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, _)| {
            let mut cells = table.rows().iter().map(|r| &r[*idx]).filter(|c| !c.is_empty()).peekable();
            cells.peek().is_some() && cells.all(|c| matches!(c, Cell::Number(_)))
        })
        .map(|(_, name)| name.clone())
        .collect()
}

/// What the advisory service gets to see about an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub total_rows: usize,
    pub total_columns: usize,
    pub column_names: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub potential_entity_columns: Vec<String>,
    pub potential_amount_columns: Vec<String>,
    pub marker_columns: Vec<String>,
    pub sample_data: Vec<(String, Vec<String>)>,
}

impl TableSummary {
    pub fn samples(&self, column: &str) -> &[String] {
        self.sample_data
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, s)| s.as_slice())
            .unwrap_or(&[])
    }
}

pub fn summarize(table: &Table) -> TableSummary {
    let roles = classify(table.columns());
    let sample_data = table
        .columns()
        .iter()
        .map(|col| {
            let samples = table
                .column_values(col)
                .map(|cells| cells.filter_map(Cell::text).take(SAMPLE_LIMIT).collect())
                .unwrap_or_default();
            (col.clone(), samples)
        })
        .collect();

    TableSummary {
        total_rows: table.len(),
        total_columns: table.columns().len(),
        column_names: table.columns().to_vec(),
        numeric_columns: numeric_columns(table),
        potential_entity_columns: roles.entity,
        potential_amount_columns: roles.amount,
        marker_columns: roles.marker,
        sample_data,
    }
}

/// Deterministic category detection used whenever the advisory service is
/// unavailable. Same columns in, same rules out.
pub fn fallback_rules(summary: &TableSummary) -> Vec<CategoryRule> {
    let amounts: Vec<String> = summary.potential_amount_columns.iter().take(1).cloned().collect();
    let grouping = if summary.marker_columns.is_empty() {
        Vec::new()
    } else {
        vec![PERIOD_COLUMN.to_string()]
    };
    let entity_cols = &summary.potential_entity_columns;

    let mut rules = Vec::new();
    for col in entity_cols.iter().filter(|c| matches_any(c, &["dispatch"])) {
        rules.push(CategoryRule::dispatcher(col, amounts.clone()));
    }
    for col in entity_cols.iter().filter(|c| matches_any(c, &["driver"])) {
        rules.push(CategoryRule::driver(col, amounts.clone()));
    }
    for col in entity_cols.iter().filter(|c| matches_any(c, &["broker", "customer", "client"])) {
        rules.push(CategoryRule::broker(col, amounts.clone()));
    }

    rules
        .into_iter()
        .map(|r| r.with_grouping(grouping.clone()).with_confidence(FALLBACK_CONFIDENCE))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CalculationMethod;

    fn table() -> Table {
        Table::new(
            &["Broker", "Dispatch", "Driver Name", "Amount", "Notes"],
            vec![
                vec![Cell::from("ACME"), Cell::from("Ali"), Cell::from("Joe"), Cell::Number(500.0), Cell::Empty],
                vec![Cell::from("Week 2"), Cell::Empty, Cell::Empty, Cell::Empty, Cell::from("x")],
                vec![Cell::from("Globex"), Cell::from("Sara"), Cell::from("Kim"), Cell::Number(300.0), Cell::Empty],
            ],
        )
    }

    #[test]
    fn test_classify() {
        let roles = classify(&["Broker", "Dispatch", "Driver Name", "Amount", "Rate/Mile", "Notes"]);
        assert_eq!(roles.entity, vec!["Broker", "Dispatch", "Driver Name"]);
        assert_eq!(roles.amount, vec!["Amount", "Rate/Mile"]);
        assert_eq!(roles.marker, vec!["Broker"]);
        assert_eq!(roles.marker_column(), Some("Broker"));
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let roles = classify(&["DISPATCHER", "total revenue"]);
        assert_eq!(roles.entity, vec!["DISPATCHER"]);
        assert_eq!(roles.amount, vec!["total revenue"]);
    }

    #[test]
    fn test_unmatched_columns() {
        let roles = classify(&["Date", "Notes"]);
        assert_eq!(roles, ColumnRoles::default());
    }

    #[test]
    fn test_numeric_columns() {
        assert_eq!(numeric_columns(&table()), vec!["Amount"]);
    }

    #[test]
    fn test_summary_samples() {
        let summary = summarize(&table());
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.total_columns, 5);
        assert_eq!(summary.samples("Dispatch"), &["Ali", "Sara"]);
        assert_eq!(summary.samples("Amount"), &["500", "300"]);
        assert!(summary.samples("Missing").is_empty());
    }

    #[test]
    fn test_fallback_rules() {
        let rules = fallback_rules(&summarize(&table()));
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Dispatcher Earnings", "Driver Payments", "Broker Performance"]);
        assert_eq!(rules[0].entity_column, "Dispatch");
        assert_eq!(rules[1].entity_column, "Driver Name");
        assert_eq!(rules[2].calculation_method, CalculationMethod::SumOnly);
        for rule in &rules {
            assert_eq!(rule.amount_columns, vec!["Amount"]);
            assert_eq!(rule.confidence, 0.8);
            assert_eq!(rule.grouping_columns, vec![PERIOD_COLUMN]);
        }
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let summary = summarize(&table());
        assert_eq!(fallback_rules(&summary), fallback_rules(&summary));
    }

    #[test]
    fn test_fallback_without_amount_or_marker() {
        let table = Table::new(&["Customer", "Notes"], vec![]);
        let rules = fallback_rules(&summarize(&table));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "Broker Performance");
        assert!(rules[0].amount_columns.is_empty());
        assert!(rules[0].grouping_columns.is_empty());
    }
}
