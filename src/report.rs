use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::advisor::{Detection, DetectionSource, MethodSuggestion};
use crate::category::{CalculationMethod, CategoryRule};
use crate::fmt::{money, percent, rate};
use crate::models::{EarningsReport, EarningsResult, PeriodReport};
use crate::store::ConfigStore;

fn shows_earnings(method: CalculationMethod) -> bool {
    method != CalculationMethod::SumOnly
}

/// Highest revenue first. Ties keep their incoming order.
fn by_revenue(results: &[EarningsResult]) -> Vec<&EarningsResult> {
    let mut sorted: Vec<&EarningsResult> = results.iter().collect();
    sorted.sort_by(|a, b| b.total_amount.total_cmp(&a.total_amount));
    sorted
}

fn entity_table<'a>(results: impl IntoIterator<Item = &'a EarningsResult>, method: CalculationMethod) -> Table {
    let mut table = Table::new();
    if shows_earnings(method) {
        table.set_header(vec!["Entity", "Revenue", "Rate", "Earnings"]);
    } else {
        table.set_header(vec!["Entity", "Revenue"]);
    }
    for r in results {
        let mut row = vec![Cell::new(&r.entity_name), Cell::new(money(r.total_amount))];
        if shows_earnings(method) {
            row.push(Cell::new(rate(method, r.percentage_or_rate)));
            row.push(Cell::new(money(r.earnings)));
        }
        table.add_row(row);
    }
    table
}

/// One period's section, or `None` when the period has no revenue at all.
/// Entities with no revenue in the period are left out.
pub fn format_period(period: &PeriodReport, method: CalculationMethod) -> Option<String> {
    let revenue: f64 = period.results.iter().map(|r| r.total_amount).sum();
    if revenue == 0.0 {
        return None;
    }
    let earnings: f64 = period.results.iter().map(|r| r.earnings).sum();

    let active = by_revenue(&period.results).into_iter().filter(|r| r.total_amount != 0.0);
    let mut out = format!("{}\n", period.period_label.bold());
    out.push_str(&entity_table(active, method).to_string());
    out.push_str(&format!("\nWeek Total: {}\n", money(revenue)));
    if shows_earnings(method) {
        out.push_str(&format!("Week Earnings: {}\n", money(earnings)));
    }
    Some(out)
}

/// Summary over the whole file. Every entity is listed, including
/// configured ones with nothing in the data.
pub fn format_overall(report: &EarningsReport, source: &str) -> String {
    let mut out = format!("{}\n", format!("{} - {source}", report.category).bold());
    out.push_str(&entity_table(by_revenue(&report.overall), report.method).to_string());
    out.push_str(&format!("\nTotal Revenue: {}\n", money(report.total_amount())));
    if shows_earnings(report.method) {
        out.push_str(&format!("Total Earnings: {}\n", money(report.total_earnings())));
    }
    out
}

/// Period sections followed by the overall summary.
pub fn format_report(report: &EarningsReport, source: &str) -> String {
    let mut sections: Vec<String> = report
        .periods
        .iter()
        .filter_map(|p| format_period(p, report.method))
        .collect();
    sections.push(format_overall(report, source));
    sections.join("\n")
}

pub fn format_detection(detection: &Detection, store: &ConfigStore) -> String {
    if detection.rules.is_empty() {
        return "No categories detected. The file needs a name-like column (Dispatch, Driver, Broker...) \
                and an amount-like column (Amount, Total, Revenue...)."
            .to_string();
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Category", "Entity", "Amounts", "Method", "Confidence", "Config"]);
    for (i, rule) in detection.rules.iter().enumerate() {
        let config = if !rule.config_required {
            "not needed".to_string()
        } else if store.has(&rule.id()) {
            "ready".green().to_string()
        } else {
            "missing".yellow().to_string()
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&rule.name),
            Cell::new(&rule.entity_column),
            Cell::new(rule.amount_columns.join(", ")),
            Cell::new(rule.calculation_method),
            Cell::new(format!("{:.0}%", rule.confidence * 100.0)),
            Cell::new(config),
        ]);
    }

    let source = match detection.source {
        DetectionSource::Advisor => "advisor",
        DetectionSource::RuleBased => "rule-based",
    };
    format!("Detected categories ({source}):\n{table}")
}

pub fn format_suggestion(category: &str, suggestion: &MethodSuggestion) -> String {
    let mut out = format!("{}: {}\n", category.bold(), suggestion.method);
    if !suggestion.reasoning.is_empty() {
        out.push_str(&format!("  {}\n", suggestion.reasoning));
    }
    if !suggestion.example.is_empty() {
        out.push_str(&format!("  e.g. {}\n", suggestion.example));
    }
    out
}

const PROMPT_EXAMPLES: usize = 3;

fn example_rate(method: CalculationMethod, i: usize) -> String {
    match method {
        CalculationMethod::Percentage => percent(if i == 0 { 1.5 } else { 1.3 }),
        CalculationMethod::FlatRate => money(if i == 0 { 300.0 } else { 250.0 }),
        CalculationMethod::SumOnly | CalculationMethod::Custom => "1".to_string(),
    }
}

/// What to tell the user when `rule` has no rates yet: the names found in the
/// file (first few as example lines), the advisor's method if there is one,
/// and the commands that finish the job.
pub fn format_config_prompt(rule: &CategoryRule, entities: &[String], suggestion: Option<&MethodSuggestion>) -> String {
    let id = rule.id();
    let mut out = format!("{}\n", format!("Configuration needed: {}", rule.name).bold());
    if entities.is_empty() {
        out.push_str(&format!("No entities found in '{}'.\n", rule.entity_column));
    } else {
        out.push_str(&format!(
            "Found {} entities in '{}'. Give each one a {} value as `Name: Value` lines, e.g.\n",
            entities.len(),
            rule.entity_column,
            rule.calculation_method
        ));
        for (i, entity) in entities.iter().take(PROMPT_EXAMPLES).enumerate() {
            out.push_str(&format!("  {entity}: {}\n", example_rate(rule.calculation_method, i)));
        }
        if entities.len() > PROMPT_EXAMPLES {
            out.push_str(&format!("  ... and {} more\n", entities.len() - PROMPT_EXAMPLES));
        }
    }
    if let Some(suggestion) = suggestion {
        out.push_str(&format!("Suggested method: {}\n", suggestion.method));
        if !suggestion.reasoning.is_empty() {
            out.push_str(&format!("  {}\n", suggestion.reasoning));
        }
    }
    out.push_str(&format!(
        "Save them with `tally config set {id}`. `tally config template <file> --category {id}` lists every name.\n"
    ));
    out
}
