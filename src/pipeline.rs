use std::borrow::Cow;

use tracing::debug;

use crate::aggregate::aggregate;
use crate::category::{CategoryRule, EntityConfig};
use crate::detector::classify;
use crate::earnings::reconcile;
use crate::error::{Result, TallyError};
use crate::models::{Cell, EarningsReport, PeriodReport};
use crate::period::{segment, PERIOD_COLUMN};
use crate::table::Table;

/// Adds the derived period column when `grouping` asks for it and the table
/// does not already carry one. Labels come from the first marker-like column
/// and are assigned over the full table, before any row is dropped.
fn with_periods<'a>(table: &'a Table, grouping: &[String]) -> Result<Cow<'a, Table>> {
    if !grouping.iter().any(|c| c == PERIOD_COLUMN) || table.has_column(PERIOD_COLUMN) {
        return Ok(Cow::Borrowed(table));
    }
    let roles = classify(table.columns());
    let marker = roles
        .marker_column()
        .ok_or(TallyError::NoColumn("week marker", "Broker"))?;
    let labels = segment(table, marker).ok_or_else(|| TallyError::MissingColumn {
        role: "week marker",
        column: marker.to_string(),
    })?;
    debug!(marker, rows = labels.len(), "derived period labels");
    let cells = labels.into_iter().map(Cell::Text).collect();
    Ok(Cow::Owned(table.with_column(PERIOD_COLUMN, cells)))
}

/// Runs one category over one table and builds the complete report.
///
/// With `by_period` unset the rule's grouping is ignored and only the overall
/// scope is reported. Nothing is returned unless every stage succeeds.
pub fn run_category(
    table: &Table,
    rule: &CategoryRule,
    config: Option<&EntityConfig>,
    by_period: bool,
) -> Result<EarningsReport> {
    rule.validate_against(table)?;
    if rule.config_required && config.map_or(true, |c| c.is_empty()) {
        return Err(TallyError::NotConfigured(rule.name.clone(), rule.id()));
    }

    let grouping: &[String] = if by_period { &rule.grouping_columns } else { &[] };
    let table = with_periods(table, grouping)?;
    let agg = aggregate(&table, &rule.entity_column, &rule.amount_columns, grouping)?;
    debug!(
        category = %rule.name,
        rows_read = agg.rows_read,
        rows_kept = agg.rows_kept,
        "aggregated"
    );

    let method = rule.calculation_method;
    let periods = agg
        .periods
        .unwrap_or_default()
        .into_iter()
        .map(|(period_label, rows)| PeriodReport {
            period_label,
            results: reconcile(&rows, method, config),
        })
        .collect();

    Ok(EarningsReport {
        category: rule.name.clone(),
        method,
        periods,
        overall: reconcile(&agg.overall, method, config),
    })
}
