use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{Result, TallyError};
use crate::models::{AggregateRow, Cell};
use crate::sanitize::clean;
use crate::table::Table;

const BLANK_GROUP: &str = "(blank)";

/// Per-period and overall entity totals for one aggregation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub overall: Vec<AggregateRow>,
    /// Periods in order of first appearance; `None` when no grouping was asked for.
    pub periods: Option<Vec<(String, Vec<AggregateRow>)>>,
    pub rows_read: usize,
    pub rows_kept: usize,
}

/// A row that survived cleaning.
struct CleanRow {
    entity: String,
    group: Option<String>,
    amount: f64,
}

fn index_of(table: &Table, role: &'static str, column: &str) -> Result<usize> {
    table.column_index(column).ok_or_else(|| TallyError::MissingColumn {
        role,
        column: column.to_string(),
    })
}

/// Cleans `table` down to (entity, group, primary amount) rows, then sums.
///
/// Rows are dropped when every amount cell is missing or unparsable, when any
/// amount is not positive, or when the entity is blank. Only the first amount
/// column is summed.
pub fn aggregate(
    table: &Table,
    entity_column: &str,
    amount_columns: &[String],
    grouping_columns: &[String],
) -> Result<Aggregation> {
    let entity_idx = index_of(table, "entity", entity_column)?;
    if amount_columns.is_empty() {
        return Err(TallyError::NoColumn("amount", "Amount, Total or Revenue"));
    }
    let amount_idx = amount_columns
        .iter()
        .map(|c| index_of(table, "amount", c))
        .collect::<Result<Vec<_>>>()?;
    let group_idx = grouping_columns
        .iter()
        .map(|c| index_of(table, "grouping", c))
        .collect::<Result<Vec<_>>>()?;

    let rows = clean_rows(table, entity_idx, &amount_idx, &group_idx);
    debug!(
        entity = entity_column,
        read = table.len(),
        kept = rows.len(),
        "cleaned rows for aggregation"
    );

    let mut overall: BTreeMap<&str, f64> = BTreeMap::new();
    for row in &rows {
        *overall.entry(row.entity.as_str()).or_default() += row.amount;
    }
    let overall = to_aggregate_rows(overall, None);

    let periods = if group_idx.is_empty() {
        None
    } else {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, BTreeMap<&str, f64>> = HashMap::new();
        for row in &rows {
            let label = row.group.as_deref().unwrap_or(BLANK_GROUP);
            let totals = groups.entry(label).or_insert_with(|| {
                order.push(label);
                BTreeMap::new()
            });
            *totals.entry(row.entity.as_str()).or_default() += row.amount;
        }
        Some(
            order
                .into_iter()
                .map(|label| {
                    let totals = groups.remove(label).unwrap_or_default();
                    (label.to_string(), to_aggregate_rows(totals, Some(label)))
                })
                .collect(),
        )
    };

    Ok(Aggregation {
        overall,
        periods,
        rows_read: table.len(),
        rows_kept: rows.len(),
    })
}

/// Trimmed entity name, `None` for blank cells and `nan`.
fn entity_name(cell: &Cell) -> Option<String> {
    let name = cell.text()?.trim().to_string();
    if name.is_empty() || name == "nan" {
        None
    } else {
        Some(name)
    }
}

/// Distinct entity names in `entity_column`, in order of first appearance.
/// Names are trimmed the way aggregation trims them; amounts are not looked at.
pub fn entity_names(table: &Table, entity_column: &str) -> Result<Vec<String>> {
    let idx = index_of(table, "entity", entity_column)?;
    let mut names: Vec<String> = Vec::new();
    for name in table.rows().iter().filter_map(|row| entity_name(&row[idx])) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

fn clean_rows(table: &Table, entity_idx: usize, amount_idx: &[usize], group_idx: &[usize]) -> Vec<CleanRow> {
    let mut kept = Vec::new();
    for row in table.rows() {
        if amount_idx.iter().all(|&i| row[i].is_empty()) {
            continue;
        }
        let amounts: Vec<Option<f64>> = amount_idx.iter().map(|&i| clean(&row[i])).collect();
        if amounts.iter().all(Option::is_none) {
            continue;
        }
        if !amounts.iter().all(|a| matches!(a, Some(v) if *v > 0.0)) {
            continue;
        }

        let Some(entity) = entity_name(&row[entity_idx]) else {
            continue;
        };

        let group = if group_idx.is_empty() {
            None
        } else {
            let parts: Vec<String> = group_idx
                .iter()
                .map(|&i| row[i].text().map(|t| t.trim().to_string()).unwrap_or_default())
                .collect();
            if parts.iter().all(String::is_empty) {
                None
            } else {
                Some(parts.join(" / "))
            }
        };

        kept.push(CleanRow {
            entity,
            group,
            amount: amounts[0].unwrap_or_default(),
        });
    }
    kept
}

fn to_aggregate_rows(totals: BTreeMap<&str, f64>, period: Option<&str>) -> Vec<AggregateRow> {
    totals
        .into_iter()
        .map(|(entity, total)| AggregateRow {
            entity_name: entity.to_string(),
            period_label: period.map(str::to_string),
            total_amount: total,
        })
        .collect()
}
