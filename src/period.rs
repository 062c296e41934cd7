use std::sync::OnceLock;

use regex::Regex;

use crate::models::Cell;
use crate::table::Table;

/// Label carried by rows that appear before the first week marker.
pub const BEFORE_FIRST_PERIOD: &str = "Before Week 1";

/// Name of the derived column holding period labels.
pub const PERIOD_COLUMN: &str = "Week";

fn week_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)week\s*(\d+)").expect("static regex"))
}

/// Returns the period a marker cell announces, if any.
pub fn marker_label(cell: &Cell) -> Option<String> {
    let text = cell.text()?;
    let caps = week_marker().captures(text.trim())?;
    Some(format!("Week {}", &caps[1]))
}

/// Assigns a period label to every row of `table`, in order.
///
/// A marker row takes the label it announces; every later row carries that
/// label until the next marker. Rows are never looked at twice, so the
/// result depends only on the original row order.
pub fn segment(table: &Table, marker_column: &str) -> Option<Vec<String>> {
    let cells = table.column_values(marker_column)?;
    let mut current = BEFORE_FIRST_PERIOD.to_string();
    let labels = cells
        .map(|cell| {
            if let Some(label) = marker_label(cell) {
                current = label;
            }
            current.clone()
        })
        .collect();
    Some(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker_table(markers: &[&str]) -> Table {
        let rows = markers.iter().map(|m| vec![Cell::from(*m)]).collect();
        Table::new(&["Broker"], rows)
    }

    #[test]
    fn test_marker_row_takes_new_label() {
        let table = broker_table(&["", "Week 4 starts", ""]);
        let labels = segment(&table, "Broker").unwrap();
        assert_eq!(labels, vec!["Before Week 1", "Week 4", "Week 4"]);
    }

    #[test]
    fn test_no_markers() {
        let table = broker_table(&["ACME", "", "Globex"]);
        let labels = segment(&table, "Broker").unwrap();
        assert!(labels.iter().all(|l| l == BEFORE_FIRST_PERIOD));
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_case_and_spacing() {
        assert_eq!(marker_label(&Cell::from("WEEK12")), Some("Week 12".to_string()));
        assert_eq!(marker_label(&Cell::from("  week   7  ")), Some("Week 7".to_string()));
        assert_eq!(marker_label(&Cell::from("Weekly load")), None);
        assert_eq!(marker_label(&Cell::Empty), None);
    }

    #[test]
    fn test_digits_kept_verbatim() {
        assert_eq!(marker_label(&Cell::from("Week 04")), Some("Week 04".to_string()));
    }

    #[test]
    fn test_forward_only_carry() {
        let table = broker_table(&["ACME", "Week 2", "ACME", "week 3", "Globex", "Globex"]);
        let labels = segment(&table, "Broker").unwrap();
        assert_eq!(
            labels,
            vec!["Before Week 1", "Week 2", "Week 2", "Week 3", "Week 3", "Week 3"]
        );
    }

    #[test]
    fn test_unknown_column() {
        let table = broker_table(&["Week 1"]);
        assert!(segment(&table, "Dispatch").is_none());
    }
}
