use crate::models::Cell;

/// Best-effort numeric extraction from a spreadsheet cell.
///
/// Everything except ASCII digits, `.` and `-` is discarded before parsing,
/// so currency symbols, thousands separators and trailing notes such as
/// `1752$+LUMPE` fall away. Returns `None` for missing cells and for
/// anything that still fails to parse.
pub fn clean(raw: &Cell) -> Option<f64> {
    match raw {
        Cell::Empty => None,
        Cell::Number(n) if n.is_nan() => None,
        Cell::Number(n) => Some(*n),
        Cell::Text(s) => clean_str(s),
    }
}

pub fn clean_str(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if kept.is_empty() {
        return None;
    }
    kept.parse::<f64>().ok()
}
