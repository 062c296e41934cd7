use std::io::Read;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, TallyError};
use crate::models::Cell;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Rows of raw cells under a trimmed header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Builds a table, trimming header names and padding short rows.
    pub fn new<S: AsRef<str>>(columns: &[S], rows: Vec<Vec<Cell>>) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().trim().to_string()).collect();
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Returns a copy of the table with `values` as an extra column, replacing
    /// any existing column of the same name.
    pub fn with_column(&self, name: &str, values: Vec<Cell>) -> Table {
        let mut table = self.clone();
        let idx = match table.column_index(name) {
            Some(idx) => idx,
            None => {
                table.columns.push(name.to_string());
                for row in &mut table.rows {
                    row.push(Cell::Empty);
                }
                table.columns.len() - 1
            }
        };
        for (row, value) in table.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        table
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileKind {
    Csv,
    #[cfg(feature = "xlsx")]
    Workbook,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            #[cfg(feature = "xlsx")]
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(Self::Workbook),
            other => Err(TallyError::UnsupportedFile(other.to_string())),
        }
    }
}

pub fn load_table(path: &Path) -> Result<Table> {
    match FileKind::from_path(path)? {
        FileKind::Csv => load_csv(path),
        #[cfg(feature = "xlsx")]
        FileKind::Workbook => load_workbook(path),
    }
}

fn load_csv(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|f| Cell::from(f.trim())).collect::<Vec<_>>());
    }

    let mut table = Table::new(&headers, rows);
    infer_numeric_columns(&mut table);
    Ok(table)
}

/// CSV cells arrive as text; columns where every non-empty cell parses as a
/// plain number become numeric, the way a spreadsheet would have typed them.
fn infer_numeric_columns(table: &mut Table) {
    for idx in 0..table.columns.len() {
        let numeric = table.rows.iter().any(|r| !r[idx].is_empty())
            && table.rows.iter().all(|r| match &r[idx] {
                Cell::Empty => true,
                Cell::Text(s) => s.parse::<f64>().is_ok(),
                Cell::Number(_) => true,
            });
        if !numeric {
            continue;
        }
        for row in &mut table.rows {
            if let Cell::Text(s) = &row[idx] {
                if let Ok(n) = s.parse::<f64>() {
                    row[idx] = Cell::Number(n);
                }
            }
        }
    }
}

#[cfg(feature = "xlsx")]
fn load_workbook(path: &Path) -> Result<Table> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| TallyError::Spreadsheet(format!("Failed to open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TallyError::Spreadsheet("Workbook has no sheets".to_string()))?
        .map_err(|e| TallyError::Spreadsheet(format!("Failed to read first sheet: {e}")))?;

    let mut sheet_rows = range.rows();
    let Some(header) = sheet_rows.next() else {
        return Ok(Table::new::<String>(&[], Vec::new()));
    };
    let headers: Vec<String> = header.iter().map(|c| c.to_string()).collect();

    let mut rows = Vec::new();
    for row in sheet_rows {
        let cells: Vec<Cell> = row
            .iter()
            .map(|c| match c {
                Data::Empty | Data::Error(_) => Cell::Empty,
                Data::Int(i) => Cell::Number(*i as f64),
                Data::Float(f) => Cell::Number(*f),
                Data::String(s) => Cell::from(s.trim()),
                other => Cell::from(other.to_string().trim()),
            })
            .collect();
        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        rows.push(cells);
    }
    Ok(Table::new(&headers, rows))
}

// ---------------------------------------------------------------------------
// Upload staging
// ---------------------------------------------------------------------------

/// An upload copied to a temporary file. The file is removed when this value
/// is dropped, on success and error paths alike.
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn load(&self) -> Result<Table> {
        load_table(self.path())
    }
}

pub fn stage_upload<R: Read>(mut reader: R, extension: &str) -> Result<StagedUpload> {
    FileKind::from_extension(extension)?;
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let mut file = tempfile::Builder::new()
        .prefix("tally-upload-")
        .suffix(&suffix)
        .tempfile()?;
    std::io::copy(&mut reader, &mut file)?;
    Ok(StagedUpload { file })
}
