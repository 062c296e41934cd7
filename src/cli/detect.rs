use crate::cli::{open_input, Session};
use crate::error::Result;
use crate::report::format_detection;

pub fn run(session: &Session, file: &str, format: Option<&str>) -> Result<()> {
    let input = open_input(file, format)?;
    println!(
        "{}: {} rows, {} columns",
        input.source, input.summary.total_rows, input.summary.total_columns
    );
    let detection = session.detect(&input.table, &input.summary);
    println!("{}", format_detection(&detection, &session.store));
    Ok(())
}
