pub mod analyze;
pub mod config;
pub mod detect;
pub mod suggest;

use std::path::Path;

use clap::{Parser, Subcommand};

use crate::advisor::{detect_categories, CategoryAdvisor, Detection};
use crate::category::{category_id, CalculationMethod, CategoryRule};
use crate::detector::{summarize, TableSummary};
use crate::error::{Result, TallyError};
use crate::settings::Settings;
use crate::store::ConfigStore;
use crate::table::{load_table, stage_upload, Table};

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Revenue tallies and earnings from dispatch spreadsheets."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which categories can be calculated from a file.
    Detect {
        /// CSV/XLSX/XLS/ODS file, or '-' for stdin
        file: String,
        /// File format when reading stdin (csv, xlsx)
        #[arg(long)]
        format: Option<String>,
    },
    /// Calculate earnings for detected categories.
    Analyze {
        /// CSV/XLSX/XLS/ODS file, or '-' for stdin
        file: String,
        /// File format when reading stdin (csv, xlsx)
        #[arg(long)]
        format: Option<String>,
        /// Category name or id to run (repeatable; default: all)
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Skip the weekly breakdown
        #[arg(long = "no-weeks")]
        no_weeks: bool,
        /// Print the report payload as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggest a calculation method for a detected category.
    Suggest {
        /// CSV/XLSX/XLS/ODS file, or '-' for stdin
        file: String,
        /// File format when reading stdin (csv, xlsx)
        #[arg(long)]
        format: Option<String>,
        /// Category name or id
        #[arg(long)]
        category: String,
    },
    /// Manage per-category entity rates.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set rates from 'Name: Value' lines (stdin unless --file).
    Set {
        /// Category name or id, e.g. dispatcher_earnings
        category: String,
        /// Read lines from this file instead of stdin
        #[arg(long)]
        file: Option<String>,
        /// Calculation method: percentage, flat_rate, sum_only
        #[arg(long)]
        method: Option<String>,
    },
    /// Show a category's configuration.
    Show { category: String },
    /// List configured categories.
    List,
    /// Remove a category's configuration.
    Delete { category: String },
    /// Print a 'Name: Value' line for every entity a file names.
    Template {
        /// CSV/XLSX/XLS/ODS file, or '-' for stdin
        file: String,
        /// File format when reading stdin (csv, xlsx)
        #[arg(long)]
        format: Option<String>,
        /// Category name or id
        #[arg(long)]
        category: String,
    },
    /// Import a legacy dispatcher rates file.
    Migrate {
        /// Legacy file (default: dispatcher_config.json)
        legacy: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Shared session state
// ---------------------------------------------------------------------------

pub struct Session {
    pub settings: Settings,
    pub store: ConfigStore,
}

impl Session {
    pub fn open(settings: Settings) -> Self {
        let store = ConfigStore::load(&settings.store_path());
        Self { settings, store }
    }

    #[cfg(feature = "advisor")]
    pub fn advisor(&self) -> Option<Box<dyn CategoryAdvisor>> {
        let key = self.settings.advisor_key(|k| std::env::var(k).ok())?;
        match crate::advisor::OpenAiAdvisor::new(&self.settings.advisor, key) {
            Ok(advisor) => Some(Box::new(advisor)),
            Err(e) => {
                tracing::warn!(error = %e, "advisor unavailable");
                None
            }
        }
    }

    #[cfg(not(feature = "advisor"))]
    pub fn advisor(&self) -> Option<Box<dyn CategoryAdvisor>> {
        None
    }

    pub fn detect(&self, table: &Table, summary: &TableSummary) -> Detection {
        let advisor = self.advisor();
        detect_categories(advisor.as_deref(), table, summary)
    }
}

/// A loaded upload plus the name to show in report headers.
pub struct Input {
    pub table: Table,
    pub summary: TableSummary,
    pub source: String,
}

/// Loads `file`, or stdin when `file` is `-`. Stdin is staged to a temp file
/// that is gone by the time this returns.
pub fn open_input(file: &str, format: Option<&str>) -> Result<Input> {
    let (table, source) = if file == "-" {
        let format = format.ok_or_else(|| {
            TallyError::Other("Reading from stdin needs --format csv or --format xlsx".to_string())
        })?;
        let staged = stage_upload(std::io::stdin().lock(), format)?;
        (staged.load()?, "stdin".to_string())
    } else {
        let path = Path::new(file);
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string());
        (load_table(path)?, source)
    };
    let summary = summarize(&table);
    Ok(Input { table, summary, source })
}

/// A rule to validate configuration against when no file is at hand. Preset
/// categories keep their method unless `method` overrides it.
pub(crate) fn rule_for(category: &str, method: Option<&str>) -> Result<CategoryRule> {
    let category = category.trim();
    if category.is_empty() {
        return Err(TallyError::UnknownCategory(String::new()));
    }
    let mut rule = match category_id(category).as_str() {
        "dispatcher_earnings" => CategoryRule::dispatcher("", Vec::new()),
        "driver_payments" => CategoryRule::driver("", Vec::new()),
        "broker_performance" => CategoryRule::broker("", Vec::new()),
        _ => CategoryRule::new(category, "", Vec::new(), CalculationMethod::Percentage),
    };
    if let Some(method) = method {
        rule.calculation_method = CalculationMethod::parse(method);
        rule.config_required = rule.calculation_method != CalculationMethod::SumOnly;
    }
    Ok(rule)
}

pub(crate) fn find_rule<'a>(detection: &'a Detection, query: &str) -> Result<&'a CategoryRule> {
    detection
        .rules
        .iter()
        .find(|r| r.matches(query))
        .ok_or_else(|| TallyError::UnknownCategory(query.to_string()))
}
