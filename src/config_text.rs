use tracing::warn;

use crate::category::{CalculationMethod, ConfigEntry, EntityConfig, EntryKind};
use crate::fmt::money;

/// Result of parsing a pasted block of `Name: Value` lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedConfig {
    pub config: EntityConfig,
    /// Lines that had a colon but no usable value, as typed.
    pub skipped: Vec<String>,
}

/// Parses lines like `Java: 1.5%` or `Baxa: $1,300`.
///
/// `%`, `$` and `,` are stripped from values. Lines without a colon are
/// ignored; lines whose value will not parse are skipped with a warning.
/// Every entry gets the type that `method` implies.
pub fn parse_config_text(text: &str, method: CalculationMethod) -> ParsedConfig {
    let kind = method.entry_kind();
    let mut parsed = ParsedConfig::default();

    for line in text.trim().lines() {
        let Some((name, raw_value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value_str: String = raw_value
            .chars()
            .filter(|c| !matches!(c, '%' | '$' | ','))
            .collect();
        let value_str = value_str.trim();

        match value_str.parse::<f64>() {
            Ok(value) if value.is_finite() && !name.is_empty() => {
                parsed.config.insert(name.to_string(), ConfigEntry { kind, value });
            }
            _ => {
                warn!(entity = name, value = value_str, "could not parse config value, skipping");
                parsed.skipped.push(line.trim().to_string());
            }
        }
    }
    parsed
}

/// Renders a category's configuration the way a user would type it back.
pub fn format_config(category_name: &str, config: Option<&EntityConfig>) -> String {
    let Some(config) = config.filter(|c| !c.is_empty()) else {
        return format!("No configuration found for {category_name}");
    };
    let mut out = format!("{category_name} Configuration\n\n");
    for (entity, entry) in config {
        out.push_str(&format!("  {entity}: {}\n", entry_value(entry)));
    }
    out
}

fn entry_value(entry: &ConfigEntry) -> String {
    match entry.kind {
        EntryKind::Percentage => format!("{}%", entry.value),
        EntryKind::FlatRate => money(entry.value),
        EntryKind::Value => format!("{}", entry.value),
    }
}

/// One `Name: Value` line per entity, ready to edit and feed back to
/// `config set`. Stored values are kept (names match ignoring case); every
/// other entity starts at zero.
pub fn format_template(entities: &[String], method: CalculationMethod, existing: Option<&EntityConfig>) -> String {
    let blank = ConfigEntry {
        kind: method.entry_kind(),
        value: 0.0,
    };
    let mut out = String::new();
    for entity in entities {
        let stored = existing.and_then(|config| {
            config
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(entity))
                .map(|(_, entry)| *entry)
        });
        out.push_str(&format!("{entity}: {}\n", entry_value(&stored.unwrap_or(blank))));
    }
    out
}
