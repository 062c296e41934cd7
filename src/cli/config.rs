use std::io::Read;
use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::aggregate::entity_names;
use crate::cli::{find_rule, open_input, rule_for, Session};
use crate::config_text::{format_config, format_template, parse_config_text};
use crate::error::Result;
use crate::store::LEGACY_CATEGORY_ID;

const DEFAULT_LEGACY_FILE: &str = "dispatcher_config.json";

pub fn set(session: &mut Session, category: &str, file: Option<&str>, method: Option<&str>) -> Result<()> {
    let rule = rule_for(category, method)?;
    let text = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let parsed = parse_config_text(&text, rule.calculation_method);
    for line in &parsed.skipped {
        eprintln!("{} could not read a value from '{line}'", "Skipped:".yellow());
    }
    let count = parsed.config.len();
    session.store.validate_and_save(&rule, parsed.config)?;

    println!("Configuration saved for {} ({count} entities).", rule.name.bold());
    print!("{}", format_config(&rule.name, session.store.get(&rule.id())));
    Ok(())
}

pub fn show(session: &Session, category: &str) -> Result<()> {
    let rule = rule_for(category, None)?;
    println!("{}", format_config(&rule.name, session.store.get(&rule.id())));
    Ok(())
}

pub fn list(session: &Session) -> Result<()> {
    let ids = session.store.category_ids();
    if ids.is_empty() {
        println!("No categories configured. Store: {}", session.store.path().display());
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Category", "Entities"]);
    for id in ids {
        let count = session.store.get(id).map_or(0, |c| c.len());
        table.add_row(vec![Cell::new(id), Cell::new(count)]);
    }
    println!("{table}");
    Ok(())
}

pub fn delete(session: &mut Session, category: &str) -> Result<()> {
    let rule = rule_for(category, None)?;
    if session.store.delete(&rule.id())? {
        println!("Deleted configuration for {}.", rule.name);
    } else {
        println!("Nothing configured for {}.", rule.name);
    }
    Ok(())
}

pub fn template(session: &Session, file: &str, format: Option<&str>, category: &str) -> Result<()> {
    let input = open_input(file, format)?;
    let detection = session.detect(&input.table, &input.summary);
    let found = find_rule(&detection, category)?;
    let config = session.store.get(&found.id());
    let rule = found.clone().with_config_method(config);

    let entities = entity_names(&input.table, &rule.entity_column)?;
    if entities.is_empty() {
        eprintln!("No entities found in '{}'.", rule.entity_column);
        return Ok(());
    }
    print!("{}", format_template(&entities, rule.calculation_method, config));
    Ok(())
}

pub fn migrate(session: &mut Session, legacy: Option<&str>) -> Result<()> {
    let path = Path::new(legacy.unwrap_or(DEFAULT_LEGACY_FILE));
    if session.store.migrate_legacy(path)? {
        println!("Migrated {} into {LEGACY_CATEGORY_ID}.", path.display());
    } else if !path.exists() {
        println!("No legacy file at {}.", path.display());
    } else {
        println!("{LEGACY_CATEGORY_ID} is already configured; nothing migrated.");
    }
    Ok(())
}
