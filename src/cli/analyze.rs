use colored::Colorize;
use tracing::info;

use crate::advisor::suggest_or_default;
use crate::aggregate::entity_names;
use crate::category::CategoryRule;
use crate::cli::{find_rule, open_input, Input, Session};
use crate::error::{Result, TallyError};
use crate::models::EarningsReport;
use crate::pipeline::run_category;
use crate::report::{format_config_prompt, format_report};

/// The configuration prompt for `rule`, with the advisor's method suggestion
/// when an advisor is available.
fn config_prompt(session: &Session, input: &Input, rule: &CategoryRule) -> Result<String> {
    let entities = entity_names(&input.table, &rule.entity_column)?;
    let advisor = session.advisor();
    let suggestion = advisor
        .as_deref()
        .map(|a| suggest_or_default(Some(a), rule, &input.summary));
    Ok(format_config_prompt(rule, &entities, suggestion.as_ref()))
}

pub fn run(
    session: &Session,
    file: &str,
    format: Option<&str>,
    categories: &[String],
    no_weeks: bool,
    json: bool,
) -> Result<()> {
    let input = open_input(file, format)?;
    let detection = session.detect(&input.table, &input.summary);

    let run_all = categories.is_empty() || categories.iter().any(|c| c.eq_ignore_ascii_case("all"));
    let rules: Vec<&CategoryRule> = if run_all {
        detection.rules.iter().collect()
    } else {
        categories
            .iter()
            .map(|c| find_rule(&detection, c))
            .collect::<Result<_>>()?
    };
    if rules.is_empty() {
        return Err(TallyError::Other(format!(
            "No categories detected in {}. Run `tally detect` to see what columns were found.",
            input.source
        )));
    }

    let mut reports: Vec<EarningsReport> = Vec::new();
    for rule in rules {
        let config = session.store.get(&rule.id());
        let rule = &rule.clone().with_config_method(config);
        match run_category(&input.table, rule, config, !no_weeks) {
            Ok(report) => {
                info!(category = %rule.name, entities = report.overall.len(), "analysis complete");
                reports.push(report);
            }
            // Running everything skips categories that still need rates.
            Err(e @ TallyError::NotConfigured(..)) if run_all => {
                eprintln!("{} {e}", "Skipping:".yellow());
                eprint!("{}", config_prompt(session, &input, rule)?);
            }
            Err(e @ TallyError::NotConfigured(..)) => {
                eprint!("{}", config_prompt(session, &input, rule)?);
                return Err(e);
            }
            Err(e) => return Err(e),
        }
    }
    if reports.is_empty() {
        return Err(TallyError::Other(
            "Nothing to report. Configure a category with `tally config set <category>` first.".to_string(),
        ));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        let rendered: Vec<String> = reports.iter().map(|r| format_report(r, &input.source)).collect();
        println!("{}", rendered.join("\n"));
    }
    Ok(())
}
