use crate::advisor::suggest_or_default;
use crate::cli::{find_rule, open_input, Session};
use crate::error::Result;
use crate::report::format_suggestion;

pub fn run(session: &Session, file: &str, format: Option<&str>, category: &str) -> Result<()> {
    let input = open_input(file, format)?;
    let detection = session.detect(&input.table, &input.summary);
    let rule = find_rule(&detection, category)?;

    let advisor = session.advisor();
    let suggestion = suggest_or_default(advisor.as_deref(), rule, &input.summary);
    print!("{}", format_suggestion(&rule.name, &suggestion));
    if suggestion.method != rule.calculation_method {
        println!("(currently {})", rule.calculation_method);
    }
    Ok(())
}
