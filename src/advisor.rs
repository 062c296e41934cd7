use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::category::{CalculationMethod, CategoryRule, ProposedRule};
use crate::detector::{fallback_rules, TableSummary};
use crate::period::PERIOD_COLUMN;
use crate::table::Table;

/// Proposals at or below this confidence are discarded.
pub const MIN_CONFIDENCE: f64 = 0.7;

const PROMPT_COLUMNS: usize = 3;
const PROMPT_SAMPLES: usize = 5;

/// An external service that can look at a table summary and propose
/// categories. Implementations may fail in any way; callers fall back.
pub trait CategoryAdvisor {
    fn propose_rules(&self, summary: &TableSummary) -> anyhow::Result<Vec<ProposedRule>>;

    fn suggest_method(&self, rule: &CategoryRule, summary: &TableSummary) -> anyhow::Result<MethodSuggestion>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSuggestion {
    pub method: CalculationMethod,
    pub reasoning: String,
    pub example: String,
}

impl Default for MethodSuggestion {
    fn default() -> Self {
        Self {
            method: CalculationMethod::Percentage,
            reasoning: "Default to percentage-based calculation".to_string(),
            example: "Entity earns X% of their total revenue".to_string(),
        }
    }
}

/// Wire shape of a method suggestion. The method arrives as free text.
#[derive(Debug, Deserialize)]
struct RawSuggestion {
    method: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    example: String,
}

impl From<RawSuggestion> for MethodSuggestion {
    fn from(raw: RawSuggestion) -> Self {
        Self {
            method: CalculationMethod::parse(&raw.method),
            reasoning: raw.reasoning,
            example: raw.example,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawProposals {
    #[serde(default)]
    categories: Vec<ProposedRule>,
}

// ---------------------------------------------------------------------------
// Detection with fallback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Advisor,
    RuleBased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub source: DetectionSource,
    pub rules: Vec<CategoryRule>,
}

/// Asks the advisor for categories and keeps the confident proposals whose
/// columns exist. Falls back to keyword rules when there is no advisor, when
/// it fails, or when nothing usable comes back.
pub fn detect_categories(advisor: Option<&dyn CategoryAdvisor>, table: &Table, summary: &TableSummary) -> Detection {
    let fallback = || Detection {
        source: DetectionSource::RuleBased,
        rules: fallback_rules(summary),
    };

    let Some(advisor) = advisor else {
        info!("no advisor configured, using rule-based detection");
        return fallback();
    };

    let proposals = match advisor.propose_rules(summary) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "advisor failed, using rule-based detection");
            return fallback();
        }
    };

    let proposed = proposals.len();
    let with_markers = !summary.marker_columns.is_empty();
    let rules: Vec<CategoryRule> = proposals
        .into_iter()
        .filter(|p| p.confidence > MIN_CONFIDENCE)
        .filter_map(|p| p.normalize(table))
        .map(|mut rule| {
            if with_markers && rule.grouping_columns.is_empty() {
                rule.grouping_columns = vec![PERIOD_COLUMN.to_string()];
            }
            rule
        })
        .collect();

    if rules.is_empty() {
        warn!(proposed, "advisor returned no usable categories, using rule-based detection");
        return fallback();
    }
    info!(proposed, kept = rules.len(), "advisor detected categories");
    Detection {
        source: DetectionSource::Advisor,
        rules,
    }
}

/// Advisor suggestion for `rule`, or the percentage default on any failure.
pub fn suggest_or_default(
    advisor: Option<&dyn CategoryAdvisor>,
    rule: &CategoryRule,
    summary: &TableSummary,
) -> MethodSuggestion {
    let Some(advisor) = advisor else {
        return MethodSuggestion::default();
    };
    advisor.suggest_method(rule, summary).unwrap_or_else(|e| {
        warn!(error = %e, category = %rule.name, "method suggestion failed, defaulting to percentage");
        MethodSuggestion::default()
    })
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

const DETECTION_SYSTEM_PROMPT: &str = "\
You are an expert at analyzing spreadsheet data structures.
Your job is to identify what types of analysis can be performed on the data.

Common categories include:
- Dispatcher Earnings: Revenue/earnings by dispatcher
- Driver Payments: Payments or earnings by driver
- Broker Performance: Revenue or metrics by broker/customer
- Equipment Analysis: Metrics by equipment/vehicle
- Route Analysis: Performance by route or destination

Return your analysis as a JSON object with this structure:
{
  \"categories\": [
    {
      \"name\": \"Category Name\",
      \"entity_column\": \"column_name\",
      \"amount_columns\": [\"column1\", \"column2\"],
      \"description\": \"What this analysis shows\",
      \"confidence\": 0.95
    }
  ]
}

Only include categories you're confident about (confidence > 0.7).";

const SUGGESTION_SYSTEM_PROMPT: &str =
    "You are a financial analyst helping determine calculation methods for earnings analysis.";

pub fn detection_prompt(summary: &TableSummary) -> String {
    let mut prompt = format!(
        "Analyze this spreadsheet structure and identify what analyses can be performed:\n\n\
         Total rows: {}\n\
         Total columns: {}\n\n\
         Column names: {}\n\n\
         Numeric columns: {}\n\n\
         Potential amount/money columns: {}\n\n\
         Potential entity/name columns: {}\n\n\
         Sample data (first few values per column):",
        summary.total_rows,
        summary.total_columns,
        summary.column_names.join(", "),
        summary.numeric_columns.join(", "),
        summary.potential_amount_columns.join(", "),
        summary.potential_entity_columns.join(", "),
    );

    let key_columns = summary
        .potential_entity_columns
        .iter()
        .take(PROMPT_COLUMNS)
        .chain(summary.potential_amount_columns.iter().take(PROMPT_COLUMNS));
    for col in key_columns {
        let samples = summary.samples(col);
        if samples.is_empty() {
            continue;
        }
        let shown: Vec<&str> = samples.iter().take(PROMPT_SAMPLES).map(String::as_str).collect();
        prompt.push_str(&format!("\n  {col}: {}", shown.join(", ")));
    }
    prompt
}

pub fn suggestion_prompt(rule: &CategoryRule, summary: &TableSummary) -> String {
    let samples: BTreeMap<&str, &[String]> = summary
        .sample_data
        .iter()
        .map(|(col, values)| (col.as_str(), values.as_slice()))
        .collect();
    let samples = serde_json::to_string_pretty(&samples).unwrap_or_default();

    format!(
        "I have a spreadsheet category: {}\n\
         Entity column: {}\n\
         Amount columns: {}\n\n\
         Sample data:\n{samples}\n\n\
         Suggest the best calculation method for this category.\n\
         Should each entity get:\n\
         1. A percentage of their total amount?\n\
         2. A flat rate per transaction?\n\
         3. Just show totals (no earnings calculation)?\n\
         4. Something else?\n\n\
         Return JSON with:\n\
         {{\n  \"method\": \"percentage\" | \"flat_rate\" | \"sum_only\" | \"custom\",\n  \
         \"reasoning\": \"Why this method is appropriate\",\n  \
         \"example\": \"Example calculation\"\n}}",
        rule.name,
        rule.entity_column,
        rule.amount_columns.join(", "),
    )
}

// ---------------------------------------------------------------------------
// OpenAI-compatible client
// ---------------------------------------------------------------------------

#[cfg(feature = "advisor")]
pub use client::OpenAiAdvisor;

#[cfg(feature = "advisor")]
mod client {
    use std::time::Duration;

    use anyhow::{bail, Context, Result};
    use serde::{Deserialize, Serialize};
    use tracing::debug;

    use super::*;
    use crate::settings::AdvisorSettings;

    #[derive(Serialize)]
    struct Msg<'a> {
        role: &'a str,
        content: &'a str,
    }

    #[derive(Serialize)]
    struct ResponseFormat {
        #[serde(rename = "type")]
        t: &'static str,
    }

    #[derive(Serialize)]
    struct Req<'a> {
        model: &'a str,
        messages: Vec<Msg<'a>>,
        temperature: f32,
        response_format: ResponseFormat,
    }

    #[derive(Deserialize)]
    struct Resp {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: MsgOut,
    }

    #[derive(Deserialize)]
    struct MsgOut {
        content: Option<String>,
    }

    /// Chat-completions client that asks for JSON-object responses.
    pub struct OpenAiAdvisor {
        http: reqwest::blocking::Client,
        endpoint: String,
        model: String,
        api_key: String,
    }

    impl OpenAiAdvisor {
        pub fn new(settings: &AdvisorSettings, api_key: String) -> Result<Self> {
            let http = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(settings.timeout_secs))
                .build()
                .context("build http client")?;
            Ok(Self {
                http,
                endpoint: settings.endpoint.clone(),
                model: settings.model.clone(),
                api_key,
            })
        }

        fn complete_json<T: serde::de::DeserializeOwned>(&self, system: &str, user: &str) -> Result<T> {
            let body = Req {
                model: &self.model,
                messages: vec![
                    Msg { role: "system", content: system },
                    Msg { role: "user", content: user },
                ],
                temperature: 0.3,
                response_format: ResponseFormat { t: "json_object" },
            };

            debug!(endpoint = %self.endpoint, model = %self.model, "advisor request");
            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .context("advisor request")?;

            let status = resp.status();
            if !status.is_success() {
                let txt = resp.text().unwrap_or_default();
                bail!("advisor error: {status} {txt}");
            }

            let out: Resp = resp.json().context("parse advisor response")?;
            let content = out
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .context("advisor response has no content")?;
            serde_json::from_str(&content).context("advisor content is not the expected JSON")
        }
    }

    impl CategoryAdvisor for OpenAiAdvisor {
        fn propose_rules(&self, summary: &TableSummary) -> Result<Vec<ProposedRule>> {
            let raw: RawProposals = self.complete_json(DETECTION_SYSTEM_PROMPT, &detection_prompt(summary))?;
            Ok(raw.categories)
        }

        fn suggest_method(&self, rule: &CategoryRule, summary: &TableSummary) -> Result<MethodSuggestion> {
            let raw: RawSuggestion =
                self.complete_json(SUGGESTION_SYSTEM_PROMPT, &suggestion_prompt(rule, summary))?;
            Ok(raw.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::summarize;
    use crate::models::Cell;

    struct Canned(&'static str);

    impl CategoryAdvisor for Canned {
        fn propose_rules(&self, _: &TableSummary) -> anyhow::Result<Vec<ProposedRule>> {
            let raw: RawProposals = serde_json::from_str(self.0)?;
            Ok(raw.categories)
        }

        fn suggest_method(&self, _: &CategoryRule, _: &TableSummary) -> anyhow::Result<MethodSuggestion> {
            let raw: RawSuggestion = serde_json::from_str(self.0)?;
            Ok(raw.into())
        }
    }

    struct Offline;

    impl CategoryAdvisor for Offline {
        fn propose_rules(&self, _: &TableSummary) -> anyhow::Result<Vec<ProposedRule>> {
            anyhow::bail!("connection refused")
        }

        fn suggest_method(&self, _: &CategoryRule, _: &TableSummary) -> anyhow::Result<MethodSuggestion> {
            anyhow::bail!("timed out")
        }
    }

    fn table() -> Table {
        Table::new(
            &["Broker", "Dispatch", "Amount"],
            vec![
                vec![Cell::from("ACME"), Cell::from("Ali"), Cell::Number(500.0)],
                vec![Cell::from("Week 2"), Cell::Empty, Cell::Empty],
            ],
        )
    }

    fn detect(advisor: Option<&dyn CategoryAdvisor>) -> Detection {
        let t = table();
        detect_categories(advisor, &t, &summarize(&t))
    }

    #[test]
    fn test_no_advisor_uses_fallback() {
        let d = detect(None);
        assert_eq!(d.source, DetectionSource::RuleBased);
        assert_eq!(d.rules.len(), 2);
    }

    #[test]
    fn test_failing_advisor_uses_fallback() {
        let d = detect(Some(&Offline));
        assert_eq!(d.source, DetectionSource::RuleBased);
        assert_eq!(d.rules[0].name, "Dispatcher Earnings");
    }

    #[test]
    fn test_malformed_response_uses_fallback() {
        let d = detect(Some(&Canned("{ not json")));
        assert_eq!(d.source, DetectionSource::RuleBased);
    }

    #[test]
    fn test_low_confidence_and_bad_columns_filtered() {
        let advisor = Canned(
            r#"{"categories":[
                {"name":"Dispatcher Earnings","entity_column":"Dispatch","amount_columns":["Amount"],"confidence":0.95},
                {"name":"Route Analysis","entity_column":"Dispatch","amount_columns":["Amount"],"confidence":0.7},
                {"name":"Driver Payments","entity_column":"Driver","amount_columns":["Amount"],"confidence":0.9}
            ]}"#,
        );
        let d = detect(Some(&advisor));
        assert_eq!(d.source, DetectionSource::Advisor);
        assert_eq!(d.rules.len(), 1);
        assert_eq!(d.rules[0].name, "Dispatcher Earnings");
        assert_eq!(d.rules[0].grouping_columns, vec![PERIOD_COLUMN]);
    }

    #[test]
    fn test_nothing_usable_uses_fallback() {
        let d = detect(Some(&Canned(r#"{"categories":[]}"#)));
        assert_eq!(d.source, DetectionSource::RuleBased);
        assert!(!d.rules.is_empty());
    }

    #[test]
    fn test_suggestion_default_on_failure() {
        let t = table();
        let summary = summarize(&t);
        let rule = CategoryRule::dispatcher("Dispatch", vec!["Amount".into()]);
        let s = suggest_or_default(Some(&Offline), &rule, &summary);
        assert_eq!(s, MethodSuggestion::default());
        assert_eq!(s.reasoning, "Default to percentage-based calculation");
        assert_eq!(suggest_or_default(None, &rule, &summary).method, CalculationMethod::Percentage);
    }

    #[test]
    fn test_suggestion_parsed() {
        let t = table();
        let summary = summarize(&t);
        let rule = CategoryRule::broker("Broker", vec!["Amount".into()]);
        let advisor = Canned(r#"{"method":"sum_only","reasoning":"brokers are not paid"}"#);
        let s = suggest_or_default(Some(&advisor), &rule, &summary);
        assert_eq!(s.method, CalculationMethod::SumOnly);
        assert_eq!(s.reasoning, "brokers are not paid");
        assert!(s.example.is_empty());
    }

    #[test]
    fn test_detection_prompt_lists_samples() {
        let t = table();
        let prompt = detection_prompt(&summarize(&t));
        assert!(prompt.contains("Total rows: 2"));
        assert!(prompt.contains("Column names: Broker, Dispatch, Amount"));
        assert!(prompt.contains("\n  Dispatch: Ali"));
        assert!(prompt.contains("\n  Amount: 500"));
    }

    #[test]
    fn test_suggestion_prompt_names_rule() {
        let t = table();
        let rule = CategoryRule::dispatcher("Dispatch", vec!["Amount".into()]);
        let prompt = suggestion_prompt(&rule, &summarize(&t));
        assert!(prompt.contains("I have a spreadsheet category: Dispatcher Earnings"));
        assert!(prompt.contains("\"Dispatch\""));
    }
}
