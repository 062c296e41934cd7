use std::collections::{HashMap, HashSet};

use crate::category::{CalculationMethod, ConfigEntry, EntityConfig};
use crate::models::{AggregateRow, EarningsResult};

/// Case-insensitive config lookup. Returns the configured spelling with the
/// entry. If two keys differ only by case, the first in map order wins.
pub fn lookup<'a>(entity: &str, config: Option<&'a EntityConfig>) -> Option<(&'a str, &'a ConfigEntry)> {
    let wanted = entity.to_lowercase();
    config?
        .iter()
        .find(|(name, _)| name.to_lowercase() == wanted)
        .map(|(name, entry)| (name.as_str(), entry))
}

/// Earnings for one entity total under `method`.
pub fn calculate(
    entity_name: &str,
    total_amount: f64,
    method: CalculationMethod,
    config: Option<&EntityConfig>,
) -> EarningsResult {
    let matched = lookup(entity_name, config);
    let name = matched.map(|(n, _)| n).unwrap_or(entity_name).to_string();
    let rate = matched.map(|(_, e)| e.value).unwrap_or(0.0);
    apply(name, total_amount, method, rate)
}

fn apply(entity_name: String, total_amount: f64, method: CalculationMethod, rate: f64) -> EarningsResult {
    let (percentage_or_rate, earnings) = match method {
        CalculationMethod::SumOnly => (0.0, total_amount),
        CalculationMethod::Percentage => (rate, total_amount * rate / 100.0),
        CalculationMethod::FlatRate => (rate, rate),
        CalculationMethod::Custom => (0.0, 0.0),
    };
    EarningsResult {
        entity_name,
        total_amount,
        percentage_or_rate,
        earnings,
    }
}

/// Earnings for every entity in one scope, joined against the configuration.
///
/// Data entities without configuration get a zero rate. Configured entities
/// without data get a zero total and zero earnings, so inactive entities
/// still show up. Data spellings that resolve to the same configured name are
/// merged first.
pub fn reconcile(
    rows: &[AggregateRow],
    method: CalculationMethod,
    config: Option<&EntityConfig>,
) -> Vec<EarningsResult> {
    let mut by_key: HashMap<String, &str> = HashMap::new();
    if let Some(config) = config {
        for name in config.keys() {
            by_key.entry(name.to_lowercase()).or_insert(name.as_str());
        }
    }

    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, f64> = HashMap::new();
    let mut present: HashSet<String> = HashSet::new();
    for row in rows {
        let key = row.entity_name.to_lowercase();
        let name = match by_key.get(&key) {
            Some(configured) => {
                present.insert(key);
                configured.to_string()
            }
            None => row.entity_name.clone(),
        };
        if !totals.contains_key(&name) {
            order.push(name.clone());
        }
        *totals.entry(name).or_default() += row.total_amount;
    }

    let mut results: Vec<EarningsResult> = order
        .into_iter()
        .map(|name| {
            let total = totals.get(&name).copied().unwrap_or_default();
            calculate(&name, total, method, config)
        })
        .collect();

    if let Some(config) = config {
        for (name, entry) in config {
            let key = name.to_lowercase();
            if present.contains(&key) || by_key.get(&key) != Some(&name.as_str()) {
                continue;
            }
            let rate = match method {
                CalculationMethod::Percentage | CalculationMethod::FlatRate => entry.value,
                CalculationMethod::SumOnly | CalculationMethod::Custom => 0.0,
            };
            results.push(EarningsResult {
                entity_name: name.clone(),
                total_amount: 0.0,
                percentage_or_rate: rate,
                earnings: 0.0,
            });
        }
    }

    results
}
