//! Label selector parsing and matching.
//!
//! Accepts the kubectl `-l` syntax and turns it into a `LabelSelector` so the same value
//! can be pushed down to the API server and re-checked locally on every notification.

use anyhow::{Result, bail};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static SET_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9._/-]+)\s+(in|notin)\s*\(([^()]*)\)$").expect("valid regex")
});

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}

/// Split on commas that are not inside a `( ... )` value list.
fn split_terms(s: &str) -> Result<Vec<&str>> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    bail!("Unbalanced ')' in selector '{}'", s);
                }
                depth -= 1;
            }
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        bail!("Unbalanced '(' in selector '{}'", s);
    }
    terms.push(&s[start..]);
    Ok(terms)
}

fn requirement(key: &str, operator: &str, values: Option<Vec<String>>) -> LabelSelectorRequirement {
    LabelSelectorRequirement {
        key: key.to_string(),
        operator: operator.to_string(),
        values,
    }
}

/// Parse a label selector string (`app=web,tier!=db,env in (prod,stage),!legacy`).
///
/// An empty string yields an empty selector, which matches every pod.
pub fn parse_selector(s: &str) -> Result<LabelSelector> {
    let mut match_labels = BTreeMap::new();
    let mut expressions = Vec::new();

    for term in split_terms(s)? {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }

        if let Some(caps) = SET_TERM.captures(term) {
            let values: Vec<String> = caps[3]
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            let operator = if &caps[2] == "in" { "In" } else { "NotIn" };
            expressions.push(requirement(&caps[1], operator, Some(values)));
        } else if let Some(key) = term.strip_prefix('!') {
            let key = key.trim();
            if !valid_key(key) {
                bail!("Invalid label key '{}' in selector '{}'", key, s);
            }
            expressions.push(requirement(key, "DoesNotExist", None));
        } else if let Some((key, value)) = term.split_once("!=") {
            let key = key.trim();
            if !valid_key(key) {
                bail!("Invalid label key '{}' in selector '{}'", key, s);
            }
            expressions.push(requirement(key, "NotIn", Some(vec![value.trim().to_string()])));
        } else if let Some((key, value)) = term.split_once('=') {
            let key = key.trim();
            let value = value.strip_prefix('=').unwrap_or(value).trim();
            if !valid_key(key) {
                bail!("Invalid label key '{}' in selector '{}'", key, s);
            }
            match_labels.insert(key.to_string(), value.to_string());
        } else if valid_key(term) {
            expressions.push(requirement(term, "Exists", None));
        } else {
            bail!("Could not parse term '{}' in selector '{}'", term, s);
        }
    }

    Ok(LabelSelector {
        match_labels: (!match_labels.is_empty()).then_some(match_labels),
        match_expressions: (!expressions.is_empty()).then_some(expressions),
    })
}

/// Check if pod labels match the given LabelSelector.
pub fn matches_selector(pod_labels: &BTreeMap<String, String>, selector: &LabelSelector) -> bool {
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if pod_labels.get(key) != Some(value) {
                return false;
            }
        }
    }

    let Some(expressions) = &selector.match_expressions else {
        return true;
    };
    expressions.iter().all(|expr| {
        let pod_value = pod_labels.get(&expr.key);
        match (expr.operator.as_str(), &expr.values) {
            ("In", Some(values)) => pod_value.is_some_and(|v| values.contains(v)),
            ("NotIn", Some(values)) => pod_value.is_none_or(|v| !values.contains(v)),
            ("Exists", _) => pod_value.is_some(),
            ("DoesNotExist", _) => pod_value.is_none(),
            // In/NotIn without values, or an operator we don't know
            _ => false,
        }
    })
}

/// Render a selector back into the string form the API server accepts.
pub fn selector_to_string(selector: &LabelSelector) -> Option<String> {
    let mut terms: Vec<String> = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.as_deref().unwrap_or_default().join(",");
        terms.push(match expr.operator.as_str() {
            "In" => format!("{} in ({})", expr.key, values),
            "NotIn" => format!("{} notin ({})", expr.key, values),
            "DoesNotExist" => format!("!{}", expr.key),
            _ => expr.key.clone(),
        });
    }

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(","))
    }
}
