//! Placeholder resolution service.
//!
//! Template fragments carry `<token>` slots. Resolution replaces every slot
//! with a DSL literal built from the context value, or fails listing every
//! slot that could not be filled.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PlaceholderError, PlaceholderResult};

/// `<name>` with ASCII letters, digits and underscores only
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z0-9_]+)>").unwrap());

/// Key transforms tried in order when looking a token up in the context.
pub const KEY_TRANSFORMS: &[(&str, fn(&str) -> String)] = &[
    ("exact", exact),
    ("lowercase", lowercase),
    ("hyphenated", hyphenated),
    ("no_separator", no_separator),
    ("camel_case", camel_case),
];

fn exact(key: &str) -> String {
    key.to_string()
}

fn lowercase(key: &str) -> String {
    key.to_lowercase()
}

fn hyphenated(key: &str) -> String {
    key.to_lowercase().replace('_', "-")
}

fn no_separator(key: &str) -> String {
    key.to_lowercase().replace(['_', '-'], "")
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, part) in key
        .split(['_', '-'])
        .filter(|p| !p.is_empty())
        .enumerate()
    {
        let part = part.to_lowercase();
        if i == 0 {
            out.push_str(&part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Common `(head "value")` patterns and the context key each one feeds
pub fn common_entity_patterns() -> BTreeMap<String, String> {
    [
        ("investor_id", r#"\(investor\s+"([^"]+)"\)"#),
        ("fund_id", r#"\(fund\s+"([^"]+)"\)"#),
        ("class_id", r#"\(class\s+"([^"]+)"\)"#),
        ("cbu_id", r#"\(cbu\.id\s+"([^"]+)"\)"#),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Stateless resolver for `<token>` templates
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderResolver;

impl PlaceholderResolver {
    pub fn new() -> Self {
        Self
    }

    /// Distinct tokens in first-occurrence order, without the angle brackets.
    pub fn find_placeholders(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        PLACEHOLDER_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect()
    }

    pub fn has_unresolved_placeholders(&self, text: &str) -> bool {
        PLACEHOLDER_RE.is_match(text)
    }

    /// Replace every token with its context value. Fails with all missing
    /// tokens at once when any cannot be resolved.
    pub fn resolve(&self, text: &str, context: &HashMap<String, Value>) -> PlaceholderResult<String> {
        let missing = self.missing_tokens(text, context);
        if !missing.is_empty() {
            debug!(tokens = ?missing, "placeholder resolution failed");
            return Err(PlaceholderError::Unresolved { tokens: missing });
        }

        Ok(PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures| {
                lookup(context, &caps[1])
                    .and_then(format_value)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned())
    }

    /// Check that every token has a context value, without rendering.
    pub fn validate_placeholders(
        &self,
        text: &str,
        context: &HashMap<String, Value>,
    ) -> PlaceholderResult<()> {
        let missing = self.missing_tokens(text, context);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PlaceholderError::MissingContext { tokens: missing })
        }
    }

    /// Resolve from the context, then from `defaults`. Tokens found in
    /// neither are left in place.
    pub fn resolve_with_defaults(
        &self,
        text: &str,
        context: &HashMap<String, Value>,
        defaults: &HashMap<String, String>,
    ) -> String {
        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures| {
                let key = &caps[1];
                lookup(context, key)
                    .and_then(format_value)
                    .or_else(|| lookup_default(defaults, key).map(quote))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Pull context values out of already-resolved DSL. Each pattern maps a
    /// context key to a regex whose first capture group is the value.
    pub fn extract_context_from_dsl(
        &self,
        text: &str,
        patterns: &BTreeMap<String, String>,
    ) -> HashMap<String, Value> {
        let mut context = HashMap::new();
        for (key, pattern) in patterns {
            let re = match Regex::new(pattern) {
                Ok(re) => re,
                Err(e) => {
                    warn!(key = %key, "skipping invalid extraction pattern: {}", e);
                    continue;
                }
            };
            if let Some(value) = re.captures(text).and_then(|c| c.get(1)) {
                context.insert(key.clone(), Value::String(value.as_str().to_string()));
            }
        }
        context
    }

    fn missing_tokens(&self, text: &str, context: &HashMap<String, Value>) -> Vec<String> {
        self.find_placeholders(text)
            .into_iter()
            .filter(|token| lookup(context, token).and_then(format_value).is_none())
            .collect()
    }
}

/// First context value found through `KEY_TRANSFORMS`.
fn lookup<'a>(context: &'a HashMap<String, Value>, key: &str) -> Option<&'a Value> {
    KEY_TRANSFORMS
        .iter()
        .find_map(|(_, transform)| context.get(&transform(key)))
}

fn lookup_default<'a>(defaults: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    KEY_TRANSFORMS
        .iter()
        .find_map(|(_, transform)| defaults.get(&transform(key)))
        .map(String::as_str)
}

/// Render a context value as DSL. `None` for values with no literal form.
fn format_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(quote(s)),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Option<Vec<String>> = items.iter().map(format_value).collect();
            parts.map(|p| p.join(" "))
        }
        Value::Object(_) => Some(quote(&value.to_string())),
        Value::Null => None,
    }
}

/// Quote a string unless it already is a quoted literal.
pub(crate) fn quote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
