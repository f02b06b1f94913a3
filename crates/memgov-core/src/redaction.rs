//! Redaction of audit-facing text.
//!
//! Every string that leaves the engine inside an event or link preview goes
//! through [`sanitize_line`] or [`preview_text`]: bracket characters are
//! stripped and sensitive values are replaced by [`REDACTION_MARKER`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Fixed replacement for sensitive content.
pub const REDACTION_MARKER: &str = "redacted";

/// Maximum preview length in characters.
pub const PREVIEW_MAX_CHARS: usize = 80;

const BRACKETS: [char; 6] = ['[', ']', '{', '}', '(', ')'];

/// Redaction pattern applied to previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionRule {
    pub pattern_name: String,
    pub regex_pattern: String,
    pub replacement: String,
}

impl RedactionRule {
    /// A sensitive term, together with any identifier it is embedded in
    /// (`db_password`, `Password123`), plus an immediately following
    /// `is value`, `: value` or `= value`.
    pub fn sensitive_term(name: &str, term_pattern: &str) -> Self {
        Self {
            pattern_name: name.to_string(),
            regex_pattern: format!(
                r"(?i)[a-z0-9_]*{term_pattern}[a-z0-9_]*(?:\s*(?:is\s+|[:=]\s*)\S+)?"
            ),
            replacement: REDACTION_MARKER.to_string(),
        }
    }

    pub fn bearer_token() -> Self {
        Self {
            pattern_name: "bearer_token".to_string(),
            regex_pattern: r"(?i)bearer\s+[a-zA-Z0-9\-._~+/]+=*".to_string(),
            replacement: REDACTION_MARKER.to_string(),
        }
    }
}

/// Ordered set of redaction rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewPolicy {
    pub rules: Vec<RedactionRule>,
    #[serde(skip)]
    compiled: Vec<(Regex, String)>,
}

impl PreviewPolicy {
    pub fn new(rules: Vec<RedactionRule>) -> Self {
        let compiled = rules
            .iter()
            .filter_map(|rule| {
                Regex::new(&rule.regex_pattern)
                    .ok()
                    .map(|re| (re, rule.replacement.clone()))
            })
            .collect();
        Self { rules, compiled }
    }

    /// The built-in sensitive-term list.
    pub fn standard() -> Self {
        Self::new(vec![
            RedactionRule::bearer_token(),
            RedactionRule::sensitive_term("password", "(?:password|passwd)"),
            RedactionRule::sensitive_term("secret", "secret"),
            RedactionRule::sensitive_term("api_key", r"api[\s_-]?key"),
            RedactionRule::sensitive_term("token", "token"),
            RedactionRule::sensitive_term("credential", "credential"),
        ])
    }

    /// Apply every rule in order.
    pub fn redact(&self, text: &str) -> RedactionResult {
        let mut result = text.to_string();
        let mut count = 0;
        let mut rules_matched = Vec::new();

        for ((re, replacement), rule) in self.compiled.iter().zip(&self.rules) {
            let matches = re.find_iter(&result).count();
            if matches > 0 {
                result = re.replace_all(&result, replacement.as_str()).to_string();
                count += matches;
                rules_matched.push(rule.pattern_name.clone());
            }
        }

        RedactionResult {
            text: result,
            redactions_applied: count,
            rules_matched,
        }
    }
}

/// Result of applying redaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionResult {
    pub text: String,
    pub redactions_applied: usize,
    pub rules_matched: Vec<String>,
}

fn standard_policy() -> &'static PreviewPolicy {
    static POLICY: OnceLock<PreviewPolicy> = OnceLock::new();
    POLICY.get_or_init(PreviewPolicy::standard)
}

pub fn strip_brackets(text: &str) -> String {
    text.chars().filter(|c| !BRACKETS.contains(c)).collect()
}

pub fn is_bracket_free(text: &str) -> bool {
    !text.contains(BRACKETS)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip brackets, redact and collapse whitespace. No length cap.
pub fn sanitize_line(text: &str) -> String {
    let stripped = strip_brackets(text);
    let redacted = standard_policy().redact(&stripped);
    collapse_whitespace(&redacted.text)
}

/// Sanitized text capped to [`PREVIEW_MAX_CHARS`].
pub fn preview_text(text: &str) -> String {
    let clean = sanitize_line(text);
    if clean.chars().count() <= PREVIEW_MAX_CHARS {
        return clean;
    }
    clean
        .chars()
        .take(PREVIEW_MAX_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}
