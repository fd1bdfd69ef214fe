//! The copy-rule document: parsing, binding, and rule matching.
//!
//! A rule document is JSON with a default `bucket_name`/`object_key` pair
//! and an ordered rule list. String- and bool-typed fields accept either an
//! expression or a static literal: a raw string that parses as an expression
//! of the right kind is compiled and validated against the corpus in
//! [`super::patterns`]; anything else is kept as a literal (strings), or
//! must be exactly `true`/`false` (bools).

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::expr::{EvalError, Expression, Kind};
use crate::types::Detail;

use super::patterns::validation_patterns;

/// Errors raised while loading or binding a rule document.
#[derive(Debug, Error)]
pub enum RuleConfigError {
    #[error("failed to open copy rule document: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse copy rule document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("at least one rule is required")]
    NoRules,

    #[error("rule[{0}]: when is required")]
    WhenRequired(usize),

    #[error("rule[{0}]: bucket_name is required (either at top level or in rule)")]
    BucketNameRequired(usize),

    #[error("rule[{0}]: object_key is required (either at top level or in rule)")]
    ObjectKeyRequired(usize),

    #[error("{context}: expression validation failed on pattern[{pattern}]: {source}")]
    Validation {
        context: String,
        pattern: usize,
        source: EvalError,
    },

    #[error("{context}: invalid bool value: {raw}")]
    InvalidBool { context: String, raw: String },
}

/// A string-typed field holding either a compiled expression or a static
/// literal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "String")]
pub struct ExprOrString {
    raw: String,
    #[serde(skip)]
    compiled: Option<Expression>,
}

impl From<String> for ExprOrString {
    fn from(raw: String) -> Self {
        ExprOrString { raw, compiled: None }
    }
}

impl ExprOrString {
    /// Compiles the raw string when it is a string-kinded expression,
    /// validating it against every corpus pattern; otherwise keeps it as a
    /// static literal.
    fn bind(&mut self, context: &str, patterns: &[Detail]) -> Result<(), RuleConfigError> {
        let Ok(expr) = Expression::parse(&self.raw) else {
            return Ok(()); // static literal
        };
        if !matches!(expr.kind(), Kind::Str | Kind::Dynamic) {
            return Ok(()); // wrong output kind: static literal
        }
        for (i, pattern) in patterns.iter().enumerate() {
            expr.eval_string(pattern)
                .map_err(|source| RuleConfigError::Validation {
                    context: context.to_string(),
                    pattern: i,
                    source,
                })?;
        }
        self.compiled = Some(expr);
        Ok(())
    }

    /// Evaluates the expression, or returns the static literal.
    pub fn eval(&self, detail: &Detail) -> Result<String, EvalError> {
        match &self.compiled {
            Some(expr) => expr.eval_string(detail),
            None => Ok(self.raw.clone()),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_expr(&self) -> bool {
        self.compiled.is_some()
    }
}

/// A bool-typed field holding either a compiled expression or a static
/// `true`/`false`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "String")]
pub struct ExprOrBool {
    raw: String,
    #[serde(skip)]
    value: bool,
    #[serde(skip)]
    compiled: Option<Expression>,
}

impl From<String> for ExprOrBool {
    fn from(raw: String) -> Self {
        ExprOrBool {
            raw,
            value: false,
            compiled: None,
        }
    }
}

impl ExprOrBool {
    fn bind(&mut self, context: &str, patterns: &[Detail]) -> Result<(), RuleConfigError> {
        if let Ok(expr) = Expression::parse(&self.raw) {
            if matches!(expr.kind(), Kind::Bool | Kind::Dynamic) {
                for (i, pattern) in patterns.iter().enumerate() {
                    expr.eval_bool(pattern)
                        .map_err(|source| RuleConfigError::Validation {
                            context: context.to_string(),
                            pattern: i,
                            source,
                        })?;
                }
                self.compiled = Some(expr);
                return Ok(());
            }
        }
        match self.raw.as_str() {
            "true" => self.value = true,
            "false" => self.value = false,
            other => {
                return Err(RuleConfigError::InvalidBool {
                    context: context.to_string(),
                    raw: other.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn eval(&self, detail: &Detail) -> Result<bool, EvalError> {
        match &self.compiled {
            Some(expr) => expr.eval_bool(detail),
            None => Ok(self.value),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_expr(&self) -> bool {
        self.compiled.is_some()
    }
}

/// One copy rule. The first rule whose `when` holds is selected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CopyRule {
    #[serde(default)]
    pub when: ExprOrBool,
    /// Matching changes are not copied.
    #[serde(default)]
    pub skip: bool,
    /// Export format token for workspace documents.
    #[serde(default)]
    pub export: String,
    #[serde(default)]
    pub bucket_name: ExprOrString,
    #[serde(default)]
    pub object_key: ExprOrString,
}

/// The top-level rule document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CopyConfig {
    #[serde(default)]
    pub bucket_name: ExprOrString,
    #[serde(default)]
    pub object_key: ExprOrString,
    #[serde(default)]
    pub rules: Vec<CopyRule>,
}

impl CopyConfig {
    /// Loads and binds a rule document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleConfigError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::parse(&bytes)
    }

    /// Parses and binds a rule document from JSON bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, RuleConfigError> {
        let mut config: CopyConfig = serde_json::from_slice(bytes)?;
        config.bind()?;
        Ok(config)
    }

    /// Validates the document and compiles every expression.
    pub fn bind(&mut self) -> Result<(), RuleConfigError> {
        if self.rules.is_empty() {
            return Err(RuleConfigError::NoRules);
        }
        let patterns = validation_patterns();
        self.bucket_name.bind("bucket_name", &patterns)?;
        self.object_key.bind("object_key", &patterns)?;
        for (i, rule) in self.rules.iter_mut().enumerate() {
            if rule.when.raw().is_empty() {
                return Err(RuleConfigError::WhenRequired(i));
            }
            rule.when.bind(&format!("rule[{i}].when"), &patterns)?;
            rule.bucket_name
                .bind(&format!("rule[{i}].bucket_name"), &patterns)?;
            rule.object_key
                .bind(&format!("rule[{i}].object_key"), &patterns)?;
            if !rule.skip {
                if self.bucket_name.raw().is_empty() && rule.bucket_name.raw().is_empty() {
                    return Err(RuleConfigError::BucketNameRequired(i));
                }
                if self.object_key.raw().is_empty() && rule.object_key.raw().is_empty() {
                    return Err(RuleConfigError::ObjectKeyRequired(i));
                }
            }
        }
        Ok(())
    }

    /// Finds the first rule whose `when` holds for `detail`.
    pub fn match_rule(&self, detail: &Detail) -> Result<Option<&CopyRule>, EvalError> {
        for rule in &self.rules {
            if rule.when.eval(detail)? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    /// The effective bucket name for a matched rule: rule-level first, then
    /// the document default.
    pub fn bucket_name(&self, rule: &CopyRule, detail: &Detail) -> Result<String, EvalError> {
        if !rule.bucket_name.raw().is_empty() {
            rule.bucket_name.eval(detail)
        } else {
            self.bucket_name.eval(detail)
        }
    }

    /// The effective object key for a matched rule.
    pub fn object_key(&self, rule: &CopyRule, detail: &Detail) -> Result<String, EvalError> {
        if !rule.object_key.raw().is_empty() {
            rule.object_key.eval(detail)
        } else {
            self.object_key.eval(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Change, File};

    fn parse(json: &str) -> Result<CopyConfig, RuleConfigError> {
        CopyConfig::parse(json.as_bytes())
    }

    fn pdf_detail() -> Detail {
        Detail {
            entity: Some(crate::types::Entity {
                id: "F1".to_string(),
                kind: "drive#file".to_string(),
                name: "report.pdf".to_string(),
                ..Default::default()
            }),
            change: Some(Change {
                change_type: "file".to_string(),
                file_id: "F1".to_string(),
                file: Some(File {
                    id: "F1".to_string(),
                    name: "report.pdf".to_string(),
                    mime_type: "application/pdf".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn parses_full_document() {
        let config = parse(
            r#"{
                "bucket_name": "my-bucket",
                "object_key": "entity.id + \"/\" + entity.name",
                "rules": [
                    {"when": "change.file.mimeType == \"application/pdf\""},
                    {"when": "change.file.mimeType.startsWith(\"application/vnd.google-apps\")",
                     "export": "pdf",
                     "bucket_name": "workspace-bucket",
                     "object_key": "\"exports/\" + change.fileId + \".pdf\""},
                    {"when": "change.removed", "skip": true}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.bucket_name.raw(), "my-bucket");
        assert!(!config.bucket_name.is_expr());
        assert!(config.object_key.is_expr());
        assert_eq!(config.rules.len(), 3);
        assert_eq!(config.rules[1].export, "pdf");
        assert_eq!(config.rules[1].bucket_name.raw(), "workspace-bucket");
        assert!(config.rules[2].skip);
    }

    #[test]
    fn no_rules_is_rejected() {
        let err = parse(r#"{"bucket_name": "b", "object_key": "k", "rules": []}"#).unwrap_err();
        assert!(matches!(err, RuleConfigError::NoRules));
    }

    #[test]
    fn missing_when_is_rejected() {
        let err = parse(
            r#"{"bucket_name": "b", "object_key": "k", "rules": [{"skip": true}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleConfigError::WhenRequired(0)));
    }

    #[test]
    fn missing_bucket_in_non_skip_rule_is_rejected() {
        let err = parse(r#"{"object_key": "k", "rules": [{"when": "true"}]}"#).unwrap_err();
        assert!(matches!(err, RuleConfigError::BucketNameRequired(0)));
    }

    #[test]
    fn missing_object_key_in_non_skip_rule_is_rejected() {
        let err = parse(r#"{"bucket_name": "b", "rules": [{"when": "true"}]}"#).unwrap_err();
        assert!(matches!(err, RuleConfigError::ObjectKeyRequired(0)));
    }

    #[test]
    fn invalid_bool_literal_is_rejected() {
        let err = parse(
            r#"{"bucket_name": "b", "object_key": "k", "rules": [{"when": "yes"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleConfigError::InvalidBool { .. }));
    }

    #[test]
    fn static_bool_literals_bind() {
        let config = parse(
            r#"{"bucket_name": "b", "object_key": "k",
                "rules": [{"when": "false"}, {"when": "true"}]}"#,
        )
        .unwrap();
        let detail = pdf_detail();
        // First rule is false; the second matches.
        let matched = config.match_rule(&detail).unwrap().unwrap();
        assert_eq!(matched.when.raw(), "true");
    }

    #[test]
    fn first_matching_rule_wins() {
        let config = parse(
            r#"{"bucket_name": "b", "object_key": "k",
                "rules": [
                    {"when": "change.file.mimeType == \"application/pdf\"", "export": "pdf"},
                    {"when": "true"}
                ]}"#,
        )
        .unwrap();
        let matched = config.match_rule(&pdf_detail()).unwrap().unwrap();
        assert_eq!(matched.export, "pdf");
    }

    #[test]
    fn no_rule_matches_yields_none() {
        let config = parse(
            r#"{"bucket_name": "b", "object_key": "k",
                "rules": [{"when": "change.removed"}]}"#,
        )
        .unwrap();
        assert!(config.match_rule(&pdf_detail()).unwrap().is_none());
    }

    #[test]
    fn bucket_and_key_resolution_prefers_rule_overrides() {
        let config = parse(
            r#"{"bucket_name": "default-bucket", "object_key": "entity.id",
                "rules": [
                    {"when": "true", "bucket_name": "override-bucket",
                     "object_key": "\"custom/\" + entity.id"}
                ]}"#,
        )
        .unwrap();
        let detail = pdf_detail();
        let rule = config.match_rule(&detail).unwrap().unwrap();
        assert_eq!(config.bucket_name(rule, &detail).unwrap(), "override-bucket");
        assert_eq!(config.object_key(rule, &detail).unwrap(), "custom/F1");
    }

    #[test]
    fn default_key_expression_evaluates() {
        let config = parse(
            r#"{"bucket_name": "b", "object_key": "entity.id + \"/\" + entity.name",
                "rules": [{"when": "true"}]}"#,
        )
        .unwrap();
        let detail = pdf_detail();
        let rule = config.match_rule(&detail).unwrap().unwrap();
        assert_eq!(config.object_key(rule, &detail).unwrap(), "F1/report.pdf");
    }

    #[test]
    fn validation_corpus_rejects_error_prone_expressions() {
        // matches() with a bad regex errors on every pattern, so binding fails
        // at startup rather than at event time.
        let err = parse(
            r#"{"bucket_name": "b", "object_key": "k",
                "rules": [{"when": "subject.matches(\"[unclosed\")"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleConfigError::Validation { .. }));
    }

    #[test]
    fn bool_expression_for_string_field_stays_literal() {
        // "true" would compile as a bool expression; for a string-typed
        // field it is kept as the literal string "true".
        let config = parse(
            r#"{"bucket_name": "true", "object_key": "k", "rules": [{"when": "true"}]}"#,
        )
        .unwrap();
        assert!(!config.bucket_name.is_expr());
        let detail = pdf_detail();
        let rule = config.match_rule(&detail).unwrap().unwrap();
        assert_eq!(config.bucket_name(rule, &detail).unwrap(), "true");
    }
}
