//! The diagnostic collector (C7). Append-only, deduplicated, severity-counted.

use std::collections::BTreeMap;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A single diagnostic finding, stable-coded and path-annotated.
///
/// See SPEC_FULL.md §3 for the invariants and §6.3 for the wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub context: BTreeMap<String, String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            path: path.into(),
            field_path: None,
            value: None,
            rule_id: None,
            context: BTreeMap::new(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message, path)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message, path)
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message, path)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_field_path(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    fn dedup_key(&self) -> (String, String, Option<String>) {
        (self.code.clone(), self.path.clone(), self.value.clone())
    }
}

/// Ordered, append-only diagnostic sink. Dedups by `(code, path, value)`.
///
/// The collector has no notion of time; ordering reflects the order the
/// pipeline stages appended to it (SPEC_FULL.md §5 "Ordering guarantees").
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    seen: HashSet<(String, String, Option<String>)>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic; later duplicates of an earlier `(code, path, value)`
    /// tuple are silently suppressed.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        let key = diagnostic.dedup_key();
        if self.seen.insert(key) {
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(d);
        }
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn infos(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Info)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn info_count(&self) -> usize {
        self.infos().count()
    }

    /// `true` when no `error`-severity diagnostic has been recorded.
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    pub fn has_fatal_error(&self) -> bool {
        self.errors().next().is_some()
    }
}

/// Summary counters plus severity-bucketed diagnostics, matching
/// SPEC_FULL.md §6.3's canonical JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub is_valid: bool,
    pub summary: DiagnosticSummary,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub info: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub rules_applied: usize,
}

impl DiagnosticCollector {
    pub fn into_report(self, rules_applied: usize) -> DiagnosticReport {
        let is_valid = self.is_valid();
        let summary = DiagnosticSummary {
            errors: self.error_count(),
            warnings: self.warning_count(),
            info: self.info_count(),
            rules_applied,
        };
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut info = Vec::new();
        for d in self.diagnostics {
            match d.severity {
                Severity::Error => errors.push(d),
                Severity::Warning => warnings.push(d),
                Severity::Info => info.push(d),
            }
        }
        DiagnosticReport {
            is_valid,
            summary,
            errors,
            warnings,
            info,
        }
    }
}
