//! C6: the declarative rule engine. Rules are plain data (loadable from
//! YAML via [`RuleFile`]) evaluated against the serialized semantic
//! tree of each transaction set through the path grammar in [`path`].
//! See SPEC_FULL.md §4.6 / spec.md §4.6.

pub mod path;
pub mod registry;

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EnginePolicy;
use crate::diagnostics::{Diagnostic, DiagnosticCollector, Severity};
use crate::model::document::Document;

/// The closed operator set (spec.md §4.6). Numeric comparisons coerce
/// strings that parse as decimals; a comparison that can't be coerced
/// returns `false` and records no diagnostic for that condition, rather
/// than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Exists,
    NotExists,
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    Matches,
    NotMatches,
    /// Field must be a 10-digit NPI whose check digit passes the
    /// standard NPI Luhn check (prefix `80840` then Luhn; spec.md §4.6).
    NpiChecksum,
    /// Field must be an 8-digit `CCYYMMDD` date naming a real calendar day.
    DateCcyymmdd,
    /// Field's decimal representation must carry no more than `value`
    /// (default 2) digits after the point.
    MonetaryPrecision,
    /// Whole-transaction aggregate: sums `field` (optionally
    /// wildcarded) and compares it against `value.right_sum` within
    /// `value.tolerance`. Special-cased in [`Engine::evaluate_rule_against`]
    /// since it needs the full tree rather than one matched scalar.
    BalanceCheck,
    /// Per-instance cross-field comparison: `field` names the instance
    /// (or array of instances) to check; `value` carries `left`,
    /// `right` (paths relative to the instance, summed if wildcarded),
    /// `op` (`lte`/`gte`/`lt`/`gt`/`eq`/`ne`), and `tolerance`.
    ConsistencyCheck,
    /// Per-instance arithmetic: `value.expression` is evaluated with
    /// `+`/`-` over instance-relative field paths and numeric literals;
    /// fires when the result exceeds `value.tolerance` from zero.
    CalculationCheck,
    /// `value.when`/`op`/`value` name a sibling condition; when it
    /// holds, `field` (relative to the same instance) must exist.
    ConditionalRequired,
    /// Document-wide: no two transactions of the targeted type(s) may
    /// share a transaction-set control number (ST02). Evaluated once
    /// per document in [`Engine::evaluate`], not per transaction tree.
    Unique,
    /// Document-wide: the transaction-set code (ST01) must be one of
    /// the six recognized healthcare transaction sets.
    RecognizedTransactionCode,
}

/// A rule's `category`, purely classificatory — it does not gate
/// evaluation, only documents intent (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Structural,
    Business,
    Hipaa,
    Format,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl Condition {
    /// Evaluates for one resolved value (`None` when the field path
    /// resolved to nothing). Returns `true` when this condition's test
    /// is satisfied; a rule fires (emits a diagnostic) when every one
    /// of its conditions holds, so "is well-formed" checks must be
    /// phrased to hold on the malformed case.
    fn holds(&self, matched: Option<&Value>) -> bool {
        match self.operator {
            Operator::Exists => value_present(matched),
            Operator::NotExists => !value_present(matched),
            Operator::Eq => matched == self.value.as_ref(),
            Operator::Ne => matched != self.value.as_ref(),
            Operator::Gt => compare_numeric(matched, self.value.as_ref(), |a, b| a > b),
            Operator::Lt => compare_numeric(matched, self.value.as_ref(), |a, b| a < b),
            Operator::Gte => compare_numeric(matched, self.value.as_ref(), |a, b| a >= b),
            Operator::Lte => compare_numeric(matched, self.value.as_ref(), |a, b| a <= b),
            Operator::In => match (matched, &self.value) {
                (Some(v), Some(Value::Array(options))) => options.contains(v),
                _ => false,
            },
            Operator::NotIn => match (matched, &self.value) {
                (Some(v), Some(Value::Array(options))) => !options.contains(v),
                _ => false,
            },
            Operator::Matches => match (matched.and_then(Value::as_str), self.value.as_ref().and_then(Value::as_str)) {
                (Some(text), Some(pattern)) => regex::Regex::new(pattern).map(|re| re.is_match(text)).unwrap_or(false),
                _ => false,
            },
            Operator::NotMatches => match (matched.and_then(Value::as_str), self.value.as_ref().and_then(Value::as_str)) {
                (Some(text), Some(pattern)) => regex::Regex::new(pattern).map(|re| !re.is_match(text)).unwrap_or(false),
                _ => false,
            },
            Operator::NpiChecksum => matched.and_then(Value::as_str).map(|npi| !npi_checksum_valid(npi)).unwrap_or(false),
            Operator::DateCcyymmdd => matched.and_then(Value::as_str).map(|d| !is_valid_ccyymmdd(d)).unwrap_or(false),
            Operator::MonetaryPrecision => {
                let max_decimals = self.value.as_ref().and_then(Value::as_u64).unwrap_or(2) as usize;
                matched.map(|v| !within_precision(v, max_decimals)).unwrap_or(false)
            }
            // Aggregate/document-wide operators carry their own evaluation
            // path (Engine::evaluate_rule_against / Engine::evaluate) and
            // never reach a per-scalar holds() call in practice; a rule
            // that somehow combines one with ordinary conditions is a
            // no-op rather than a panic.
            Operator::BalanceCheck
            | Operator::ConsistencyCheck
            | Operator::CalculationCheck
            | Operator::ConditionalRequired
            | Operator::Unique
            | Operator::RecognizedTransactionCode => false,
        }
    }
}

/// `Option<T>` model fields serialize as a present `null`, not an absent
/// key, so "exists"/"not exists" checks must treat `null` as absent to
/// match what the field actually means.
fn value_present(matched: Option<&Value>) -> bool {
    matches!(matched, Some(v) if !v.is_null())
}

/// Validates a 10-digit NPI's check digit: Luhn over `80840` followed
/// by the NPI's first 9 digits, compared against its 10th digit.
fn npi_checksum_valid(npi: &str) -> bool {
    if npi.len() != 10 || !npi.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let base: Vec<u32> = format!("80840{}", &npi[..9]).chars().filter_map(|c| c.to_digit(10)).collect();
    let check_digit: u32 = match npi[9..].parse() {
        Ok(d) => d,
        Err(_) => return false,
    };
    luhn_check_digit(&base) == check_digit
}

fn luhn_check_digit(digits: &[u32]) -> u32 {
    let mut sum = 0u32;
    for (i, &d) in digits.iter().rev().enumerate() {
        if i % 2 == 0 {
            let doubled = d * 2;
            sum += if doubled > 9 { doubled - 9 } else { doubled };
        } else {
            sum += d;
        }
    }
    (10 - (sum % 10)) % 10
}

fn is_valid_ccyymmdd(date: &str) -> bool {
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let year: u32 = date[0..4].parse().unwrap_or(0);
    let month: u32 = date[4..6].parse().unwrap_or(0);
    let day: u32 = date[6..8].parse().unwrap_or(0);
    if !(1..=12).contains(&month) || day == 0 {
        return false;
    }
    let days_in_month = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    };
    day <= days_in_month
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn within_precision(value: &Value, max_decimals: usize) -> bool {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return true,
    };
    match text.split_once('.') {
        Some((_, frac)) => frac.len() <= max_decimals,
        None => true,
    }
}

fn numeric_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn compare_numeric(matched: Option<&Value>, operand: Option<&Value>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (matched.and_then(numeric_of), operand.and_then(numeric_of)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// The six recognized healthcare transaction sets (spec.md §1/§3).
const RECOGNIZED_TRANSACTION_CODES: &[&str] = &["835", "837", "270", "271", "276", "277"];

/// Resolves `path` against `scope` and sums every numeric match. A plain
/// field resolves to at most one value; a `[*]`-wildcarded field sums
/// every matched element. An empty path sums `scope` itself (useful
/// when `scope` is already the leaf). Returns `None` only when nothing
/// numeric was found to sum.
fn numeric_sum(scope: &Value, path: &str) -> Option<f64> {
    if path.is_empty() {
        return numeric_of(scope);
    }
    let matches = path::evaluate(scope, path);
    if matches.is_empty() {
        return None;
    }
    let mut total = 0.0;
    for (_, v) in matches {
        total += numeric_of(v)?;
    }
    Some(total)
}

/// Splits a field path at its first `[*]` wildcard into the array
/// prefix (including the wildcard) and the path relative to one
/// matched element. A path with no wildcard returns `(None, field)`.
fn split_array_prefix(field: &str) -> (Option<String>, String) {
    match field.find("[*]") {
        Some(pos) => {
            let prefix = field[..pos + 3].to_string();
            let rel = field[pos + 3..].trim_start_matches('.').to_string();
            (Some(prefix), rel)
        }
        None => (None, field.to_string()),
    }
}

/// Evaluates a `+`/`-` chain of numeric literals and field paths
/// (relative to `scope`, summed if wildcarded) used by
/// `Operator::CalculationCheck`. Returns `None` if any term can't be
/// resolved to a number.
fn eval_additive_expression(scope: &Value, expression: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut sign = 1.0;
    let mut term_start = 0usize;
    let bytes = expression.as_bytes();

    for i in 0..=bytes.len() {
        let at_end = i == bytes.len();
        let is_operator = !at_end && (bytes[i] == b'+' || bytes[i] == b'-');
        if at_end || is_operator {
            let term = expression[term_start..i].trim();
            if !term.is_empty() {
                let value = term.parse::<f64>().ok().or_else(|| numeric_sum(scope, term))?;
                total += sign * value;
            }
            if is_operator {
                sign = if bytes[i] == b'-' { -1.0 } else { 1.0 };
                term_start = i + 1;
            }
        }
    }
    Some(total)
}

fn default_enabled() -> bool {
    true
}

/// One rule: a target (transaction types, or all), a category label,
/// and an ordered, implicitly-ANDed list of conditions. Firing appends
/// one diagnostic per unique matching path (spec.md §8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    /// Transaction-set codes (e.g. `"835"`) this rule applies to; empty
    /// means every transaction in the document.
    #[serde(default)]
    pub transaction_types: HashSet<String>,
    #[serde(default = "default_category")]
    pub category: Category,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_category() -> Category {
    Category::Custom
}

impl Rule {
    fn effective_code(&self) -> String {
        self.error_code.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// A named, loadable collection of rules (one YAML document; spec.md
/// §6.5). Unknown top-level keys are preserved as opaque values rather
/// than rejected, matching "unknown fields are preserved as opaque
/// metadata and ignored by the engine."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub transaction_set: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(flatten)]
    pub extra: std::collections::BTreeMap<String, serde_yaml::Value>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl RuleFile {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

/// Evaluates a set of rules against a parsed [`Document`], honoring
/// [`EnginePolicy`]'s `max_errors`, `fail_fast`, and `rule_budget`.
/// Returns the number of rule definitions actually attempted (a rule
/// skipped for being `enabled: false` is not counted; one whose
/// `transaction_types` simply doesn't match anything in this document
/// still counts, since the engine did consider it).
pub struct Engine {
    rules: Vec<Rule>,
}

impl Engine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, document: &Document, policy: &EnginePolicy, diags: &mut DiagnosticCollector) -> usize {
        let started = Instant::now();
        let mut applied = 0;

        let transactions = collect_transactions(document);

        for rule in &self.rules {
            if !rule.enabled {
                continue;
            }
            if let Some(budget) = policy.rule_budget {
                if started.elapsed() > budget {
                    diags.push(Diagnostic::info(
                        "RULES_TIMEOUT",
                        "rule evaluation stopped after exceeding the configured time budget",
                        "rules",
                    ));
                    break;
                }
            }
            if let Some(max) = policy.max_errors {
                if diags.all().len() >= max {
                    break;
                }
            }

            applied += 1;

            let sole_operator = match rule.conditions.as_slice() {
                [only] => Some(only.operator),
                _ => None,
            };
            match sole_operator {
                Some(Operator::Unique) => {
                    self.evaluate_unique(rule, &transactions, diags);
                }
                Some(Operator::RecognizedTransactionCode) => {
                    self.evaluate_recognized_code(rule, &transactions, diags);
                }
                _ => {
                    for (prefix, code, _control_number, tree) in &transactions {
                        if !rule.transaction_types.is_empty() && !rule.transaction_types.contains(code) {
                            continue;
                        }
                        self.evaluate_rule_against(rule, prefix, tree, diags);
                    }
                }
            }

            if policy.fail_fast && diags.has_fatal_error() {
                break;
            }
        }

        applied
    }

    /// Fires when two transactions of a targeted type share a
    /// transaction-set control number (ST02); "control-number
    /// uniqueness within run" (spec.md §4.6 `hipaa`).
    fn evaluate_unique(&self, rule: &Rule, transactions: &[(String, String, String, Value)], diags: &mut DiagnosticCollector) {
        let mut seen: HashSet<&str> = HashSet::new();
        for (prefix, code, control_number, _tree) in transactions {
            if !rule.transaction_types.is_empty() && !rule.transaction_types.contains(code) {
                continue;
            }
            if control_number.is_empty() {
                continue;
            }
            if !seen.insert(control_number.as_str()) {
                let path = format!("{prefix}.header.control_number");
                self.fire(rule, &path, Some("control_number"), Some(&Value::String(control_number.clone())), None, diags);
            }
        }
    }

    /// Fires when a transaction's ST01 code isn't one of the six
    /// recognized healthcare transaction sets (spec.md §4.6 `hipaa`).
    fn evaluate_recognized_code(&self, rule: &Rule, transactions: &[(String, String, String, Value)], diags: &mut DiagnosticCollector) {
        for (prefix, code, _control_number, _tree) in transactions {
            if !rule.transaction_types.is_empty() && !rule.transaction_types.contains(code) {
                continue;
            }
            if !RECOGNIZED_TRANSACTION_CODES.contains(&code.as_str()) {
                let path = format!("{prefix}.header.transaction_set_code");
                self.fire(rule, &path, Some("transaction_set_code"), Some(&Value::String(code.clone())), None, diags);
            }
        }
    }

    fn evaluate_rule_against(&self, rule: &Rule, txn_prefix: &str, root: &Value, diags: &mut DiagnosticCollector) {
        if let [condition] = rule.conditions.as_slice() {
            match condition.operator {
                Operator::BalanceCheck => return self.evaluate_balance_check(rule, condition, txn_prefix, root, diags),
                Operator::ConsistencyCheck => return self.evaluate_consistency_check(rule, condition, txn_prefix, root, diags),
                Operator::CalculationCheck => return self.evaluate_calculation_check(rule, condition, txn_prefix, root, diags),
                Operator::ConditionalRequired => return self.evaluate_conditional_required(rule, condition, txn_prefix, root, diags),
                _ => {}
            }
        }

        let array_prefix = rule.conditions.iter().find_map(|c| {
            let pos = c.field.find("[*]")?;
            Some(c.field[..pos + 3].to_string())
        });

        let instances: Vec<(String, &Value)> = match &array_prefix {
            Some(prefix) => path::evaluate(root, prefix),
            None => vec![(String::new(), root)],
        };

        for (concrete, instance) in instances {
            let mut all_hold = true;
            let mut primary_field: Option<String> = None;
            let mut primary_value: Option<Value> = None;
            let mut primary_message: Option<String> = None;

            for condition in &rule.conditions {
                let matches = condition_matches(condition, root, instance, array_prefix.as_deref());
                let holds = if matches.is_empty() {
                    matches!(condition.operator, Operator::NotExists | Operator::Exists) && condition.holds(None)
                } else {
                    matches.iter().all(|(_, v)| condition.holds(Some(v)))
                };

                if primary_field.is_none() {
                    primary_field = Some(condition.field.clone());
                    primary_value = matches.first().map(|(_, v)| (*v).clone());
                    primary_message = condition.message.clone();
                }

                if !holds {
                    all_hold = false;
                    break;
                }
            }

            if all_hold {
                let location = if concrete.is_empty() {
                    format!("{txn_prefix}.{}", primary_field.clone().unwrap_or_default())
                } else {
                    format!("{txn_prefix}.{concrete}")
                };
                self.fire(rule, &location, primary_field.as_deref(), primary_value.as_ref(), primary_message, diags);
            }
        }
    }

    /// Sums `condition.field` (relative to `root`, wildcard-summed if it
    /// contains `[*]`) and `value.right_sum`/`value.right`, firing when
    /// the two differ by more than `value.tolerance` (default 0.01).
    /// Whole-transaction scope: `condition.field` is resolved directly
    /// against `root`, not per matched instance (spec.md §4.6
    /// `balance_check{left_sum, right_sum, tolerance}`).
    fn evaluate_balance_check(&self, rule: &Rule, condition: &Condition, txn_prefix: &str, root: &Value, diags: &mut DiagnosticCollector) {
        let params = condition.value.as_ref().and_then(Value::as_object);
        let right_path = params
            .and_then(|p| p.get("right_sum").or_else(|| p.get("right")))
            .and_then(Value::as_str)
            .unwrap_or("");
        let tolerance = params.and_then(|p| p.get("tolerance")).and_then(Value::as_f64).unwrap_or(0.01);

        let (Some(left), Some(right)) = (numeric_sum(root, &condition.field), numeric_sum(root, right_path)) else {
            return;
        };
        if (left - right).abs() > tolerance {
            let path = format!("{txn_prefix}.{}", condition.field.replace("[*]", "[]"));
            self.fire_aggregate(rule, &path, left, right, diags);
        }
    }

    /// Per-instance cross-field comparison. `condition.field` names the
    /// instance or array of instances (e.g. `claims[*]`, or empty for
    /// the whole transaction); `value.left`/`value.right` are paths
    /// relative to each instance (summed if wildcarded), compared with
    /// `value.op` within `value.tolerance` (spec.md §4.6 `consistency_check`).
    fn evaluate_consistency_check(&self, rule: &Rule, condition: &Condition, txn_prefix: &str, root: &Value, diags: &mut DiagnosticCollector) {
        let params = condition.value.as_ref().and_then(Value::as_object);
        let left_path = params.and_then(|p| p.get("left")).and_then(Value::as_str).unwrap_or("");
        let right_path = params.and_then(|p| p.get("right")).and_then(Value::as_str).unwrap_or("");
        let op = params.and_then(|p| p.get("op")).and_then(Value::as_str).unwrap_or("eq");
        let tolerance = params.and_then(|p| p.get("tolerance")).and_then(Value::as_f64).unwrap_or(0.0);

        let instances: Vec<(String, &Value)> = if condition.field.is_empty() {
            vec![(String::new(), root)]
        } else {
            path::evaluate(root, &condition.field)
        };

        for (concrete, instance) in instances {
            let (Some(left), Some(right)) = (numeric_sum(instance, left_path), numeric_sum(instance, right_path)) else {
                continue;
            };
            let satisfied = match op {
                "lte" => left <= right + tolerance,
                "gte" => left >= right - tolerance,
                "lt" => left < right + tolerance,
                "gt" => left > right - tolerance,
                "ne" => (left - right).abs() > tolerance,
                _ => (left - right).abs() <= tolerance,
            };
            if !satisfied {
                let path = if concrete.is_empty() {
                    format!("{txn_prefix}.{left_path}")
                } else {
                    format!("{txn_prefix}.{concrete}.{left_path}")
                };
                self.fire_aggregate(rule, &path, left, right, diags);
            }
        }
    }

    /// Per-instance arithmetic: `value.expression` is a `+`/`-` chain of
    /// numeric literals and instance-relative field paths (summed if
    /// wildcarded); fires when the result is more than `value.tolerance`
    /// from zero (spec.md §4.6 `calculation_check{expression}`).
    fn evaluate_calculation_check(&self, rule: &Rule, condition: &Condition, txn_prefix: &str, root: &Value, diags: &mut DiagnosticCollector) {
        let params = condition.value.as_ref().and_then(Value::as_object);
        let expression = params.and_then(|p| p.get("expression")).and_then(Value::as_str).unwrap_or("");
        let tolerance = params.and_then(|p| p.get("tolerance")).and_then(Value::as_f64).unwrap_or(0.01);

        let instances: Vec<(String, &Value)> = if condition.field.is_empty() {
            vec![(String::new(), root)]
        } else {
            path::evaluate(root, &condition.field)
        };

        for (concrete, instance) in instances {
            let Some(result) = eval_additive_expression(instance, expression) else {
                continue;
            };
            if result.abs() > tolerance {
                let path = if concrete.is_empty() {
                    format!("{txn_prefix}.{expression}")
                } else {
                    format!("{txn_prefix}.{concrete}")
                };
                self.fire(rule, &path, None, Some(&Value::from(result)), None, diags);
            }
        }
    }

    /// `condition.field` must exist whenever the sibling condition named
    /// by `value.when`/`value.op`/`value.value` holds, both resolved
    /// relative to the same instance (spec.md §4.6
    /// `conditional_required{when, op, value}`).
    fn evaluate_conditional_required(&self, rule: &Rule, condition: &Condition, txn_prefix: &str, root: &Value, diags: &mut DiagnosticCollector) {
        let params = condition.value.as_ref().and_then(Value::as_object);
        let when_path = params.and_then(|p| p.get("when")).and_then(Value::as_str).unwrap_or("");
        let op = params.and_then(|p| p.get("op")).and_then(Value::as_str).unwrap_or("exists");
        let expected = params.and_then(|p| p.get("value"));

        let (array_prefix, relative_field) = split_array_prefix(&condition.field);
        let instances: Vec<(String, &Value)> = match &array_prefix {
            Some(prefix) => path::evaluate(root, prefix),
            None => vec![(String::new(), root)],
        };

        for (concrete, instance) in instances {
            let when_value = path::evaluate(instance, when_path).first().map(|(_, v)| *v);
            let condition_met = match op {
                "exists" => value_present(when_value),
                "not_exists" => !value_present(when_value),
                "eq" => when_value == expected,
                "ne" => when_value != expected,
                _ => false,
            };
            if !condition_met {
                continue;
            }
            let required_present = path::evaluate(instance, &relative_field).first().map(|(_, v)| *v).is_some_and(|v| !v.is_null());
            if !required_present {
                let path = if concrete.is_empty() {
                    format!("{txn_prefix}.{relative_field}")
                } else {
                    format!("{txn_prefix}.{concrete}.{relative_field}")
                };
                self.fire(rule, &path, Some(&relative_field), None, None, diags);
            }
        }
    }

    fn fire_aggregate(&self, rule: &Rule, path: &str, left: f64, right: f64, diags: &mut DiagnosticCollector) {
        let template = rule.message.clone().unwrap_or_else(|| rule.description.clone());
        let message = template.replace("{left}", &left.to_string()).replace("{right}", &right.to_string());
        let diagnostic = Diagnostic::new(rule.severity, rule.effective_code(), message, path)
            .with_rule_id(rule.id.clone())
            .with_context("left", left.to_string())
            .with_context("right", right.to_string());
        diags.push(diagnostic);
    }

    fn fire(
        &self,
        rule: &Rule,
        path: &str,
        field: Option<&str>,
        value: Option<&Value>,
        condition_message: Option<String>,
        diags: &mut DiagnosticCollector,
    ) {
        let template = condition_message.or_else(|| rule.message.clone()).unwrap_or_else(|| rule.description.clone());
        let value_display = value.map(display_value).unwrap_or_default();
        let message = template.replace("{value}", &value_display).replace("{field}", field.unwrap_or(""));

        let mut diagnostic = Diagnostic::new(rule.severity, rule.effective_code(), message, path).with_rule_id(rule.id.clone());
        if !value_display.is_empty() {
            diagnostic = diagnostic.with_value(value_display);
        }
        diags.push(diagnostic);
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn condition_matches<'a>(condition: &Condition, root: &'a Value, instance: &'a Value, array_prefix: Option<&str>) -> Vec<(String, &'a Value)> {
    if let Some(prefix) = array_prefix {
        if condition.field.starts_with(prefix) {
            let rel = condition.field[prefix.len()..].trim_start_matches('.');
            return if rel.is_empty() {
                vec![(String::new(), instance)]
            } else {
                path::evaluate(instance, rel)
            };
        }
    }
    path::evaluate(root, &condition.field)
}

/// Flattens the document into `(path_prefix, transaction_set_code,
/// control_number, serialized_tree)` quadruples, one per transaction
/// set, so the engine can filter by `transaction_types`, build
/// fully-qualified diagnostic paths, and run the document-wide
/// `Unique`/`RecognizedTransactionCode` checks without re-walking the tree.
fn collect_transactions(document: &Document) -> Vec<(String, String, String, Value)> {
    let mut out = Vec::new();
    for (i, interchange) in document.interchanges.iter().enumerate() {
        for (j, group) in interchange.functional_groups.iter().enumerate() {
            for (k, txn) in group.transactions.iter().enumerate() {
                let prefix = format!("interchanges[{i}].functional_groups[{j}].transactions[{k}]");
                let tree = serde_json::to_value(&txn.transaction_data).unwrap_or(Value::Null);
                out.push((prefix, txn.header.transaction_set_code.clone(), txn.header.control_number.clone(), tree));
            }
        }
    }
    out
}
