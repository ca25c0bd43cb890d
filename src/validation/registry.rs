//! Built-in rule sets (§6.5): curated [`RuleFile`]s a caller can ask
//! for by name instead of authoring YAML from scratch. `comprehensive`
//! (alias `all`) is the union of every other named set, deduplicated
//! by rule id.

use std::collections::{BTreeMap, HashSet};

use serde_json::json;

use crate::diagnostics::Severity;

use super::{Category, Condition, Operator, Rule, RuleFile};

fn rule(id: &str, description: &str, error_code: &str, severity: Severity, transaction_type: &str, category: Category, field: &str, operator: Operator, value: Option<serde_json::Value>) -> Rule {
    Rule {
        id: id.to_string(),
        description: description.to_string(),
        severity,
        transaction_types: [transaction_type.to_string()].into_iter().collect(),
        category,
        enabled: true,
        conditions: vec![Condition {
            field: field.to_string(),
            operator,
            value,
            message: None,
        }],
        error_code: Some(error_code.to_string()),
        message: None,
    }
}

/// Builds a rule with no transaction-type restriction (applies to every
/// transaction set in the document) — used for document-wide checks
/// like control-number uniqueness and recognized transaction codes.
fn rule_all(id: &str, description: &str, error_code: &str, severity: Severity, category: Category, field: &str, operator: Operator, value: Option<serde_json::Value>) -> Rule {
    Rule {
        id: id.to_string(),
        description: description.to_string(),
        severity,
        transaction_types: HashSet::new(),
        category,
        enabled: true,
        conditions: vec![Condition {
            field: field.to_string(),
            operator,
            value,
            message: None,
        }],
        error_code: Some(error_code.to_string()),
        message: None,
    }
}

/// Structural sanity: the fields every recognized transaction must
/// carry to be minimally useful downstream.
pub fn basic() -> Vec<Rule> {
    vec![
        rule(
            "basic.835.payer_name_present",
            "835 payer name should be present",
            "BASIC_PAYER_NAME_MISSING",
            Severity::Warning,
            "835",
            Category::Structural,
            "payer.name",
            Operator::NotExists,
            None,
        ),
        rule(
            "basic.837p.claim_id_present",
            "837P claim id should not be empty",
            "BASIC_CLAIM_ID_MISSING",
            Severity::Warning,
            "837",
            Category::Structural,
            "claim.claim_id",
            Operator::NotExists,
            None,
        ),
    ]
}

/// Financial plausibility checks beyond what the 835 projector's
/// balance check already covers: non-negative monetary values,
/// recognized payment-method codes, paid-vs-charge invariants, and
/// service-line aggregation against the claim total (spec.md §4.6
/// `business`).
pub fn business() -> Vec<Rule> {
    vec![
        rule(
            "business.835.claim_total_paid_nonnegative",
            "835 claim total paid should not be negative",
            "BUSINESS_NEGATIVE_PAYMENT",
            Severity::Error,
            "835",
            Category::Business,
            "claims[*].total_paid",
            Operator::Lt,
            Some(json!(0)),
        ),
        rule(
            "business.837p.service_charge_nonnegative",
            "837P service line charge should not be negative",
            "BUSINESS_NEGATIVE_CHARGE",
            Severity::Error,
            "837",
            Category::Business,
            "service_lines[*].charge",
            Operator::Lt,
            Some(json!(0)),
        ),
        rule(
            "business.835.payment_method_recognized",
            "835 payment method should be one of ACH, CHK, WIR, NON",
            "BUSINESS_PAYMENT_METHOD_UNRECOGNIZED",
            Severity::Warning,
            "835",
            Category::Business,
            "financial_information.payment_method",
            Operator::NotIn,
            Some(json!(["ACH", "CHK", "WIR", "NON"])),
        ),
        Rule {
            id: "business.835.claim_paid_not_above_charge".to_string(),
            description: "835 claim total paid should not exceed total charge".to_string(),
            severity: Severity::Warning,
            transaction_types: ["835".to_string()].into_iter().collect(),
            category: Category::Business,
            enabled: true,
            conditions: vec![Condition {
                field: "claims[*]".to_string(),
                operator: Operator::ConsistencyCheck,
                value: Some(json!({ "left": "total_paid", "op": "lte", "right": "total_charge", "tolerance": 0.01 })),
                message: None,
            }],
            error_code: Some("BUSINESS_PAID_EXCEEDS_CHARGE".to_string()),
            message: None,
        },
        Rule {
            id: "business.835.service_lines_reconcile_with_claim_total".to_string(),
            description: "835 claim total paid should equal the sum of its service lines' paid amounts".to_string(),
            severity: Severity::Warning,
            transaction_types: ["835".to_string()].into_iter().collect(),
            category: Category::Business,
            enabled: true,
            conditions: vec![Condition {
                field: "claims[*]".to_string(),
                operator: Operator::ConsistencyCheck,
                value: Some(json!({ "left": "total_paid", "op": "eq", "right": "services[*].paid", "tolerance": 0.01 })),
                message: None,
            }],
            error_code: Some("BUSINESS_SERVICE_LINE_AGGREGATION_MISMATCH".to_string()),
            message: None,
        },
    ]
}

/// NPI format (10 digits) and checksum, payment-date canonicalization,
/// monetary precision, control-number uniqueness within the run, and
/// recognized transaction-set codes (spec.md §4.6 `hipaa`).
pub fn hipaa() -> Vec<Rule> {
    vec![
        rule(
            "hipaa.835.payee_npi_format",
            "835 payee NPI, if present, must be 10 digits",
            "HIPAA_NPI_FORMAT",
            Severity::Error,
            "835",
            Category::Hipaa,
            "payee.npi",
            Operator::NotMatches,
            Some(json!(r"^\d{10}$")),
        ),
        rule(
            "hipaa.835.payee_npi_checksum",
            "835 payee NPI, if present, must pass the NPI check-digit algorithm",
            "HIPAA_NPI_CHECKSUM",
            Severity::Error,
            "835",
            Category::Hipaa,
            "payee.npi",
            Operator::NpiChecksum,
            None,
        ),
        rule(
            "hipaa.837p.billing_provider_npi_format",
            "837P billing provider NPI, if present, must be 10 digits",
            "HIPAA_NPI_FORMAT",
            Severity::Error,
            "837",
            Category::Hipaa,
            "billing_provider.npi",
            Operator::NotMatches,
            Some(json!(r"^\d{10}$")),
        ),
        rule(
            "hipaa.837p.billing_provider_npi_checksum",
            "837P billing provider NPI, if present, must pass the NPI check-digit algorithm",
            "HIPAA_NPI_CHECKSUM",
            Severity::Error,
            "837",
            Category::Hipaa,
            "billing_provider.npi",
            Operator::NpiChecksum,
            None,
        ),
        rule(
            "hipaa.835.payment_date_canonical",
            "835 payment date, if present, must be a valid CCYYMMDD date",
            "HIPAA_DATE_FORMAT",
            Severity::Warning,
            "835",
            Category::Hipaa,
            "financial_information.payment_date",
            Operator::DateCcyymmdd,
            None,
        ),
        rule(
            "hipaa.835.total_paid_precision",
            "835 claim total paid must carry at most 2 decimal places",
            "HIPAA_MONETARY_PRECISION",
            Severity::Warning,
            "835",
            Category::Hipaa,
            "claims[*].total_paid",
            Operator::MonetaryPrecision,
            Some(json!(2)),
        ),
        rule_all(
            "hipaa.control_number_unique_within_run",
            "transaction-set control numbers (ST02) must be unique within a run",
            "HIPAA_CONTROL_NUMBER_DUPLICATE",
            Severity::Error,
            Category::Hipaa,
            "control_number",
            Operator::Unique,
            None,
        ),
        rule_all(
            "hipaa.recognized_transaction_set_code",
            "transaction-set code (ST01) must be one of the recognized healthcare transaction sets",
            "HIPAA_UNRECOGNIZED_TRANSACTION_CODE",
            Severity::Error,
            Category::Hipaa,
            "transaction_set_code",
            Operator::RecognizedTransactionCode,
            None,
        ),
    ]
}

/// Stricter HIPAA companion-guide checks layered on top of [`hipaa`]:
/// tax id shape and diagnosis code presence.
pub fn hipaa_advanced() -> Vec<Rule> {
    vec![
        rule(
            "hipaa_advanced.835.payer_tax_id_format",
            "835 payer tax id, if present, must be 9 digits",
            "HIPAA_TAX_ID_FORMAT",
            Severity::Warning,
            "835",
            Category::Hipaa,
            "payer.tax_id",
            Operator::NotMatches,
            Some(json!(r"^\d{9}$")),
        ),
        rule(
            "hipaa_advanced.837p.diagnosis_present",
            "837P claim should carry at least one diagnosis code",
            "HIPAA_DIAGNOSIS_MISSING",
            Severity::Warning,
            "837",
            Category::Hipaa,
            "diagnoses",
            Operator::NotExists,
            None,
        ),
    ]
}

/// Field-level validators (`currency_format`, `date_format`,
/// `npi_format`, `range`, `required`, `conditional_required`) composed
/// with cross-field validators (`balance_check`, `consistency_check`,
/// `calculation_check`) — the richer layer spec.md §4.6 describes on
/// top of [`business`] and [`hipaa`].
pub fn enhanced_business() -> Vec<Rule> {
    vec![
        rule(
            "enhanced_business.837p.service_lines_present",
            "837P claims should carry at least one service line",
            "ENHANCED_BUSINESS_NO_SERVICE_LINES",
            Severity::Warning,
            "837",
            Category::Business,
            "service_lines",
            Operator::NotExists,
            None,
        ),
        rule(
            "enhanced_business.837p.total_charge_currency_format",
            "837P claim total charge must carry at most 2 decimal places",
            "ENHANCED_BUSINESS_CURRENCY_FORMAT",
            Severity::Warning,
            "837",
            Category::Business,
            "claim.total_charge",
            Operator::MonetaryPrecision,
            Some(json!(2)),
        ),
        Rule {
            id: "enhanced_business.835.payee_npi_required_without_tax_id".to_string(),
            description: "835 payee must carry an NPI when no tax id was reported".to_string(),
            severity: Severity::Warning,
            transaction_types: ["835".to_string()].into_iter().collect(),
            category: Category::Business,
            enabled: true,
            conditions: vec![Condition {
                field: "payee.npi".to_string(),
                operator: Operator::ConditionalRequired,
                value: Some(json!({ "when": "payee.tax_id", "op": "not_exists" })),
                message: None,
            }],
            error_code: Some("ENHANCED_BUSINESS_PAYEE_IDENTIFIER_MISSING".to_string()),
            message: None,
        },
        Rule {
            id: "enhanced_business.835.bpr_balances_against_claims_and_plb".to_string(),
            description: "835 BPR total paid should balance against the sum of claim payments and PLB adjustments".to_string(),
            severity: Severity::Warning,
            transaction_types: ["835".to_string()].into_iter().collect(),
            category: Category::Business,
            enabled: true,
            conditions: vec![Condition {
                field: "financial_information.total_paid".to_string(),
                operator: Operator::BalanceCheck,
                value: Some(json!({ "right_sum": "claims[*].total_paid", "tolerance": 0.01 })),
                message: None,
            }],
            error_code: Some("ENHANCED_BUSINESS_BALANCE_CHECK".to_string()),
            message: None,
        },
        Rule {
            id: "enhanced_business.835.claim_total_charge_covers_adjustments_and_paid".to_string(),
            description: "835 claim total charge should equal total paid plus patient responsibility".to_string(),
            severity: Severity::Warning,
            transaction_types: ["835".to_string()].into_iter().collect(),
            category: Category::Business,
            enabled: true,
            conditions: vec![Condition {
                field: "claims[*]".to_string(),
                operator: Operator::CalculationCheck,
                value: Some(json!({ "expression": "total_charge - total_paid - patient_responsibility", "tolerance": 0.01 })),
                message: None,
            }],
            error_code: Some("ENHANCED_BUSINESS_CALCULATION_CHECK".to_string()),
            message: None,
        },
    ]
}

/// Returns the named built-in rule set, or `None` if `name` isn't one
/// of the recognized set names. `comprehensive` and `all` are aliases
/// for the union of every other set, deduplicated by rule id.
pub fn builtin(name: &str) -> Option<RuleFile> {
    let rules = match name {
        "basic" => basic(),
        "business" => business(),
        "hipaa" => hipaa(),
        "hipaa-advanced" | "hipaa_advanced" => hipaa_advanced(),
        "enhanced-business" | "enhanced_business" => enhanced_business(),
        "comprehensive" | "all" => {
            let mut seen = HashSet::new();
            let mut all = Vec::new();
            for set in [basic(), business(), hipaa(), hipaa_advanced(), enhanced_business()] {
                for r in set {
                    if seen.insert(r.id.clone()) {
                        all.push(r);
                    }
                }
            }
            all
        }
        _ => return None,
    };
    Some(RuleFile {
        version: "1.0".to_string(),
        transaction_set: None,
        description: Some(format!("built-in rule set: {name}")),
        rules,
        extra: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comprehensive_is_union_of_named_sets() {
        let comprehensive = builtin("comprehensive").unwrap();
        let total: usize = [basic(), business(), hipaa(), hipaa_advanced(), enhanced_business()]
            .iter()
            .map(Vec::len)
            .sum();
        assert_eq!(comprehensive.rules.len(), total);
    }

    #[test]
    fn all_is_an_alias_for_comprehensive() {
        assert_eq!(builtin("all").unwrap().rules.len(), builtin("comprehensive").unwrap().rules.len());
    }

    #[test]
    fn unknown_name_returns_none() {
        assert!(builtin("nonexistent").is_none());
    }

    #[test]
    fn every_built_in_rule_targets_one_type_or_is_explicitly_document_wide() {
        let comprehensive = builtin("comprehensive").unwrap();
        let document_wide: HashSet<&str> = ["hipaa.control_number_unique_within_run", "hipaa.recognized_transaction_set_code"].into_iter().collect();
        assert!(comprehensive
            .rules
            .iter()
            .all(|r| r.transaction_types.len() == 1 || (r.transaction_types.is_empty() && document_wide.contains(r.id.as_str()))));
    }

    #[test]
    fn document_wide_rules_are_exactly_the_expected_set() {
        let comprehensive = builtin("comprehensive").unwrap();
        let actual: HashSet<&str> = comprehensive.rules.iter().filter(|r| r.transaction_types.is_empty()).map(|r| r.id.as_str()).collect();
        let expected: HashSet<&str> = ["hipaa.control_number_unique_within_run", "hipaa.recognized_transaction_set_code"].into_iter().collect();
        assert_eq!(actual, expected);
    }
}
