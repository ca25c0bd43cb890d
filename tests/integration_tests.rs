//! End-to-end scenarios S1-S6 and the boundary cases from SPEC_FULL.md
//! §8, driving the public `parse_and_validate` entry point the way a
//! caller outside this crate would.

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use std::str::FromStr;

use edi_x12_core::config::EngineConfig;
use edi_x12_core::error::EdiError;
use edi_x12_core::transactions::TransactionData;
use edi_x12_core::{parse_and_validate, Severity};

const ISA_PREFIX: &str = "ISA*00*          *00*          *ZZ*SENDER123      *ZZ*RECEIVER456    *210101*1253*^*00501*";
const ISA_SUFFIX: &str = "*0*P*>~";

fn isa(control: &str) -> String {
    format!("{ISA_PREFIX}{control:0>9}{ISA_SUFFIX}")
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Builds one interchange from a caller-supplied ST..SE body. `gs06`,
/// `ge01`/`ge02`, and `iea01`/`iea02` are parameterized so mismatch
/// scenarios can diverge from the happy path at exactly one spot.
struct Envelope {
    isa_control: String,
    gs06: String,
    ge01: String,
    ge02: String,
    iea01: String,
    iea02: String,
    body: String,
}

impl Envelope {
    fn happy_path(body: &str) -> Self {
        Self {
            isa_control: "000000001".to_string(),
            gs06: "1".to_string(),
            ge01: "1".to_string(),
            ge02: "1".to_string(),
            iea01: "1".to_string(),
            iea02: "000000001".to_string(),
            body: body.to_string(),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&isa(&self.isa_control));
        out.push_str(&format!(
            "GS*HP*SENDER*RECEIVER*20210101*1253*{}*X*005010X221A1~",
            self.gs06
        ));
        out.push_str(&self.body);
        out.push_str(&format!("GE*{}*{}~", self.ge01, self.ge02));
        out.push_str(&format!("IEA*{}*{}~", self.iea01, self.iea02));
        out.into_bytes()
    }
}

fn s1_body() -> &'static str {
    "ST*835*0001~\
BPR*I*1000.00*C*ACH*CCP*01*123456789*DA*987654321*1500000000**01*123456789*DA*987654321*20240101~\
TRN*1*TRACE123*1500000000~\
N1*PR*PAYER~\
N1*PE*PAYEE*XX*1234567893~\
CLP*CLM001*1*1200.00*1000.00*200.00*MC*PAYERCLAIM~\
SE*7*0001~"
}

#[test]
fn s1_minimal_835_ach_one_paid_claim() {
    let bytes = Envelope::happy_path(s1_body()).bytes();
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();

    assert!(outcome.diagnostics.is_valid);
    assert_eq!(outcome.diagnostics.summary.errors, 0);
    assert_eq!(outcome.document.interchanges.len(), 1);
    assert_eq!(outcome.document.interchanges[0].functional_groups.len(), 1);
    assert_eq!(outcome.document.interchanges[0].functional_groups[0].transactions.len(), 1);

    let txn = &outcome.document.interchanges[0].functional_groups[0].transactions[0];
    match &txn.transaction_data {
        TransactionData::T835(t835) => {
            assert_eq!(t835.financial_information.total_paid, dec("1000.00"));
            assert_eq!(t835.claims.len(), 1);
            let claim = &t835.claims[0];
            assert_eq!(claim.total_charge, dec("1200.00"));
            assert_eq!(claim.total_paid, dec("1000.00"));
            assert_eq!(claim.patient_responsibility, dec("200.00"));
        }
        other => panic!("expected T835, got {other:?}"),
    }
}

#[test]
fn s2_se_count_wrong_still_parses_with_one_diagnostic() {
    let body = s1_body().replace("SE*7*0001~", "SE*99*0001~");
    let bytes = Envelope::happy_path(&body).bytes();
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();

    assert_eq!(outcome.document.interchanges.len(), 1);
    let matches: Vec<_> = outcome
        .diagnostics
        .errors
        .iter()
        .filter(|d| d.code == "SE01_COUNT_INVALID")
        .collect();
    assert_eq!(matches.len(), 1);
    // SE01_COUNT_INVALID is an error-severity structural diagnostic, so
    // is_valid flips false.
    assert!(!outcome.diagnostics.is_valid);
}

#[test]
fn s3_control_numbers_mismatched() {
    let mut envelope = Envelope::happy_path(&s1_body().replace("SE*7*0001~", "SE*7*XYZ999~"));
    envelope.ge02 = "999999".to_string();
    envelope.iea02 = "000000099".to_string();
    let bytes = envelope.bytes();

    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();
    let codes: Vec<&str> = outcome.diagnostics.errors.iter().map(|d| d.code.as_str()).collect();
    assert!(codes.contains(&"ISA13_IEA02_MISMATCH"));
    assert!(codes.contains(&"GS06_GE02_MISMATCH"));
    assert!(codes.contains(&"ST02_SE02_MISMATCH"));
}

#[test]
fn s4_835_financial_imbalance_with_plb() {
    let body = s1_body().replace("SE*7*0001~", "PLB*1234567893*20240101*CV*-5.00~SE*8*0001~");
    let bytes = Envelope::happy_path(&body).bytes();
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();

    let imbalance = outcome
        .diagnostics
        .warnings
        .iter()
        .find(|d| d.code == "835_FINANCIAL_IMBALANCE")
        .expect("expected an 835_FINANCIAL_IMBALANCE warning");

    assert_eq!(imbalance.context.get("bpr_total").map(String::as_str), Some("1000.00"));
    assert_eq!(imbalance.context.get("claims_total").map(String::as_str), Some("1000.00"));
    assert_eq!(imbalance.context.get("plb_total").map(String::as_str), Some("-5.00"));
    assert_eq!(imbalance.context.get("delta").map(String::as_str), Some("5.00"));
    assert_eq!(imbalance.context.get("tolerance").map(String::as_str), Some("0.01"));
}

#[test]
fn s5_composite_svc_with_modifier() {
    let body = "ST*835*0001~\
BPR*I*100.00*C*ACH*CCP*01*123456789*DA*987654321*1500000000**01*123456789*DA*987654321*20240101~\
N1*PR*PAYER~\
N1*PE*PAYEE*XX*1234567893~\
CLP*CLM001*1*100.00*100.00*0*MC*PAYERCLAIM~\
SVC*HC>99213>25*100.00*75.00**1~\
SE*7*0001~";
    let bytes = Envelope::happy_path(body).bytes();
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();

    let txn = &outcome.document.interchanges[0].functional_groups[0].transactions[0];
    match &txn.transaction_data {
        TransactionData::T835(t835) => {
            let service = &t835.claims[0].services[0];
            assert_eq!(service.procedure_code, "99213");
            assert_eq!(service.modifiers, vec!["25".to_string()]);
            assert_eq!(service.charge, dec("100.00"));
            assert_eq!(service.paid, dec("75.00"));
            assert_eq!(service.units, dec("1"));
        }
        other => panic!("expected T835, got {other:?}"),
    }
}

#[test]
fn s6_custom_yaml_rule_fires() {
    let yaml = r#"
version: "1.0"
rules:
  - id: HIGH_VALUE
    description: "High-value payment {value}"
    severity: info
    conditions:
      - field: financial_information.total_paid
        operator: gt
        value: 500
"#;
    let rule_file = edi_x12_core::validation::RuleFile::from_yaml(yaml).unwrap();
    let mut config = EngineConfig::default();
    config.rules = rule_file.rules;

    let bytes = Envelope::happy_path(s1_body()).bytes();
    let outcome = parse_and_validate(&bytes, &config).unwrap();

    let hit = outcome
        .diagnostics
        .info
        .iter()
        .find(|d| d.code == "HIGH_VALUE")
        .expect("expected the custom HIGH_VALUE rule to fire");
    assert_eq!(hit.value.as_deref(), Some("1000.00"));
    assert_eq!(hit.severity, Severity::Info);
}

#[test]
fn zero_length_document_is_invalid_header() {
    let err = parse_and_validate(b"", &EngineConfig::default()).unwrap_err();
    assert_matches!(err, EdiError::InvalidHeader(_));
}

#[test]
fn isa_iea_only_zero_functional_groups() {
    let mut bytes = isa("000000001").into_bytes();
    bytes.extend_from_slice(b"IEA*0*000000001~");
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();
    assert_eq!(outcome.document.interchanges.len(), 1);
    assert!(outcome.document.interchanges[0].functional_groups.is_empty());
    assert!(outcome.diagnostics.is_valid);
}

#[test]
fn two_functional_groups_with_different_identifier_codes() {
    let mut bytes = isa("000000001").into_bytes();
    bytes.extend_from_slice(b"GS*HP*SENDER*RECEIVER*20210101*1253*1*X*005010X221A1~");
    bytes.extend_from_slice(s1_body().as_bytes());
    bytes.extend_from_slice(b"GE*1*1~");
    bytes.extend_from_slice(b"GS*HB*SENDER*RECEIVER*20210101*1253*2*X*005010X279A1~");
    bytes.extend_from_slice(b"ST*270*0002~EQ*30~SE*3*0002~");
    bytes.extend_from_slice(b"GE*1*2~");
    bytes.extend_from_slice(b"IEA*2*000000001~");

    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();
    assert_eq!(outcome.document.interchanges[0].functional_groups.len(), 2);
    assert_eq!(outcome.document.interchanges[0].functional_groups[0].header.functional_id_code, "HP");
    assert_eq!(outcome.document.interchanges[0].functional_groups[1].header.functional_id_code, "HB");
}

#[test]
fn group_with_two_st_se_pairs_differing_identifiers() {
    let body = format!(
        "{}{}",
        s1_body(),
        "ST*270*0002~EQ*30~SE*3*0002~"
    );
    let bytes = Envelope::happy_path(&body).bytes();
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();

    let transactions = &outcome.document.interchanges[0].functional_groups[0].transactions;
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].header.transaction_set_code, "835");
    assert_eq!(transactions[1].header.transaction_set_code, "270");
}

#[test]
fn composite_procedure_code_shapes_all_parse() {
    use edi_x12_core::transactions::split_procedure_composite;

    assert_eq!(
        split_procedure_composite(&["HC".into(), "99213".into()]),
        ("99213".to_string(), Vec::<String>::new())
    );
    assert_eq!(
        split_procedure_composite(&["HC".into(), "99213".into(), "25".into()]),
        ("99213".to_string(), vec!["25".to_string()])
    );
    assert_eq!(
        split_procedure_composite(&["HC".into(), "99213".into(), "25".into(), "59".into()]),
        ("99213".to_string(), vec!["25".to_string(), "59".to_string()])
    );
    assert_eq!(
        split_procedure_composite(&["99213".into()]),
        ("99213".to_string(), Vec::<String>::new())
    );
}

#[test]
fn cas_segment_with_three_adjustment_triplets_all_captured() {
    let body = "ST*835*0001~\
BPR*I*100.00*C*ACH*CCP*01*123456789*DA*987654321*1500000000**01*123456789*DA*987654321*20240101~\
N1*PR*PAYER~\
N1*PE*PAYEE*XX*1234567893~\
CLP*CLM001*1*200.00*100.00*0*MC*PAYERCLAIM~\
CAS*CO*45*50.00*1*51*30.00*2*85*20.00*1~\
SE*7*0001~";
    let bytes = Envelope::happy_path(body).bytes();
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();

    let txn = &outcome.document.interchanges[0].functional_groups[0].transactions[0];
    match &txn.transaction_data {
        TransactionData::T835(t835) => {
            assert_eq!(t835.claims[0].adjustments.len(), 3);
            assert!(t835.claims[0].adjustments.iter().all(|a| a.group_code.as_deref() == Some("CO")));
            assert_eq!(t835.claims[0].adjustments[0].reason_code, "45");
            assert_eq!(t835.claims[0].adjustments[1].reason_code, "51");
            assert_eq!(t835.claims[0].adjustments[2].reason_code, "85");
        }
        other => panic!("expected T835, got {other:?}"),
    }
}

#[test]
fn plb_alternating_sign_amounts_honor_balance_equation() {
    // claims_total (100.00) - plb_total (10.00 - 5.00 = 5.00) == 95.00,
    // which matches bpr_total exactly: no imbalance warning expected.
    let body = "ST*835*0001~\
BPR*I*95.00*C*ACH*CCP*01*123456789*DA*987654321*1500000000**01*123456789*DA*987654321*20240101~\
N1*PR*PAYER~\
N1*PE*PAYEE*XX*1234567893~\
CLP*CLM001*1*100.00*100.00*0*MC*PAYERCLAIM~\
PLB*1234567893*20240101*CV*10.00*L6*-5.00~\
SE*7*0001~";
    let bytes = Envelope::happy_path(body).bytes();
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();

    assert!(!outcome.diagnostics.warnings.iter().any(|d| d.code == "835_FINANCIAL_IMBALANCE"));
    let txn = &outcome.document.interchanges[0].functional_groups[0].transactions[0];
    match &txn.transaction_data {
        TransactionData::T835(t835) => assert_eq!(t835.plb_adjustments.len(), 2),
        other => panic!("expected T835, got {other:?}"),
    }
}

#[test]
fn unknown_transaction_code_retains_raw_segments() {
    let body = "ST*999*0001~ZZZ*1*2*3~SE*3*0001~";
    let bytes = Envelope::happy_path(body).bytes();
    let outcome = parse_and_validate(&bytes, &EngineConfig::default()).unwrap();

    let txn = &outcome.document.interchanges[0].functional_groups[0].transactions[0];
    assert_matches!(txn.transaction_data, TransactionData::Raw { .. });
    assert!(outcome.diagnostics.info.iter().any(|d| d.code == "UNKNOWN_TRANSACTION"));
}

#[test]
fn raw_transaction_serializes_under_its_type_tag() {
    let body = "ST*999*0001~ZZZ*1*2*3~SE*3*0001~";
    let bytes = Envelope::happy_path(body).bytes();
    let config = EngineConfig::default().with_builtin_rules("hipaa");
    let outcome = parse_and_validate(&bytes, &config).unwrap();

    let txn = &outcome.document.interchanges[0].functional_groups[0].transactions[0];
    let tree = serde_json::to_value(&txn.transaction_data).expect("Raw must serialize under internal tagging");
    assert_eq!(tree["type"], "Raw");
    assert!(tree["segments"].is_array());
}

#[test]
fn builtin_comprehensive_rule_set_runs_against_s1() {
    let config = EngineConfig::default().with_builtin_rules("comprehensive");
    let bytes = Envelope::happy_path(s1_body()).bytes();
    let outcome = parse_and_validate(&bytes, &config).unwrap();
    assert!(outcome.diagnostics.summary.rules_applied > 0);
    // S1's payee NPI (1234567893) is well-formed and checksum-valid, so the
    // comprehensive HIPAA rule set must not flag the document as invalid.
    assert!(outcome.diagnostics.is_valid);
    assert!(!outcome.diagnostics.errors.iter().any(|d| d.code == "HIPAA_NPI_FORMAT"));
}
