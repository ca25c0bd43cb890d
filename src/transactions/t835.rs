//! 835 (Health Care Claim Payment/Advice) projector.
//!
//! State machine: `Header -> Financial(BPR) -> Trace(TRN) -> Refs/Dates ->
//! Payer(N1=PR) -> Payee(N1=PE) -> Claims(loop: CLP (CAS|NM1|REF|DTM|AMT|QTY)*
//! (SVC (CAS|REF|DTM|AMT|QTY)*)*) -> Summary(PLB|SE)`. See SPEC_FULL.md §4.5.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::PlbSignConvention;
use crate::diagnostics::{Diagnostic, DiagnosticCollector};
use crate::model::segment::Segment;

use super::{parse_decimal, split_procedure_composite, unexpected_segment, IdentifierRef};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    pub name: Option<String>,
    pub npi: Option<String>,
    pub tax_id: Option<String>,
    pub other_ids: Vec<IdentifierRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialInformation {
    pub total_paid: Decimal,
    pub payment_method: String,
    pub payment_date: Option<String>,
    pub trace_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Adjustment {
    pub group_code: Option<String>,
    pub reason_code: String,
    pub amount: Decimal,
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceLine {
    pub procedure_code: String,
    pub modifiers: Vec<String>,
    pub charge: Decimal,
    pub paid: Decimal,
    pub units: Decimal,
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: String,
    pub status_code: String,
    pub total_charge: Decimal,
    pub total_paid: Decimal,
    pub patient_responsibility: Decimal,
    pub adjustments: Vec<Adjustment>,
    pub services: Vec<ServiceLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlbAdjustment {
    pub provider_id: String,
    pub reason_code: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct T835 {
    pub payer: Entity,
    pub payee: Entity,
    pub financial_information: FinancialInformation,
    pub claims: Vec<Claim>,
    pub plb_adjustments: Vec<PlbAdjustment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Financial,
    Trace,
    RefsDates,
    Payer,
    Payee,
    Claims,
    Summary,
}

/// Parses one CAS segment's adjustments. CAS01 is a single group code
/// shared by every repetition in the segment; what repeats is the
/// (reason, amount, quantity) triplet at elements 2-4, then 5-7, then
/// 8-10, etc, up to 6 triplets per segment in the standard, all of
/// which are captured, not only the first (§4.5).
fn parse_cas_adjustments(segment: &Segment, path: &str, diags: &mut DiagnosticCollector) -> Vec<Adjustment> {
    let group_code = segment.element_opt(1).map(str::to_string);
    let mut out = Vec::new();
    let mut pos = 2;
    loop {
        let reason = segment.element(pos);
        if reason.is_empty() {
            break;
        }
        let amount = parse_decimal(segment.element(pos + 1), path, diags);
        let quantity_raw = segment.element(pos + 2);
        let quantity = if quantity_raw.is_empty() {
            None
        } else {
            Some(parse_decimal(quantity_raw, path, diags))
        };
        out.push(Adjustment {
            group_code: group_code.clone(),
            reason_code: reason.to_string(),
            amount,
            quantity,
        });
        pos += 3;
    }
    out
}

fn apply_ref(entity: &mut Entity, segment: &Segment, diags: &mut DiagnosticCollector, path: &str) {
    let qualifier = segment.element(1);
    let value = segment.element(2);
    match qualifier {
        "TJ" => entity.tax_id = Some(value.to_string()),
        "HPI" => entity.npi = Some(value.to_string()),
        "1D" => {
            entity.other_ids.push(IdentifierRef {
                qualifier: qualifier.to_string(),
                value: value.to_string(),
            });
            diags.push(Diagnostic::info(
                "835_REF_1D_NPI_CANDIDATE",
                "REF*1D identifier recorded as other_ids; some payers use 1D for NPI in legacy versions",
                path,
            ).with_value(value));
        }
        "" => {}
        other => entity.other_ids.push(IdentifierRef {
            qualifier: other.to_string(),
            value: value.to_string(),
        }),
    }
}

fn apply_nm1_npi(entity: &mut Entity, segment: &Segment) {
    // NM1*...*XX*<npi>: qualifier "XX" at element 8 identifies an NPI.
    if segment.element(8) == "XX" {
        if let Some(npi) = segment.element_opt(9) {
            entity.npi = Some(npi.to_string());
        }
    }
}

pub fn project(segments: &[Segment], diags: &mut DiagnosticCollector, plb_sign: PlbSignConvention) -> T835 {
    let mut tree = T835::default();
    let mut state = State::Header;
    let mut current_claim: Option<Claim> = None;
    let mut current_service: Option<ServiceLine> = None;
    let mut target: RefTarget = RefTarget::None;

    for segment in segments {
        match segment.id.as_str() {
            "ST" | "SE" => continue,
            "BPR" => {
                tree.financial_information.total_paid = parse_decimal(segment.element(2), "financial_information.total_paid", diags);
                tree.financial_information.payment_method = segment.element(4).to_string();
                tree.financial_information.payment_date = segment.element_opt(16).map(str::to_string);
                state = State::Financial;
            }
            "TRN" => {
                tree.financial_information.trace_number = segment.element_opt(2).map(str::to_string);
                state = State::Trace;
            }
            "REF" if state == State::Trace || state == State::RefsDates => {
                state = State::RefsDates;
                // Header-level REF with no payer/payee context yet is recorded
                // against whichever entity is currently being built; before N1
                // loops begin there is none, so this is a no-op placeholder.
            }
            "DTM" if matches!(state, State::Trace | State::RefsDates) => {
                state = State::RefsDates;
            }
            "N1" if segment.element(1) == "PR" => {
                tree.payer.name = segment.element_opt(2).map(str::to_string);
                target = RefTarget::Payer;
                state = State::Payer;
            }
            "N1" if segment.element(1) == "PE" => {
                if segment.element(3) == "XX" {
                    tree.payee.npi = segment.element_opt(4).map(str::to_string);
                } else if segment.element(3) == "FI" {
                    tree.payee.tax_id = segment.element_opt(4).map(str::to_string);
                }
                tree.payee.name = segment.element_opt(2).map(str::to_string);
                target = RefTarget::Payee;
                state = State::Payee;
            }
            "REF" if matches!(state, State::Payer | State::Payee) => {
                let entity = match target {
                    RefTarget::Payer => &mut tree.payer,
                    RefTarget::Payee => &mut tree.payee,
                    RefTarget::None => continue,
                };
                apply_ref(entity, segment, diags, "payer_or_payee");
            }
            "NM1" if matches!(state, State::Payer | State::Payee) => {
                let entity = match target {
                    RefTarget::Payer => &mut tree.payer,
                    RefTarget::Payee => &mut tree.payee,
                    RefTarget::None => continue,
                };
                apply_nm1_npi(entity, segment);
            }
            "CLP" => {
                if let Some(claim) = current_claim.take() {
                    tree.claims.push(finish_claim(claim, current_service.take()));
                }
                state = State::Claims;
                current_claim = Some(Claim {
                    claim_id: segment.element(1).to_string(),
                    status_code: segment.element(2).to_string(),
                    total_charge: parse_decimal(segment.element(3), "claims[].total_charge", diags),
                    total_paid: parse_decimal(segment.element(4), "claims[].total_paid", diags),
                    patient_responsibility: parse_decimal(segment.element(5), "claims[].patient_responsibility", diags),
                    adjustments: Vec::new(),
                    services: Vec::new(),
                });
            }
            "CAS" if state == State::Claims => {
                let adjustments = parse_cas_adjustments(segment, "claims[].adjustments", diags);
                if let Some(service) = current_service.as_mut() {
                    service.adjustments.extend(adjustments);
                } else if let Some(claim) = current_claim.as_mut() {
                    claim.adjustments.extend(adjustments);
                }
            }
            "SVC" if state == State::Claims => {
                if let (Some(claim), Some(service)) = (current_claim.as_mut(), current_service.take()) {
                    claim.services.push(service);
                }
                let (procedure_code, modifiers) = split_procedure_composite(&segment.elements.first().map(|e| e.components.clone()).unwrap_or_default());
                current_service = Some(ServiceLine {
                    procedure_code,
                    modifiers,
                    charge: parse_decimal(segment.element(2), "claims[].services[].charge", diags),
                    paid: parse_decimal(segment.element(3), "claims[].services[].paid", diags),
                    units: parse_decimal(segment.element(5), "claims[].services[].units", diags),
                    adjustments: Vec::new(),
                });
            }
            "NM1" | "REF" | "DTM" | "AMT" | "QTY" if state == State::Claims => {
                // Accepted but not individually modeled at this grain.
            }
            "PLB" => {
                state = State::Summary;
                let provider_id = segment.element(1).to_string();
                let mut pos = 3;
                loop {
                    let reason = segment.element(pos);
                    if reason.is_empty() {
                        break;
                    }
                    let amount = parse_decimal(segment.element(pos + 1), "plb_adjustments[].amount", diags);
                    tree.plb_adjustments.push(PlbAdjustment {
                        provider_id: provider_id.clone(),
                        reason_code: reason.to_string(),
                        amount,
                    });
                    pos += 2;
                }
            }
            _ => {
                unexpected_segment(segment, state_name(state), "835", diags);
            }
        }
    }

    if let Some(claim) = current_claim.take() {
        tree.claims.push(finish_claim(claim, current_service.take()));
    }

    check_financial_balance(&tree, plb_sign, diags);
    tree
}

fn finish_claim(claim: Claim, trailing_service: Option<ServiceLine>) -> Claim {
    let mut claim = claim;
    if let Some(service) = trailing_service {
        claim.services.push(service);
    }
    claim
}

fn state_name(state: State) -> &'static str {
    match state {
        State::Header => "Header",
        State::Financial => "Financial",
        State::Trace => "Trace",
        State::RefsDates => "RefsDates",
        State::Payer => "Payer",
        State::Payee => "Payee",
        State::Claims => "Claims",
        State::Summary => "Summary",
    }
}

#[derive(Debug, Clone, Copy)]
enum RefTarget {
    None,
    Payer,
    Payee,
}

const BALANCE_TOLERANCE: &str = "0.01";

fn check_financial_balance(tree: &T835, sign: PlbSignConvention, diags: &mut DiagnosticCollector) {
    let claims_total: Decimal = tree.claims.iter().map(|c| c.total_paid).sum();
    let plb_total: Decimal = tree.plb_adjustments.iter().map(|p| p.amount).sum();
    let bpr_total = tree.financial_information.total_paid;

    let expected = match sign {
        PlbSignConvention::PositiveReducesObligation => claims_total - plb_total,
        PlbSignConvention::PositiveIncreasesObligation => claims_total + plb_total,
    };
    let delta = (bpr_total - expected).abs();
    let tolerance: Decimal = BALANCE_TOLERANCE.parse().unwrap();

    if delta > tolerance {
        diags.push(
            Diagnostic::warning(
                "835_FINANCIAL_IMBALANCE",
                format!("BPR total paid {bpr_total} does not match claims/PLB total {expected} within tolerance"),
                "financial_information.total_paid",
            )
            .with_context("bpr_total", bpr_total.to_string())
            .with_context("claims_total", claims_total.to_string())
            .with_context("plb_total", plb_total.to_string())
            .with_context("delta", delta.to_string())
            .with_context("tolerance", tolerance.to_string()),
        );
    }
}
