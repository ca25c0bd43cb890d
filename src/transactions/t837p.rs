//! 837P (Health Care Claim: Professional) projector.
//!
//! State machine: `Header -> Submitter(NM1*41) -> Receiver(NM1*40) ->
//! BillingProvider(loop 2000A/2010AA) -> Subscriber(loop 2000B) ->
//! Claim(CLM) -> Diagnoses(HI) -> ServiceLines(LX..SV1..SE)`. See
//! SPEC_FULL.md §4.5.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticCollector;
use crate::model::segment::Segment;

use super::{parse_decimal, split_procedure_composite, unexpected_segment, IdentifierRef};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Party {
    pub name: Option<String>,
    pub npi: Option<String>,
    pub identifiers: Vec<IdentifierRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claim837 {
    pub claim_id: String,
    pub total_charge: Decimal,
    pub place_of_service: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceLine837 {
    pub procedure_code: String,
    pub modifiers: Vec<String>,
    pub units: Decimal,
    pub charge: Decimal,
    pub diagnosis_pointers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct T837P {
    pub submitter: Party,
    pub receiver: Party,
    pub billing_provider: Party,
    pub rendering_provider: Option<Party>,
    pub subscriber: Party,
    pub patient: Option<Party>,
    pub claim: Claim837,
    pub diagnoses: Vec<String>,
    pub service_lines: Vec<ServiceLine837>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Submitter,
    Receiver,
    BillingProvider,
    Subscriber,
    Claim,
    Diagnoses,
    ServiceLines,
}

fn fill_party_from_nm1(segment: &Segment) -> Party {
    let mut party = Party {
        name: segment.element_opt(3).map(str::to_string),
        npi: None,
        identifiers: Vec::new(),
    };
    if segment.element(8) == "XX" {
        party.npi = segment.element_opt(9).map(str::to_string);
    } else if let Some(id) = segment.element_opt(9) {
        party.identifiers.push(IdentifierRef {
            qualifier: segment.element(8).to_string(),
            value: id.to_string(),
        });
    }
    party
}

pub fn project(segments: &[Segment], diags: &mut DiagnosticCollector) -> T837P {
    let mut tree = T837P::default();
    let mut state = State::Header;
    let mut current_service: Option<ServiceLine837> = None;

    for segment in segments {
        match segment.id.as_str() {
            "ST" | "SE" => continue,
            "NM1" if segment.element(1) == "41" => {
                tree.submitter = fill_party_from_nm1(segment);
                state = State::Submitter;
            }
            "NM1" if segment.element(1) == "40" => {
                tree.receiver = fill_party_from_nm1(segment);
                state = State::Receiver;
            }
            "NM1" if segment.element(1) == "85" => {
                tree.billing_provider = fill_party_from_nm1(segment);
                state = State::BillingProvider;
            }
            "NM1" if segment.element(1) == "82" => {
                tree.rendering_provider = Some(fill_party_from_nm1(segment));
            }
            "NM1" if segment.element(1) == "IL" => {
                tree.subscriber = fill_party_from_nm1(segment);
                state = State::Subscriber;
            }
            "NM1" if segment.element(1) == "QC" => {
                tree.patient = Some(fill_party_from_nm1(segment));
            }
            "CLM" => {
                tree.claim = Claim837 {
                    claim_id: segment.element(1).to_string(),
                    total_charge: parse_decimal(segment.element(2), "claim.total_charge", diags),
                    place_of_service: segment.element(5).to_string(),
                };
                state = State::Claim;
            }
            "HI" => {
                state = State::Diagnoses;
                for element in &segment.elements {
                    if let Some(code) = element.component(1) {
                        if !code.is_empty() {
                            tree.diagnoses.push(code.to_string());
                        }
                    }
                }
            }
            "LX" => {
                if let Some(service) = current_service.take() {
                    tree.service_lines.push(service);
                }
                state = State::ServiceLines;
            }
            "SV1" => {
                let composite = segment
                    .elements
                    .first()
                    .map(|e| e.components.clone())
                    .unwrap_or_default();
                let (procedure_code, modifiers) = split_procedure_composite(&composite);
                let diagnosis_pointers = segment
                    .elements
                    .get(6)
                    .map(|e| e.components.clone())
                    .unwrap_or_default();
                current_service = Some(ServiceLine837 {
                    procedure_code,
                    modifiers,
                    charge: parse_decimal(segment.element(2), "service_lines[].charge", diags),
                    units: parse_decimal(segment.element(4), "service_lines[].units", diags),
                    diagnosis_pointers,
                });
                state = State::ServiceLines;
            }
            _ => {
                unexpected_segment(segment, state_name(state), "837P", diags);
            }
        }
    }

    if let Some(service) = current_service.take() {
        tree.service_lines.push(service);
    }

    tree
}

fn state_name(state: State) -> &'static str {
    match state {
        State::Header => "Header",
        State::Submitter => "Submitter",
        State::Receiver => "Receiver",
        State::BillingProvider => "BillingProvider",
        State::Subscriber => "Subscriber",
        State::Claim => "Claim",
        State::Diagnoses => "Diagnoses",
        State::ServiceLines => "ServiceLines",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::segment::Element;

    fn composite(parts: &[&str]) -> Element {
        Element::new(parts.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn sv1_composite_diagnosis_pointers() {
        let mut diags = DiagnosticCollector::new();
        let segments = vec![
            Segment::new(
                "CLM",
                vec![
                    Element::single("CLM001"),
                    Element::single("250.00"),
                    Element::single(""),
                    Element::single(""),
                    composite(&["11", "B", "1"]),
                ],
            ),
            Segment::new(
                "SV1",
                vec![
                    composite(&["HC", "99213", "25"]),
                    Element::single("100.00"),
                    Element::single("UN"),
                    Element::single("1"),
                    Element::single(""),
                    Element::single(""),
                    composite(&["1", "2"]),
                ],
            ),
        ];
        let tree = project(&segments, &mut diags);
        assert_eq!(tree.service_lines.len(), 1);
        assert_eq!(tree.service_lines[0].procedure_code, "99213");
        assert_eq!(tree.service_lines[0].diagnosis_pointers, vec!["1", "2"]);
    }
}
