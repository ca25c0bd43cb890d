//! 276 (Health Care Claim Status Request) and 277 (...Response)
//! projectors. Shared skeleton identical to 270/271's party loops; they
//! diverge at the claim-level segment. See SPEC_FULL.md §4.5.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticCollector;
use crate::model::segment::Segment;

use super::{parse_decimal, unexpected_segment, IdentifierRef};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Party {
    pub name: Option<String>,
    pub identifiers: Vec<IdentifierRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimInquiry276 {
    pub claim_control_number: String,
    pub total_claim_charge: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimStatusInfo277 {
    pub status_code: String,
    pub category_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Skeleton {
    information_source: Party,
    information_receiver: Party,
    subscriber: Party,
    dependent: Option<Party>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct T276 {
    pub information_source: Party,
    pub information_receiver: Party,
    pub subscriber: Party,
    pub dependent: Option<Party>,
    pub claim_inquiries: Vec<ClaimInquiry276>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct T277 {
    pub information_source: Party,
    pub information_receiver: Party,
    pub subscriber: Party,
    pub dependent: Option<Party>,
    pub claim_status_info: Vec<ClaimStatusInfo277>,
    pub messages: Vec<String>,
}

fn fill_party(segment: &Segment) -> Party {
    let mut party = Party {
        name: segment.element_opt(3).map(str::to_string),
        identifiers: Vec::new(),
    };
    if let Some(id) = segment.element_opt(9) {
        party.identifiers.push(IdentifierRef {
            qualifier: segment.element(8).to_string(),
            value: id.to_string(),
        });
    }
    party
}

fn walk_skeleton(segments: &[Segment], mut on_other: impl FnMut(&Segment)) -> Skeleton {
    let mut skeleton = Skeleton::default();
    for segment in segments {
        match segment.id.as_str() {
            "ST" | "SE" => continue,
            "NM1" if segment.element(1) == "PR" => skeleton.information_source = fill_party(segment),
            "NM1" if segment.element(1) == "1P" => skeleton.information_receiver = fill_party(segment),
            "NM1" if segment.element(1) == "IL" => skeleton.subscriber = fill_party(segment),
            "NM1" if segment.element(1) == "03" => skeleton.dependent = Some(fill_party(segment)),
            _ => on_other(segment),
        }
    }
    skeleton
}

pub fn project_276(segments: &[Segment], diags: &mut DiagnosticCollector) -> T276 {
    let mut inquiries = Vec::new();
    let mut pending_control_number: Option<String> = None;

    let skeleton = walk_skeleton(segments, |segment| match segment.id.as_str() {
        "TRN" => pending_control_number = segment.element_opt(2).map(str::to_string),
        "REF" if segment.element(1) == "1K" => {
            pending_control_number = segment.element_opt(2).map(str::to_string);
        }
        "AMT" if segment.element(1) == "T3" => {
            inquiries.push(ClaimInquiry276 {
                claim_control_number: pending_control_number.clone().unwrap_or_default(),
                total_claim_charge: parse_decimal(segment.element(2), "claim_inquiries[].total_claim_charge", diags),
            });
        }
        "NM1" | "DTP" | "DMG" | "HL" => {}
        _ => unexpected_segment(segment, "276", "276", diags),
    });

    T276 {
        information_source: skeleton.information_source,
        information_receiver: skeleton.information_receiver,
        subscriber: skeleton.subscriber,
        dependent: skeleton.dependent,
        claim_inquiries: inquiries,
    }
}

pub fn project_277(segments: &[Segment], diags: &mut DiagnosticCollector) -> T277 {
    let mut status_info = Vec::new();
    let mut messages = Vec::new();

    let skeleton = walk_skeleton(segments, |segment| match segment.id.as_str() {
        "STC" => {
            // STC01 is a composite: category_code:status_code:entity_code.
            let first = segment.elements.first();
            let category_code = first.and_then(|e| e.component(0)).unwrap_or_default().to_string();
            let status_code = first.and_then(|e| e.component(1)).unwrap_or_default().to_string();
            status_info.push(ClaimStatusInfo277 { status_code, category_code });
        }
        "MSG" => {
            if let Some(text) = segment.element_opt(1) {
                messages.push(text.to_string());
            }
        }
        "NM1" | "DTP" | "DMG" | "HL" | "TRN" | "REF" => {}
        _ => unexpected_segment(segment, "277", "277", diags),
    });

    T277 {
        information_source: skeleton.information_source,
        information_receiver: skeleton.information_receiver,
        subscriber: skeleton.subscriber,
        dependent: skeleton.dependent,
        claim_status_info: status_info,
        messages,
    }
}
