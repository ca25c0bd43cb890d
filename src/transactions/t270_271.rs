//! 270 (Eligibility, Coverage or Benefit Inquiry) and 271 (...Response)
//! projectors. They share a skeleton — `information_source NM1*PR`,
//! `information_receiver NM1*1P`, `subscriber NM1*IL`, optional
//! `dependent NM1*03` — and diverge at the EQ/EB level. See SPEC_FULL.md
//! §4.5.

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
pub struct EligibilityInquiry270 {
    pub service_type_code: String,
    pub trace_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilityBenefit271 {
    pub eligibility_code: String,
    pub service_type_code: String,
    pub coverage_level: Option<String>,
    pub amount: Option<Decimal>,
    pub percent: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Skeleton {
    information_source: Party,
    information_receiver: Party,
    subscriber: Party,
    dependent: Option<Party>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct T270 {
    pub information_source: Party,
    pub information_receiver: Party,
    pub subscriber: Party,
    pub dependent: Option<Party>,
    pub eligibility_inquiries: Vec<EligibilityInquiry270>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct T271 {
    pub information_source: Party,
    pub information_receiver: Party,
    pub subscriber: Party,
    pub dependent: Option<Party>,
    pub eligibility_benefits: Vec<EligibilityBenefit271>,
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

pub fn project_270(segments: &[Segment], diags: &mut DiagnosticCollector) -> T270 {
    let mut inquiries = Vec::new();
    let mut last_trace: Option<String> = None;
    let skeleton = walk_skeleton(segments, |segment| match segment.id.as_str() {
        "TRN" => last_trace = segment.element_opt(2).map(str::to_string),
        "EQ" => inquiries.push(EligibilityInquiry270 {
            service_type_code: segment.element(1).to_string(),
            trace_number: last_trace.clone(),
        }),
        "NM1" | "DTP" | "REF" | "DMG" | "HL" => {}
        _ => unexpected_segment(segment, "270", "270", diags),
    });

    T270 {
        information_source: skeleton.information_source,
        information_receiver: skeleton.information_receiver,
        subscriber: skeleton.subscriber,
        dependent: skeleton.dependent,
        eligibility_inquiries: inquiries,
    }
}

pub fn project_271(segments: &[Segment], diags: &mut DiagnosticCollector) -> T271 {
    let mut benefits = Vec::new();
    let mut messages = Vec::new();
    let mut amount_fields: Vec<(usize, Option<String>, Option<String>)> = Vec::new();

    let skeleton = walk_skeleton(segments, |segment| match segment.id.as_str() {
        "EB" => {
            let service_type_code = segment
                .elements
                .get(2)
                .and_then(|e| e.components.first())
                .cloned()
                .unwrap_or_default();
            amount_fields.push((
                benefits.len(),
                segment.element_opt(7).map(str::to_string),
                segment.element_opt(8).map(str::to_string),
            ));
            benefits.push(EligibilityBenefit271 {
                eligibility_code: segment.element(1).to_string(),
                service_type_code,
                coverage_level: segment.element_opt(2).map(str::to_string),
                amount: None,
                percent: None,
            });
        }
        "MSG" => {
            if let Some(text) = segment.element_opt(1) {
                messages.push(text.to_string());
            }
        }
        "NM1" | "DTP" | "REF" | "DMG" | "HL" | "TRN" => {}
        _ => unexpected_segment(segment, "271", "271", diags),
    });

    for (index, amount_raw, percent_raw) in amount_fields {
        if let Some(raw) = amount_raw {
            benefits[index].amount = Some(parse_decimal(&raw, "eligibility_benefits[].amount", diags));
        }
        if let Some(raw) = percent_raw {
            benefits[index].percent = Some(parse_decimal(&raw, "eligibility_benefits[].percent", diags));
        }
    }

    T271 {
        information_source: skeleton.information_source,
        information_receiver: skeleton.information_receiver,
        subscriber: skeleton.subscriber,
        dependent: skeleton.dependent,
        eligibility_benefits: benefits,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::segment::Element;

    fn seg(id: &str, elements: &[&str]) -> Segment {
        Segment::new(id, elements.iter().map(|e| Element::single(*e)).collect())
    }

    #[test]
    fn inquiry_keyed_by_service_type() {
        let mut diags = DiagnosticCollector::new();
        let segments = vec![
            seg("NM1", &["PR", "2", "PAYER"]),
            seg("NM1", &["1P", "2", "PROVIDER"]),
            seg("NM1", &["IL", "1", "DOE", "JOHN"]),
            seg("EQ", &["30"]),
        ];
        let tree = project_270(&segments, &mut diags);
        assert_eq!(tree.eligibility_inquiries.len(), 1);
        assert_eq!(tree.eligibility_inquiries[0].service_type_code, "30");
    }
}
