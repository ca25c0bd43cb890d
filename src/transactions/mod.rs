//! Transaction-set projectors (C5): per-transaction state machines that
//! walk a window of segments (ST..SE) and produce a typed semantic tree.
//!
//! Shared helpers live here; each recognized transaction set gets its own
//! module. See SPEC_FULL.md §4.5 for the state-machine descriptions.

pub mod t270_271;
pub mod t276_277;
pub mod t835;
pub mod t837p;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::diagnostics::{Diagnostic, DiagnosticCollector};
use crate::model::segment::Segment;

pub use t270_271::{EligibilityBenefit271, EligibilityInquiry270, T270, T271};
pub use t276_277::{ClaimInquiry276, ClaimStatusInfo277, T276, T277};
pub use t835::T835;
pub use t837p::T837P;

/// The closed sum type dispatched on transaction-set code (§4.4, §9
/// "closed sum type ... plus an open registry").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransactionData {
    #[serde(rename = "835")]
    T835(T835),
    #[serde(rename = "837P")]
    T837P(T837P),
    #[serde(rename = "270")]
    T270(T270),
    #[serde(rename = "271")]
    T271(T271),
    #[serde(rename = "276")]
    T276(T276),
    #[serde(rename = "277")]
    T277(T277),
    /// No projector recognized the transaction-set code; segments are
    /// retained verbatim (§4.4). A struct variant, not a newtype around
    /// a sequence, so it has a map to serialize into under the `type`
    /// tag (serde's internally-tagged representation can't serialize a
    /// newtype variant wrapping a sequence).
    Raw { segments: Vec<Segment> },
    /// A caller-registered projector (§6.6) produced an opaque tree. The
    /// plugin owns its own serialization; the core only stores the label.
    Extension {
        code: String,
        segments: Vec<Segment>,
    },
}

/// Parses a monetary/quantity field as a fixed-point decimal (up to two
/// fractional digits for monetary values per §4.5). Invalid numerics
/// record `NUMERIC_FORMAT` and default the field to zero, matching the
/// §7 policy: the only fatal kind is `InvalidHeader`.
pub fn parse_decimal(raw: &str, path: &str, diags: &mut DiagnosticCollector) -> Decimal {
    if raw.trim().is_empty() {
        return Decimal::ZERO;
    }
    match Decimal::from_str(raw.trim()) {
        Ok(d) => d,
        Err(_) => {
            diags.push(
                Diagnostic::error(
                    "FIELD_NUMERIC_FORMAT",
                    format!("expected a numeric value, found '{raw}'"),
                    path,
                )
                .with_value(raw),
            );
            Decimal::ZERO
        }
    }
}

/// Splits a composite element on the sub-element separator already
/// applied at tokenization time (an `Element`'s components), returning
/// the qualifier-stripped procedure code and the remaining components as
/// modifiers. Handles the documented shapes: `HC:99213`, `HC:99213:25`,
/// `HC:99213:25:59`, and bare `99213` (no qualifier).
pub fn split_procedure_composite(components: &[String]) -> (String, Vec<String>) {
    match components.len() {
        0 => (String::new(), Vec::new()),
        1 => (components[0].clone(), Vec::new()),
        _ => {
            // First component is a qualifier (e.g. "HC"); second is the
            // procedure code; any further components are modifiers.
            let code = components.get(1).cloned().unwrap_or_default();
            let modifiers = components.get(2..).map(|s| s.to_vec()).unwrap_or_default();
            (code, modifiers)
        }
    }
}

/// A qualified reference/identification value shared across the entity
/// shapes of every projector (REF segments, NM1 secondary identifiers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifierRef {
    pub qualifier: String,
    pub value: String,
}

/// Records an `UNEXPECTED_SEGMENT` warning for a segment a projector's
/// state machine did not expect; the segment is skipped, not aborted.
pub fn unexpected_segment(segment: &Segment, state: &str, path: &str, diags: &mut DiagnosticCollector) {
    diags.push(Diagnostic::warning(
        "UNEXPECTED_SEGMENT",
        format!("segment {} unexpected in state {state}", segment.id),
        path,
    ));
}

/// Records a `MISSING_REQUIRED` error for a required segment absent at
/// the end of a projector's window.
pub fn missing_required(segment_id: &str, path: &str, diags: &mut DiagnosticCollector) {
    diags.push(Diagnostic::error(
        "MISSING_REQUIRED",
        format!("required segment {segment_id} is missing"),
        path,
    ));
}

/// Recognized transaction-set codes the built-in dispatcher (C4) projects.
pub const RECOGNIZED_CODES: &[&str] = &["835", "837", "270", "271", "276", "277"];

/// Projects a segment window (ST..SE inclusive) into a typed semantic
/// tree for one of the six built-in transaction sets, using the PLB
/// sign convention from [`crate::config::EnginePolicy`] for 835.
pub fn project_builtin(code: &str, segments: &[Segment], diags: &mut DiagnosticCollector, plb_sign: crate::config::PlbSignConvention) -> Option<TransactionData> {
    match code {
        "835" => Some(TransactionData::T835(t835::project(segments, diags, plb_sign))),
        "837" => Some(TransactionData::T837P(t837p::project(segments, diags))),
        "270" => Some(TransactionData::T270(t270_271::project_270(segments, diags))),
        "271" => Some(TransactionData::T271(t270_271::project_271(segments, diags))),
        "276" => Some(TransactionData::T276(t276_277::project_276(segments, diags))),
        "277" => Some(TransactionData::T277(t276_277::project_277(segments, diags))),
        _ => None,
    }
}
