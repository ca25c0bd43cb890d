//! C3: envelope assembler. Walks a flat segment stream for a single
//! interchange (ISA..IEA inclusive) and rebuilds the
//! Interchange/FunctionalGroup/TransactionSet tree, checking every
//! control-number and count invariant along the way. See SPEC_FULL.md §4.3.

use crate::diagnostics::{Diagnostic, DiagnosticCollector};
use crate::model::document::{
    FunctionalGroup, FunctionalGroupHeader, FunctionalGroupTrailer, Interchange, InterchangeHeader, InterchangeTrailer,
    TransactionSet, TransactionSetHeader, TransactionSetTrailer,
};
use crate::model::segment::Segment;
use crate::transactions::TransactionData;

/// Assembles one interchange from its tokenized segments. `component_separator`
/// is carried through from delimiter detection purely for the header record;
/// assembly itself only needs element-level structure, already applied by the
/// tokenizer.
///
/// `project` is called once per ST..SE window with the transaction-set code
/// (ST01) and the segments strictly between ST and SE (exclusive); it returns
/// the semantic tree to store, deferring to the dispatcher (C4) for what that
/// means per code.
pub fn assemble(
    segments: &[Segment],
    component_separator: char,
    diags: &mut DiagnosticCollector,
    mut project: impl FnMut(&str, &[Segment], &mut DiagnosticCollector) -> TransactionData,
) -> Option<Interchange> {
    let mut iter = segments.iter();

    let isa = iter.next()?;
    if isa.id != "ISA" {
        diags.push(Diagnostic::error("ENVELOPE_STRUCTURE", "interchange does not begin with ISA", "interchanges[0]"));
        return None;
    }
    let header = InterchangeHeader {
        sender_qualifier: isa.element(5).to_string(),
        sender_id: isa.element(6).to_string(),
        receiver_qualifier: isa.element(7).to_string(),
        receiver_id: isa.element(8).to_string(),
        date: isa.element(9).to_string(),
        time: isa.element(10).to_string(),
        version: isa.element(12).to_string(),
        control_number: isa.element(13).to_string(),
        usage_indicator: isa.element(15).to_string(),
        component_separator,
    };

    let mut groups = Vec::new();
    let mut iea: Option<&Segment> = None;

    // Collect the remaining segments so we can locate group boundaries by
    // scanning rather than threading a peekable iterator through recursion.
    let rest: Vec<&Segment> = iter.collect();
    let mut i = 0usize;
    while i < rest.len() {
        match rest[i].id.as_str() {
            "GS" => {
                let (group, next_i) = assemble_group(&rest, i, diags, &mut project);
                groups.push(group);
                i = next_i;
            }
            "IEA" => {
                iea = Some(rest[i]);
                i += 1;
                break;
            }
            other => {
                diags.push(Diagnostic::warning(
                    "UNEXPECTED_SEGMENT",
                    format!("segment {other} unexpected at interchange level"),
                    "interchanges[0]",
                ));
                i += 1;
            }
        }
    }

    let trailer = iea.map(|seg| InterchangeTrailer {
        control_number: seg.element(2).to_string(),
        group_count: seg.element(1).parse().unwrap_or(0),
    });

    if let Some(trailer) = &trailer {
        if trailer.control_number != header.control_number {
            diags.push(
                Diagnostic::error(
                    "ISA13_IEA02_MISMATCH",
                    format!(
                        "ISA13 control number '{}' does not match IEA02 '{}'",
                        header.control_number, trailer.control_number
                    ),
                    "interchanges[0]",
                )
                .with_value(trailer.control_number.clone()),
            );
        }
        if trailer.group_count != groups.len() {
            diags.push(Diagnostic::error(
                "IEA01_COUNT_MISMATCH",
                format!("IEA01 reports {} functional groups but {} were found", trailer.group_count, groups.len()),
                "interchanges[0]",
            ));
        }
    } else {
        diags.push(Diagnostic::error("ENVELOPE_STRUCTURE", "interchange is missing its IEA trailer", "interchanges[0]"));
    }

    Some(Interchange {
        header,
        functional_groups: groups,
        trailer,
    })
}

fn assemble_group(
    rest: &[&Segment],
    start: usize,
    diags: &mut DiagnosticCollector,
    project: &mut impl FnMut(&str, &[Segment], &mut DiagnosticCollector) -> TransactionData,
) -> (FunctionalGroup, usize) {
    let gs = rest[start];
    let header = FunctionalGroupHeader {
        functional_id_code: gs.element(1).to_string(),
        application_sender_code: gs.element(2).to_string(),
        application_receiver_code: gs.element(3).to_string(),
        date: gs.element(4).to_string(),
        time: gs.element(5).to_string(),
        control_number: gs.element(6).to_string(),
        responsible_agency_code: gs.element(7).to_string(),
        version_code: gs.element(8).to_string(),
    };

    let mut transactions = Vec::new();
    let mut i = start + 1;
    let mut ge: Option<&Segment> = None;

    while i < rest.len() {
        match rest[i].id.as_str() {
            "ST" => {
                let (txn, next_i) = assemble_transaction(rest, i, diags, project);
                transactions.push(txn);
                i = next_i;
            }
            "GE" => {
                ge = Some(rest[i]);
                i += 1;
                break;
            }
            other => {
                diags.push(Diagnostic::warning(
                    "UNEXPECTED_SEGMENT",
                    format!("segment {other} unexpected at functional-group level"),
                    "functional_groups[]",
                ));
                i += 1;
            }
        }
    }

    let trailer = ge.map(|seg| FunctionalGroupTrailer {
        transaction_count: seg.element(1).parse().unwrap_or(0),
        control_number: seg.element(2).to_string(),
    });

    if let Some(trailer) = &trailer {
        if trailer.control_number != header.control_number {
            diags.push(Diagnostic::error(
                "GS06_GE02_MISMATCH",
                format!(
                    "GS06 control number '{}' does not match GE02 '{}'",
                    header.control_number, trailer.control_number
                ),
                "functional_groups[]",
            ));
        }
        if trailer.transaction_count != transactions.len() {
            diags.push(Diagnostic::error(
                "GE01_COUNT_MISMATCH",
                format!(
                    "GE01 reports {} transaction sets but {} were found",
                    trailer.transaction_count,
                    transactions.len()
                ),
                "functional_groups[]",
            ));
        }
    } else {
        diags.push(Diagnostic::error(
            "ENVELOPE_STRUCTURE",
            "functional group is missing its GE trailer",
            "functional_groups[]",
        ));
    }

    (
        FunctionalGroup {
            header,
            transactions,
            trailer,
        },
        i,
    )
}

fn assemble_transaction(
    rest: &[&Segment],
    start: usize,
    diags: &mut DiagnosticCollector,
    project: &mut impl FnMut(&str, &[Segment], &mut DiagnosticCollector) -> TransactionData,
) -> (TransactionSet, usize) {
    let st = rest[start];
    let header = TransactionSetHeader {
        transaction_set_code: st.element(1).to_string(),
        control_number: st.element(2).to_string(),
    };

    let mut body: Vec<Segment> = Vec::new();
    let mut i = start + 1;
    let mut se: Option<&Segment> = None;

    while i < rest.len() {
        match rest[i].id.as_str() {
            "SE" => {
                se = Some(rest[i]);
                i += 1;
                break;
            }
            _ => {
                body.push((*rest[i]).clone());
                i += 1;
            }
        }
    }

    let trailer = se.map(|seg| TransactionSetTrailer {
        segment_count: seg.element(1).parse().unwrap_or(0),
        control_number: seg.element(2).to_string(),
    });

    if let Some(trailer) = &trailer {
        if trailer.control_number != header.control_number {
            diags.push(Diagnostic::error(
                "ST02_SE02_MISMATCH",
                format!(
                    "ST02 control number '{}' does not match SE02 '{}'",
                    header.control_number, trailer.control_number
                ),
                "functional_groups[].transactions[]",
            ));
        }
        // SE01 counts every segment of the transaction set, ST and SE included.
        let actual = body.len() + 2;
        if trailer.segment_count != actual {
            diags.push(Diagnostic::error(
                "SE01_COUNT_INVALID",
                format!("SE01 reports {} segments but {} were found (including ST/SE)", trailer.segment_count, actual),
                "functional_groups[].transactions[]",
            ));
        }
    } else {
        diags.push(Diagnostic::error(
            "ENVELOPE_STRUCTURE",
            "transaction set is missing its SE trailer",
            "functional_groups[].transactions[]",
        ));
    }

    let transaction_data = project(&header.transaction_set_code, &body, diags);

    (
        TransactionSet {
            header,
            transaction_data,
            trailer,
        },
        i,
    )
}
