//! C2: segment tokenizer. Splits the remainder of the input (after the
//! ISA header) into segments, elements, and sub-elements using the
//! delimiters [`crate::delimiters::detect`] found. See SPEC_FULL.md §4.2.

use crate::config::ParserConfig;
use crate::delimiters::Delimiters;
use crate::diagnostics::{Diagnostic, DiagnosticCollector};
use crate::model::segment::{Element, Segment};

/// Splits raw input bytes into segments. The ISA segment itself is
/// included as the first result (callers that already parsed it with
/// [`crate::delimiters::detect`] still need its elements re-tokenized
/// here so the envelope assembler sees a uniform `Segment` stream).
///
/// Trailing empty segments produced by a terminator immediately
/// followed by end-of-input are dropped silently; an empty segment
/// found mid-stream (two terminators back to back) is skipped with a
/// `MALFORMED_SEGMENT` warning, since no segment id can be recovered.
pub fn tokenize(input: &[u8], delimiters: Delimiters, config: &ParserConfig, diags: &mut DiagnosticCollector) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = 0usize;

    for (i, &byte) in input.iter().enumerate() {
        if byte != delimiters.segment_terminator {
            continue;
        }
        let raw = &input[start..i];
        start = i + 1;

        let raw = trim_segment(raw, config);
        if raw.is_empty() {
            continue;
        }

        match parse_segment(raw, delimiters) {
            Some(segment) => {
                check_segment_id_length(&segment, diags);
                segments.push(segment);
            }
            None => diags.push(Diagnostic::warning(
                "MALFORMED_SEGMENT",
                "segment has no recoverable id and was skipped",
                "segments",
            )),
        }
    }

    // Trailing bytes with no terminator: accepted only if non-empty once
    // trimmed, matching lenient trading-partner practice for a missing
    // final terminator.
    let tail = trim_segment(&input[start..], config);
    if !tail.is_empty() {
        if let Some(segment) = parse_segment(tail, delimiters) {
            check_segment_id_length(&segment, diags);
            segments.push(segment);
        }
    }

    segments
}

/// A segment id outside 2-3 characters is still emitted with its raw id
/// for downstream diagnostics, but recorded as malformed (§4.2).
fn check_segment_id_length(segment: &Segment, diags: &mut DiagnosticCollector) {
    if segment.raw_id_is_malformed() {
        diags.push(
            Diagnostic::warning(
                "MALFORMED_SEGMENT",
                format!("segment id '{}' is outside the 2-3 character range", segment.id),
                "segments",
            )
            .with_value(segment.id.clone()),
        );
    }
}

fn trim_segment<'a>(raw: &'a [u8], config: &ParserConfig) -> &'a [u8] {
    if !config.trim_segment_whitespace {
        return raw;
    }
    let mut slice = raw;
    while matches!(slice.first(), Some(b'\r') | Some(b'\n')) {
        slice = &slice[1..];
    }
    while matches!(slice.last(), Some(b'\r') | Some(b'\n')) {
        slice = &slice[..slice.len() - 1];
    }
    slice
}

fn parse_segment(raw: &[u8], delimiters: Delimiters) -> Option<Segment> {
    let text = String::from_utf8_lossy(raw);
    let mut fields = text.split(delimiters.element as char);
    let id = fields.next()?.trim().to_string();
    if id.is_empty() {
        return None;
    }

    let elements = fields
        .map(|field| {
            let components: Vec<String> = field.split(delimiters.sub_element as char).map(str::to_string).collect();
            Element::new(components)
        })
        .collect();

    Some(Segment::new(id, elements))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delims() -> Delimiters {
        Delimiters {
            element: b'*',
            sub_element: b'>',
            repetition: b'^',
            segment_terminator: b'~',
        }
    }

    #[test]
    fn splits_segments_and_elements() {
        let mut diags = DiagnosticCollector::new();
        let input = b"ST*835*0001~BPR*I*100.00*C*ACH~SE*2*0001~";
        let segments = tokenize(input, delims(), &ParserConfig::default(), &mut diags);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].id, "ST");
        assert_eq!(segments[1].element(2), "100.00");
    }

    #[test]
    fn composite_sub_elements_split() {
        let mut diags = DiagnosticCollector::new();
        let input = b"SVC*HC>99213>25*100.00~";
        let segments = tokenize(input, delims(), &ParserConfig::default(), &mut diags);
        assert_eq!(segments[0].elements[0].components, vec!["HC", "99213", "25"]);
    }

    #[test]
    fn skips_empty_mid_stream_segment_with_warning() {
        let mut diags = DiagnosticCollector::new();
        let input = b"ST*835*0001~~SE*1*0001~";
        let segments = tokenize(input, delims(), &ParserConfig::default(), &mut diags);
        assert_eq!(segments.len(), 2);
        assert_eq!(diags.warning_count(), 0); // truly empty segments are just skipped, not malformed
    }

    #[test]
    fn trims_cr_lf_between_segments() {
        let mut diags = DiagnosticCollector::new();
        let input = b"ST*835*0001~\r\nSE*1*0001~";
        let segments = tokenize(input, delims(), &ParserConfig::default(), &mut diags);
        assert_eq!(segments.len(), 2);
    }
}
