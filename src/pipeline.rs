//! Top-level orchestration: bytes in, parsed document and diagnostics
//! out. Wires C1 (delimiters) -> C2 (tokenizer) -> C3 (envelope) -> C4
//! (dispatch) -> C5 (projectors) -> C6 (rule engine) -> C7
//! (diagnostics). See SPEC_FULL.md §2 and §5.

use tracing::{info_span, instrument};

use crate::config::EngineConfig;
use crate::delimiters;
use crate::diagnostics::{DiagnosticCollector, DiagnosticReport};
use crate::envelope;
use crate::error::{EdiError, Result};
use crate::model::document::Document;
use crate::tokenizer;
use crate::validation::Engine;

/// The result of running an input through the full pipeline: the
/// assembled document tree (possibly empty interchanges if nothing
/// could be assembled past a structural diagnostic) and the
/// accumulated diagnostic report.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub document: Document,
    pub diagnostics: DiagnosticReport,
}

/// Parses and validates a raw X12 byte stream. The only way this
/// returns `Err` is [`EdiError::InvalidHeader`] — every other problem,
/// however severe, is recorded as a diagnostic and the best-effort
/// document is still returned (SPEC_FULL.md §7).
#[instrument(skip(input, config))]
pub fn parse_and_validate(input: &[u8], config: &EngineConfig) -> Result<PipelineOutcome> {
    let mut diags = DiagnosticCollector::new();
    let dispatcher = &config.dispatcher;

    let delimiters = delimiters::detect(input)?;
    let component_separator = delimiters.sub_element as char;

    let segments = {
        let _span = info_span!("tokenize", bytes = input.len()).entered();
        tokenizer::tokenize(input, delimiters, &config.parser, &mut diags)
    };

    let mut document = Document::default();
    {
        let _span = info_span!("assemble").entered();
        for chunk in split_interchanges(&segments) {
            let plb_sign = config.policy.plb_sign_convention;
            let interchange = envelope::assemble(chunk, component_separator, &mut diags, |code, body, d| dispatcher.dispatch(code, body, d, plb_sign));
            if let Some(interchange) = interchange {
                document.interchanges.push(interchange);
            }
        }
    }

    if !config.rules.is_empty() {
        let _span = info_span!("rules", count = config.rules.len()).entered();
        let engine = Engine::new(config.rules.clone());
        let applied = engine.evaluate(&document, &config.policy, &mut diags);
        return Ok(PipelineOutcome {
            document,
            diagnostics: diags.into_report(applied),
        });
    }

    Ok(PipelineOutcome {
        document,
        diagnostics: diags.into_report(0),
    })
}

/// Splits a flat segment stream into per-interchange slices, each
/// running from an `ISA` segment through its matching `IEA` inclusive.
/// Trailing segments after the last `IEA` (or before the first `ISA`)
/// are dropped; [`envelope::assemble`] itself reports a missing-ISA or
/// missing-IEA structural diagnostic when a chunk is incomplete.
fn split_interchanges(segments: &[crate::model::segment::Segment]) -> Vec<&[crate::model::segment::Segment]> {
    let mut chunks = Vec::new();
    let mut start: Option<usize> = None;

    for (i, segment) in segments.iter().enumerate() {
        match segment.id.as_str() {
            "ISA" => start = Some(i),
            "IEA" => {
                if let Some(s) = start.take() {
                    chunks.push(&segments[s..=i]);
                }
            }
            _ => {}
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_835() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(
            b"ISA*00*          *00*          *ZZ*SENDER123      *ZZ*RECEIVER456    *210101*1253*^*00501*000000001*0*P*>~",
        );
        bytes.extend_from_slice(b"GS*HP*SENDER*RECEIVER*20210101*1253*1*X*005010X221A1~");
        bytes.extend_from_slice(b"ST*835*0001~");
        bytes.extend_from_slice(b"BPR*I*100.00*C*ACH*CCP*01*999999999*DA*123456*1512345678**01*999999999*DA*987654*20210102~");
        bytes.extend_from_slice(b"TRN*1*12345*1512345678~");
        bytes.extend_from_slice(b"N1*PR*ACME PAYER~");
        bytes.extend_from_slice(b"N1*PE*ACME PROVIDER*XX*1234567893~");
        bytes.extend_from_slice(b"CLP*CLAIM1*1*100.00*100.00*0*MC*123456~");
        bytes.extend_from_slice(b"SE*7*0001~");
        bytes.extend_from_slice(b"GE*1*1~");
        bytes.extend_from_slice(b"IEA*1*000000001~");
        bytes
    }

    #[test]
    fn parses_minimal_835_without_errors() {
        let outcome = parse_and_validate(&minimal_835(), &EngineConfig::default()).unwrap();
        assert_eq!(outcome.document.interchanges.len(), 1);
        assert_eq!(outcome.document.interchanges[0].functional_groups[0].transactions.len(), 1);
        assert!(outcome.diagnostics.is_valid);
    }

    #[test]
    fn rejects_input_without_isa() {
        let err = parse_and_validate(b"NOT AN EDI FILE AT ALL", &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EdiError::InvalidHeader(_)));
    }

    #[test]
    fn builtin_rules_run_when_configured() {
        let config = EngineConfig::default().with_builtin_rules("hipaa");
        let outcome = parse_and_validate(&minimal_835(), &config).unwrap();
        assert!(outcome.diagnostics.summary.rules_applied > 0);
    }

    #[test]
    fn registered_extension_projector_runs_for_unrecognized_code() {
        use crate::dispatch::ExtensionProjector;
        use crate::model::segment::Segment;
        use crate::transactions::TransactionData;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(
            b"ISA*00*          *00*          *ZZ*SENDER123      *ZZ*RECEIVER456    *210101*1253*^*00501*000000001*0*P*>~",
        );
        bytes.extend_from_slice(b"GS*HP*SENDER*RECEIVER*20210101*1253*1*X*005010X221A1~");
        bytes.extend_from_slice(b"ST*834*0001~");
        bytes.extend_from_slice(b"INS*Y*18~");
        bytes.extend_from_slice(b"SE*3*0001~");
        bytes.extend_from_slice(b"GE*1*1~");
        bytes.extend_from_slice(b"IEA*1*000000001~");

        struct Echo834;
        impl ExtensionProjector for Echo834 {
            fn project(&self, segments: &[Segment], _diags: &mut crate::diagnostics::DiagnosticCollector) -> TransactionData {
                TransactionData::Extension {
                    code: "834".to_string(),
                    segments: segments.to_vec(),
                }
            }
        }

        let config = EngineConfig::default().with_extension("834", Echo834);
        let outcome = parse_and_validate(&bytes, &config).unwrap();

        let txn = &outcome.document.interchanges[0].functional_groups[0].transactions[0];
        assert!(matches!(&txn.transaction_data, TransactionData::Extension { code, .. } if code == "834"));
        // a registered extension handled the code, so no UNKNOWN_TRANSACTION info diagnostic fires
        assert!(!outcome.diagnostics.info.iter().any(|d| d.code == "UNKNOWN_TRANSACTION"));
    }
}
