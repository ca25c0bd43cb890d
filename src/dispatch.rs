//! C4: transaction dispatcher. Keys off ST01 to choose a projector,
//! falling back to the six built-ins and then to a caller-registered
//! extension point (§6.6) before giving up and retaining raw segments.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PlbSignConvention;
use crate::diagnostics::{Diagnostic, DiagnosticCollector};
use crate::model::segment::Segment;
use crate::transactions::{self, TransactionData, RECOGNIZED_CODES};

/// A caller-supplied projector for a transaction-set code the built-in
/// dispatcher does not recognize. Receives the ST..SE body segments
/// (exclusive of ST/SE) and the shared diagnostic collector, and
/// returns the opaque tree it wants stored under
/// [`TransactionData::Extension`].
pub trait ExtensionProjector: Send + Sync {
    fn project(&self, segments: &[Segment], diags: &mut DiagnosticCollector) -> TransactionData;
}

impl<F> ExtensionProjector for F
where
    F: Fn(&[Segment], &mut DiagnosticCollector) -> TransactionData + Send + Sync,
{
    fn project(&self, segments: &[Segment], diags: &mut DiagnosticCollector) -> TransactionData {
        self(segments, diags)
    }
}

/// An open registry of extension projectors keyed by transaction-set
/// code (§6.6 "a closed sum type for the built-ins plus an open
/// registry"). Cloning a [`Dispatcher`] is cheap; registered
/// projectors are reference-counted.
#[derive(Clone, Default)]
pub struct Dispatcher {
    extensions: HashMap<String, Arc<dyn ExtensionProjector>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a projector for `code`. Registering a code also
    /// handled by a built-in projector shadows the built-in for that
    /// code — callers can override default behavior this way.
    pub fn register(&mut self, code: impl Into<String>, projector: impl ExtensionProjector + 'static) {
        self.extensions.insert(code.into(), Arc::new(projector));
    }

    /// Projects one ST..SE segment window into a [`TransactionData`],
    /// recording an `UNKNOWN_TRANSACTION` info diagnostic when neither a
    /// built-in nor a registered extension recognizes `code`.
    pub fn dispatch(&self, code: &str, segments: &[Segment], diags: &mut DiagnosticCollector, plb_sign: PlbSignConvention) -> TransactionData {
        if let Some(extension) = self.extensions.get(code) {
            return extension.project(segments, diags);
        }
        if let Some(data) = transactions::project_builtin(code, segments, diags, plb_sign) {
            return data;
        }
        if !RECOGNIZED_CODES.contains(&code) {
            diags.push(
                Diagnostic::info(
                    "UNKNOWN_TRANSACTION",
                    format!("transaction set code '{code}' is not recognized; segments retained as raw"),
                    "functional_groups[].transactions[]",
                )
                .with_value(code),
            );
        }
        TransactionData::Raw { segments: segments.to_vec() }
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
    fn unknown_code_falls_back_to_raw_with_info_diagnostic() {
        let dispatcher = Dispatcher::new();
        let mut diags = DiagnosticCollector::new();
        let segments = vec![seg("XYZ", &["1"])];
        let data = dispatcher.dispatch("999", &segments, &mut diags, PlbSignConvention::default());
        assert!(matches!(data, TransactionData::Raw { .. }));
        assert_eq!(diags.info_count(), 1);
    }

    #[test]
    fn registered_extension_overrides_unknown_handling() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("999", |segments: &[Segment], _diags: &mut DiagnosticCollector| TransactionData::Extension {
            code: "999".to_string(),
            segments: segments.to_vec(),
        });
        let mut diags = DiagnosticCollector::new();
        let segments = vec![seg("XYZ", &["1"])];
        let data = dispatcher.dispatch("999", &segments, &mut diags, PlbSignConvention::default());
        assert!(matches!(data, TransactionData::Extension { .. }));
        assert_eq!(diags.info_count(), 0);
    }

    #[test]
    fn built_in_code_dispatches_without_diagnostic() {
        let dispatcher = Dispatcher::new();
        let mut diags = DiagnosticCollector::new();
        let data = dispatcher.dispatch("270", &[seg("EQ", &["30"])], &mut diags, PlbSignConvention::default());
        assert!(matches!(data, TransactionData::T270(_)));
    }
}
