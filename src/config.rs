//! Policy and configuration knobs. Plain structs passed by ownership;
//! no global or process-wide mutable state (SPEC_FULL.md §9).

use std::time::Duration;

/// Tokenizer-level configuration (C2).
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Trim optional CR/LF between segments. Default `true`.
    pub trim_segment_whitespace: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            trim_segment_whitespace: true,
        }
    }
}

/// Resolves the §9 Open Question on PLB sign convention for the 835
/// financial-balance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlbSignConvention {
    /// `total_paid == claims_total - plb_total` (a positive PLB amount
    /// reduces what the payer owes). Matches the worked example in
    /// spec.md §8 S4. This is the default.
    PositiveReducesObligation,
    /// `total_paid == claims_total + plb_total`.
    PositiveIncreasesObligation,
}

impl Default for PlbSignConvention {
    fn default() -> Self {
        PlbSignConvention::PositiveReducesObligation
    }
}

/// The "one error strategy expressed as a policy record" from SPEC_FULL.md §9.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    /// Stop rule evaluation after this many diagnostics have been recorded
    /// by the rule engine (any severity). `None` means unbounded.
    pub max_errors: Option<usize>,
    /// When `true`, the first `error`-severity diagnostic raised during
    /// *rule evaluation* halts further rule evaluation. Parsing and
    /// projection are unaffected — they never abort except for
    /// `InvalidHeader`.
    pub fail_fast: bool,
    /// Sign convention for 835 PLB amounts in the financial balance check.
    pub plb_sign_convention: PlbSignConvention,
    /// Optional wall-clock budget for rule evaluation. Exceeding it
    /// appends a `RULES_TIMEOUT` info diagnostic and stops evaluating
    /// further rules; the parsed document is still returned.
    pub rule_budget: Option<Duration>,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            max_errors: None,
            fail_fast: false,
            plb_sign_convention: PlbSignConvention::default(),
            rule_budget: None,
        }
    }
}

/// Top-level configuration bundle for [`crate::pipeline::parse_and_validate`].
///
/// `rules` is empty by default — parsing and structural validation run
/// regardless, but the rule engine (C6) only evaluates what the caller
/// asks for, whether hand-authored or pulled from
/// [`crate::validation::registry::builtin`].
///
/// `dispatcher` is the construction-time plugin surface from
/// SPEC_FULL.md §6.6: register a projector for a transaction-set code
/// the six built-ins don't recognize before parsing, and it overrides
/// (or supplements) the built-in dispatch table for this call.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub parser: ParserConfig,
    pub policy: EnginePolicy,
    pub rules: Vec<crate::validation::Rule>,
    pub dispatcher: crate::dispatch::Dispatcher,
}

impl EngineConfig {
    /// Adds every rule from a named built-in set (SPEC_FULL.md §6.5).
    /// Unknown names are ignored rather than erroring, since a bad rule
    /// set name is a configuration mistake, not a parse failure.
    pub fn with_builtin_rules(mut self, name: &str) -> Self {
        if let Some(rule_file) = crate::validation::registry::builtin(name) {
            self.rules.extend(rule_file.rules);
        }
        self
    }

    /// Registers a projector for `code`, extending (or overriding) the
    /// built-in dispatch table for this configuration (SPEC_FULL.md
    /// §6.6).
    pub fn with_extension(mut self, code: impl Into<String>, projector: impl crate::dispatch::ExtensionProjector + 'static) -> Self {
        self.dispatcher.register(code, projector);
        self
    }
}
