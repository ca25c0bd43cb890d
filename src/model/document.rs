//! The envelope tree: Interchange -> FunctionalGroup -> TransactionSet.
//! See SPEC_FULL.md §3 for the invariants each level carries.

use serde::{Deserialize, Serialize};

use crate::transactions::TransactionData;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterchangeHeader {
    pub sender_qualifier: String,
    pub sender_id: String,
    pub receiver_qualifier: String,
    pub receiver_id: String,
    pub date: String,
    pub time: String,
    pub version: String,
    pub control_number: String,
    pub usage_indicator: String,
    pub component_separator: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterchangeTrailer {
    pub control_number: String,
    pub group_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interchange {
    pub header: InterchangeHeader,
    pub functional_groups: Vec<FunctionalGroup>,
    pub trailer: Option<InterchangeTrailer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionalGroupHeader {
    pub functional_id_code: String,
    pub application_sender_code: String,
    pub application_receiver_code: String,
    pub date: String,
    pub time: String,
    pub control_number: String,
    pub responsible_agency_code: String,
    pub version_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionalGroupTrailer {
    pub transaction_count: usize,
    pub control_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionalGroup {
    pub header: FunctionalGroupHeader,
    pub transactions: Vec<TransactionSet>,
    pub trailer: Option<FunctionalGroupTrailer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSetHeader {
    pub transaction_set_code: String,
    pub control_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSetTrailer {
    pub segment_count: usize,
    pub control_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSet {
    pub header: TransactionSetHeader,
    pub transaction_data: TransactionData,
    pub trailer: Option<TransactionSetTrailer>,
}

/// The top-level parsed document (§6.2): an ordered sequence of
/// interchanges. A single input produces exactly one `Document`, which
/// may itself contain more than one interchange only when the byte
/// stream concatenates multiple ISA..IEA envelopes — a common trading
/// partner practice this crate treats as ordinary multi-interchange
/// input rather than an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub interchanges: Vec<Interchange>,
}
