pub mod amount;
pub mod candidate;
pub mod flag;
pub mod invoice;
pub mod result;
pub mod status;
pub mod threshold;

pub use amount::parse_amount;
pub use candidate::{CandidateKind, CandidateRecord};
pub use flag::{DiscrepancyReport, Flag, FlagType, Severity};
pub use invoice::{Invoice, InvoiceMetadata, LineItem, MatchContext, PoMatch};
pub use result::{
    links_invoice, EntityMatch, FieldScores, InvoiceMatchOutcome, MatchDecision, MatchResult,
    StoredMatch,
};
pub use status::MatchStatus;
pub use threshold::{FieldWeights, ThresholdConfig};
