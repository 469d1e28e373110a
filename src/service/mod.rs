pub mod aggregator;
pub mod ai;
pub mod checker;
pub mod discrepancy;
pub mod matcher;
pub mod scorers;
pub mod similarity;
pub mod source;

pub use aggregator::match_entity;
pub use ai::{
    scorer_from_config, score_with_timeout, AiError, AiScore, DisabledScorer,
    OpenAiRelevanceScorer, RelevanceScorer,
};
pub use checker::{DiscrepancyChecker, InvoiceDiscrepancies};
pub use discrepancy::check_discrepancies;
pub use matcher::MatcherService;
pub use similarity::similarity;
pub use source::{CandidateSource, InMemorySource};
