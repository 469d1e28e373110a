pub mod pool;
pub mod queries;
pub mod source;

pub use pool::create_pool;
pub use queries::*;
pub use source::PgCandidateSource;
