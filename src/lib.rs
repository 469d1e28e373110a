pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::{create_pool, PgCandidateSource};
pub use error::{EngineError, Result};
pub use service::{DiscrepancyChecker, MatcherService};
