pub mod classifier;
pub mod config;
pub mod context;
pub mod domain_utils;
pub mod error;
pub mod extract;
pub mod fusion;
pub mod llm;
pub mod message;
pub mod reporting;
pub mod reputation;
pub mod types;

pub use config::Config;
pub use context::ServiceContext;
pub use error::FusionError;
pub use fusion::{FusionEngine, FusionWeights};
pub use message::MessageParser;
pub use reporting::Reporter;
pub use reputation::{KeyMode, ReputationOracle, StoreOutcome};
pub use types::{EmailInput, FusionBranch, RiskResult};
