pub mod cli;
pub mod config;
pub mod error;
pub mod estimator;
pub mod params;
pub mod planner;
pub mod types;

pub use error::AppError;
pub use estimator::{DustPolicy, FeeEstimator, FixedFeeEstimator, MempoolFeeEstimator, StandardDustPolicy};
pub use params::ChainParams;
pub use planner::{priority_label, FeePlanner};
pub use types::{
    spendable_candidates, CandidateInput, CustomFeeKind, FeeMode, FeePlan, FeePolicy, FeeRate, InputPool,
    PriorityLabel, RequestedPayment, SpendKind,
};
