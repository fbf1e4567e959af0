//! Deterministic payment-allocation engine.
//!
//! Instruments are validated once from raw profile records, ranked by the reward they return
//! net of percentage fees, and filled greedily up to their usable capacity. Per-instrument
//! minimums are handled by a repair step, falling back to an exact subset search; flat fees by a
//! bounded drop-one local search. The same ranking is available without a transaction through
//! [`AllocationOptimizer::rank`]. Every result is re-validated by the [`ConstraintChecker`] before it
//! leaves the engine.

pub mod constraints;
pub mod domain;
pub mod instrument;
pub mod optimizer;
pub mod reward;

use rust_decimal::Decimal;

pub use constraints::{ConstraintChecker, ConstraintViolation};
pub use domain::{
    Allocation, AllocationExplanation, InstrumentDecision, InstrumentId, InstrumentRanking,
    MerchantCategory, RankedInstrument, SelectionReason, SkipReason, SkippedInstrument, Split,
    TransactionContext, TransactionError, CENT, MONEY_SCALE,
};
pub use instrument::{Headroom, Instrument, InstrumentRecord, InvalidInstrumentError};
pub use optimizer::{AllocationOptimizer, OptimizerConfig};
pub use reward::{evaluate, RewardEvaluation};

/// Typed failures returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error(transparent)]
    InvalidInstrument(#[from] InvalidInstrumentError),
    #[error(transparent)]
    InvalidTransaction(#[from] TransactionError),
    #[error("no instrument is eligible for merchant category '{category}'")]
    NoEligibleInstrument { category: MerchantCategory },
    #[error("usable capacity {available} cannot cover {requested} (shortfall {shortfall})")]
    InsufficientCapacity {
        requested: Decimal,
        available: Decimal,
        shortfall: Decimal,
    },
    #[error("allocation failed validation: {0}")]
    ConstraintViolation(#[from] ConstraintViolation),
}

/// Validate raw records and allocate `transaction` across them.
pub fn recommend_allocation(
    records: Vec<InstrumentRecord>,
    transaction: &TransactionContext,
    config: &OptimizerConfig,
) -> Result<Allocation, AllocationError> {
    let instruments = records
        .into_iter()
        .map(Instrument::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    AllocationOptimizer::new(config.clone()).optimize(&instruments, transaction)
}
