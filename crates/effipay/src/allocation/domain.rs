use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::instrument::Headroom;

/// Number of decimal places in one unit of currency precision (cents).
pub const MONEY_SCALE: u32 = 2;

/// Smallest representable charge: one cent.
pub const CENT: Decimal = Decimal::from_parts(1, 0, 0, false, MONEY_SCALE);

/// Truncate towards zero to whole cents. Never rounds a capacity up.
pub(crate) fn floor_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero)
}

/// Round away from zero to whole cents. Used for minimum-charge floors.
pub(crate) fn ceil_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::AwayFromZero)
}

pub(crate) fn is_whole_cents(value: Decimal) -> bool {
    floor_cents(value) == value
}

/// Identifier wrapper for a user's payment instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub String);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Merchant classification code, stored trimmed and lower-cased so lookups are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MerchantCategory(String);

impl MerchantCategory {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for MerchantCategory {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for MerchantCategory {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<MerchantCategory> for String {
    fn from(value: MerchantCategory) -> Self {
        value.0
    }
}

impl fmt::Display for MerchantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejections raised while building a [`TransactionContext`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction amount must be positive (found {0})")]
    NonPositiveAmount(Decimal),
    #[error("transaction amount {0} has sub-cent precision")]
    SubCentAmount(Decimal),
    #[error("merchant category must not be blank")]
    BlankCategory,
}

/// The charge being allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionContext {
    amount: Decimal,
    merchant_category: MerchantCategory,
}

impl TransactionContext {
    pub fn new(
        amount: Decimal,
        merchant_category: impl Into<MerchantCategory>,
    ) -> Result<Self, TransactionError> {
        let merchant_category = merchant_category.into();
        if amount <= Decimal::ZERO {
            return Err(TransactionError::NonPositiveAmount(amount));
        }
        if !is_whole_cents(amount) {
            return Err(TransactionError::SubCentAmount(amount));
        }
        if merchant_category.is_blank() {
            return Err(TransactionError::BlankCategory);
        }

        Ok(Self {
            amount,
            merchant_category,
        })
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn merchant_category(&self) -> &MerchantCategory {
        &self.merchant_category
    }
}

/// One leg of an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub instrument_id: InstrumentId,
    pub charged_amount: Decimal,
}

/// The engine's answer for a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub splits: Vec<Split>,
    pub net_benefit: Decimal,
    pub explanation: AllocationExplanation,
}

impl Allocation {
    pub fn total_charged(&self) -> Decimal {
        self.splits.iter().map(|split| split.charged_amount).sum()
    }

    pub fn charged_to(&self, id: &InstrumentId) -> Decimal {
        self.splits
            .iter()
            .find(|split| &split.instrument_id == id)
            .map(|split| split.charged_amount)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Audit trail for an allocation. Every value the optimizer used to rank, fill,
/// and prune instruments is recorded so the result can be recomputed from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationExplanation {
    pub merchant_category: MerchantCategory,
    pub amount: Decimal,
    pub chosen: Vec<InstrumentDecision>,
    pub skipped: Vec<SkippedInstrument>,
    pub improvement_rounds: usize,
}

/// Why an instrument received its charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Filled up to capacity or the remaining amount in rate order.
    RankedFill,
    /// Admitted at its minimum charge after shaving lower-ranked splits.
    MinimumChargeRepair,
    /// Part of the best subset of minimum-charge instruments that fits the amount.
    MinimumChargeSearch,
}

/// Decision-time snapshot of an instrument that received part of the charge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentDecision {
    pub instrument_id: InstrumentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub rank: usize,
    pub reward_rate: Decimal,
    pub percentage_fee: Decimal,
    pub flat_fee: Decimal,
    pub net_marginal_rate: Decimal,
    pub headroom: Headroom,
    pub capacity: Headroom,
    pub charged_amount: Decimal,
    pub reward_value: Decimal,
    pub fee_cost: Decimal,
    pub reason: SelectionReason,
}

/// Instruments in the order the optimizer would fill them, computed without a
/// pending transaction. Without a category every instrument is ranked on its
/// default rate and allow-lists are not consulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentRanking {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_category: Option<MerchantCategory>,
    pub ranked: Vec<RankedInstrument>,
    pub skipped: Vec<SkippedInstrument>,
}

impl InstrumentRanking {
    pub fn best(&self) -> Option<&RankedInstrument> {
        self.ranked.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedInstrument {
    pub instrument_id: InstrumentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub rank: usize,
    pub reward_rate: Decimal,
    pub percentage_fee: Decimal,
    pub flat_fee: Decimal,
    pub net_marginal_rate: Decimal,
    pub headroom: Headroom,
    pub capacity: Headroom,
    pub min_charge: Decimal,
}

/// An instrument the optimizer looked at but did not charge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedInstrument {
    pub instrument_id: InstrumentId,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    CategoryNotAccepted,
    NoHeadroom {
        headroom: Headroom,
    },
    MinimumAboveCapacity {
        min_charge: Decimal,
        capacity: Decimal,
    },
    MinimumAboveAmount {
        min_charge: Decimal,
        amount: Decimal,
    },
    MinimumAboveRemainder {
        min_charge: Decimal,
        remaining: Decimal,
    },
    NotNeeded,
    ExcludedForMinimums {
        min_charge: Decimal,
    },
    DroppedForNetBenefit {
        net_gain: Decimal,
    },
}

impl SkipReason {
    pub fn summary(&self) -> String {
        match self {
            SkipReason::CategoryNotAccepted => "not accepted for this category".to_string(),
            SkipReason::NoHeadroom { headroom } => format!("no usable headroom ({headroom})"),
            SkipReason::MinimumAboveCapacity {
                min_charge,
                capacity,
            } => format!("minimum charge {min_charge} exceeds capacity {capacity}"),
            SkipReason::MinimumAboveAmount { min_charge, amount } => {
                format!("minimum charge {min_charge} exceeds transaction amount {amount}")
            }
            SkipReason::MinimumAboveRemainder {
                min_charge,
                remaining,
            } => format!("minimum charge {min_charge} exceeds remaining {remaining}"),
            SkipReason::NotNeeded => "amount covered by higher-ranked instruments".to_string(),
            SkipReason::ExcludedForMinimums { min_charge } => {
                format!("left out so the other minimum charges fit (minimum {min_charge})")
            }
            SkipReason::DroppedForNetBenefit { net_gain } => {
                format!("dropped to save flat fee (net gain {net_gain})")
            }
        }
    }
}
