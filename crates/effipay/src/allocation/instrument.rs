use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{ceil_cents, floor_cents, InstrumentId, MerchantCategory};

/// Raw instrument attributes as they arrive from a profile store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub id: InstrumentId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub credit_limit: Option<Decimal>,
    #[serde(default)]
    pub current_balance: Decimal,
    #[serde(default)]
    pub reward_schedule: BTreeMap<MerchantCategory, Decimal>,
    #[serde(default)]
    pub default_rate: Decimal,
    #[serde(default)]
    pub flat_fee: Decimal,
    #[serde(default)]
    pub percentage_fee: Decimal,
    #[serde(default)]
    pub min_charge: Option<Decimal>,
    #[serde(default)]
    pub max_charge: Option<Decimal>,
    #[serde(default)]
    pub eligible_categories: Option<BTreeSet<MerchantCategory>>,
}

/// Validation failures raised while building an [`Instrument`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInstrumentError {
    #[error("instrument id must not be blank")]
    BlankId,
    #[error("instrument {id}: balance {balance} exceeds credit limit {limit}")]
    BalanceExceedsLimit {
        id: InstrumentId,
        balance: Decimal,
        limit: Decimal,
    },
    #[error("instrument {id}: min_charge {min} exceeds max_charge {max}")]
    InvertedBounds {
        id: InstrumentId,
        min: Decimal,
        max: Decimal,
    },
    #[error("instrument {id}: {field} must not be negative (found {value})")]
    Negative {
        id: InstrumentId,
        field: &'static str,
        value: Decimal,
    },
    #[error("instrument {id} appears more than once")]
    DuplicateId { id: InstrumentId },
}

/// Unused capacity on an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Headroom {
    Limited(Decimal),
    Unlimited,
}

impl Headroom {
    /// The smaller of this headroom and `amount`.
    pub fn clamp(self, amount: Decimal) -> Decimal {
        match self {
            Headroom::Limited(limit) => limit.min(amount),
            Headroom::Unlimited => amount,
        }
    }

    pub fn covers(self, amount: Decimal) -> bool {
        match self {
            Headroom::Limited(limit) => amount <= limit,
            Headroom::Unlimited => true,
        }
    }

    pub fn is_exhausted(self) -> bool {
        matches!(self, Headroom::Limited(limit) if limit <= Decimal::ZERO)
    }

    pub fn limited(self) -> Option<Decimal> {
        match self {
            Headroom::Limited(limit) => Some(limit),
            Headroom::Unlimited => None,
        }
    }
}

impl Ord for Headroom {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Headroom::Unlimited, Headroom::Unlimited) => Ordering::Equal,
            (Headroom::Unlimited, Headroom::Limited(_)) => Ordering::Greater,
            (Headroom::Limited(_), Headroom::Unlimited) => Ordering::Less,
            (Headroom::Limited(left), Headroom::Limited(right)) => left.cmp(right),
        }
    }
}

impl PartialOrd for Headroom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Headroom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Headroom::Limited(limit) => write!(f, "{limit}"),
            Headroom::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Immutable, validated view of one payment instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    id: InstrumentId,
    label: Option<String>,
    credit_limit: Option<Decimal>,
    current_balance: Decimal,
    reward_schedule: BTreeMap<MerchantCategory, Decimal>,
    default_rate: Decimal,
    flat_fee: Decimal,
    percentage_fee: Decimal,
    min_charge: Option<Decimal>,
    max_charge: Option<Decimal>,
    eligible_categories: Option<BTreeSet<MerchantCategory>>,
}

impl TryFrom<InstrumentRecord> for Instrument {
    type Error = InvalidInstrumentError;

    fn try_from(record: InstrumentRecord) -> Result<Self, Self::Error> {
        if record.id.0.trim().is_empty() {
            return Err(InvalidInstrumentError::BlankId);
        }

        let id = record.id;
        let non_negative = |field: &'static str, value: Decimal| {
            if value < Decimal::ZERO {
                Err(InvalidInstrumentError::Negative {
                    id: id.clone(),
                    field,
                    value,
                })
            } else {
                Ok(())
            }
        };

        if let Some(limit) = record.credit_limit {
            non_negative("credit_limit", limit)?;
        }
        non_negative("current_balance", record.current_balance)?;
        non_negative("default_rate", record.default_rate)?;
        non_negative("flat_fee", record.flat_fee)?;
        non_negative("percentage_fee", record.percentage_fee)?;
        if let Some(min) = record.min_charge {
            non_negative("min_charge", min)?;
        }
        if let Some(max) = record.max_charge {
            non_negative("max_charge", max)?;
        }
        for rate in record.reward_schedule.values() {
            non_negative("reward_schedule", *rate)?;
        }

        if let Some(limit) = record.credit_limit {
            if record.current_balance > limit {
                return Err(InvalidInstrumentError::BalanceExceedsLimit {
                    id,
                    balance: record.current_balance,
                    limit,
                });
            }
        }

        if let (Some(min), Some(max)) = (record.min_charge, record.max_charge) {
            if min > max {
                return Err(InvalidInstrumentError::InvertedBounds { id, min, max });
            }
        }

        Ok(Self {
            id,
            label: record.label.filter(|label| !label.trim().is_empty()),
            credit_limit: record.credit_limit,
            current_balance: record.current_balance,
            reward_schedule: record.reward_schedule,
            default_rate: record.default_rate,
            flat_fee: record.flat_fee,
            percentage_fee: record.percentage_fee,
            min_charge: record.min_charge,
            max_charge: record.max_charge,
            eligible_categories: record.eligible_categories,
        })
    }
}

impl Instrument {
    pub fn id(&self) -> &InstrumentId {
        &self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn credit_limit(&self) -> Option<Decimal> {
        self.credit_limit
    }

    pub fn current_balance(&self) -> Decimal {
        self.current_balance
    }

    pub fn flat_fee(&self) -> Decimal {
        self.flat_fee
    }

    pub fn percentage_fee(&self) -> Decimal {
        self.percentage_fee
    }

    pub fn min_charge(&self) -> Option<Decimal> {
        self.min_charge
    }

    pub fn max_charge(&self) -> Option<Decimal> {
        self.max_charge
    }

    /// `credit_limit - current_balance`, or unlimited for instruments without a limit.
    pub fn available_headroom(&self) -> Headroom {
        match self.credit_limit {
            Some(limit) => Headroom::Limited(limit - self.current_balance),
            None => Headroom::Unlimited,
        }
    }

    pub fn default_rate(&self) -> Decimal {
        self.default_rate
    }

    pub fn reward_rate(&self, category: &MerchantCategory) -> Decimal {
        self.reward_schedule
            .get(category)
            .copied()
            .unwrap_or(self.default_rate)
    }

    /// Reward earned per unit charged once the percentage fee is paid.
    pub fn net_marginal_rate(&self, category: &MerchantCategory) -> Decimal {
        self.reward_rate(category) - self.percentage_fee
    }

    pub fn accepts(&self, category: &MerchantCategory) -> bool {
        self.eligible_categories
            .as_ref()
            .map_or(true, |allowed| allowed.contains(category))
    }

    /// Most that may be routed here in one transaction: headroom clipped by
    /// `max_charge`, truncated to whole cents.
    pub fn capacity(&self) -> Headroom {
        let bounded = match (self.available_headroom(), self.max_charge) {
            (Headroom::Limited(headroom), Some(max)) => Headroom::Limited(headroom.min(max)),
            (Headroom::Limited(headroom), None) => Headroom::Limited(headroom),
            (Headroom::Unlimited, Some(max)) => Headroom::Limited(max),
            (Headroom::Unlimited, None) => Headroom::Unlimited,
        };

        match bounded {
            Headroom::Limited(limit) => Headroom::Limited(floor_cents(limit).max(Decimal::ZERO)),
            Headroom::Unlimited => Headroom::Unlimited,
        }
    }

    /// Smallest charge this instrument will take, rounded up to whole cents.
    pub fn minimum_charge_floor(&self) -> Decimal {
        self.min_charge.map(ceil_cents).unwrap_or(Decimal::ZERO)
    }
}
