use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use super::domain::{InstrumentId, MerchantCategory, Split, TransactionContext};
use super::instrument::{Headroom, Instrument};

/// First rule a candidate allocation broke.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintViolation {
    #[error("splits total {allocated} but transaction amount is {expected}")]
    SumMismatch {
        expected: Decimal,
        allocated: Decimal,
    },
    #[error("split references unknown instrument {id}")]
    UnknownInstrument { id: InstrumentId },
    #[error("instrument {id} appears in more than one split")]
    DuplicateInstrument { id: InstrumentId },
    #[error("instrument {id} charged non-positive amount {amount}")]
    NonPositiveCharge { id: InstrumentId, amount: Decimal },
    #[error("instrument {id} does not accept category '{category}'")]
    CategoryNotAccepted {
        id: InstrumentId,
        category: MerchantCategory,
    },
    #[error("instrument {id} charged {amount}, below its minimum {min}")]
    BelowMinimum {
        id: InstrumentId,
        amount: Decimal,
        min: Decimal,
    },
    #[error("instrument {id} charged {amount}, above its maximum {max}")]
    AboveMaximum {
        id: InstrumentId,
        amount: Decimal,
        max: Decimal,
    },
    #[error("instrument {id} charged {amount}, above its headroom {headroom}")]
    ExceedsHeadroom {
        id: InstrumentId,
        amount: Decimal,
        headroom: Headroom,
    },
}

/// Validates candidate splits against one transaction and instrument set.
pub struct ConstraintChecker<'a> {
    instruments: BTreeMap<&'a InstrumentId, &'a Instrument>,
    transaction: &'a TransactionContext,
}

impl<'a> ConstraintChecker<'a> {
    pub fn new(instruments: &'a [Instrument], transaction: &'a TransactionContext) -> Self {
        let instruments = instruments
            .iter()
            .map(|instrument| (instrument.id(), instrument))
            .collect();

        Self {
            instruments,
            transaction,
        }
    }

    pub fn check(&self, splits: &[Split]) -> Result<(), ConstraintViolation> {
        let allocated: Decimal = splits.iter().map(|split| split.charged_amount).sum();
        if allocated != self.transaction.amount() {
            return Err(ConstraintViolation::SumMismatch {
                expected: self.transaction.amount(),
                allocated,
            });
        }

        let mut seen = BTreeSet::new();
        for split in splits {
            self.check_split(split, &mut seen)?;
        }

        Ok(())
    }

    fn check_split<'s>(
        &self,
        split: &'s Split,
        seen: &mut BTreeSet<&'s InstrumentId>,
    ) -> Result<(), ConstraintViolation> {
        let id = &split.instrument_id;
        let amount = split.charged_amount;

        let instrument = self
            .instruments
            .get(id)
            .ok_or_else(|| ConstraintViolation::UnknownInstrument { id: id.clone() })?;

        if !seen.insert(id) {
            return Err(ConstraintViolation::DuplicateInstrument { id: id.clone() });
        }

        if amount <= Decimal::ZERO {
            return Err(ConstraintViolation::NonPositiveCharge {
                id: id.clone(),
                amount,
            });
        }

        let category = self.transaction.merchant_category();
        if !instrument.accepts(category) {
            return Err(ConstraintViolation::CategoryNotAccepted {
                id: id.clone(),
                category: category.clone(),
            });
        }

        if let Some(min) = instrument.min_charge() {
            if amount < min {
                return Err(ConstraintViolation::BelowMinimum {
                    id: id.clone(),
                    amount,
                    min,
                });
            }
        }

        if let Some(max) = instrument.max_charge() {
            if amount > max {
                return Err(ConstraintViolation::AboveMaximum {
                    id: id.clone(),
                    amount,
                    max,
                });
            }
        }

        let headroom = instrument.available_headroom();
        if !headroom.covers(amount) {
            return Err(ConstraintViolation::ExceedsHeadroom {
                id: id.clone(),
                amount,
                headroom,
            });
        }

        Ok(())
    }
}
