use rust_decimal::Decimal;
use serde::Serialize;

use super::domain::MerchantCategory;
use super::instrument::Instrument;

/// Value earned and cost incurred by charging an amount to one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RewardEvaluation {
    pub reward_value: Decimal,
    pub fee_cost: Decimal,
}

impl RewardEvaluation {
    pub fn net(&self) -> Decimal {
        self.reward_value - self.fee_cost
    }
}

pub fn evaluate(
    instrument: &Instrument,
    category: &MerchantCategory,
    charged_amount: Decimal,
) -> RewardEvaluation {
    if charged_amount <= Decimal::ZERO {
        return RewardEvaluation::default();
    }

    RewardEvaluation {
        reward_value: charged_amount * instrument.reward_rate(category),
        fee_cost: instrument.flat_fee() + instrument.percentage_fee() * charged_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::domain::InstrumentId;
    use crate::allocation::instrument::InstrumentRecord;
    use std::str::FromStr;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("valid decimal")
    }

    fn instrument(rate: &str, flat_fee: &str, percentage_fee: &str) -> Instrument {
        Instrument::try_from(InstrumentRecord {
            id: InstrumentId::from("card"),
            credit_limit: Some(dec("500")),
            default_rate: dec(rate),
            flat_fee: dec(flat_fee),
            percentage_fee: dec(percentage_fee),
            ..InstrumentRecord::default()
        })
        .expect("valid instrument")
    }

    #[test]
    fn flat_fee_dominates_small_charges() {
        let card = instrument("0.10", "5", "0");
        let evaluation = evaluate(&card, &"misc".into(), dec("10"));

        assert_eq!(evaluation.reward_value, dec("1.0"));
        assert_eq!(evaluation.fee_cost, dec("5"));
        assert_eq!(evaluation.net(), dec("-4"));
    }

    #[test]
    fn percentage_fee_scales_with_amount() {
        let card = instrument("0.02", "0", "0.03");
        let evaluation = evaluate(&card, &"misc".into(), dec("200"));

        assert_eq!(evaluation.reward_value, dec("4"));
        assert_eq!(evaluation.fee_cost, dec("6"));
        assert_eq!(evaluation.net(), dec("-2"));
    }

    #[test]
    fn unused_instrument_costs_nothing() {
        let card = instrument("0.05", "5", "0.01");
        assert_eq!(
            evaluate(&card, &"misc".into(), Decimal::ZERO),
            RewardEvaluation::default()
        );
    }

    #[test]
    fn decimal_arithmetic_does_not_drift() {
        let card = instrument("0.015", "0", "0");
        let total: Decimal = (0..1000)
            .map(|_| evaluate(&card, &"misc".into(), dec("0.10")).reward_value)
            .sum();
        assert_eq!(total, dec("1.5"));
    }
}
