use std::cmp::Ordering;
use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::constraints::ConstraintChecker;
use super::domain::{
    Allocation, AllocationExplanation, InstrumentDecision, InstrumentRanking, MerchantCategory,
    RankedInstrument, SelectionReason, SkipReason, SkippedInstrument, Split, TransactionContext,
};
use super::instrument::{Headroom, Instrument, InvalidInstrumentError};
use super::reward::evaluate;
use super::AllocationError;

/// Tuning knobs for the optimizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Cap on local-improvement rounds. Defaults to the number of eligible instruments.
    pub max_improvement_rounds: Option<usize>,
}

/// Stateless allocator: greedy fill by net marginal rate with minimum-charge
/// repair, an exact subset search when minimums still block the fill, then a
/// bounded drop-one local search to shed unprofitable flat fees.
#[derive(Debug, Clone, Default)]
pub struct AllocationOptimizer {
    config: OptimizerConfig,
}

/// Eligible instrument with the values it is ranked by.
struct Candidate<'a> {
    instrument: &'a Instrument,
    reward_rate: Decimal,
    net_rate: Decimal,
    headroom: Headroom,
    capacity: Headroom,
    min_charge: Decimal,
}

impl<'a> Candidate<'a> {
    /// Without a category the allow-list is skipped and the default rate is
    /// used. Without an amount the minimum is only checked against capacity.
    fn screen(
        instrument: &'a Instrument,
        category: Option<&MerchantCategory>,
        amount: Option<Decimal>,
    ) -> Result<Self, SkipReason> {
        if let Some(category) = category {
            if !instrument.accepts(category) {
                return Err(SkipReason::CategoryNotAccepted);
            }
        }

        let headroom = instrument.available_headroom();
        let capacity = instrument.capacity();
        if capacity.is_exhausted() {
            return Err(SkipReason::NoHeadroom { headroom });
        }

        let min_charge = instrument.minimum_charge_floor();
        if let Some(amount) = amount {
            if min_charge > amount {
                return Err(SkipReason::MinimumAboveAmount { min_charge, amount });
            }
        }
        if let Some(limit) = capacity.limited() {
            if min_charge > limit {
                return Err(SkipReason::MinimumAboveCapacity {
                    min_charge,
                    capacity: limit,
                });
            }
        }

        let reward_rate = category.map_or(instrument.default_rate(), |category| {
            instrument.reward_rate(category)
        });
        Ok(Self {
            instrument,
            reward_rate,
            net_rate: reward_rate - instrument.percentage_fee(),
            headroom,
            capacity,
            min_charge,
        })
    }

    /// Higher net rate first, then more headroom, then lower id.
    fn ranking(left: &Self, right: &Self) -> Ordering {
        right
            .net_rate
            .cmp(&left.net_rate)
            .then_with(|| right.headroom.cmp(&left.headroom))
            .then_with(|| left.instrument.id().cmp(right.instrument.id()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    rank: usize,
    charged: Decimal,
    reason: SelectionReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    placements: Vec<Placement>,
    deferred: Vec<(usize, Decimal)>,
}

impl AllocationOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Order the usable instruments for `category` with no amount in play.
    pub fn rank(
        &self,
        instruments: &[Instrument],
        category: Option<&MerchantCategory>,
    ) -> Result<InstrumentRanking, AllocationError> {
        ensure_unique_ids(instruments)?;

        let mut skipped = Vec::new();
        let mut candidates = Vec::new();
        for instrument in instruments {
            match Candidate::screen(instrument, category, None) {
                Ok(candidate) => candidates.push(candidate),
                Err(reason) => skipped.push(SkippedInstrument {
                    instrument_id: instrument.id().clone(),
                    reason,
                }),
            }
        }

        candidates.sort_by(Candidate::ranking);
        skipped.sort_by(|left, right| left.instrument_id.cmp(&right.instrument_id));

        let ranked = candidates
            .iter()
            .enumerate()
            .map(|(rank, candidate)| RankedInstrument {
                instrument_id: candidate.instrument.id().clone(),
                label: candidate.instrument.label().map(str::to_string),
                rank: rank + 1,
                reward_rate: candidate.reward_rate,
                percentage_fee: candidate.instrument.percentage_fee(),
                flat_fee: candidate.instrument.flat_fee(),
                net_marginal_rate: candidate.net_rate,
                headroom: candidate.headroom,
                capacity: candidate.capacity,
                min_charge: candidate.min_charge,
            })
            .collect();

        Ok(InstrumentRanking {
            merchant_category: category.cloned(),
            ranked,
            skipped,
        })
    }

    pub fn optimize(
        &self,
        instruments: &[Instrument],
        transaction: &TransactionContext,
    ) -> Result<Allocation, AllocationError> {
        ensure_unique_ids(instruments)?;

        let category = transaction.merchant_category();
        let amount = transaction.amount();

        let mut skipped = Vec::new();
        let mut candidates = Vec::new();
        for instrument in instruments {
            match Candidate::screen(instrument, Some(category), Some(amount)) {
                Ok(candidate) => candidates.push(candidate),
                Err(reason) => skipped.push(SkippedInstrument {
                    instrument_id: instrument.id().clone(),
                    reason,
                }),
            }
        }

        if candidates.is_empty() {
            return Err(AllocationError::NoEligibleInstrument {
                category: category.clone(),
            });
        }

        candidates.sort_by(Candidate::ranking);
        check_total_capacity(&candidates, amount)?;

        let mut excluded = BTreeSet::new();
        let mut displaced = BTreeSet::new();
        let mut plan = match fill(&candidates, amount, &excluded) {
            Some(plan) => plan,
            None => {
                let (plan, left_out) = search_minimum_subsets(&candidates, category, amount)
                    .map_err(|available| AllocationError::InsufficientCapacity {
                        requested: amount,
                        available,
                        shortfall: amount - available,
                    })?;
                debug!(
                    left_out = left_out.len(),
                    "greedy fill could not honour minimum charges; using subset search"
                );
                excluded = left_out.clone();
                displaced = left_out;
                plan
            }
        };
        let mut best_net = plan_net(&candidates, category, &plan);

        let round_cap = self
            .config
            .max_improvement_rounds
            .unwrap_or(candidates.len());
        let mut dropped = Vec::new();
        let mut rounds = 0;

        while rounds < round_cap {
            rounds += 1;
            let mut improvement: Option<(usize, Plan, Decimal)> = None;

            for placement in &plan.placements {
                let mut trial_exclusions = excluded.clone();
                trial_exclusions.insert(placement.rank);
                let Some(trial) = fill(&candidates, amount, &trial_exclusions) else {
                    continue;
                };

                let trial_net = plan_net(&candidates, category, &trial);
                let beats_current = trial_net > best_net;
                let beats_other = improvement
                    .as_ref()
                    .map_or(true, |(_, _, net)| trial_net > *net);
                if beats_current && beats_other {
                    improvement = Some((placement.rank, trial, trial_net));
                }
            }

            match improvement {
                Some((rank, trial, trial_net)) => {
                    debug!(
                        instrument = %candidates[rank].instrument.id(),
                        gain = %(trial_net - best_net),
                        "dropping instrument to improve net benefit"
                    );
                    excluded.insert(rank);
                    dropped.push((rank, trial_net - best_net));
                    plan = trial;
                    best_net = trial_net;
                }
                None => break,
            }
        }

        let allocation = build_allocation(
            &candidates,
            transaction,
            plan,
            &dropped,
            &displaced,
            skipped,
            best_net,
            rounds,
        );

        if let Err(violation) =
            ConstraintChecker::new(instruments, transaction).check(&allocation.splits)
        {
            error!(
                %violation,
                category = %category,
                amount = %amount,
                "optimizer produced an invalid allocation"
            );
            return Err(AllocationError::ConstraintViolation(violation));
        }

        Ok(allocation)
    }
}

fn ensure_unique_ids(instruments: &[Instrument]) -> Result<(), InvalidInstrumentError> {
    let mut seen = BTreeSet::new();
    for instrument in instruments {
        if !seen.insert(instrument.id()) {
            return Err(InvalidInstrumentError::DuplicateId {
                id: instrument.id().clone(),
            });
        }
    }
    Ok(())
}

fn check_total_capacity(candidates: &[Candidate<'_>], amount: Decimal) -> Result<(), AllocationError> {
    let mut available = Decimal::ZERO;
    for candidate in candidates {
        match candidate.capacity {
            Headroom::Unlimited => return Ok(()),
            Headroom::Limited(limit) => available += limit,
        }
    }

    if available < amount {
        return Err(AllocationError::InsufficientCapacity {
            requested: amount,
            available,
            shortfall: amount - available,
        });
    }
    Ok(())
}

/// Greedy fill over ranked candidates, skipping `excluded` ranks. `None` when
/// the minimum-charge repair cannot place the whole amount.
fn fill(
    candidates: &[Candidate<'_>],
    amount: Decimal,
    excluded: &BTreeSet<usize>,
) -> Option<Plan> {
    let mut placements = Vec::new();
    let mut deferred = Vec::new();
    let mut remaining = amount;

    for (rank, candidate) in candidates.iter().enumerate() {
        if remaining.is_zero() {
            break;
        }
        if excluded.contains(&rank) {
            continue;
        }

        let take = candidate.capacity.clamp(remaining);
        if take < candidate.min_charge {
            deferred.push((rank, remaining));
            continue;
        }

        placements.push(Placement {
            rank,
            charged: take,
            reason: SelectionReason::RankedFill,
        });
        remaining -= take;
    }

    if !remaining.is_zero() {
        remaining = repair_minimums(candidates, &mut placements, &mut deferred, remaining);
    }

    if !remaining.is_zero() {
        return None;
    }

    placements.sort_by_key(|placement| placement.rank);
    Some(Plan {
        placements,
        deferred,
    })
}

/// Admit a deferred candidate at its minimum by shaving the shortfall off
/// already placed splits, lowest-ranked first, never below their own minimum.
fn repair_minimums(
    candidates: &[Candidate<'_>],
    placements: &mut Vec<Placement>,
    deferred: &mut Vec<(usize, Decimal)>,
    remaining: Decimal,
) -> Decimal {
    for position in 0..deferred.len() {
        let (rank, _) = deferred[position];
        let candidate = &candidates[rank];
        // Deferral implies remaining < min_charge <= capacity.
        let need = candidate.min_charge - remaining;

        let slack: Decimal = placements
            .iter()
            .map(|placement| placement.charged - candidates[placement.rank].min_charge)
            .sum();
        if slack < need {
            continue;
        }

        placements.sort_by(|left, right| right.rank.cmp(&left.rank));
        let mut outstanding = need;
        for placement in placements.iter_mut() {
            if outstanding.is_zero() {
                break;
            }
            let reducible = placement.charged - candidates[placement.rank].min_charge;
            let shave = reducible.min(outstanding);
            placement.charged -= shave;
            outstanding -= shave;
        }
        placements.retain(|placement| !placement.charged.is_zero());

        placements.push(Placement {
            rank,
            charged: candidate.min_charge,
            reason: SelectionReason::MinimumChargeRepair,
        });
        deferred.remove(position);
        return Decimal::ZERO;
    }

    remaining
}

/// Candidates with a minimum charge that take part in the subset search.
/// Lower-ranked ones beyond this width stay out.
const MINIMUM_SEARCH_WIDTH: usize = 16;

/// Exact fallback for wallets the greedy pass cannot place. Candidates without
/// a minimum are always kept; every subset of those with one is tried and the
/// best net plan wins, earliest subset on ties. On failure returns the largest
/// amount any admissible subset could carry.
fn search_minimum_subsets(
    candidates: &[Candidate<'_>],
    category: &MerchantCategory,
    amount: Decimal,
) -> Result<(Plan, BTreeSet<usize>), Decimal> {
    let (with_minimum, without_minimum): (Vec<usize>, Vec<usize>) =
        (0..candidates.len()).partition(|&rank| !candidates[rank].min_charge.is_zero());
    let searched = &with_minimum[..with_minimum.len().min(MINIMUM_SEARCH_WIDTH)];

    let mut best: Option<(Plan, BTreeSet<usize>, Decimal)> = None;
    let mut available = Decimal::ZERO;

    for mask in 0u32..(1u32 << searched.len()) {
        let included: BTreeSet<usize> = without_minimum
            .iter()
            .copied()
            .chain(
                searched
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1u32 << bit) != 0)
                    .map(|(_, rank)| *rank),
            )
            .collect();

        let floor: Decimal = included
            .iter()
            .map(|&rank| candidates[rank].min_charge)
            .sum();
        if floor > amount {
            continue;
        }

        let plan = match spread(candidates, amount, &included) {
            Ok(plan) => plan,
            Err(placed) => {
                available = available.max(placed);
                continue;
            }
        };

        let net = plan_net(candidates, category, &plan);
        if best.as_ref().map_or(true, |(_, _, best_net)| net > *best_net) {
            let left_out = (0..candidates.len())
                .filter(|rank| !included.contains(rank))
                .collect();
            best = Some((plan, left_out, net));
        }
    }

    best.map(|(plan, left_out, _)| (plan, left_out))
        .ok_or(available)
}

/// Charge every included candidate its minimum, then top up in rank order.
/// On failure returns the total that could be placed.
fn spread(
    candidates: &[Candidate<'_>],
    amount: Decimal,
    included: &BTreeSet<usize>,
) -> Result<Plan, Decimal> {
    let mut charges: Vec<(usize, Decimal)> = included
        .iter()
        .map(|&rank| (rank, candidates[rank].min_charge))
        .collect();
    let floor: Decimal = charges.iter().map(|(_, charged)| *charged).sum();
    let mut remaining = amount - floor;

    for (rank, charged) in charges.iter_mut() {
        if remaining.is_zero() {
            break;
        }
        let top_up = candidates[*rank].capacity.clamp(*charged + remaining) - *charged;
        *charged += top_up;
        remaining -= top_up;
    }

    if !remaining.is_zero() {
        return Err(amount - remaining);
    }

    let placements = charges
        .into_iter()
        .filter(|(_, charged)| !charged.is_zero())
        .map(|(rank, charged)| Placement {
            rank,
            charged,
            reason: if candidates[rank].min_charge.is_zero() {
                SelectionReason::RankedFill
            } else {
                SelectionReason::MinimumChargeSearch
            },
        })
        .collect();

    Ok(Plan {
        placements,
        deferred: Vec::new(),
    })
}

fn plan_net(candidates: &[Candidate<'_>], category: &MerchantCategory, plan: &Plan) -> Decimal {
    plan.placements
        .iter()
        .map(|placement| {
            evaluate(candidates[placement.rank].instrument, category, placement.charged).net()
        })
        .sum()
}

fn build_allocation(
    candidates: &[Candidate<'_>],
    transaction: &TransactionContext,
    plan: Plan,
    dropped: &[(usize, Decimal)],
    displaced: &BTreeSet<usize>,
    mut skipped: Vec<SkippedInstrument>,
    net_benefit: Decimal,
    improvement_rounds: usize,
) -> Allocation {
    let category = transaction.merchant_category();

    let mut splits = Vec::with_capacity(plan.placements.len());
    let mut chosen = Vec::with_capacity(plan.placements.len());
    for placement in &plan.placements {
        let candidate = &candidates[placement.rank];
        let instrument = candidate.instrument;
        let evaluation = evaluate(instrument, category, placement.charged);

        splits.push(Split {
            instrument_id: instrument.id().clone(),
            charged_amount: placement.charged,
        });
        chosen.push(InstrumentDecision {
            instrument_id: instrument.id().clone(),
            label: instrument.label().map(str::to_string),
            rank: placement.rank + 1,
            reward_rate: candidate.reward_rate,
            percentage_fee: instrument.percentage_fee(),
            flat_fee: instrument.flat_fee(),
            net_marginal_rate: candidate.net_rate,
            headroom: candidate.headroom,
            capacity: candidate.capacity,
            charged_amount: placement.charged,
            reward_value: evaluation.reward_value,
            fee_cost: evaluation.fee_cost,
            reason: placement.reason,
        });
    }

    skipped.sort_by(|left, right| left.instrument_id.cmp(&right.instrument_id));

    let placed: BTreeSet<usize> = plan.placements.iter().map(|p| p.rank).collect();
    for (rank, candidate) in candidates.iter().enumerate() {
        if placed.contains(&rank) {
            continue;
        }

        let reason = if let Some((_, net_gain)) = dropped.iter().find(|(r, _)| *r == rank) {
            SkipReason::DroppedForNetBenefit {
                net_gain: *net_gain,
            }
        } else if displaced.contains(&rank) {
            SkipReason::ExcludedForMinimums {
                min_charge: candidate.min_charge,
            }
        } else if let Some((_, remaining)) = plan.deferred.iter().find(|(r, _)| *r == rank) {
            SkipReason::MinimumAboveRemainder {
                min_charge: candidate.min_charge,
                remaining: *remaining,
            }
        } else {
            SkipReason::NotNeeded
        };

        skipped.push(SkippedInstrument {
            instrument_id: candidate.instrument.id().clone(),
            reason,
        });
    }

    Allocation {
        splits,
        net_benefit,
        explanation: AllocationExplanation {
            merchant_category: category.clone(),
            amount: transaction.amount(),
            chosen,
            skipped,
            improvement_rounds,
        },
    }
}
