use crate::infra::{load_offers, load_profiles, parse_amount};
use clap::Args;
use effipay::allocation::{Allocation, InstrumentRanking, SelectionReason};
use effipay::error::AppError;
use effipay::recommendation::{
    RankingQuery, RecommendationConfig, RecommendationRequest, RecommendationService, UserId,
};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct AllocateArgs {
    /// Profile fixture (.json or .csv)
    #[arg(long)]
    pub(crate) profiles: PathBuf,
    /// User whose instruments should be considered
    #[arg(long)]
    pub(crate) user: String,
    /// Transaction amount in currency units, e.g. 120.00
    #[arg(long, value_parser = parse_amount)]
    pub(crate) amount: Decimal,
    /// Merchant category code, e.g. groceries
    #[arg(long)]
    pub(crate) category: String,
    /// Optional offer catalog JSON overriding stored category rates
    #[arg(long)]
    pub(crate) offers: Option<PathBuf>,
    /// Print the raw allocation payload instead of the text report
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_allocate(args: AllocateArgs) -> Result<(), AppError> {
    let AllocateArgs {
        profiles,
        user,
        amount,
        category,
        offers,
        json,
    } = args;

    let store = Arc::new(load_profiles(&profiles)?);
    let catalog = offers.as_deref().map(load_offers).transpose()?.map(Arc::new);
    let service = RecommendationService::new(store, catalog, RecommendationConfig::default());

    let allocation = service
        .recommend(RecommendationRequest {
            user_id: UserId(user),
            amount,
            merchant_category: category,
        })
        .await?;

    if json {
        match serde_json::to_string_pretty(&allocation) {
            Ok(payload) => println!("{payload}"),
            Err(err) => println!("Allocation payload unavailable: {err}"),
        }
    } else {
        print!("{}", render_allocation(&allocation));
    }

    Ok(())
}

#[derive(Args, Debug)]
pub(crate) struct RankArgs {
    /// Profile fixture (.json or .csv)
    #[arg(long)]
    pub(crate) profiles: PathBuf,
    /// User whose instruments should be ranked
    #[arg(long)]
    pub(crate) user: String,
    /// Merchant category; default rates are used when omitted
    #[arg(long)]
    pub(crate) category: Option<String>,
    /// Optional offer catalog JSON overriding stored category rates
    #[arg(long)]
    pub(crate) offers: Option<PathBuf>,
    /// Print the raw ranking payload instead of the text report
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_rank(args: RankArgs) -> Result<(), AppError> {
    let RankArgs {
        profiles,
        user,
        category,
        offers,
        json,
    } = args;

    let store = Arc::new(load_profiles(&profiles)?);
    let catalog = offers.as_deref().map(load_offers).transpose()?.map(Arc::new);
    let service = RecommendationService::new(store, catalog, RecommendationConfig::default());

    let ranking = service
        .rank_instruments(
            UserId(user),
            RankingQuery {
                merchant_category: category,
            },
        )
        .await?;

    if json {
        match serde_json::to_string_pretty(&ranking) {
            Ok(payload) => println!("{payload}"),
            Err(err) => println!("Ranking payload unavailable: {err}"),
        }
    } else {
        print!("{}", render_ranking(&ranking));
    }

    Ok(())
}

pub(crate) fn render_ranking(ranking: &InstrumentRanking) -> String {
    let mut out = String::new();

    match &ranking.merchant_category {
        Some(category) => {
            let _ = writeln!(out, "Ranking for '{category}'");
        }
        None => {
            let _ = writeln!(out, "Ranking on default rates");
        }
    }

    if ranking.ranked.is_empty() {
        let _ = writeln!(out, "  no usable instruments");
    }
    for ranked in &ranking.ranked {
        let name = ranked
            .label
            .as_deref()
            .unwrap_or(ranked.instrument_id.0.as_str());
        let _ = writeln!(
            out,
            "  #{} {}: net {} (rate {} percentage fee {} flat fee {}) | capacity {} | minimum {}",
            ranked.rank,
            name,
            ranked.net_marginal_rate,
            ranked.reward_rate,
            ranked.percentage_fee,
            ranked.flat_fee,
            ranked.capacity,
            ranked.min_charge
        );
    }

    for skipped in &ranking.skipped {
        let _ = writeln!(
            out,
            "  - {}: {}",
            skipped.instrument_id,
            skipped.reason.summary()
        );
    }

    out
}

pub(crate) fn render_allocation(allocation: &Allocation) -> String {
    let explanation = &allocation.explanation;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Allocation for {} in '{}'",
        explanation.amount, explanation.merchant_category
    );
    let _ = writeln!(out, "Net benefit: {}", allocation.net_benefit);

    let _ = writeln!(out, "\nSplits:");
    for decision in &explanation.chosen {
        let name = decision
            .label
            .as_deref()
            .unwrap_or(decision.instrument_id.0.as_str());
        let via = match decision.reason {
            SelectionReason::RankedFill => "ranked fill",
            SelectionReason::MinimumChargeRepair => "minimum-charge repair",
            SelectionReason::MinimumChargeSearch => "minimum-charge subset",
        };
        let _ = writeln!(
            out,
            "  #{} {}: {} | rate {} net {} | reward {} fees {} | capacity {} ({})",
            decision.rank,
            name,
            decision.charged_amount,
            decision.reward_rate,
            decision.net_marginal_rate,
            decision.reward_value,
            decision.fee_cost,
            decision.capacity,
            via
        );
    }

    if explanation.skipped.is_empty() {
        let _ = writeln!(out, "\nSkipped: none");
    } else {
        let _ = writeln!(out, "\nSkipped:");
        for skipped in &explanation.skipped {
            let _ = writeln!(
                out,
                "  - {}: {}",
                skipped.instrument_id,
                skipped.reason.summary()
            );
        }
    }

    if explanation.improvement_rounds > 0 {
        let _ = writeln!(
            out,
            "\nLocal improvement rounds: {}",
            explanation.improvement_rounds
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use effipay::allocation::{
        recommend_allocation, AllocationOptimizer, Instrument, InstrumentId, InstrumentRecord,
        MerchantCategory, OptimizerConfig, TransactionContext,
    };

    fn card(id: &str, limit: i64, rate: Decimal) -> InstrumentRecord {
        InstrumentRecord {
            id: InstrumentId::from(id),
            label: Some(format!("{id} card")),
            credit_limit: Some(Decimal::from(limit)),
            default_rate: rate,
            ..InstrumentRecord::default()
        }
    }

    #[test]
    fn report_lists_splits_in_rank_order_and_skips() {
        let records = vec![
            card("a", 100, Decimal::new(2, 2)),
            card("b", 50, Decimal::new(5, 2)),
            card("c", 500, Decimal::new(1, 2)),
        ];
        let transaction =
            TransactionContext::new(Decimal::from(120), "groceries").expect("transaction");
        let allocation = recommend_allocation(records, &transaction, &OptimizerConfig::default())
            .expect("allocation");

        let report = render_allocation(&allocation);
        let b_line = report.find("#1 b card: 50").expect("rank 1 line");
        let a_line = report.find("#2 a card: 70").expect("rank 2 line");
        assert!(b_line < a_line);
        assert!(report.contains("Net benefit: 3.9"));
        assert!(report.contains("  - c: amount covered by higher-ranked instruments"));
    }

    #[test]
    fn ranking_report_lists_instruments_then_skips() {
        let mut maxed = card("maxed", 100, Decimal::new(9, 2));
        maxed.current_balance = Decimal::from(100);
        let instruments: Vec<Instrument> = vec![
            card("a", 100, Decimal::new(2, 2)),
            card("b", 50, Decimal::new(5, 2)),
            maxed,
        ]
        .into_iter()
        .map(|record| Instrument::try_from(record).expect("valid instrument"))
        .collect();
        let category = MerchantCategory::new("groceries");
        let ranking = AllocationOptimizer::default()
            .rank(&instruments, Some(&category))
            .expect("ranking");

        let report = render_ranking(&ranking);
        assert!(report.starts_with("Ranking for 'groceries'"));
        let b_line = report.find("#1 b card: net 0.05").expect("rank 1 line");
        let a_line = report.find("#2 a card: net 0.02").expect("rank 2 line");
        assert!(b_line < a_line);
        assert!(report.contains("  - maxed: no usable headroom"));
    }
}
