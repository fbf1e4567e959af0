use std::collections::BTreeMap;
use std::sync::Arc;

use super::common::*;
use crate::allocation::{Headroom, InstrumentId, InstrumentRecord};
use crate::recommendation::{
    Collaborator, ErrorKind, RankingQuery, RecommendationError, RecommendationService, UserId,
};

#[tokio::test]
async fn recommends_best_split_for_stored_profile() {
    let (service, profiles) = build_service();

    let allocation = service
        .recommend(request("user-1", "120.00", "groceries"))
        .await
        .expect("allocation");

    assert_eq!(allocation.charged_to(&InstrumentId::from("card-b")), dec("50"));
    assert_eq!(allocation.charged_to(&InstrumentId::from("card-a")), dec("70"));
    assert_eq!(allocation.net_benefit, dec("3.90"));
    assert_eq!(allocation.total_charged(), dec("120"));
    assert_eq!(profiles.calls(), 1);
}

#[tokio::test]
async fn category_is_normalized_before_lookup() {
    let profiles = Arc::new(MemoryProfiles::default());
    let mut dining = card("dining-card", "500", "0.01");
    dining
        .reward_schedule
        .insert(crate::allocation::MerchantCategory::new("dining"), dec("0.04"));
    profiles.insert("user-2", vec![dining, card("flat", "500", "0.02")]);
    let service = RecommendationService::without_offers(profiles, service_config());

    let allocation = service
        .recommend(request("user-2", "25", "  Dining "))
        .await
        .expect("allocation");

    assert_eq!(allocation.splits.len(), 1);
    assert_eq!(allocation.splits[0].instrument_id, InstrumentId::from("dining-card"));
    assert_eq!(allocation.net_benefit, dec("1.00"));
}

#[tokio::test]
async fn blank_user_is_rejected_without_touching_the_store() {
    let (service, profiles) = build_service();

    let error = service
        .recommend(request("   ", "10", "groceries"))
        .await
        .expect_err("blank user");

    assert!(matches!(error, RecommendationError::BlankUserId));
    assert_eq!(error.kind(), ErrorKind::InvalidRequest);
    assert_eq!(profiles.calls(), 0);
}

#[tokio::test]
async fn malformed_amounts_are_invalid_requests() {
    let (service, _) = build_service();

    for amount in ["0", "-5", "10.001"] {
        let error = service
            .recommend(request("user-1", amount, "groceries"))
            .await
            .expect_err("invalid amount");
        assert_eq!(error.kind(), ErrorKind::InvalidRequest, "amount {amount}");
    }

    let error = service
        .recommend(request("user-1", "10", " "))
        .await
        .expect_err("blank category");
    assert_eq!(error.kind(), ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let (service, _) = build_service();

    let error = service
        .recommend(request("ghost", "10", "groceries"))
        .await
        .expect_err("missing user");

    match error {
        RecommendationError::NotFound { user_id } => assert_eq!(user_id.0, "ghost"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_profile_has_no_eligible_instrument() {
    let (service, profiles) = build_service();
    profiles.insert("user-empty", Vec::new());

    let error = service
        .recommend(request("user-empty", "10", "groceries"))
        .await
        .expect_err("empty profile");

    assert_eq!(error.kind(), ErrorKind::NoEligibleInstrument);
}

#[tokio::test]
async fn shortfall_is_reported_when_capacity_runs_out() {
    let (service, _) = build_service();

    let error = service
        .recommend(request("user-1", "170", "groceries"))
        .await
        .expect_err("insufficient capacity");

    match error {
        RecommendationError::InsufficientCapacity {
            requested,
            available,
            shortfall,
        } => {
            assert_eq!(requested, dec("170"));
            assert_eq!(available, dec("150"));
            assert_eq!(shortfall, dec("20"));
        }
        other => panic!("expected insufficient capacity, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_stored_instrument_is_surfaced() {
    let (service, profiles) = build_service();
    profiles.insert(
        "user-broken",
        vec![InstrumentRecord {
            id: InstrumentId::from("overdrawn"),
            credit_limit: Some(dec("100")),
            current_balance: dec("150"),
            ..InstrumentRecord::default()
        }],
    );

    let error = service
        .recommend(request("user-broken", "10", "groceries"))
        .await
        .expect_err("invalid instrument");

    assert_eq!(error.kind(), ErrorKind::InvalidInstrument);
}

#[tokio::test]
async fn slow_profile_store_times_out() {
    let service = RecommendationService::without_offers(Arc::new(SlowProfiles), service_config());

    let error = service
        .recommend(request("user-1", "10", "groceries"))
        .await
        .expect_err("timeout");

    match error {
        RecommendationError::UpstreamTimeout {
            collaborator,
            timeout_ms,
        } => {
            assert_eq!(collaborator, Collaborator::ProfileStore);
            assert_eq!(timeout_ms, 50);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn unavailable_profile_store_is_reported() {
    let service =
        RecommendationService::without_offers(Arc::new(UnavailableProfiles), service_config());

    let error = service
        .recommend(request("user-1", "10", "groceries"))
        .await
        .expect_err("unavailable");

    assert_eq!(error.kind(), ErrorKind::UpstreamUnavailable);
    assert!(error.to_string().contains("database offline"));
}

#[tokio::test]
async fn catalog_rates_override_stored_schedule() {
    let profiles = Arc::new(MemoryProfiles::default());
    profiles.insert("user-1", wallet());
    let offers = FixedOffers {
        rates: BTreeMap::from([(InstrumentId::from("card-a"), dec("0.10"))]),
    };
    let service = RecommendationService::new(profiles, Some(Arc::new(offers)), service_config());

    let allocation = service
        .recommend(request("user-1", "120", "groceries"))
        .await
        .expect("allocation");

    assert_eq!(allocation.charged_to(&InstrumentId::from("card-a")), dec("100"));
    assert_eq!(allocation.charged_to(&InstrumentId::from("card-b")), dec("20"));
    assert_eq!(allocation.net_benefit, dec("11.00"));
    let decision = allocation
        .explanation
        .chosen
        .iter()
        .find(|decision| decision.instrument_id == InstrumentId::from("card-a"))
        .expect("card-a chosen");
    assert_eq!(decision.rank, 1);
    assert_eq!(decision.reward_rate, dec("0.10"));
}

#[tokio::test]
async fn failing_catalog_is_surfaced() {
    let profiles = Arc::new(MemoryProfiles::default());
    profiles.insert("user-1", wallet());
    let service =
        RecommendationService::new(profiles, Some(Arc::new(FailingOffers)), service_config());

    let error = service
        .recommend(request("user-1", "120", "groceries"))
        .await
        .expect_err("catalog failure");

    match error {
        RecommendationError::UpstreamUnavailable { collaborator, .. } => {
            assert_eq!(collaborator, Collaborator::OfferCatalog);
        }
        other => panic!("expected upstream unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_catalog_times_out_after_the_profile_is_loaded() {
    let profiles = Arc::new(MemoryProfiles::default());
    profiles.insert("user-1", wallet());
    let service =
        RecommendationService::new(profiles.clone(), Some(Arc::new(SlowOffers)), service_config());

    let error = service
        .recommend(request("user-1", "120", "groceries"))
        .await
        .expect_err("catalog timeout");

    assert_eq!(error.kind(), ErrorKind::UpstreamTimeout);
    match error {
        RecommendationError::UpstreamTimeout {
            collaborator,
            timeout_ms,
        } => {
            assert_eq!(collaborator, Collaborator::OfferCatalog);
            assert_eq!(timeout_ms, 50);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(profiles.calls(), 1);
}

#[tokio::test]
async fn ranking_uses_catalog_rates_for_the_requested_category() {
    let profiles = Arc::new(MemoryProfiles::default());
    profiles.insert("user-1", wallet());
    let offers = FixedOffers {
        rates: BTreeMap::from([(InstrumentId::from("card-a"), dec("0.10"))]),
    };
    let service = RecommendationService::new(profiles, Some(Arc::new(offers)), service_config());

    let ranking = service
        .rank_instruments(
            UserId::from("user-1"),
            RankingQuery {
                merchant_category: Some(" Groceries ".to_string()),
            },
        )
        .await
        .expect("ranking");

    let best = ranking.best().expect("ranked instrument");
    assert_eq!(best.instrument_id, InstrumentId::from("card-a"));
    assert_eq!(best.reward_rate, dec("0.10"));
    assert_eq!(best.capacity, Headroom::Limited(dec("100")));
}

#[tokio::test]
async fn blank_ranking_category_falls_back_to_default_rates() {
    let profiles = Arc::new(MemoryProfiles::default());
    profiles.insert("user-1", wallet());
    let service =
        RecommendationService::new(profiles, Some(Arc::new(FailingOffers)), service_config());

    let ranking = service
        .rank_instruments(
            UserId::from("user-1"),
            RankingQuery {
                merchant_category: Some("   ".to_string()),
            },
        )
        .await
        .expect("catalog is not consulted without a category");

    assert_eq!(ranking.merchant_category, None);
    assert_eq!(ranking.ranked[0].instrument_id, InstrumentId::from("card-b"));
}

#[tokio::test]
async fn ranking_rejects_blank_user_and_empty_profile() {
    let (service, profiles) = build_service();
    profiles.insert("empty", Vec::new());

    let error = service
        .rank_instruments(UserId::from(" "), RankingQuery::default())
        .await
        .expect_err("blank user");
    assert_eq!(error.kind(), ErrorKind::InvalidRequest);
    assert_eq!(profiles.calls(), 0);

    let error = service
        .rank_instruments(UserId::from("empty"), RankingQuery::default())
        .await
        .expect_err("empty profile");
    assert!(matches!(error, RecommendationError::EmptyProfile { .. }));
}
