use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::allocation::{InstrumentId, InstrumentRecord, MerchantCategory, OptimizerConfig};
use crate::recommendation::repository::{
    OfferCatalog, OfferCatalogError, ProfileStore, ProfileStoreError,
};
use crate::recommendation::{
    recommendation_router, RecommendationConfig, RecommendationRequest, RecommendationService,
    UserId,
};

pub(super) fn dec(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("valid decimal")
}

pub(super) fn card(id: &str, headroom: &str, rate: &str) -> InstrumentRecord {
    InstrumentRecord {
        id: InstrumentId::from(id),
        credit_limit: Some(dec(headroom)),
        default_rate: dec(rate),
        ..InstrumentRecord::default()
    }
}

/// Two-card wallet from the canonical split example: A(100 @ 2%), B(50 @ 5%).
pub(super) fn wallet() -> Vec<InstrumentRecord> {
    vec![card("card-a", "100", "0.02"), card("card-b", "50", "0.05")]
}

pub(super) fn request(user: &str, amount: &str, category: &str) -> RecommendationRequest {
    RecommendationRequest {
        user_id: UserId::from(user),
        amount: dec(amount),
        merchant_category: category.to_string(),
    }
}

pub(super) fn service_config() -> RecommendationConfig {
    RecommendationConfig {
        upstream_timeout: Duration::from_millis(50),
        optimizer: OptimizerConfig::default(),
    }
}

pub(super) fn build_service() -> (RecommendationService<MemoryProfiles>, Arc<MemoryProfiles>) {
    let profiles = Arc::new(MemoryProfiles::default());
    profiles.insert("user-1", wallet());
    let service = RecommendationService::without_offers(profiles.clone(), service_config());
    (service, profiles)
}

#[derive(Default, Clone)]
pub(super) struct MemoryProfiles {
    records: Arc<Mutex<HashMap<UserId, Vec<InstrumentRecord>>>>,
    calls: Arc<Mutex<usize>>,
}

impl MemoryProfiles {
    pub(super) fn insert(&self, user: &str, records: Vec<InstrumentRecord>) {
        self.records
            .lock()
            .expect("profile mutex poisoned")
            .insert(UserId::from(user), records);
    }

    pub(super) fn calls(&self) -> usize {
        *self.calls.lock().expect("call counter poisoned")
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn get_instruments(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<InstrumentRecord>, ProfileStoreError> {
        *self.calls.lock().expect("call counter poisoned") += 1;
        let records = self
            .records
            .lock()
            .expect("profile mutex poisoned")
            .get(user_id)
            .cloned();
        records.ok_or(ProfileStoreError::NotFound)
    }
}

pub(super) struct SlowProfiles;

#[async_trait]
impl ProfileStore for SlowProfiles {
    async fn get_instruments(
        &self,
        _user_id: &UserId,
    ) -> Result<Vec<InstrumentRecord>, ProfileStoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(wallet())
    }
}

pub(super) struct UnavailableProfiles;

#[async_trait]
impl ProfileStore for UnavailableProfiles {
    async fn get_instruments(
        &self,
        _user_id: &UserId,
    ) -> Result<Vec<InstrumentRecord>, ProfileStoreError> {
        Err(ProfileStoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) struct FixedOffers {
    pub(super) rates: BTreeMap<InstrumentId, Decimal>,
}

#[async_trait]
impl OfferCatalog for FixedOffers {
    async fn get_current_rates(
        &self,
        _category: &MerchantCategory,
    ) -> Result<BTreeMap<InstrumentId, Decimal>, OfferCatalogError> {
        Ok(self.rates.clone())
    }
}

pub(super) struct SlowOffers;

#[async_trait]
impl OfferCatalog for SlowOffers {
    async fn get_current_rates(
        &self,
        _category: &MerchantCategory,
    ) -> Result<BTreeMap<InstrumentId, Decimal>, OfferCatalogError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(BTreeMap::new())
    }
}

pub(super) struct FailingOffers;

#[async_trait]
impl OfferCatalog for FailingOffers {
    async fn get_current_rates(
        &self,
        _category: &MerchantCategory,
    ) -> Result<BTreeMap<InstrumentId, Decimal>, OfferCatalogError> {
        Err(OfferCatalogError::Unavailable("search quota exhausted".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn router_with_service(service: RecommendationService<MemoryProfiles>) -> axum::Router {
    recommendation_router(Arc::new(service))
}
