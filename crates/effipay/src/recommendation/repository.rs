use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::domain::UserId;
use crate::allocation::{InstrumentId, InstrumentRecord, MerchantCategory};

/// Read-only source of a user's stored payment instruments.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_instruments(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<InstrumentRecord>, ProfileStoreError>;
}

/// Error enumeration for profile lookups.
#[derive(Debug, thiserror::Error)]
pub enum ProfileStoreError {
    #[error("user not found")]
    NotFound,
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// Optional enrichment source for current category reward rates.
#[async_trait]
pub trait OfferCatalog: Send + Sync {
    async fn get_current_rates(
        &self,
        category: &MerchantCategory,
    ) -> Result<BTreeMap<InstrumentId, Decimal>, OfferCatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OfferCatalogError {
    #[error("offer catalog unavailable: {0}")]
    Unavailable(String),
}

/// Placeholder catalog type for services built without offer enrichment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOfferCatalog;

#[async_trait]
impl OfferCatalog for NoOfferCatalog {
    async fn get_current_rates(
        &self,
        _category: &MerchantCategory,
    ) -> Result<BTreeMap<InstrumentId, Decimal>, OfferCatalogError> {
        Ok(BTreeMap::new())
    }
}
