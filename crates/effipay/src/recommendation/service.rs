use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::domain::{Collaborator, ErrorKind, RankingQuery, RecommendationRequest, UserId};
use super::repository::{
    NoOfferCatalog, OfferCatalog, OfferCatalogError, ProfileStore, ProfileStoreError,
};
use crate::allocation::{
    Allocation, AllocationError, AllocationOptimizer, ConstraintViolation, Instrument,
    InstrumentRanking, InstrumentRecord, InvalidInstrumentError, MerchantCategory,
    OptimizerConfig, TransactionContext, TransactionError,
};

pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Explicit settings handed to the service at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationConfig {
    pub upstream_timeout: Duration,
    pub optimizer: OptimizerConfig,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            optimizer: OptimizerConfig::default(),
        }
    }
}

/// Service composing the profile store, optional offer catalog, and allocation engine.
pub struct RecommendationService<P, C = NoOfferCatalog> {
    profiles: Arc<P>,
    offers: Option<Arc<C>>,
    optimizer: AllocationOptimizer,
    upstream_timeout: Duration,
}

impl<P> RecommendationService<P, NoOfferCatalog>
where
    P: ProfileStore + 'static,
{
    pub fn without_offers(profiles: Arc<P>, config: RecommendationConfig) -> Self {
        Self::new(profiles, None, config)
    }
}

impl<P, C> RecommendationService<P, C>
where
    P: ProfileStore + 'static,
    C: OfferCatalog + 'static,
{
    pub fn new(profiles: Arc<P>, offers: Option<Arc<C>>, config: RecommendationConfig) -> Self {
        Self {
            profiles,
            offers,
            optimizer: AllocationOptimizer::new(config.optimizer),
            upstream_timeout: config.upstream_timeout,
        }
    }

    /// Fetch the user's instruments and compute the best split for the transaction.
    pub async fn recommend(
        &self,
        request: RecommendationRequest,
    ) -> Result<Allocation, RecommendationError> {
        let RecommendationRequest {
            user_id,
            amount,
            merchant_category,
        } = request;

        if user_id.0.trim().is_empty() {
            return Err(RecommendationError::BlankUserId);
        }
        let transaction = TransactionContext::new(amount, merchant_category.as_str())?;
        let category = transaction.merchant_category();

        let mut records = self.fetch_profile(&user_id).await?;
        if records.is_empty() {
            return Err(RecommendationError::EmptyProfile { user_id });
        }

        self.refresh_rates(category, &mut records).await?;

        let instruments = records
            .into_iter()
            .map(Instrument::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let allocation = self.optimizer.optimize(&instruments, &transaction)?;

        info!(
            user_id = %user_id,
            category = %category,
            amount = %transaction.amount(),
            splits = allocation.splits.len(),
            net_benefit = %allocation.net_benefit,
            "allocation recommended"
        );

        Ok(allocation)
    }

    /// Rank the user's instruments without a pending transaction. A blank or
    /// missing category ranks on default rates and skips the offer catalog.
    pub async fn rank_instruments(
        &self,
        user_id: UserId,
        query: RankingQuery,
    ) -> Result<InstrumentRanking, RecommendationError> {
        if user_id.0.trim().is_empty() {
            return Err(RecommendationError::BlankUserId);
        }
        let category = query
            .merchant_category
            .as_deref()
            .map(MerchantCategory::new)
            .filter(|category| !category.is_blank());

        let mut records = self.fetch_profile(&user_id).await?;
        if records.is_empty() {
            return Err(RecommendationError::EmptyProfile { user_id });
        }

        if let Some(category) = &category {
            self.refresh_rates(category, &mut records).await?;
        }

        let instruments = records
            .into_iter()
            .map(Instrument::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let ranking = self.optimizer.rank(&instruments, category.as_ref())?;

        info!(
            user_id = %user_id,
            category = category.as_ref().map_or("default", MerchantCategory::as_str),
            ranked = ranking.ranked.len(),
            best = ranking.best().map_or("none", |best| best.instrument_id.0.as_str()),
            "instruments ranked"
        );

        Ok(ranking)
    }

    async fn fetch_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<InstrumentRecord>, RecommendationError> {
        let outcome = self
            .with_timeout(
                Collaborator::ProfileStore,
                self.profiles.get_instruments(user_id),
            )
            .await?;

        match outcome {
            Ok(records) => Ok(records),
            Err(ProfileStoreError::NotFound) => Err(RecommendationError::NotFound {
                user_id: user_id.clone(),
            }),
            Err(ProfileStoreError::Unavailable(detail)) => {
                warn!(collaborator = %Collaborator::ProfileStore, %detail, "upstream unavailable");
                Err(RecommendationError::UpstreamUnavailable {
                    collaborator: Collaborator::ProfileStore,
                    detail,
                })
            }
        }
    }

    /// Overlay current catalog rates onto the stored schedules for this category.
    async fn refresh_rates(
        &self,
        category: &MerchantCategory,
        records: &mut [InstrumentRecord],
    ) -> Result<(), RecommendationError> {
        let Some(offers) = &self.offers else {
            return Ok(());
        };

        let outcome = self
            .with_timeout(
                Collaborator::OfferCatalog,
                offers.get_current_rates(category),
            )
            .await?;

        let rates = match outcome {
            Ok(rates) => rates,
            Err(OfferCatalogError::Unavailable(detail)) => {
                warn!(collaborator = %Collaborator::OfferCatalog, %detail, "upstream unavailable");
                return Err(RecommendationError::UpstreamUnavailable {
                    collaborator: Collaborator::OfferCatalog,
                    detail,
                });
            }
        };

        for record in records.iter_mut() {
            if let Some(rate) = rates.get(&record.id) {
                record.reward_schedule.insert(category.clone(), *rate);
            }
        }

        Ok(())
    }

    async fn with_timeout<F, T>(
        &self,
        collaborator: Collaborator,
        call: F,
    ) -> Result<T, RecommendationError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.upstream_timeout, call)
            .await
            .map_err(|_| {
                let timeout_ms = u64::try_from(self.upstream_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(%collaborator, timeout_ms, "upstream call timed out");
                RecommendationError::UpstreamTimeout {
                    collaborator,
                    timeout_ms,
                }
            })
    }
}

/// Error raised by the recommendation service.
#[derive(Debug, thiserror::Error)]
pub enum RecommendationError {
    #[error("user id must not be blank")]
    BlankUserId,
    #[error(transparent)]
    InvalidTransaction(#[from] TransactionError),
    #[error(transparent)]
    InvalidInstrument(#[from] InvalidInstrumentError),
    #[error("user {user_id} has no payment instruments on file")]
    EmptyProfile { user_id: UserId },
    #[error("no instrument is eligible for merchant category '{category}'")]
    NoEligibleInstrument { category: MerchantCategory },
    #[error("usable capacity {available} cannot cover {requested} (shortfall {shortfall})")]
    InsufficientCapacity {
        requested: Decimal,
        available: Decimal,
        shortfall: Decimal,
    },
    #[error("internal allocation error: {0}")]
    ConstraintViolation(ConstraintViolation),
    #[error("{collaborator} did not respond within {timeout_ms} ms")]
    UpstreamTimeout {
        collaborator: Collaborator,
        timeout_ms: u64,
    },
    #[error("{collaborator} unavailable: {detail}")]
    UpstreamUnavailable {
        collaborator: Collaborator,
        detail: String,
    },
    #[error("user {user_id} not found")]
    NotFound { user_id: UserId },
}

impl RecommendationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecommendationError::BlankUserId | RecommendationError::InvalidTransaction(_) => {
                ErrorKind::InvalidRequest
            }
            RecommendationError::InvalidInstrument(_) => ErrorKind::InvalidInstrument,
            RecommendationError::EmptyProfile { .. }
            | RecommendationError::NoEligibleInstrument { .. } => ErrorKind::NoEligibleInstrument,
            RecommendationError::InsufficientCapacity { .. } => ErrorKind::InsufficientCapacity,
            RecommendationError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            RecommendationError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            RecommendationError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            RecommendationError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

impl From<AllocationError> for RecommendationError {
    fn from(value: AllocationError) -> Self {
        match value {
            AllocationError::InvalidInstrument(err) => Self::InvalidInstrument(err),
            AllocationError::InvalidTransaction(err) => Self::InvalidTransaction(err),
            AllocationError::NoEligibleInstrument { category } => {
                Self::NoEligibleInstrument { category }
            }
            AllocationError::InsufficientCapacity {
                requested,
                available,
                shortfall,
            } => Self::InsufficientCapacity {
                requested,
                available,
                shortfall,
            },
            AllocationError::ConstraintViolation(violation) => Self::ConstraintViolation(violation),
        }
    }
}
