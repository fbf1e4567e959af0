//! Recommendation service: fetches a user's instruments, optionally refreshes category reward
//! rates from an offer catalog, and asks the allocation engine for the best split.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{Collaborator, ErrorKind, RankingQuery, RecommendationRequest, UserId};
pub use repository::{
    NoOfferCatalog, OfferCatalog, OfferCatalogError, ProfileStore, ProfileStoreError,
};
pub use router::recommendation_router;
pub use service::{
    RecommendationConfig, RecommendationError, RecommendationService, DEFAULT_UPSTREAM_TIMEOUT,
};
