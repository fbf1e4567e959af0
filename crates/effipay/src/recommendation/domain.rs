use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for a user whose profile holds payment instruments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Inbound request for a split recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: UserId,
    #[serde(alias = "trans_amt")]
    pub amount: Decimal,
    #[serde(alias = "trans_type")]
    pub merchant_category: String,
}

/// Query for a ranking made without a pending transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingQuery {
    #[serde(default, alias = "trans_type")]
    pub merchant_category: Option<String>,
}

/// External systems the service depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    ProfileStore,
    OfferCatalog,
}

impl Collaborator {
    pub const fn label(self) -> &'static str {
        match self {
            Collaborator::ProfileStore => "profile store",
            Collaborator::OfferCatalog => "offer catalog",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stable error codes exposed to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    InvalidInstrument,
    NoEligibleInstrument,
    InsufficientCapacity,
    ConstraintViolation,
    UpstreamTimeout,
    UpstreamUnavailable,
    NotFound,
}

impl ErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidInstrument => "invalid_instrument",
            ErrorKind::NoEligibleInstrument => "no_eligible_instrument",
            ErrorKind::InsufficientCapacity => "insufficient_capacity",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::NotFound => "not_found",
        }
    }
}
