use effipay::config::UpstreamConfig;
use effipay::error::AppError;
use effipay::profiles::{InMemoryProfileStore, StaticOfferCatalog};
use effipay::recommendation::{RecommendationConfig, RecommendationService};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiService = RecommendationService<InMemoryProfileStore, StaticOfferCatalog>;

/// Hydrate the fixture-backed collaborators and wire them into the service.
pub(crate) fn build_service(
    upstream: &UpstreamConfig,
    config: RecommendationConfig,
) -> Result<ApiService, AppError> {
    let profiles = match upstream.profile_store_path.as_deref() {
        Some(path) => load_profiles(path)?,
        None => {
            warn!("PROFILE_STORE_PATH not set; every user will be reported as not found");
            InMemoryProfileStore::default()
        }
    };

    let offers = upstream
        .offer_catalog_path
        .as_deref()
        .map(load_offers)
        .transpose()?
        .map(Arc::new);

    Ok(RecommendationService::new(
        Arc::new(profiles),
        offers,
        config,
    ))
}

pub(crate) fn load_profiles(path: &Path) -> Result<InMemoryProfileStore, AppError> {
    let store = InMemoryProfileStore::from_path(path)?;
    info!(path = %path.display(), users = store.user_count(), "profile store loaded");
    Ok(store)
}

pub(crate) fn load_offers(path: &Path) -> Result<StaticOfferCatalog, AppError> {
    let catalog = StaticOfferCatalog::from_path(path)?;
    info!(path = %path.display(), "offer catalog loaded");
    Ok(catalog)
}

pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim())
        .map_err(|err| format!("failed to parse '{raw}' as a decimal amount ({err})"))
}
