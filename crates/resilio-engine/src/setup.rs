use crate::fallback::FallbackAdapter;
use crate::pack::{PackLoadError, PackLoader};
use crate::resolution::{Prober, ResolutionEngine};
use crate::store::SelectorStore;
use resilio_common::config::schema::ResilioConfig;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Failed to load selector packs: {0}")]
    Packs(#[from] PackLoadError),
}

/// Wire a resolution engine from configuration: open the store, install the
/// selector packs as builtins, and build the prober and fallback tier.
pub async fn build_engine(config: &ResilioConfig) -> Result<ResolutionEngine, SetupError> {
    let store = SelectorStore::from_config(&config.store).await;

    let packs = PackLoader::load_all(&config.packs.paths).await?;
    let actions = PackLoader::install(&packs, &store);

    let fallback = FallbackAdapter::from_config(&config.fallback);
    info!(
        packs = packs.len(),
        actions,
        fallback = fallback.is_enabled(),
        "resolution engine ready"
    );

    Ok(
        ResolutionEngine::new(store, Prober::from_config(&config.resilience), fallback)
            .with_max_candidates(config.resilience.max_candidates),
    )
}
