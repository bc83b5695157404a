use anyhow::{Context, bail};
use resilio_engine::Origin;
use resilio_engine::actions::{ResilientPage, RetryPolicy};
use resilio_engine::config::ConfigLoader;
use resilio_engine::diagnostics::FailureReport;
use resilio_engine::pack::PackLoader;
use resilio_engine::schema::ResilioConfig;
use resilio_engine::setup::build_engine;
use resilio_engine::store::SelectorStore;
use resilio_h::HeadlessPage;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub async fn load_config(path: Option<&Path>) -> anyhow::Result<ResilioConfig> {
    match path {
        Some(path) => {
            let mut config = ConfigLoader::load_from(path)
                .await
                .with_context(|| format!("loading {}", path.display()))?;
            ConfigLoader::apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
            Ok(config)
        }
        None => Ok(ConfigLoader::load_default().await?),
    }
}

/// The store with pack builtins registered, so listings show them too.
async fn open_store(config: &ResilioConfig) -> anyhow::Result<SelectorStore> {
    let store = SelectorStore::from_config(&config.store).await;
    let packs = PackLoader::load_all(&config.packs.paths).await?;
    PackLoader::install(&packs, &store);
    Ok(store)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn cache_stats(config: &ResilioConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    print_json(&json!({
        "path": config.store.path,
        "stats": store.stats(),
    }))
}

pub async fn cache_show(config: &ResilioConfig, key: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let entries = match key {
        Some(key) => store.candidates(key),
        None => store.entries(None),
    };
    print_json(&entries)
}

pub async fn cache_prune(config: &ResilioConfig, max_age_days: Option<u64>) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let days = max_age_days.unwrap_or(config.store.prune_max_age_days);
    let removed = store
        .prune(Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)))
        .await
        .context("pruning selector cache")?;
    print_json(&json!({ "removed": removed, "remaining": store.len() }))
}

pub async fn cache_add(config: &ResilioConfig, key: &str, selector: &str) -> anyhow::Result<()> {
    if selector.trim().is_empty() {
        bail!("selector must not be empty");
    }
    let store = open_store(config).await?;
    store
        .upsert(key, selector, Origin::Learned)
        .await
        .context("writing selector cache")?;
    print_json(&store.get(key, selector))
}

pub async fn probe(
    config: &ResilioConfig,
    target: &str,
    action_key: &str,
    visible: bool,
) -> anyhow::Result<()> {
    url::Url::parse(target).with_context(|| format!("invalid URL: {target}"))?;

    let engine = Arc::new(build_engine(config).await?);
    let mut page = HeadlessPage::new(visible);
    page.launch().await.context("launching browser")?;
    let landed = page.navigate(target).await;

    let mut resilient = ResilientPage::new(page, Arc::clone(&engine))
        .with_retry_policy(RetryPolicy::from_config(&config.resilience));

    let outcome = match landed {
        Err(e) => Err(anyhow::Error::new(e).context("navigating")),
        Ok(url) => {
            info!(%url, action_key, "probing");
            match resilient.locate(action_key).await {
                Ok(resolution) => print_json(&resolution),
                Err(err) => {
                    let report = FailureReport::capture(resilient.page_mut(), &err).await;
                    print_json(&report)?;
                    Err(anyhow::Error::new(err))
                }
            }
        }
    };

    let closed = resilient
        .into_inner()
        .close()
        .await
        .context("closing browser");
    let flushed = engine
        .store()
        .flush()
        .await
        .context("flushing selector cache");
    settle(outcome, [flushed, closed])
}

/// The probe's own error wins; cleanup failures after it are only logged.
fn settle(
    outcome: anyhow::Result<()>,
    cleanup: impl IntoIterator<Item = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    let mut result = outcome;
    for step in cleanup {
        if let Err(e) = step {
            if result.is_ok() {
                result = Err(e);
            } else {
                warn!("cleanup failed: {e:#}");
            }
        }
    }
    result
}
