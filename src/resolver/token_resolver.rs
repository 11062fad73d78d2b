//! Lazy `(logset name, log name) -> token` resolution.
//!
//! Lookup order:
//! - cached logset + resolved log: answered from memory, no network call
//! - cached log without token (known from a listing): token fetched once and attached
//! - unknown log: jittered race poll against the remote logset, then either adopt the
//!   concurrently created log or create it
//! - unknown logset: created remotely; a conflict means another writer won, so the cache is
//!   refreshed from the listing instead of creating again

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cache::logset::{Log, LogSet};
use crate::cache::logset_cache::LogSetCache;
use crate::config::types::RaceCheck;
use crate::error::{GatewayError, ResolveError};
use crate::management::gateway::ManagementApi;
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::jitter;

pub const DEFAULT_RESOLVE_ATTEMPTS: u32 = 3;
pub const DEFAULT_RACE_JITTER_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Listings performed after a create-logset conflict before giving up.
    pub resolve_attempts: u32,
    /// Upper bound of the random pause before a race poll.
    pub race_jitter: Duration,
    pub race_check: RaceCheck,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            resolve_attempts: DEFAULT_RESOLVE_ATTEMPTS,
            race_jitter: Duration::from_millis(DEFAULT_RACE_JITTER_MS),
            race_check: RaceCheck::default(),
        }
    }
}

pub struct TokenResolver<G: ManagementApi> {
    gateway: G,
    cache: LogSetCache,
    settings: ResolverSettings,
}

impl<G: ManagementApi> TokenResolver<G> {
    pub fn new(gateway: G, cache: LogSetCache, settings: ResolverSettings) -> Self {
        Self {
            gateway,
            cache,
            settings,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn cache(&self) -> &LogSetCache {
        &self.cache
    }

    pub async fn resolve(&self, logset_name: &str, log_name: &str) -> Result<String, ResolveError> {
        let metrics = get_metrics().await;
        let start = Instant::now();

        let result = async {
            let logset = self.resolve_logset(logset_name).await?;
            self.resolve_log(&logset, log_name).await
        }
        .await;

        metrics
            .resolution_duration
            .observe(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            warn!("failed to resolve token for '{}/{}': {}", logset_name, log_name, err);
            metrics.resolutions.with_label_values(&["failed"]).inc();
        }
        result
    }

    /// Fill the cache from the remote listing. Logs are registered without tokens.
    pub async fn warm_up(&self) -> Result<usize, ResolveError> {
        let (count, _) = self.refresh_from_listing(None).await?;
        info!("cache warmed up with {} logsets", count);
        Ok(count)
    }

    /// Merge the remote listing into the cache and return how many logsets were listed.
    ///
    /// With a `target`, only logsets that are already cached get refreshed and the target is
    /// stored last, so a listing larger than the cache can neither push the target out nor
    /// evict entries that carry tokens. The stored target is returned when it was listed.
    async fn refresh_from_listing(&self, target: Option<&str>) -> Result<(usize, Option<LogSet>), GatewayError> {
        let logsets = self.gateway.list_logsets().await?;
        let count = logsets.len();
        let mut listed_target = None;
        for summary in logsets {
            if target == Some(summary.name.as_str()) {
                listed_target = Some(summary.into_logset());
                continue;
            }
            let name = summary.name.clone();
            let remote = summary.into_logset();
            let merged = match self.cache.get(&name).await {
                Some(cached) => cached.merge_remote(remote),
                None if target.is_some() => continue,
                None => remote,
            };
            self.cache.put(&name, merged).await;
        }
        debug!("refreshed logsets from a listing of {}", count);

        let stored = match (target, listed_target) {
            (Some(name), Some(remote)) => {
                let merged = match self.cache.get(name).await {
                    Some(cached) => cached.merge_remote(remote),
                    None => remote,
                };
                self.cache.put(name, merged.clone()).await;
                Some(merged)
            }
            _ => None,
        };
        Ok((count, stored))
    }

    async fn resolve_logset(&self, name: &str) -> Result<LogSet, ResolveError> {
        if let Some(logset) = self.cache.get(name).await {
            return Ok(logset);
        }

        match self.gateway.create_logset(name).await {
            Ok(created) => {
                let mut logset = created.into_logset();
                logset.name = name.to_owned();
                self.cache.put(name, logset.clone()).await;
                info!("created logset '{}' ({})", name, logset.id);
                Ok(logset)
            }
            Err(err) if err.is_conflict() => {
                warn!("logset '{}' already exists remotely, refreshing from listing", name);
                let attempts = self.settings.resolve_attempts.max(1);
                for attempt in 1..=attempts {
                    if let (_, Some(logset)) = self.refresh_from_listing(Some(name)).await? {
                        return Ok(logset);
                    }
                    debug!("logset '{}' not listed yet ({}/{})", name, attempt, attempts);
                    if attempt < attempts {
                        sleep(jitter(self.settings.race_jitter)).await;
                    }
                }
                Err(ResolveError::LogSetUnavailable(name.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn resolve_log(&self, logset: &LogSet, log_name: &str) -> Result<String, ResolveError> {
        let metrics = get_metrics().await;

        if let Some(log) = logset.logs.get(log_name) {
            if let Some(token) = log.token() {
                metrics.resolutions.with_label_values(&["cached"]).inc();
                return Ok(token.to_owned());
            }
            let token = self.attach_token(logset, log_name, &log.id).await?;
            metrics.resolutions.with_label_values(&["attached"]).inc();
            return Ok(token);
        }

        sleep(jitter(self.settings.race_jitter)).await;
        let remote = self.remote_view(logset).await?;
        if remote.logs.contains_key(log_name) {
            info!("log '{}' in '{}' was created concurrently", log_name, logset.name);
            let refreshed = self.store_remote_view(logset, remote).await;
            let token = self.token_from(&refreshed, log_name).await?;
            metrics.resolutions.with_label_values(&["raced"]).inc();
            return Ok(token);
        }

        let token = self.create_log(logset, log_name).await?;
        metrics.resolutions.with_label_values(&["created"]).inc();
        Ok(token)
    }

    async fn create_log(&self, logset: &LogSet, log_name: &str) -> Result<String, ResolveError> {
        match self.gateway.create_log(&logset.id, log_name).await {
            Ok(created) => {
                let log = created.into_log();
                let token = log
                    .token()
                    .map(str::to_owned)
                    .ok_or_else(|| ResolveError::MissingToken { log_id: log.id.clone() })?;
                info!("created log '{}' in '{}' ({})", log_name, logset.name, log.id);
                self.store_log(logset, log_name, log).await;
                Ok(token)
            }
            Err(err) if err.is_conflict() => {
                warn!("log '{}' in '{}' was created between poll and create", log_name, logset.name);
                let remote = self.remote_view(logset).await?;
                let refreshed = self.store_remote_view(logset, remote).await;
                self.token_from(&refreshed, log_name).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remote state of one logset, read the way the deployment is configured to poll.
    async fn remote_view(&self, logset: &LogSet) -> Result<LogSet, GatewayError> {
        match self.settings.race_check {
            RaceCheck::Logset => Ok(self.gateway.get_logset(&logset.id).await?.into_logset()),
            RaceCheck::LogListing => {
                let logs = self
                    .gateway
                    .list_logs()
                    .await?
                    .into_iter()
                    .filter(|log| log.belongs_to(&logset.id))
                    .map(|log| (log.name.clone(), log.into_log()))
                    .collect();
                Ok(LogSet::with_logs(logset.id.clone(), logset.name.clone(), logs))
            }
        }
    }

    async fn token_from(&self, logset: &LogSet, log_name: &str) -> Result<String, ResolveError> {
        match logset.logs.get(log_name) {
            Some(log) => match log.token() {
                Some(token) => Ok(token.to_owned()),
                None => self.attach_token(logset, log_name, &log.id).await,
            },
            None => Err(ResolveError::LogUnavailable {
                logset: logset.name.clone(),
                log: log_name.to_owned(),
            }),
        }
    }

    async fn attach_token(&self, logset: &LogSet, log_name: &str, log_id: &str) -> Result<String, ResolveError> {
        debug!("fetching token for log '{}' ({})", log_name, log_id);
        let log = self.gateway.get_log(log_id).await?.into_log();
        let token = log
            .token()
            .map(str::to_owned)
            .ok_or_else(|| ResolveError::MissingToken { log_id: log_id.to_owned() })?;
        self.store_log(logset, log_name, log).await;
        Ok(token)
    }

    async fn store_log(&self, logset: &LogSet, log_name: &str, log: Log) {
        let stored = self
            .cache
            .update(&logset.name, |cached| {
                cached.logs.insert(log_name.to_owned(), log.clone());
            })
            .await;
        if stored.is_none() {
            let mut logset = logset.clone();
            logset.logs.insert(log_name.to_owned(), log);
            self.cache.put(&logset.name.clone(), logset).await;
        }
    }

    async fn store_remote_view(&self, logset: &LogSet, remote: LogSet) -> LogSet {
        let current = self
            .cache
            .get(&logset.name)
            .await
            .unwrap_or_else(|| logset.clone());
        let merged = current.merge_remote(remote);
        self.cache.put(&logset.name, merged.clone()).await;
        merged
    }
}
