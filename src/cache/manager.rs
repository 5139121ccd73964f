//! Named cache regions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{Cache, CacheOptions, CacheStatsSnapshot};
use crate::clock::SharedClock;
use crate::config::CacheConfig;

/// Well-known region names
pub mod regions {
    /// Application resources
    pub const APPLICATIONS: &str = "applications";
    /// API keys (looked up on every Basic / bearer authentication)
    pub const API_KEYS: &str = "apiKeys";
    /// Accounts
    pub const ACCOUNTS: &str = "accounts";
    /// Directories
    pub const DIRECTORIES: &str = "directories";
    /// Access token resources
    pub const ACCESS_TOKENS: &str = "accessTokens";
    /// Tenants
    pub const TENANTS: &str = "tenants";
    /// Consumed ID-Site / SAML callback nonces
    pub const ID_SITE_NONCES: &str = "idSiteNonces";

    /// Regions created by [`CacheManager::with_defaults`](super::CacheManager::with_defaults)
    pub const ALL: [&str; 7] = [
        APPLICATIONS,
        API_KEYS,
        ACCOUNTS,
        DIRECTORIES,
        ACCESS_TOKENS,
        TENANTS,
        ID_SITE_NONCES,
    ];
}

/// Owns one [`Cache`] per region name.
///
/// Regions are created up front; [`CacheManager::get`] never creates one on
/// demand.
#[derive(Debug)]
pub struct CacheManager {
    regions: RwLock<HashMap<String, Arc<Cache>>>,
    clock: SharedClock,
}

impl CacheManager {
    /// Manager without any regions
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            regions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Manager with every region in [`regions::ALL`], sized from `config`
    #[must_use]
    pub fn with_defaults(config: &CacheConfig, clock: SharedClock) -> Self {
        let manager = Self::new(clock);
        for region in regions::ALL {
            let (ttl, tti) = config.expiry_for(region);
            manager.create(region, CacheOptions::new(ttl, tti));
        }
        manager
    }

    /// Create (or replace) the cache for `region`
    pub fn create(&self, region: &str, options: CacheOptions) -> Arc<Cache> {
        debug!(region, ttl = options.ttl, tti = options.tti, "Creating cache region");
        let cache = Arc::new(Cache::new(region, options, self.clock.clone()));
        self.regions
            .write()
            .insert(region.to_string(), Arc::clone(&cache));
        cache
    }

    /// Cache for `region`, if it was created
    #[must_use]
    pub fn get(&self, region: &str) -> Option<Arc<Cache>> {
        self.regions.read().get(region).cloned()
    }

    /// Names of all created regions, sorted
    #[must_use]
    pub fn regions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.regions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Statistics per region
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, CacheStatsSnapshot> {
        self.regions
            .read()
            .iter()
            .map(|(name, cache)| (name.clone(), cache.stats()))
            .collect()
    }
}
