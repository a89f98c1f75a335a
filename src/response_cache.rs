//! In-memory response cache keyed by request fingerprint.
//!
//! Entries expire after a TTL and the least-recently-accessed entry is
//! evicted when the cache grows past `max_size`. Only methods configured as
//! safe (default: GET) are consulted. The cache is internally synchronized;
//! reads never hold the lock longer than a single lookup, writes than a
//! single insert/evict step.

use crate::model::{Headers, Method, Response};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Configuration for response caching
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for cached responses
    pub ttl: Duration,
    /// Maximum number of cached responses
    pub max_size: usize,
    /// Whether caching is enabled globally
    pub enabled: bool,
    /// Methods whose responses may be served from cache
    pub cacheable_methods: Vec<Method>,
    /// Request headers that participate in the fingerprint
    pub significant_headers: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(crate::constants::DEFAULT_CACHE_TTL_SECS),
            max_size: crate::constants::DEFAULT_CACHE_MAX_SIZE,
            enabled: true,
            cacheable_methods: vec![Method::Get],
            significant_headers: Vec::new(),
        }
    }
}

/// Cache key derived from request attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hashes method, canonicalized URL, body digest, and the configured
    /// subset of headers (sorted for stability).
    #[must_use]
    pub fn from_request(
        method: Method,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
        significant_headers: &[String],
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(canonicalize_url(url).as_bytes());

        let mut selected: Vec<(String, &str)> = significant_headers
            .iter()
            .filter_map(|name| headers.get(name).map(|v| (name.to_lowercase(), v)))
            .collect();
        selected.sort();
        for (name, value) in selected {
            hasher.update(name.as_bytes());
            hasher.update(value.as_bytes());
        }

        if let Some(body) = body {
            hasher.update(Sha256::digest(body.as_bytes()));
        }

        Self(format!("{:x}", hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Strips the fragment and a trailing path slash so equivalent URLs share a
/// fingerprint.
fn canonicalize_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url).trim();
    if without_fragment.contains('?') {
        return without_fragment.to_string();
    }
    without_fragment.trim_end_matches('/').to_string()
}

#[derive(Debug)]
struct CacheEntry {
    response: Response,
    inserted_at: Instant,
    last_access: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    /// `hits / (hits + misses)`, or 0 when nothing was looked up.
    pub hit_rate: f64,
}

/// Response cache manager
#[derive(Debug)]
pub struct ResponseCache {
    config: CacheConfig,
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    counters: Mutex<Counters>,
}

impl ResponseCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Whether responses for this method may be cached at all.
    #[must_use]
    pub fn is_cacheable(&self, method: Method) -> bool {
        self.config.enabled && self.config.cacheable_methods.contains(&method)
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cached response when present and within TTL, touching its
    /// last-access time. Expired entries are dropped on the spot.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Response> {
        if !self.config.enabled {
            return None;
        }
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = Instant::now();

        let hit = match entries.get_mut(fingerprint) {
            Some(entry) if now.duration_since(entry.inserted_at) <= self.config.ttl => {
                entry.last_access = now;
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(fingerprint);
                None
            }
            None => None,
        };
        drop(entries);

        let mut counters = self.counters.lock().expect("cache lock poisoned");
        if hit.is_some() {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
        hit
    }

    /// Inserts a response, evicting the least-recently-accessed entry when
    /// the cache would exceed `max_size`.
    pub fn set(&self, fingerprint: Fingerprint, response: Response) {
        if !self.config.enabled || self.config.max_size == 0 {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        if !entries.contains_key(&fingerprint) && entries.len() >= self.config.max_size {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            fingerprint,
            CacheEntry {
                response,
                inserted_at: now,
                last_access: now,
            },
        );
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let counters = self.counters.lock().expect("cache lock poisoned");
        let size = self.entries.lock().expect("cache lock poisoned").len();
        let total = counters.hits + counters.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            counters.hits as f64 / total as f64
        };
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            size,
            hit_rate,
        }
    }

    /// Resets hit/miss counters without touching entries.
    pub fn clear_stats(&self) {
        let mut counters = self.counters.lock().expect("cache lock poisoned");
        *counters = Counters::default();
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }
}
