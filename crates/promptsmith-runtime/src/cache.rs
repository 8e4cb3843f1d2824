//! Judge verdict cache.
//!
//! Re-evaluating an unchanged prompt against the same scenario input with
//! the same judge yields a cached verdict instead of a new call. Only parsed
//! verdicts are cached; parse fallbacks and errors are not.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Cache key for one judge call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    provider: String,
    model: String,
    prompt_hash: u64,
    input_hash: u64,
}

impl CacheKey {
    pub fn new(provider: &str, model: &str, prompt: &str, input: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            prompt_hash: hash_text(prompt),
            input_hash: hash_text(input),
        }
    }
}

/// A parsed judge verdict.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedVerdict {
    pub response: String,
    pub score: f64,
    pub reasoning: String,
}

/// Judge cache using moka.
pub struct JudgeCache {
    cache: Cache<CacheKey, CachedVerdict>,
}

impl JudgeCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CachedVerdict> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, verdict: CachedVerdict) {
        self.cache.insert(key, verdict).await;
    }

}

impl Default for JudgeCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = JudgeCache::default();
        let key = CacheKey::new("offline", "offline", "You are a tutor.", "Explain fractions");

        assert!(cache.get(&key).await.is_none());

        let verdict = CachedVerdict {
            response: "Fractions are parts of a whole.".to_string(),
            score: 8.0,
            reasoning: "On topic".to_string(),
        };
        cache.insert(key.clone(), verdict.clone()).await;

        assert_eq!(cache.get(&key).await, Some(verdict));
    }

    #[tokio::test]
    async fn test_key_depends_on_prompt_and_provider() {
        let cache = JudgeCache::default();
        let key = CacheKey::new("offline", "offline", "prompt v1", "hi");
        cache
            .insert(
                key,
                CachedVerdict {
                    response: String::new(),
                    score: 7.0,
                    reasoning: String::new(),
                },
            )
            .await;

        let changed_prompt = CacheKey::new("offline", "offline", "prompt v2", "hi");
        let other_judge = CacheKey::new("anthropic", "offline", "prompt v1", "hi");
        assert!(cache.get(&changed_prompt).await.is_none());
        assert!(cache.get(&other_judge).await.is_none());
    }
}
