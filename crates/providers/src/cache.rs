//! Semantic response cache
//!
//! Caches finished replies keyed by utterance embedding. A lookup scans live
//! entries for the best cosine match above a similarity threshold; entries
//! expire after a TTL. Any cache failure degrades to normal generation.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Cache statistics
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct CacheEntry {
    embedding: Vec<f32>,
    response: String,
    stored_at: Instant,
}

/// Similarity-keyed response cache with TTL expiry.
pub struct SemanticCache {
    entries: Mutex<Vec<CacheEntry>>,
    stats: Mutex<CacheStats>,
    ttl: Duration,
    threshold: f32,
}

impl SemanticCache {
    pub fn new(ttl: Duration, threshold: f32) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            stats: Mutex::new(CacheStats::default()),
            ttl,
            threshold,
        }
    }

    /// Best cached response whose similarity clears the threshold.
    pub fn lookup(&self, embedding: &[f32]) -> Option<String> {
        let now = Instant::now();
        let entries = self.entries.lock();

        let mut best: Option<(f32, &CacheEntry)> = None;
        for entry in entries.iter() {
            if now.duration_since(entry.stored_at) > self.ttl {
                continue;
            }

            let similarity = cosine_similarity(embedding, &entry.embedding);
            if similarity >= self.threshold
                && best.map_or(true, |(s, _)| similarity > s)
            {
                best = Some((similarity, entry));
            }
        }

        let hit = best.map(|(_, entry)| entry.response.clone());
        drop(entries);

        let mut stats = self.stats.lock();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        hit
    }

    /// Store a finished reply, dropping expired entries along the way.
    pub fn store(&self, embedding: Vec<f32>, response: String) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        entries.retain(|e| now.duration_since(e.stored_at) <= self.ttl);
        entries.push(CacheEntry {
            embedding,
            response,
            stored_at: now,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_embedding_hits() {
        let cache = SemanticCache::new(Duration::from_secs(300), 0.85);
        cache.store(vec![1.0, 0.0, 0.0], "cached answer".to_string());

        assert_eq!(
            cache.lookup(&[1.0, 0.0, 0.0]).as_deref(),
            Some("cached answer")
        );
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn dissimilar_embedding_misses() {
        let cache = SemanticCache::new(Duration::from_secs(300), 0.85);
        cache.store(vec![1.0, 0.0, 0.0], "cached answer".to_string());

        assert_eq!(cache.lookup(&[0.0, 1.0, 0.0]), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn best_match_wins() {
        let cache = SemanticCache::new(Duration::from_secs(300), 0.5);
        cache.store(vec![1.0, 0.3, 0.0], "close".to_string());
        cache.store(vec![1.0, 0.0, 0.0], "closest".to_string());

        assert_eq!(cache.lookup(&[1.0, 0.0, 0.0]).as_deref(), Some("closest"));
    }

    #[test]
    fn expired_entries_are_invisible_and_purged() {
        let cache = SemanticCache::new(Duration::ZERO, 0.85);
        cache.store(vec![1.0, 0.0], "stale".to_string());

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.lookup(&[1.0, 0.0]), None);

        // A store after expiry purges the dead entry
        cache.store(vec![0.0, 1.0], "fresh".to_string());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
