//! Token revocation store.
//!
//! The store is a TTL key-value set shared by every server process, so a
//! revocation (or a rotation claim) is visible immediately everywhere —
//! replay detection depends on no stale reads. In production this trait
//! fronts a networked TTL store; [`MemoryRevocationStore`] is the
//! single-process implementation and the test double.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::errors::AuthError;

/// Shared TTL key-value set holding revoked-token fingerprints.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Insert `key`, expiring after `ttl`. Overwrites any existing entry.
    async fn set_with_expiry(&self, key: &str, ttl: Duration) -> Result<(), AuthError>;

    /// Insert `key` only if it is not already present (`SET NX EX`).
    ///
    /// Returns `true` when this call claimed the key. Exactly one caller
    /// can win for a given key, which is what makes refresh rotation
    /// single-use.
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, AuthError>;

    /// Whether `key` is present (and unexpired).
    async fn exists(&self, key: &str) -> Result<bool, AuthError>;
}

/// In-process revocation store backed by a concurrent map.
///
/// Entries expire lazily on read; [`purge_expired`](Self::purge_expired)
/// sweeps the map for long-lived processes.
#[derive(Default)]
pub struct MemoryRevocationStore {
    entries: DashMap<String, Instant>,
}

impl MemoryRevocationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before - self.entries.len()
    }

    /// Number of live (possibly-expired, not yet purged) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn set_with_expiry(&self, key: &str, ttl: Duration) -> Result<(), AuthError> {
        let _ = self.entries.insert(key.to_owned(), Instant::now() + ttl);
        Ok(())
    }

    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, AuthError> {
        let now = Instant::now();
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    Ok(false)
                } else {
                    // Expired entry: the key is free to claim again.
                    let _ = occupied.insert(now + ttl);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                let _ = vacant.insert(now + ttl);
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        let now = Instant::now();
        if let Some(expires_at) = self.entries.get(key).map(|e| *e.value()) {
            if expires_at > now {
                return Ok(true);
            }
            let _ = self.entries.remove(key);
        }
        Ok(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_then_exists() {
        let store = MemoryRevocationStore::new();
        store.set_with_expiry("k1", LONG).await.unwrap();
        assert!(store.exists("k1").await.unwrap());
        assert!(!store.exists("k2").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entry_not_found() {
        let store = MemoryRevocationStore::new();
        store
            .set_with_expiry("k1", Duration::from_millis(0))
            .await
            .unwrap();
        assert!(!store.exists("k1").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entry_removed_on_read() {
        let store = MemoryRevocationStore::new();
        store
            .set_with_expiry("k1", Duration::from_millis(0))
            .await
            .unwrap();
        let _ = store.exists("k1").await.unwrap();
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn insert_if_absent_claims_once() {
        let store = MemoryRevocationStore::new();
        assert!(store.insert_if_absent("k1", LONG).await.unwrap());
        assert!(!store.insert_if_absent("k1", LONG).await.unwrap());
        assert!(store.exists("k1").await.unwrap());
    }

    #[tokio::test]
    async fn insert_if_absent_reclaims_expired() {
        let store = MemoryRevocationStore::new();
        assert!(
            store
                .insert_if_absent("k1", Duration::from_millis(0))
                .await
                .unwrap()
        );
        // The old entry is expired, so the key can be claimed again.
        assert!(store.insert_if_absent("k1", LONG).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_claims_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(MemoryRevocationStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert_if_absent("contested", LONG).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn purge_expired_sweeps() {
        let store = MemoryRevocationStore::new();
        store
            .set_with_expiry("dead", Duration::from_millis(0))
            .await
            .unwrap();
        store.set_with_expiry("live", LONG).await.unwrap();
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.exists("live").await.unwrap());
    }

    #[tokio::test]
    async fn set_overwrites_ttl() {
        let store = MemoryRevocationStore::new();
        store
            .set_with_expiry("k1", Duration::from_millis(0))
            .await
            .unwrap();
        store.set_with_expiry("k1", LONG).await.unwrap();
        assert!(store.exists("k1").await.unwrap());
    }

    #[test]
    fn empty_store() {
        let store = MemoryRevocationStore::new();
        assert!(store.is_empty());
        assert_eq!(store.purge_expired(), 0);
    }
}
