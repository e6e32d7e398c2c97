//! User directory snapshot, refreshed every `ttl`.
//!
//! Lookups read a shared immutable snapshot. When a refresh fails and a
//! previous snapshot exists, the previous one keeps being served.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::domain::error::Result;
use crate::domain::identity::AccountIdentity;
use crate::obs;

/// Source of all known accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn accounts(&self) -> Result<Vec<AccountIdentity>>;
}

/// Directory backed by a fixed list, e.g. `[[directory.accounts]]` in settings.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    accounts: Vec<AccountIdentity>,
}

impl StaticDirectory {
    pub fn new(accounts: Vec<AccountIdentity>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl AccountDirectory for StaticDirectory {
    async fn accounts(&self) -> Result<Vec<AccountIdentity>> {
        Ok(self.accounts.clone())
    }
}

/// Immutable view of the directory at one point in time.
///
/// Every account is indexed by display name, email and username. On a key
/// collision the account listed first wins.
#[derive(Debug)]
pub struct DirectorySnapshot {
    accounts: Vec<AccountIdentity>,
    index: HashMap<String, usize>,
    loaded_at: Instant,
}

impl DirectorySnapshot {
    pub fn new(accounts: Vec<AccountIdentity>) -> Self {
        let mut index = HashMap::new();
        for (i, account) in accounts.iter().enumerate() {
            for key in [&account.display_name, &account.email, &account.username] {
                index.entry(key.clone()).or_insert(i);
            }
        }
        Self {
            accounts,
            index,
            loaded_at: Instant::now(),
        }
    }

    /// Account whose display name, email or username equals `key` exactly.
    pub fn lookup(&self, key: &str) -> Option<&AccountIdentity> {
        self.index.get(key).map(|&i| &self.accounts[i])
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }
}

/// Caches a [`DirectorySnapshot`] loaded from an [`AccountDirectory`].
pub struct DirectoryCache {
    source: Arc<dyn AccountDirectory>,
    ttl: Duration,
    current: RwLock<Option<Arc<DirectorySnapshot>>>,
    refresh: Mutex<()>,
}

impl DirectoryCache {
    pub fn new(source: Arc<dyn AccountDirectory>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Current snapshot, refreshing it first when older than the ttl.
    ///
    /// Only one refresh runs at a time; concurrent callers wait for it and
    /// then read its result. Errors only when no snapshot was ever loaded.
    pub async fn snapshot(&self) -> Result<Arc<DirectorySnapshot>> {
        if let Some(snapshot) = self.fresh().await {
            return Ok(snapshot);
        }

        let _guard = self.refresh.lock().await;
        if let Some(snapshot) = self.fresh().await {
            return Ok(snapshot);
        }

        match self.source.accounts().await {
            Ok(accounts) => {
                let snapshot = Arc::new(DirectorySnapshot::new(accounts));
                obs::emit_directory_refreshed(snapshot.len());
                *self.current.write().await = Some(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(e) => {
                let stale = self.current.read().await.clone();
                obs::emit_directory_refresh_failed(&e, stale.is_some());
                stale.ok_or(e)
            }
        }
    }

    async fn fresh(&self) -> Option<Arc<DirectorySnapshot>> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_fresh(self.ttl))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::CountingDirectory;

    const TTL: Duration = Duration::from_secs(300);

    fn accounts() -> Vec<AccountIdentity> {
        vec![
            AccountIdentity::new("tomas", "Tomas", "my@email.com"),
            AccountIdentity::new("ci", "Build Bot", "ci@example.com").service(),
        ]
    }

    #[test]
    fn lookup_by_any_key() {
        let snapshot = DirectorySnapshot::new(accounts());
        assert_eq!(snapshot.lookup("tomas").unwrap().email, "my@email.com");
        assert_eq!(snapshot.lookup("Tomas").unwrap().username, "tomas");
        assert_eq!(snapshot.lookup("ci@example.com").unwrap().username, "ci");
        assert!(snapshot.lookup("TOMAS").is_none());
        assert!(snapshot.lookup("nobody").is_none());
    }

    #[test]
    fn first_account_wins_collision() {
        let snapshot = DirectorySnapshot::new(vec![
            AccountIdentity::new("a", "Shared", "a@example.com"),
            AccountIdentity::new("b", "Shared", "b@example.com"),
        ]);
        assert_eq!(snapshot.lookup("Shared").unwrap().username, "a");
        assert_eq!(snapshot.lookup("b").unwrap().username, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_reused_within_ttl() {
        let source = Arc::new(CountingDirectory::new(accounts()));
        let cache = DirectoryCache::new(source.clone(), TTL);

        cache.snapshot().await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        cache.snapshot().await.unwrap();
        assert_eq!(source.calls(), 1);

        tokio::time::advance(TTL).await;
        cache.snapshot().await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_serves_stale_snapshot() {
        let source = Arc::new(CountingDirectory::new(accounts()));
        let cache = DirectoryCache::new(source.clone(), TTL);

        cache.snapshot().await.unwrap();
        source.set_failing(true);
        tokio::time::advance(TTL * 2).await;

        let snapshot = cache.snapshot().await.unwrap();
        assert!(snapshot.lookup("tomas").is_some());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failed_first_load_is_an_error() {
        let source = Arc::new(CountingDirectory::new(accounts()));
        source.set_failing(true);
        let cache = DirectoryCache::new(source, TTL);
        assert!(cache.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let source = Arc::new(CountingDirectory::new(accounts()));
        let cache = Arc::new(DirectoryCache::new(source.clone(), TTL));

        let callers = (0..4).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.snapshot().await.map(|s| s.len()) }
        });
        let sizes = futures::future::try_join_all(callers).await.unwrap();

        assert_eq!(sizes, vec![2; 4]);
        assert_eq!(source.calls(), 1);
    }
}
