use crate::models::{Character, CharacterQuery};
use crate::services::{AssetStore, CacheKey, CacheManager, EntityStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Collaborators the maintenance jobs work against
#[derive(Clone)]
pub struct Housekeeper {
    pub store: Arc<dyn EntityStore>,
    pub assets: Arc<dyn AssetStore>,
    pub cache: Arc<CacheManager>,
}

/// Schedule for the periodic jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HousekeepingSchedule {
    pub sweep_enabled: bool,
    pub sweep_interval: Duration,
    pub count_refresh_interval: Duration,
    pub receipt_retention: Duration,
}

impl Housekeeper {
    pub fn new(
        store: Arc<dyn EntityStore>,
        assets: Arc<dyn AssetStore>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            store,
            assets,
            cache,
        }
    }

    /// Delete a character, then its images, then every cached listing
    ///
    /// The images are deleted concurrently. Image and cache cleanup are
    /// best-effort once the record is gone.
    /// Returns the purged character, or `None` if it did not exist.
    pub async fn purge_character(&self, id: &str) -> Result<Option<Character>, StoreError> {
        let Some(character) = self.store.find(id).await? else {
            return Ok(None);
        };

        if !self.store.delete(id).await? {
            return Ok(None);
        }

        let mut deletions = JoinSet::new();
        for handle in character.images.handles() {
            let assets = Arc::clone(&self.assets);
            let handle = handle.to_string();
            deletions.spawn(async move {
                let result = assets.delete(&handle).await;
                (handle, result)
            });
        }
        while let Some(joined) = deletions.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((handle, Err(e))) => {
                    tracing::warn!("Failed to delete image {} of {}: {}", handle, id, e)
                }
                Err(e) => tracing::warn!("Image deletion task for {} failed: {}", id, e),
            }
        }

        if let Err(e) = self.cache.invalidate_pattern(CacheKey::LISTINGS).await {
            tracing::warn!("Failed to invalidate listings after purging {}: {}", id, e);
        }

        tracing::info!("Purged character {} ({})", character.name, id);
        Ok(Some(character))
    }

    /// Purge the character with the most losses
    pub async fn sweep_lowest_ranked(&self) -> Result<Option<Character>, StoreError> {
        let lowest = self.store.list(&CharacterQuery::most_losses(1)).await?;
        match lowest.into_iter().next() {
            Some(character) => self.purge_character(&character.id).await,
            None => Ok(None),
        }
    }

    /// Recount characters and publish the total to the cache
    pub async fn refresh_count(&self) -> Result<u64, StoreError> {
        let count = self.store.count().await?;
        if let Err(e) = self.cache.set(&CacheKey::count(), &count).await {
            tracing::warn!("Failed to cache character count: {}", e);
        }
        Ok(count)
    }

    /// Drop tally receipts older than `retention`
    pub async fn prune_receipts(&self, retention: Duration) -> Result<u64, StoreError> {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::days(7));
        self.store.prune_receipts(chrono::Utc::now() - retention).await
    }

    /// Start the periodic jobs on the current runtime
    ///
    /// Each job first fires one full period after startup. Errors are logged
    /// and the job keeps its schedule.
    pub fn spawn(self, schedule: HousekeepingSchedule) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if schedule.sweep_enabled {
            let job = self.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = interval_at(
                    Instant::now() + schedule.sweep_interval,
                    schedule.sweep_interval,
                );
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    match job.sweep_lowest_ranked().await {
                        Ok(Some(c)) => tracing::info!("Lowest ranking character {} deleted", c.id),
                        Ok(None) => tracing::debug!("Sweep found no characters"),
                        Err(e) => tracing::error!("Error removing lowest ranking character: {}", e),
                    }
                    match job.prune_receipts(schedule.receipt_retention).await {
                        Ok(pruned) => tracing::debug!("Pruned {} tally receipts", pruned),
                        Err(e) => tracing::error!("Error pruning tally receipts: {}", e),
                    }
                }
            }));
        }

        let job = self;
        handles.push(tokio::spawn(async move {
            let mut ticker = interval_at(
                Instant::now() + schedule.count_refresh_interval,
                schedule.count_refresh_interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match job.refresh_count().await {
                    Ok(count) => tracing::debug!("Character count refreshed: {}", count),
                    Err(e) => tracing::error!("Error refreshing character count: {}", e),
                }
            }
        }));

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CharacterImages;
    use crate::services::{Asset, AssetError, InMemoryAssetStore, InMemoryEntityStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Asset store whose deletes stall, recording how many overlap
    #[derive(Default)]
    struct StallingAssets {
        inner: InMemoryAssetStore,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl AssetStore for StallingAssets {
        async fn store(&self, asset: Asset) -> Result<String, AssetError> {
            self.inner.store(asset).await
        }

        async fn fetch(&self, handle: &str) -> Result<Asset, AssetError> {
            self.inner.fetch(handle).await
        }

        async fn delete(&self, handle: &str) -> Result<(), AssetError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.delete(handle).await
        }
    }

    async fn setup() -> (Housekeeper, Arc<InMemoryEntityStore>, Arc<InMemoryAssetStore>) {
        let store = Arc::new(InMemoryEntityStore::new());
        let assets = Arc::new(InMemoryAssetStore::new());

        for (id, losses) in [("1", 3), ("2", 8), ("3", 0)] {
            let mut c = Character::new(id, format!("Pilot {}", id));
            c.losses = losses;
            c.images = CharacterImages::for_character(id);
            for handle in c.images.handles() {
                assets.store(Asset::jpeg(handle, vec![0])).await.unwrap();
            }
            store.insert(c).await;
        }

        let keeper = Housekeeper::new(
            store.clone(),
            assets.clone(),
            Arc::new(CacheManager::in_process(100, 60)),
        );
        (keeper, store, assets)
    }

    #[tokio::test]
    async fn test_sweep_purges_most_losses_with_images() {
        let (keeper, store, assets) = setup().await;
        assert_eq!(assets.len().await, 15);

        let swept = keeper.sweep_lowest_ranked().await.unwrap().unwrap();
        assert_eq!(swept.id, "2");
        assert!(store.find("2").await.unwrap().is_none());
        assert_eq!(assets.len().await, 10);
    }

    #[tokio::test]
    async fn test_purge_deletes_images_concurrently() {
        let store = Arc::new(InMemoryEntityStore::new());
        let assets = Arc::new(StallingAssets::default());
        let mut c = Character::new("7", "Pilot 7");
        c.images = CharacterImages::for_character("7");
        for handle in c.images.handles() {
            assets.store(Asset::jpeg(handle, vec![0])).await.unwrap();
        }
        store.insert(c).await;

        let keeper = Housekeeper::new(
            store.clone(),
            assets.clone(),
            Arc::new(CacheManager::in_process(100, 60)),
        );
        let purged = keeper.purge_character("7").await.unwrap().unwrap();

        assert_eq!(purged.id, "7");
        assert!(assets.inner.is_empty().await);
        assert_eq!(assets.peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_purge_missing_character() {
        let (keeper, _, _) = setup().await;
        assert!(keeper.purge_character("404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_count_publishes_to_cache() {
        let (keeper, _, _) = setup().await;
        assert_eq!(keeper.refresh_count().await.unwrap(), 3);

        let cached: u64 = keeper.cache.get(&CacheKey::count()).await.unwrap();
        assert_eq!(cached, 3);
    }

    #[tokio::test]
    async fn test_purge_invalidates_listings() {
        let (keeper, _, _) = setup().await;
        keeper.cache.set(&CacheKey::worst(), &vec!["2"]).await.unwrap();

        keeper.purge_character("1").await.unwrap();
        assert!(keeper.cache.get::<Vec<String>>(&CacheKey::worst()).await.is_err());
    }
}
