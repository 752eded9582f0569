// Service exports
pub mod assets;
pub mod cache;
pub mod housekeeping;
pub mod memory;
pub mod postgres;
pub mod store;

pub use assets::{AppwriteStorage, Asset, AssetError, AssetStore, InMemoryAssetStore};
pub use cache::{CacheError, CacheKey, CacheManager};
pub use housekeeping::{Housekeeper, HousekeepingSchedule};
pub use memory::InMemoryEntityStore;
pub use postgres::PostgresClient;
pub use store::{EntityStore, StoreError, TallyReceipt};
